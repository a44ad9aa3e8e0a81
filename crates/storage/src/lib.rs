//! ironwatch-storage -- 임베디드 관계형 저장소
//!
//! 호스트, 로그 엔트리, 종류별 상세, 룰, 알림 테이블을 SQLite 하나에 담고
//! 레포지토리 형태의 좁은 연산을 제공합니다. 각 연산은 독립된 트랜잭션입니다.
//!
//! 모든 호출은 하나의 연결 잠금을 통해 직렬화됩니다 (단일 writer).
//!
//! # 사용 예시
//! ```no_run
//! # fn example() -> Result<(), ironwatch_storage::StoreError> {
//! use ironwatch_storage::{AlertFilter, Storage};
//!
//! let storage = Storage::open_in_memory()?;
//! let alerts = storage.query_alerts(&AlertFilter::default())?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod models;
pub mod schema;

mod alerts;
mod entries;
mod hosts;
mod rules;
mod store;

pub use error::StoreError;
pub use models::{
    AlertFilter, AlertRecord, CountSummary, HostSummary, LogFilter, NewAlert, NewRule,
    ProcessingFlag, RuleRecord, StoredEntry, from_millis, to_millis,
};
pub use store::Storage;
