//! 저장소 에러 타입
//!
//! [`StoreError`]는 저장소 내부 에러를 표현하며,
//! `From<StoreError> for IronwatchError` 변환으로 상위 레이어와 통합됩니다.

use ironwatch_core::error::{IronwatchError, StorageError};

/// 저장소 에러
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// SQLite 실행 실패
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// 필드/메타데이터 직렬화 실패
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 데이터베이스 디렉토리 생성 실패
    #[error("failed to prepare database path '{path}': {source}")]
    Path {
        path: String,
        source: std::io::Error,
    },

    /// 연결 잠금이 오염됨
    #[error("storage connection lock poisoned")]
    LockPoisoned,

    /// 잘못된 입력
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<StoreError> for IronwatchError {
    fn from(err: StoreError) -> Self {
        match &err {
            StoreError::Path { .. } | StoreError::LockPoisoned => {
                IronwatchError::Storage(StorageError::Connection(err.to_string()))
            }
            StoreError::Sqlite(_) | StoreError::Serialization(_) | StoreError::InvalidArgument(_) => {
                IronwatchError::Storage(StorageError::Query(err.to_string()))
            }
        }
    }
}
