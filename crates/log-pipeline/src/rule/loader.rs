//! 규칙 파일 로더 -- YAML 규칙 파일을 디스크에서 로드합니다.
//!
//! 규칙 디렉토리 내의 `.yml`/`.yaml` 파일을 스캔하고 파싱합니다.
//! 개별 파일 파싱 실패는 경고 로그를 남기고 건너뜁니다.
//! [`RuleLoader::import_directory`]는 로드한 규칙을 이름 기준으로 규칙 테이블에 upsert합니다.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use ironwatch_storage::Storage;

use crate::error::LogPipelineError;

use super::types::RuleDefinition;

/// 규칙 파일 로더 설정
const MAX_RULE_FILE_SIZE: u64 = 10 * 1024 * 1024; // 10MB
const MAX_RULES_COUNT: usize = 10_000;

/// 파일 하나의 로딩 결과
#[derive(Debug)]
pub struct RuleFileReport {
    pub path: PathBuf,
    pub result: Result<RuleDefinition, LogPipelineError>,
}

/// import 결과
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// upsert된 규칙 수
    pub imported: usize,
    /// 저장에 실패한 규칙 수
    pub failed: usize,
}

/// 규칙 파일 로더
pub struct RuleLoader;

impl RuleLoader {
    /// 디렉토리의 모든 YAML 파일을 파일별 결과와 함께 읽습니다 (경로 순).
    ///
    /// # Errors
    /// - 디렉토리를 읽을 수 없는 경우
    pub async fn scan_directory(
        dir: impl AsRef<Path>,
    ) -> Result<Vec<RuleFileReport>, LogPipelineError> {
        let dir = dir.as_ref();
        let dir_error = |reason: String| LogPipelineError::RuleLoad {
            path: dir.display().to_string(),
            reason,
        };

        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| dir_error(format!("failed to read directory: {e}")))?;

        let mut paths = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| dir_error(format!("failed to read directory entry: {e}")))?
        {
            let path = entry.path();
            let is_yaml = path
                .extension()
                .is_some_and(|ext| ext == "yml" || ext == "yaml");
            if is_yaml {
                paths.push(path);
            }
        }
        paths.sort();

        let mut reports = Vec::with_capacity(paths.len());
        for path in paths {
            let result = Self::load_file(&path).await;
            reports.push(RuleFileReport { path, result });
        }
        Ok(reports)
    }

    /// 디렉토리에서 모든 YAML 규칙 파일을 로드합니다.
    ///
    /// 개별 파일 로딩 실패와 중복 이름은 경고 로그를 남기고 건너뜁니다.
    ///
    /// # Errors
    /// - 디렉토리를 읽을 수 없는 경우
    /// - 규칙 수가 `MAX_RULES_COUNT`를 초과하는 경우
    pub async fn load_directory(
        dir: impl AsRef<Path>,
    ) -> Result<Vec<RuleDefinition>, LogPipelineError> {
        let dir = dir.as_ref();
        let mut rules = Vec::new();
        let mut seen_names = HashSet::new();

        for report in Self::scan_directory(dir).await? {
            match report.result {
                Ok(rule) => {
                    if !seen_names.insert(rule.name.clone()) {
                        tracing::warn!(
                            rule = %rule.name,
                            path = %report.path.display(),
                            "duplicate rule name, skipping"
                        );
                        continue;
                    }
                    rules.push(rule);
                }
                Err(e) => {
                    tracing::warn!(
                        path = %report.path.display(),
                        error = %e,
                        "failed to load rule file, skipping"
                    );
                }
            }

            if rules.len() > MAX_RULES_COUNT {
                return Err(LogPipelineError::RuleLoad {
                    path: dir.display().to_string(),
                    reason: format!("too many rules: max {MAX_RULES_COUNT}"),
                });
            }
        }

        tracing::info!(
            dir = %dir.display(),
            count = rules.len(),
            "loaded detection rules"
        );

        Ok(rules)
    }

    /// 디렉토리의 규칙을 규칙 테이블로 가져옵니다.
    ///
    /// 같은 이름의 행은 갱신됩니다. 행 하나의 저장 실패는 나머지를 막지 않습니다.
    pub async fn import_directory(
        storage: &Storage,
        dir: impl AsRef<Path>,
    ) -> Result<ImportSummary, LogPipelineError> {
        let rules = Self::load_directory(dir).await?;
        let mut new_rules = Vec::with_capacity(rules.len());
        for rule in &rules {
            new_rules.push(rule.to_new_rule()?);
        }

        let storage = storage.clone();
        let summary = tokio::task::spawn_blocking(move || {
            let mut summary = ImportSummary::default();
            for rule in &new_rules {
                match storage.upsert_rule(rule) {
                    Ok(id) => {
                        tracing::debug!(rule = %rule.name, rule_id = id, "rule imported");
                        summary.imported += 1;
                    }
                    Err(e) => {
                        tracing::warn!(rule = %rule.name, error = %e, "failed to import rule");
                        summary.failed += 1;
                    }
                }
            }
            summary
        })
        .await?;

        tracing::info!(
            imported = summary.imported,
            failed = summary.failed,
            "rule import finished"
        );
        Ok(summary)
    }

    /// 단일 YAML 파일에서 규칙을 로드합니다.
    pub async fn load_file(path: impl AsRef<Path>) -> Result<RuleDefinition, LogPipelineError> {
        let path = path.as_ref();
        let file_error = |reason: String| LogPipelineError::RuleLoad {
            path: path.display().to_string(),
            reason,
        };

        // 파일 크기 검증
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| file_error(format!("failed to read file metadata: {e}")))?;

        if metadata.len() > MAX_RULE_FILE_SIZE {
            return Err(file_error(format!(
                "file too large: {} bytes (max: {MAX_RULE_FILE_SIZE})",
                metadata.len()
            )));
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| file_error(format!("failed to read file: {e}")))?;

        Self::parse_yaml(&content, &path.display().to_string())
    }

    /// YAML 문자열을 파싱하여 규칙을 생성합니다.
    pub fn parse_yaml(yaml_str: &str, source: &str) -> Result<RuleDefinition, LogPipelineError> {
        let rule: RuleDefinition =
            serde_yaml::from_str(yaml_str).map_err(|e| LogPipelineError::RuleLoad {
                path: source.to_owned(),
                reason: format!("YAML parse error: {e}"),
            })?;

        // 유효성 검증
        rule.validate()?;

        Ok(rule)
    }
}
