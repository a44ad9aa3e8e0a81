//! 종류별 상세 필드 추출
//!
//! 저장된 엔트리의 원문과 구조화 필드로부터 [`LogDetail`]을 만듭니다.
//! `linux`는 SSH 인증 패턴을 추가로 해석하고, `nginx`/`windows`는
//! 해당 파서로 원문을 다시 파싱합니다. `unknown`은 추출 대상이 아닙니다.

use std::sync::LazyLock;

use regex::Regex;

use ironwatch_core::pipeline::LogParser;
use ironwatch_core::types::{LinuxDetail, LogDetail, LogKind};

use crate::error::LogPipelineError;
use crate::parser::{EventJsonParser, GenericLineParser, WebAccessParser};

static SSH_AUTH_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?P<ssh_action>Accepted|Failed)\s+(?:password|publickey)\s+for\s+",
        r"(?:invalid\s+user\s+)?(?P<ssh_user>\S+)\s+from\s+(?P<ssh_ip>\S+)",
    ))
    .expect("valid ssh auth regex")
});

/// SSH 인증 시도 정보
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshAuth {
    pub action: String,
    pub user: String,
    pub ip: String,
}

/// 메시지에서 SSH 인증 시도를 찾습니다.
pub fn parse_ssh_auth(message: &str) -> Option<SshAuth> {
    let caps = SSH_AUTH_PATTERN.captures(message)?;
    Some(SshAuth {
        action: caps.name("ssh_action")?.as_str().to_owned(),
        user: caps.name("ssh_user")?.as_str().to_owned(),
        ip: caps.name("ssh_ip")?.as_str().to_owned(),
    })
}

/// 상세 필드 추출기
#[derive(Default)]
pub struct FieldExtractor {
    line: GenericLineParser,
    web: WebAccessParser,
    event: EventJsonParser,
}

impl FieldExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 상세 레코드를 만듭니다.
    ///
    /// 원문에서 상세를 만들 수 없으면 `Ok(None)`입니다.
    pub fn extract(
        &self,
        kind: LogKind,
        raw: &str,
        fields: &[(String, String)],
    ) -> Result<Option<LogDetail>, LogPipelineError> {
        match kind {
            LogKind::Linux => Ok(Some(self.extract_linux(raw, fields))),
            LogKind::Nginx => self.reparse(&self.web, raw),
            LogKind::Windows => self.reparse(&self.event, raw),
            LogKind::Unknown => Ok(None),
        }
    }

    fn extract_linux(&self, raw: &str, fields: &[(String, String)]) -> LogDetail {
        let lookup = |fields: &[(String, String)], name: &str| {
            fields
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
        };

        // 구조화 필드가 없으면 원문 헤더를 다시 해석
        let reparsed;
        let fields = if lookup(fields, "message").is_some() {
            fields
        } else {
            reparsed = self.line.parse(raw).map(|p| p.fields).unwrap_or_default();
            reparsed.as_slice()
        };

        let app_name = lookup(fields, "app_name");
        let message = lookup(fields, "message").unwrap_or_else(|| raw.trim().to_owned());
        let mut detail = LinuxDetail {
            pid: lookup(fields, "pid").and_then(|p| p.parse().ok()),
            app_name,
            message,
            ..LinuxDetail::default()
        };

        let is_sshd = detail
            .app_name
            .as_deref()
            .is_some_and(|a| a.eq_ignore_ascii_case("sshd"));
        if let Some(auth) = is_sshd.then(|| parse_ssh_auth(&detail.message)).flatten() {
            detail.ssh_action = Some(auth.action);
            detail.ssh_user = Some(auth.user);
            detail.ssh_ip = Some(auth.ip);
        }

        LogDetail::Linux(detail)
    }

    fn reparse(
        &self,
        parser: &dyn LogParser,
        raw: &str,
    ) -> Result<Option<LogDetail>, LogPipelineError> {
        let parsed = parser.parse(raw).map_err(|e| LogPipelineError::Parse {
            format: parser.format_name().to_owned(),
            offset: 0,
            reason: e.to_string(),
        })?;
        Ok(parsed.detail)
    }
}
