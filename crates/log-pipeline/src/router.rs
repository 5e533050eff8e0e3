//! 채널 라우터 -- 송신자 식별 정보로 채널 이름을 결정합니다.
//!
//! 우선순위는 정확한 IP 일치 > 호스트명 일치 > 기본 채널입니다.
//! 호스트명은 앞뒤 공백 제거, 소문자화, 끝의 점 하나 제거 후 비교합니다.
//!
//! 라우트 테이블은 시작 시 한 번 JSON 문서에서 로드하며 이후 변경되지 않습니다.
//!
//! ```json
//! {
//!   "version": 1,
//!   "default_router": "raw",
//!   "routers": [
//!     { "name": "controlm", "ip_addresses": ["10.0.0.5"], "hostnames": ["ctm01.corp."] }
//!   ]
//! }
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::LogPipelineError;

/// 라우트 문서 최대 크기
const MAX_ROUTES_FILE_SIZE: u64 = 10 * 1024 * 1024; // 10MB

/// 채널이 결정된 근거
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchReason {
    /// 송신 IP 일치
    Ip,
    /// 호스트명 일치
    Hostname,
    /// 일치 없음, 기본 채널
    Default,
}

impl MatchReason {
    /// 로그와 아카이브에 쓰는 문자열 표현
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ip => "ip",
            Self::Hostname => "hostname",
            Self::Default => "default",
        }
    }
}

impl fmt::Display for MatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 라우팅 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    /// 채널 이름
    pub channel: String,
    /// 결정 근거
    pub reason: MatchReason,
}

#[derive(Debug, Deserialize)]
struct RouteDocument {
    #[serde(default = "default_version")]
    version: u32,
    #[serde(default = "default_router_name")]
    default_router: String,
    #[serde(default)]
    routers: Vec<RouterEntry>,
}

#[derive(Debug, Deserialize)]
struct RouterEntry {
    name: String,
    #[serde(default)]
    ip_addresses: Option<Vec<String>>,
    #[serde(default)]
    hostnames: Option<Vec<String>>,
}

fn default_version() -> u32 {
    1
}

fn default_router_name() -> String {
    "raw".to_owned()
}

/// 라우트 테이블
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTable {
    version: u32,
    default_router: String,
    ip_to_router: HashMap<String, String>,
    host_to_router: HashMap<String, String>,
}

impl RouteTable {
    /// 기본 채널만 있는 빈 테이블을 생성합니다.
    pub fn new(default_router: impl Into<String>) -> Self {
        Self {
            version: default_version(),
            default_router: default_router.into(),
            ip_to_router: HashMap::new(),
            host_to_router: HashMap::new(),
        }
    }

    /// IP 라우트를 추가합니다. 같은 IP가 이미 있으면 덮어씁니다.
    pub fn with_ip(mut self, ip: &str, channel: impl Into<String>) -> Self {
        self.ip_to_router.insert(ip.trim().to_owned(), channel.into());
        self
    }

    /// 호스트명 라우트를 추가합니다. 정규화 후 비어 있으면 무시합니다.
    pub fn with_hostname(mut self, hostname: &str, channel: impl Into<String>) -> Self {
        if let Some(host) = normalize_hostname(hostname) {
            self.host_to_router.insert(host, channel.into());
        }
        self
    }

    /// JSON 문서에서 테이블을 생성합니다.
    ///
    /// 뒤에 나온 라우터가 같은 IP/호스트명을 다시 지정하면 뒤의 것이 이깁니다.
    pub fn from_json(json: &str) -> Result<Self, LogPipelineError> {
        let doc: RouteDocument = serde_json::from_str(json)?;

        let mut table = Self::new(doc.default_router);
        table.version = doc.version;

        for router in doc.routers {
            for ip in router.ip_addresses.unwrap_or_default() {
                table = table.with_ip(&ip, router.name.clone());
            }
            for host in router.hostnames.unwrap_or_default() {
                table = table.with_hostname(&host, router.name.clone());
            }
        }

        Ok(table)
    }

    /// 파일에서 테이블을 로드합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, LogPipelineError> {
        let path = path.as_ref();
        let route_err = |reason: String| LogPipelineError::RouteTable {
            path: path.display().to_string(),
            reason,
        };

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| route_err(format!("failed to read file metadata: {e}")))?;
        if metadata.len() > MAX_ROUTES_FILE_SIZE {
            return Err(route_err(format!(
                "file too large: {} bytes (max: {MAX_ROUTES_FILE_SIZE})",
                metadata.len()
            )));
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| route_err(format!("failed to read file: {e}")))?;
        let table = Self::from_json(&content).map_err(|e| route_err(e.to_string()))?;

        tracing::info!(
            path = %path.display(),
            version = table.version,
            default_router = %table.default_router,
            ip_routes = table.ip_to_router.len(),
            hostname_routes = table.host_to_router.len(),
            "loaded route table"
        );
        Ok(table)
    }

    /// 문서 버전
    pub fn version(&self) -> u32 {
        self.version
    }

    /// 기본 채널 이름
    pub fn default_router(&self) -> &str {
        &self.default_router
    }

    /// 송신 IP와 호스트명으로 채널을 결정합니다.
    pub fn resolve(&self, source_ip: &str, hostname: Option<&str>) -> RouteMatch {
        if let Some(channel) = self.ip_to_router.get(source_ip) {
            return RouteMatch {
                channel: channel.clone(),
                reason: MatchReason::Ip,
            };
        }

        let host_match = hostname
            .and_then(normalize_hostname)
            .and_then(|host| self.host_to_router.get(&host));
        if let Some(channel) = host_match {
            return RouteMatch {
                channel: channel.clone(),
                reason: MatchReason::Hostname,
            };
        }

        RouteMatch {
            channel: self.default_router.clone(),
            reason: MatchReason::Default,
        }
    }
}

/// 호스트명을 비교용으로 정규화합니다.
fn normalize_hostname(hostname: &str) -> Option<String> {
    let host = hostname.trim().to_lowercase();
    let host = host.strip_suffix('.').unwrap_or(&host);
    (!host.is_empty()).then(|| host.to_owned())
}

/// 채널 라우터
///
/// 라우트 테이블과 알림 채널 목록을 함께 보관합니다.
#[derive(Debug, Clone)]
pub struct Router {
    table: RouteTable,
    alert_channels: HashSet<String>,
}

impl Router {
    /// 새 라우터를 생성합니다.
    pub fn new(table: RouteTable, alert_channels: impl IntoIterator<Item = String>) -> Self {
        Self {
            table,
            alert_channels: alert_channels.into_iter().collect(),
        }
    }

    /// 송신 IP와 호스트명으로 채널을 결정합니다.
    pub fn resolve(&self, source_ip: &str, hostname: Option<&str>) -> RouteMatch {
        self.table.resolve(source_ip, hostname)
    }

    /// 알림 추출을 수행하는 채널인지 확인합니다. 대소문자를 구분합니다.
    pub fn is_alert_bearing(&self, channel: &str) -> bool {
        self.alert_channels.contains(channel)
    }

    /// 라우트 테이블
    pub fn table(&self) -> &RouteTable {
        &self.table
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const DOC: &str = r#"{
        "version": 3,
        "default_router": "archive",
        "routers": [
            { "name": "controlm", "ip_addresses": [" 10.0.0.5 "], "hostnames": ["CTM01.corp."] },
            { "name": "network", "ip_addresses": ["10.0.0.9"], "hostnames": null },
            { "name": "legacy", "hostnames": ["ctm01.corp", "  "] }
        ]
    }"#;

    #[test]
    fn ip_match_wins_over_hostname() {
        let table = RouteTable::from_json(DOC).unwrap();
        let m = table.resolve("10.0.0.9", Some("ctm01.corp"));
        assert_eq!(m.channel, "network");
        assert_eq!(m.reason, MatchReason::Ip);
    }

    #[test]
    fn hostname_match_ignores_case_and_trailing_dot() {
        let table = RouteTable::new("raw").with_hostname("CtM02.Corp.", "controlm");
        let m = table.resolve("192.168.1.1", Some("ctm02.CORP."));
        assert_eq!(m.channel, "controlm");
        assert_eq!(m.reason, MatchReason::Hostname);
        assert_eq!(table.resolve("192.168.1.1", Some(" ctm02.corp ")).channel, "controlm");
    }

    #[test]
    fn later_router_wins_on_conflict() {
        let table = RouteTable::from_json(DOC).unwrap();
        assert_eq!(table.resolve("1.1.1.1", Some("ctm01.corp")).channel, "legacy");
    }

    #[test]
    fn ip_is_trimmed_at_load() {
        let table = RouteTable::from_json(DOC).unwrap();
        assert_eq!(table.resolve("10.0.0.5", None).channel, "controlm");
    }

    #[test]
    fn no_match_falls_back_to_default() {
        let table = RouteTable::from_json(DOC).unwrap();
        let m = table.resolve("172.16.0.1", None);
        assert_eq!(m.channel, "archive");
        assert_eq!(m.reason, MatchReason::Default);
        assert_eq!(table.resolve("172.16.0.1", Some("")).reason, MatchReason::Default);
        assert_eq!(table.resolve("172.16.0.1", Some(".")).reason, MatchReason::Default);
    }

    #[test]
    fn defaults_when_fields_missing() {
        let table = RouteTable::from_json("{}").unwrap();
        assert_eq!(table.version(), 1);
        assert_eq!(table.default_router(), "raw");
        assert_eq!(table.resolve("10.0.0.1", Some("x")).channel, "raw");
    }

    #[test]
    fn malformed_document_fails() {
        assert!(RouteTable::from_json("{ not json").is_err());
        assert!(RouteTable::from_json(r#"{"routers": [{"ip_addresses": []}]}"#).is_err());
    }

    #[test]
    fn reason_strings() {
        assert_eq!(MatchReason::Ip.to_string(), "ip");
        assert_eq!(MatchReason::Hostname.as_str(), "hostname");
        assert_eq!(
            serde_json::to_string(&MatchReason::Default).unwrap(),
            "\"default\""
        );
    }

    #[test]
    fn alert_channels_are_case_sensitive() {
        let router = Router::new(RouteTable::new("raw"), vec!["controlm".to_owned()]);
        assert!(router.is_alert_bearing("controlm"));
        assert!(!router.is_alert_bearing("ControlM"));
        assert!(!router.is_alert_bearing("raw"));
    }

    #[tokio::test]
    async fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(DOC.as_bytes()).unwrap();
        let table = RouteTable::load(file.path()).await.unwrap();
        assert_eq!(table.version(), 3);
    }

    #[tokio::test]
    async fn load_missing_file_fails() {
        let err = RouteTable::load("/nonexistent/routes.json").await.unwrap_err();
        assert!(matches!(err, LogPipelineError::RouteTable { .. }));
    }
}
