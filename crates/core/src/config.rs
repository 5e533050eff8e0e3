//! 설정 관리 -- watchtower.toml 파싱 및 런타임 설정
//!
//! [`WatchtowerConfig`]는 모든 모듈의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`WATCHTOWER_RECEIVER_BIND_ADDR=0.0.0.0:514` 형식)
//! 3. 설정 파일 (`watchtower.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), watchtower_core::error::WatchtowerError> {
//! use watchtower_core::config::WatchtowerConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = WatchtowerConfig::load("watchtower.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = WatchtowerConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::net::SocketAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, WatchtowerError};

/// UDP 데이터그램 최대 크기
const MAX_DATAGRAM_SIZE: usize = 65_535;

/// Watchtower 통합 설정
///
/// `watchtower.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WatchtowerConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// UDP 수신기 설정
    #[serde(default)]
    pub receiver: ReceiverConfig,
    /// 채널 라우팅 설정
    #[serde(default)]
    pub routing: RoutingConfig,
    /// 알림 추출/중복 제거 설정
    #[serde(default)]
    pub alerting: AlertingConfig,
    /// 이벤트 아카이브 설정
    #[serde(default)]
    pub archive: ArchiveConfig,
    /// 처리 단계 설정
    #[serde(default)]
    pub pipeline: ProcessingConfig,
    /// 메트릭 엔드포인트 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl WatchtowerConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, WatchtowerError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, WatchtowerError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                WatchtowerError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                WatchtowerError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, WatchtowerError> {
        toml::from_str(toml_str).map_err(|e| {
            WatchtowerError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `WATCHTOWER_{SECTION}_{FIELD}`
    ///
    /// 기존 배포와의 호환을 위해 `SYSLOG_HOST`/`SYSLOG_PORT`도 읽습니다.
    /// `WATCHTOWER_RECEIVER_BIND_ADDR`가 설정되어 있으면 그것이 우선합니다.
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "WATCHTOWER_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "WATCHTOWER_GENERAL_LOG_FORMAT");

        // Receiver
        override_legacy_bind(&mut self.receiver.bind_addr);
        override_string(
            &mut self.receiver.bind_addr,
            "WATCHTOWER_RECEIVER_BIND_ADDR",
        );
        override_usize(
            &mut self.receiver.recv_buffer_size,
            "WATCHTOWER_RECEIVER_RECV_BUFFER_SIZE",
        );
        override_usize(
            &mut self.receiver.max_message_size,
            "WATCHTOWER_RECEIVER_MAX_MESSAGE_SIZE",
        );
        override_usize(
            &mut self.receiver.queue_capacity,
            "WATCHTOWER_RECEIVER_QUEUE_CAPACITY",
        );

        // Routing
        override_string(
            &mut self.routing.routes_path,
            "WATCHTOWER_ROUTING_ROUTES_PATH",
        );
        override_csv(
            &mut self.routing.alert_channels,
            "WATCHTOWER_ROUTING_ALERT_CHANNELS",
        );

        // Alerting
        override_string(
            &mut self.alerting.ledger_path,
            "WATCHTOWER_ALERTING_LEDGER_PATH",
        );
        override_string(
            &mut self.alerting.internal_alerts_path,
            "WATCHTOWER_ALERTING_INTERNAL_ALERTS_PATH",
        );
        override_string(
            &mut self.alerting.external_alerts_path,
            "WATCHTOWER_ALERTING_EXTERNAL_ALERTS_PATH",
        );
        override_string(
            &mut self.alerting.job_catalog_path,
            "WATCHTOWER_ALERTING_JOB_CATALOG_PATH",
        );

        // Archive
        override_string(
            &mut self.archive.events_path,
            "WATCHTOWER_ARCHIVE_EVENTS_PATH",
        );
        override_string(
            &mut self.archive.channel_log_path,
            "WATCHTOWER_ARCHIVE_CHANNEL_LOG_PATH",
        );

        // Pipeline
        override_u64(
            &mut self.pipeline.handler_timeout_secs,
            "WATCHTOWER_PIPELINE_HANDLER_TIMEOUT_SECS",
        );

        // Metrics
        override_bool(&mut self.metrics.enabled, "WATCHTOWER_METRICS_ENABLED");
        override_string(
            &mut self.metrics.listen_addr,
            "WATCHTOWER_METRICS_LISTEN_ADDR",
        );
        override_u16(&mut self.metrics.port, "WATCHTOWER_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), WatchtowerError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.receiver.bind_addr.parse::<SocketAddr>().is_err() {
            return Err(invalid(
                "receiver.bind_addr",
                format!("'{}' is not a valid socket address", self.receiver.bind_addr),
            ));
        }

        if self.receiver.max_message_size == 0
            || self.receiver.max_message_size > MAX_DATAGRAM_SIZE
        {
            return Err(invalid(
                "receiver.max_message_size",
                format!("must be 1-{MAX_DATAGRAM_SIZE}"),
            ));
        }

        if self.receiver.queue_capacity == 0 {
            return Err(invalid("receiver.queue_capacity", "must be greater than 0"));
        }

        if self.routing.routes_path.is_empty() {
            return Err(invalid("routing.routes_path", "must not be empty"));
        }

        for (field, value) in [
            ("alerting.ledger_path", &self.alerting.ledger_path),
            (
                "alerting.internal_alerts_path",
                &self.alerting.internal_alerts_path,
            ),
            (
                "alerting.external_alerts_path",
                &self.alerting.external_alerts_path,
            ),
            ("archive.events_path", &self.archive.events_path),
            ("archive.channel_log_path", &self.archive.channel_log_path),
        ] {
            if value.is_empty() {
                return Err(invalid(field, "must not be empty"));
            }
        }

        if self.pipeline.handler_timeout_secs == 0 {
            return Err(invalid(
                "pipeline.handler_timeout_secs",
                "must be greater than 0",
            ));
        }

        if self.metrics.enabled && self.metrics.endpoint != "/metrics" {
            return Err(invalid(
                "metrics.endpoint",
                "only '/metrics' is supported",
            ));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> WatchtowerError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.into(),
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// UDP 수신기 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// 바인드 주소
    pub bind_addr: String,
    /// 커널 수신 버퍼 크기 힌트 (SO_RCVBUF, 바이트). 0이면 OS 기본값.
    pub recv_buffer_size: usize,
    /// 데이터그램당 최대 읽기 크기 (바이트)
    pub max_message_size: usize,
    /// 수신 단계와 처리 단계 사이 큐 용량
    pub queue_capacity: usize,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:1514".to_owned(),
            recv_buffer_size: 256 * 1024,
            max_message_size: 8192,
            queue_capacity: 1024,
        }
    }
}

/// 채널 라우팅 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// 라우트 테이블 JSON 경로
    pub routes_path: String,
    /// 알림 추출을 수행할 채널 이름 목록
    pub alert_channels: Vec<String>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            routes_path: "/etc/watchtower/routes.json".to_owned(),
            alert_channels: vec!["controlm".to_owned()],
        }
    }
}

/// 알림 추출 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertingConfig {
    /// 중복 제거 원장 파일 경로
    pub ledger_path: String,
    /// 내부 감사 로그 경로
    pub internal_alerts_path: String,
    /// 외부 소비자용 알림 로그 경로
    pub external_alerts_path: String,
    /// 작업 카탈로그 JSON 경로. 비어 있으면 모든 작업이 미등록으로 처리됩니다.
    pub job_catalog_path: String,
}

impl Default for AlertingConfig {
    fn default() -> Self {
        Self {
            ledger_path: "/var/lib/watchtower/controlm/ids_alerted.log".to_owned(),
            internal_alerts_path: "/var/lib/watchtower/controlm/controlm_log_alerts.txt"
                .to_owned(),
            external_alerts_path: "/var/lib/watchtower/controlm/alerts_to_work.log".to_owned(),
            job_catalog_path: String::new(),
        }
    }
}

/// 이벤트 아카이브 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// 모든 이벤트를 기록하는 JSONL 경로
    pub events_path: String,
    /// 알림 채널 원본 로그 JSONL 경로
    pub channel_log_path: String,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            events_path: "/var/lib/watchtower/syslog_events.jsonl".to_owned(),
            channel_log_path: "/var/lib/watchtower/controlm/router_logs.jsonl".to_owned(),
        }
    }
}

/// 처리 단계 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// 패킷 하나의 처리 제한 시간 (초)
    pub handler_timeout_secs: u64,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            handler_timeout_secs: 5,
        }
    }
}

/// 메트릭 엔드포인트 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 리슨 주소
    pub listen_addr: String,
    /// 리슨 포트
    pub port: u16,
    /// 스크레이프 경로
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9100,
            endpoint: "/metrics".to_owned(),
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}

/// `SYSLOG_HOST`/`SYSLOG_PORT`로 바인드 주소의 호스트/포트 부분을 교체합니다.
fn override_legacy_bind(bind_addr: &mut String) {
    let host = std::env::var("SYSLOG_HOST").ok();
    let port = std::env::var("SYSLOG_PORT").ok();
    if host.is_none() && port.is_none() {
        return;
    }

    let (current_host, current_port) = match bind_addr.rsplit_once(':') {
        Some((h, p)) => (h.to_owned(), p.to_owned()),
        None => (bind_addr.clone(), String::new()),
    };

    if let Some(port) = &port {
        if port.parse::<u16>().is_err() {
            warn!(value = port.as_str(), "SYSLOG_PORT is not a valid port, ignoring");
            return;
        }
    }

    let host = match host {
        Some(h) if h.contains(':') && !h.starts_with('[') => format!("[{h}]"),
        Some(h) => h,
        None => current_host,
    };
    let port = port.unwrap_or(current_port);
    *bind_addr = format!("{host}:{port}");
}
