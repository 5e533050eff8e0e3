//! 로그 파이프라인 설정
//!
//! [`PipelineConfig`]는 core의 [`WatchtowerConfig`]에서 수신기, 라우팅,
//! 알림, 아카이브 섹션을 모아 파이프라인이 쓰는 평탄한 설정으로 만듭니다.
//!
//! # 사용 예시
//! ```ignore
//! use watchtower_core::config::WatchtowerConfig;
//! use watchtower_log_pipeline::config::PipelineConfig;
//!
//! let core_config = WatchtowerConfig::default();
//! let config = PipelineConfig::from_core(&core_config);
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use watchtower_core::config::WatchtowerConfig;

use crate::error::LogPipelineError;

/// UDP 데이터그램 최대 크기
const MAX_DATAGRAM_SIZE: usize = 65_535;

/// 큐 용량 상한
const MAX_QUEUE_CAPACITY: usize = 1_000_000;

/// 처리 제한 시간 상한 (초)
const MAX_HANDLER_TIMEOUT_SECS: u64 = 300;

/// 로그 파이프라인 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// UDP 바인드 주소
    pub bind_addr: String,
    /// SO_RCVBUF 힌트 (바이트, 0이면 OS 기본값)
    pub recv_buffer_size: usize,
    /// 데이터그램당 최대 읽기 크기 (바이트)
    pub max_message_size: usize,
    /// 수신기와 처리 단계 사이 큐 용량
    pub queue_capacity: usize,
    /// 라우트 테이블 JSON 경로
    pub routes_path: String,
    /// 알림 추출을 수행할 채널 목록
    pub alert_channels: Vec<String>,
    /// 중복 제거 원장 경로
    pub ledger_path: String,
    /// 내부 감사 로그 경로
    pub internal_alerts_path: String,
    /// 외부 소비자용 알림 로그 경로
    pub external_alerts_path: String,
    /// 작업 카탈로그 경로 (빈 문자열이면 사용하지 않음)
    pub job_catalog_path: String,
    /// 이벤트 아카이브 경로
    pub events_path: String,
    /// 알림 채널 원본 로그 경로
    pub channel_log_path: String,
    /// 패킷 하나의 처리 제한 시간 (초)
    pub handler_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_core(&WatchtowerConfig::default())
    }
}

impl PipelineConfig {
    /// core 설정에서 파이프라인 설정을 생성합니다.
    pub fn from_core(core: &WatchtowerConfig) -> Self {
        Self {
            bind_addr: core.receiver.bind_addr.clone(),
            recv_buffer_size: core.receiver.recv_buffer_size,
            max_message_size: core.receiver.max_message_size,
            queue_capacity: core.receiver.queue_capacity,
            routes_path: core.routing.routes_path.clone(),
            alert_channels: core.routing.alert_channels.clone(),
            ledger_path: core.alerting.ledger_path.clone(),
            internal_alerts_path: core.alerting.internal_alerts_path.clone(),
            external_alerts_path: core.alerting.external_alerts_path.clone(),
            job_catalog_path: core.alerting.job_catalog_path.clone(),
            events_path: core.archive.events_path.clone(),
            channel_log_path: core.archive.channel_log_path.clone(),
            handler_timeout_secs: core.pipeline.handler_timeout_secs,
        }
    }

    /// 처리 제한 시간을 `Duration`으로 반환합니다.
    pub fn handler_timeout(&self) -> Duration {
        Duration::from_secs(self.handler_timeout_secs)
    }

    /// 설정된 작업 카탈로그 경로를 반환합니다.
    pub fn job_catalog(&self) -> Option<&str> {
        let path = self.job_catalog_path.trim();
        (!path.is_empty()).then_some(path)
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), LogPipelineError> {
        if self.bind_addr.parse::<SocketAddr>().is_err() {
            return Err(config_err(
                "bind_addr",
                format!("'{}' is not a valid socket address", self.bind_addr),
            ));
        }

        if self.max_message_size == 0 || self.max_message_size > MAX_DATAGRAM_SIZE {
            return Err(config_err(
                "max_message_size",
                format!("must be 1-{MAX_DATAGRAM_SIZE}"),
            ));
        }

        if self.queue_capacity == 0 || self.queue_capacity > MAX_QUEUE_CAPACITY {
            return Err(config_err(
                "queue_capacity",
                format!("must be 1-{MAX_QUEUE_CAPACITY}"),
            ));
        }

        if self.handler_timeout_secs == 0 || self.handler_timeout_secs > MAX_HANDLER_TIMEOUT_SECS
        {
            return Err(config_err(
                "handler_timeout_secs",
                format!("must be 1-{MAX_HANDLER_TIMEOUT_SECS}"),
            ));
        }

        for (field, value) in [
            ("ledger_path", &self.ledger_path),
            ("internal_alerts_path", &self.internal_alerts_path),
            ("external_alerts_path", &self.external_alerts_path),
            ("events_path", &self.events_path),
            ("channel_log_path", &self.channel_log_path),
        ] {
            if value.trim().is_empty() {
                return Err(config_err(field, "must not be empty"));
            }
        }

        if self.alert_channels.iter().any(|c| c.trim().is_empty()) {
            return Err(config_err("alert_channels", "channel names must not be empty"));
        }

        Ok(())
    }
}

fn config_err(field: &str, reason: impl Into<String>) -> LogPipelineError {
    LogPipelineError::Config {
        field: field.to_owned(),
        reason: reason.into(),
    }
}

/// 파이프라인 설정 빌더
///
/// 테스트에서 임시 디렉토리 경로를 주입할 때 주로 사용합니다.
#[derive(Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// UDP 바인드 주소를 설정합니다.
    pub fn bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.bind_addr = addr.into();
        self
    }

    /// 큐 용량을 설정합니다.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    /// 알림 채널 목록을 설정합니다.
    pub fn alert_channels(mut self, channels: Vec<String>) -> Self {
        self.config.alert_channels = channels;
        self
    }

    /// 라우트 테이블 경로를 설정합니다.
    pub fn routes_path(mut self, path: impl Into<String>) -> Self {
        self.config.routes_path = path.into();
        self
    }

    /// 원장 경로를 설정합니다.
    pub fn ledger_path(mut self, path: impl Into<String>) -> Self {
        self.config.ledger_path = path.into();
        self
    }

    /// 두 알림 로그 경로를 설정합니다.
    pub fn alert_paths(mut self, internal: impl Into<String>, external: impl Into<String>) -> Self {
        self.config.internal_alerts_path = internal.into();
        self.config.external_alerts_path = external.into();
        self
    }

    /// 작업 카탈로그 경로를 설정합니다.
    pub fn job_catalog_path(mut self, path: impl Into<String>) -> Self {
        self.config.job_catalog_path = path.into();
        self
    }

    /// 아카이브 경로들을 설정합니다.
    pub fn archive_paths(mut self, events: impl Into<String>, channel_log: impl Into<String>) -> Self {
        self.config.events_path = events.into();
        self.config.channel_log_path = channel_log.into();
        self
    }

    /// 처리 제한 시간(초)을 설정합니다.
    pub fn handler_timeout_secs(mut self, secs: u64) -> Self {
        self.config.handler_timeout_secs = secs;
        self
    }

    /// 모든 출력 파일을 한 디렉토리 아래에 둡니다.
    pub fn data_dir(self, dir: impl AsRef<std::path::Path>) -> Self {
        let dir = dir.as_ref();
        let path = |name: &str| dir.join(name).display().to_string();
        self.ledger_path(path("ids_alerted.log"))
            .alert_paths(path("controlm_log_alerts.txt"), path("alerts_to_work.log"))
            .archive_paths(path("syslog_events.jsonl"), path("router_logs.jsonl"))
    }

    /// 설정을 검증하고 `PipelineConfig`를 생성합니다.
    pub fn build(self) -> Result<PipelineConfig, LogPipelineError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
