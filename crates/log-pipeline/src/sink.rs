//! 출력 싱크
//!
//! - [`JsonlEventSink`]: 봉투 한 건을 JSON 한 줄로 추가합니다. 이벤트 아카이브와
//!   알림 채널 원본 로그에 모두 씁니다.
//! - [`AlertLogWriter`]: 수락된 알림의 내부 감사 줄과 외부 소비자 줄을
//!   각각의 로그 파일에 추가합니다.
//!
//! 모든 파일은 추가 전용이며 열 때 상위 디렉토리를 만듭니다.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::alert::JobAlert;
use crate::config::PipelineConfig;
use crate::error::LogPipelineError;
use crate::parser::Envelope;
use crate::router::MatchReason;

/// 아카이브에 기록하는 이벤트 한 건
#[derive(Debug, Serialize)]
pub struct ArchivedEvent<'a> {
    /// 수신 시각
    pub received_at: DateTime<Utc>,
    /// 송신 IP
    pub source_ip: IpAddr,
    /// 송신 포트
    pub source_port: u16,
    /// 라우팅된 채널
    pub channel: &'a str,
    /// 라우팅 근거
    pub match_reason: MatchReason,
    /// 봉투 필드
    #[serde(flatten)]
    pub envelope: &'a Envelope,
}

/// 이벤트 싱크 인터페이스
pub trait EventSink: Send + Sync {
    /// 이벤트 한 건을 기록합니다.
    fn record(&self, event: &ArchivedEvent<'_>) -> Result<(), LogPipelineError>;
}

/// 알림 싱크 인터페이스
pub trait AlertSink: Send + Sync {
    /// 수락된 알림을 기록합니다.
    fn write(&self, alert: &JobAlert) -> Result<(), LogPipelineError>;
}

/// 뮤텍스로 보호되는 추가 전용 파일
struct AppendFile {
    sink: String,
    path: PathBuf,
    file: Mutex<File>,
}

impl AppendFile {
    fn open(sink: &str, path: &Path) -> Result<Self, LogPipelineError> {
        let sink_err = |e: std::io::Error| LogPipelineError::Sink {
            sink: sink.to_owned(),
            reason: format!("{}: {e}", path.display()),
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(sink_err)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(sink_err)?;

        Ok(Self {
            sink: sink.to_owned(),
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    /// 한 줄을 추가합니다. 줄 끝 개행은 여기서 붙입니다.
    fn append_line(&self, line: &str) -> Result<(), LogPipelineError> {
        let mut file = self.file.lock().map_err(|_| self.err("file lock poisoned".to_owned()))?;
        let mut buf = String::with_capacity(line.len() + 1);
        buf.push_str(line);
        buf.push('\n');
        file.write_all(buf.as_bytes())
            .and_then(|()| file.flush())
            .map_err(|e| self.err(format!("{}: {e}", self.path.display())))
    }

    fn err(&self, reason: String) -> LogPipelineError {
        LogPipelineError::Sink {
            sink: self.sink.clone(),
            reason,
        }
    }
}

/// JSON Lines 이벤트 싱크
pub struct JsonlEventSink {
    file: AppendFile,
}

impl JsonlEventSink {
    /// 싱크 파일을 엽니다. `name`은 에러와 메트릭 레이블에 쓰입니다.
    pub fn open(name: &str, path: impl AsRef<Path>) -> Result<Self, LogPipelineError> {
        let file = AppendFile::open(name, path.as_ref())?;
        tracing::debug!(sink = name, path = %path.as_ref().display(), "opened event sink");
        Ok(Self { file })
    }

    /// 싱크 이름
    pub fn name(&self) -> &str {
        &self.file.sink
    }
}

impl EventSink for JsonlEventSink {
    fn record(&self, event: &ArchivedEvent<'_>) -> Result<(), LogPipelineError> {
        let line = serde_json::to_string(event)?;
        self.file.append_line(&line)
    }
}

/// 알림 로그 작성기
pub struct AlertLogWriter {
    internal: AppendFile,
    external: AppendFile,
}

impl AlertLogWriter {
    /// 내부 감사 로그와 외부 소비자 로그를 엽니다.
    pub fn open(
        internal_path: impl AsRef<Path>,
        external_path: impl AsRef<Path>,
    ) -> Result<Self, LogPipelineError> {
        Ok(Self {
            internal: AppendFile::open("internal_alerts", internal_path.as_ref())?,
            external: AppendFile::open("external_alerts", external_path.as_ref())?,
        })
    }
}

impl AlertSink for AlertLogWriter {
    fn write(&self, alert: &JobAlert) -> Result<(), LogPipelineError> {
        self.internal.append_line(&alert.internal_line)?;
        self.external.append_line(&alert.external_line)
    }
}

/// 처리 단계가 쓰는 싱크 묶음
#[derive(Clone)]
pub struct SinkSet {
    /// 모든 봉투의 아카이브
    pub archive: Arc<dyn EventSink>,
    /// 알림 채널 봉투의 원본 로그
    pub channel_log: Arc<dyn EventSink>,
    /// 수락된 알림 로그
    pub alerts: Arc<dyn AlertSink>,
}

impl SinkSet {
    /// 설정된 경로의 파일 싱크를 모두 엽니다.
    pub fn open(config: &PipelineConfig) -> Result<Self, LogPipelineError> {
        Ok(Self {
            archive: Arc::new(JsonlEventSink::open("archive", &config.events_path)?),
            channel_log: Arc::new(JsonlEventSink::open("channel_log", &config.channel_log_path)?),
            alerts: Arc::new(AlertLogWriter::open(
                &config.internal_alerts_path,
                &config.external_alerts_path,
            )?),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;
    use crate::parser::EnvelopeParser;

    #[test]
    fn jsonl_sink_writes_one_object_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("archive/syslog_events.jsonl");
        let sink = JsonlEventSink::open("archive", &path).unwrap();
        assert_eq!(sink.name(), "archive");

        let parser = EnvelopeParser::new().unwrap();
        let envelope = parser.parse_with_year("<13>Feb  9 07:09:52 ctm01 ctmlog[42]: hello", 2025);
        let degraded = parser.parse("garbage");

        for env in [&envelope, &degraded] {
            sink.record(&ArchivedEvent {
                received_at: Utc::now(),
                source_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)),
                source_port: 514,
                channel: "controlm",
                match_reason: MatchReason::Ip,
                envelope: env,
            })
            .unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["channel"], "controlm");
        assert_eq!(first["match_reason"], "ip");
        assert_eq!(first["source_ip"], "10.0.0.5");
        assert_eq!(first["hostname"], "ctm01");
        assert_eq!(first["pid"], 42);
        assert_eq!(first["message"], "hello");

        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert!(second["pri"].is_null());
        assert_eq!(second["raw"], "garbage");
    }

    #[test]
    fn sink_appends_to_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        std::fs::write(&path, "{}\n").unwrap();

        let sink = JsonlEventSink::open("archive", &path).unwrap();
        let envelope = Envelope::degraded("x");
        sink.record(&ArchivedEvent {
            received_at: Utc::now(),
            source_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            source_port: 1,
            channel: "raw",
            match_reason: MatchReason::Default,
            envelope: &envelope,
        })
        .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.starts_with("{}\n"));
    }

    #[test]
    fn sink_set_opens_configured_paths() {
        let dir = tempfile::tempdir().unwrap();
        let config = crate::config::PipelineConfigBuilder::new()
            .data_dir(dir.path().join("out"))
            .build()
            .unwrap();
        let _sinks = SinkSet::open(&config).unwrap();
        for name in ["syslog_events.jsonl", "router_logs.jsonl", "controlm_log_alerts.txt", "alerts_to_work.log"] {
            assert!(dir.path().join("out").join(name).exists(), "{name}");
        }
    }

    #[test]
    fn open_fails_when_parent_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let result = JsonlEventSink::open("archive", blocker.join("events.jsonl"));
        assert!(matches!(result, Err(LogPipelineError::Sink { .. })));
    }
}
