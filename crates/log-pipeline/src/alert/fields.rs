//! 알림 본문 필드 토크나이저
//!
//! 작업 스케줄러가 보내는 자유 텍스트 본문은 `label: value` 쌍이 고정된 순서로
//! 이어진 형태입니다. [`FieldTokenizer`]는 순서가 정해진 레이블 표를 기준으로
//! 본문을 한 번만 훑어 모든 필드를 뽑습니다.
//!
//! 규칙:
//! - 레이블은 텍스트 시작 또는 공백 뒤에서만 인식하며 `:`가 뒤따라야 합니다.
//!   대소문자는 구분하지 않습니다.
//! - 표에서 직전에 받아들인 레이블보다 뒤에 있는 레이블만 받아들입니다.
//!   순서를 거스르는 등장은 값의 일부로 취급합니다.
//! - 필드 값은 자기 레이블과 표상 바로 다음 레이블 사이의 텍스트입니다.
//!   다음 레이블이 이어지지 않으면 값은 비어 있습니다.
//!   마지막 필드(`run_counter`)만 텍스트 끝까지 읽습니다.
//! - 앞뒤 공백을 제거한 값이 빈 문자열이면 비어 있는 것으로 봅니다.

use chrono::NaiveDateTime;
use regex::Regex;
use serde::Serialize;

use crate::error::LogPipelineError;

/// `detected_entry` 날짜 형식
pub const DETECTED_ENTRY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 본문에서 추출하는 필드 (표 순서)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertField {
    CallType,
    AlertId,
    DataCenter,
    Memname,
    OrderId,
    Severity,
    Status,
    SendTime,
    LastUser,
    LastTime,
    Message,
    RunAs,
    SubApplication,
    Application,
    JobName,
    HostId,
    AlertType,
    ClosedFromEm,
    TicketNumber,
    RunCounter,
}

impl AlertField {
    /// 표 순서대로 나열한 전체 필드
    pub const ALL: [AlertField; 20] = [
        Self::CallType,
        Self::AlertId,
        Self::DataCenter,
        Self::Memname,
        Self::OrderId,
        Self::Severity,
        Self::Status,
        Self::SendTime,
        Self::LastUser,
        Self::LastTime,
        Self::Message,
        Self::RunAs,
        Self::SubApplication,
        Self::Application,
        Self::JobName,
        Self::HostId,
        Self::AlertType,
        Self::ClosedFromEm,
        Self::TicketNumber,
        Self::RunCounter,
    ];

    /// 본문에 나타나는 레이블
    pub fn label(self) -> &'static str {
        match self {
            Self::CallType => "call_type",
            Self::AlertId => "alert_id",
            Self::DataCenter => "data_center",
            Self::Memname => "memname",
            Self::OrderId => "order_id",
            Self::Severity => "severity",
            Self::Status => "status",
            Self::SendTime => "send_time",
            Self::LastUser => "last_user",
            Self::LastTime => "last_time",
            Self::Message => "message",
            Self::RunAs => "run_as",
            Self::SubApplication => "sub_application",
            Self::Application => "application",
            Self::JobName => "job_name",
            Self::HostId => "host_id",
            Self::AlertType => "alert_type",
            Self::ClosedFromEm => "closed_from_em",
            Self::TicketNumber => "ticket_number",
            Self::RunCounter => "run_counter",
        }
    }

    /// 표에서의 위치
    pub fn index(self) -> usize {
        self as usize
    }

    fn from_label(label: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|field| field.label().eq_ignore_ascii_case(label))
    }
}

/// 본문에서 추출한 알림 후보
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlertCandidate {
    values: [Option<String>; 20],
    detected_entry: Option<String>,
}

impl AlertCandidate {
    /// 필드 값을 반환합니다.
    pub fn get(&self, field: AlertField) -> Option<&str> {
        self.values[field.index()].as_deref()
    }

    /// 필드 값을 설정합니다. 공백뿐인 값은 비어 있는 것으로 저장합니다.
    pub fn set(&mut self, field: AlertField, value: &str) {
        let value = value.trim();
        self.values[field.index()] = (!value.is_empty()).then(|| value.to_owned());
    }

    /// `YYYY-MM-DD HH:MM:SS` 형태로 정규화한 detected_entry
    pub fn detected_entry(&self) -> Option<&str> {
        self.detected_entry.as_deref()
    }

    /// detected_entry를 시간대 없는 날짜-시각으로 해석합니다.
    pub fn detected_at(&self) -> Option<NaiveDateTime> {
        let entry = self.detected_entry.as_deref()?;
        NaiveDateTime::parse_from_str(entry, DETECTED_ENTRY_FORMAT).ok()
    }

    /// 값이 있는 필드 수
    pub fn populated(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }
}

/// 순서 있는 레이블 표 기반 토크나이저
#[derive(Debug, Clone)]
pub struct FieldTokenizer {
    label_re: Regex,
    detected_re: Regex,
    leading_date_re: Regex,
}

/// 받아들인 레이블 위치
struct LabelHit {
    field: AlertField,
    label_start: usize,
    value_start: usize,
}

impl FieldTokenizer {
    /// 레이블 표에서 토크나이저를 생성합니다.
    pub fn new() -> Result<Self, LogPipelineError> {
        let alternation = AlertField::ALL
            .iter()
            .map(|field| regex::escape(field.label()))
            .collect::<Vec<_>>()
            .join("|");

        Ok(Self {
            label_re: Regex::new(&format!(r"(?i)(?:^|\s)({alternation}):"))?,
            detected_re: Regex::new(
                r"(?i)detected entry:\s*(\d{4}-\d{2}-\d{2})\s+(\d{2}:\d{2}:\d{2})",
            )?,
            leading_date_re: Regex::new(r"^\s*(\d{4}-\d{2}-\d{2})\s+(\d{2}:\d{2}:\d{2})")?,
        })
    }

    /// 본문에서 모든 필드와 detected_entry를 추출합니다.
    pub fn extract(&self, body: &str) -> AlertCandidate {
        let mut candidate = AlertCandidate {
            detected_entry: self.detected_entry(body),
            ..AlertCandidate::default()
        };

        let hits = self.accepted_labels(body);
        for (i, hit) in hits.iter().enumerate() {
            match hits.get(i + 1) {
                Some(next) if next.field.index() == hit.field.index() + 1 => {
                    candidate.set(hit.field, &body[hit.value_start..next.label_start]);
                }
                None if hit.field == AlertField::RunCounter => {
                    candidate.set(hit.field, &body[hit.value_start..]);
                }
                _ => {}
            }
        }

        candidate
    }

    /// 표 순서를 지키는 레이블 등장만 모읍니다.
    fn accepted_labels(&self, body: &str) -> Vec<LabelHit> {
        let mut hits: Vec<LabelHit> = Vec::new();
        for caps in self.label_re.captures_iter(body) {
            let (Some(whole), Some(label)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let Some(field) = AlertField::from_label(label.as_str()) else {
                continue;
            };
            let in_order = hits
                .last()
                .is_none_or(|last| field.index() > last.field.index());
            if in_order {
                hits.push(LabelHit {
                    field,
                    label_start: label.start(),
                    value_start: whole.end(),
                });
            }
        }
        hits
    }

    /// 본문 맨 앞의 날짜-시각, 없으면 `Detected Entry:` 뒤의 날짜-시각을 찾습니다.
    fn detected_entry(&self, body: &str) -> Option<String> {
        let caps = self
            .leading_date_re
            .captures(body)
            .or_else(|| self.detected_re.captures(body))?;
        Some(format!("{} {}", &caps[1], &caps[2]))
    }
}
