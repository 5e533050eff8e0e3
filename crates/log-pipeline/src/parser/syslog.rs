//! BSD syslog 봉투 파서
//!
//! rsyslog가 전달하는 RFC 3164 계열 메시지를 [`Envelope`]로 분해합니다.
//!
//! # 메시지 형식
//! ```text
//! <PRI>MON DD HH:MM:SS HOST TAG[pid]: MESSAGE
//! ```
//!
//! 원본 타임스탬프에는 연도와 시간대가 없습니다. 파서는 현재 UTC 연도를 붙이고
//! UTC로 표시한 근사값을 만듭니다. 이 값은 권위 있는 시각이 아닙니다.
//!
//! 문법에 맞지 않는 입력은 에러가 아니라 구조 필드가 모두 비어 있는
//! 축약 봉투가 됩니다.
//!
//! # 사용 예시
//! ```ignore
//! use watchtower_log_pipeline::parser::EnvelopeParser;
//!
//! let parser = EnvelopeParser::new()?;
//! let envelope = parser.parse("<34>Oct 11 22:14:15 ctm01 ctmlog[123]: job ended");
//! assert_eq!(envelope.app_name.as_deref(), Some("ctmlog"));
//! ```

use chrono::{DateTime, Datelike, NaiveDateTime, Utc};
use regex::Regex;
use serde::Serialize;

use crate::error::LogPipelineError;

/// 유효한 최대 PRI 값
/// facility 최댓값 23 * 8 + severity 최댓값 7 = 191
const MAX_SYSLOG_PRI: u16 = 191;

/// 봉투 문법
const ENVELOPE_PATTERN: &str = r"(?s)^<(?P<pri>\d{1,3})>(?P<ts>[A-Z][a-z]{2}\s+\d{1,2}\s+\d{2}:\d{2}:\d{2})\s+(?P<host>\S+)\s+(?P<tag>[^\s:]+)(?::\s*)?(?P<msg>.*)$";

/// TAG에서 앱 이름과 선택적 `[pid]`를 분리하는 패턴
const TAG_PATTERN: &str = r"^(?P<app>[A-Za-z0-9_./-]+)(?:\[(?P<pid>\d+)\])?$";

/// 수신 텍스트 한 건을 구조화한 결과
///
/// 모든 구조 필드는 독립적으로 비어 있을 수 있습니다.
/// `message`와 `raw`는 항상 존재합니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Envelope {
    /// PRI 값 (0-191)
    pub pri: Option<u8>,
    /// facility (PRI / 8)
    pub facility: Option<u8>,
    /// syslog severity (PRI % 8)
    pub severity: Option<u8>,
    /// 현재 UTC 연도를 붙여 복원한 근사 타임스탬프
    pub timestamp: Option<DateTime<Utc>>,
    /// 원본 타임스탬프 텍스트
    pub timestamp_raw: Option<String>,
    /// 송신 호스트명
    pub hostname: Option<String>,
    /// 애플리케이션 이름 (TAG)
    pub app_name: Option<String>,
    /// 프로세스 ID
    pub pid: Option<u32>,
    /// 메시지 본문
    pub message: String,
    /// 원본 텍스트
    pub raw: String,
}

impl Envelope {
    /// 문법에 맞지 않는 입력에 대한 축약 봉투를 만듭니다.
    pub fn degraded(input: &str) -> Self {
        Self {
            pri: None,
            facility: None,
            severity: None,
            timestamp: None,
            timestamp_raw: None,
            hostname: None,
            app_name: None,
            pid: None,
            message: input.trim().to_owned(),
            raw: input.to_owned(),
        }
    }

    /// 축약 봉투인지 확인합니다.
    pub fn is_degraded(&self) -> bool {
        self.pri.is_none()
    }
}

/// 봉투 파서
///
/// 정규식을 생성 시 한 번만 컴파일합니다. 파싱 자체는 실패하지 않습니다.
#[derive(Debug, Clone)]
pub struct EnvelopeParser {
    envelope_re: Regex,
    tag_re: Regex,
}

impl EnvelopeParser {
    /// 새 파서를 생성합니다.
    pub fn new() -> Result<Self, LogPipelineError> {
        Ok(Self {
            envelope_re: Regex::new(ENVELOPE_PATTERN)?,
            tag_re: Regex::new(TAG_PATTERN)?,
        })
    }

    /// PRI 값에서 facility와 severity를 분리합니다.
    ///
    /// PRI = facility * 8 + severity
    pub fn decode_pri(pri: u8) -> (u8, u8) {
        (pri / 8, pri % 8)
    }

    /// 현재 UTC 연도를 사용해 텍스트를 파싱합니다.
    pub fn parse(&self, input: &str) -> Envelope {
        self.parse_with_year(input, Utc::now().year())
    }

    /// 지정한 연도로 타임스탬프를 복원하며 텍스트를 파싱합니다.
    pub fn parse_with_year(&self, input: &str, year: i32) -> Envelope {
        let Some(caps) = self.envelope_re.captures(input.trim()) else {
            return Envelope::degraded(input);
        };

        let pri = match caps["pri"].parse::<u16>() {
            Ok(pri) if pri <= MAX_SYSLOG_PRI => pri as u8,
            _ => return Envelope::degraded(input),
        };
        let (facility, severity) = Self::decode_pri(pri);

        let ts_raw = &caps["ts"];
        let (app_name, pid) = self.split_tag(&caps["tag"]);

        Envelope {
            pri: Some(pri),
            facility: Some(facility),
            severity: Some(severity),
            timestamp: parse_bsd_timestamp(ts_raw, year),
            timestamp_raw: Some(ts_raw.to_owned()),
            hostname: Some(caps["host"].to_owned()),
            app_name: Some(app_name),
            pid,
            message: caps["msg"].trim_start().to_owned(),
            raw: input.to_owned(),
        }
    }

    /// `app[pid]` 형태의 TAG를 분리합니다. 형태가 다르면 TAG 전체를 앱 이름으로 씁니다.
    fn split_tag(&self, tag: &str) -> (String, Option<u32>) {
        match self.tag_re.captures(tag) {
            Some(caps) => {
                let pid = caps.name("pid").and_then(|p| p.as_str().parse().ok());
                (caps["app"].to_owned(), pid)
            }
            None => (tag.to_owned(), None),
        }
    }
}

/// `Oct 11 22:14:15` 형태의 타임스탬프에 연도를 붙여 UTC로 해석합니다.
///
/// 존재하지 않는 날짜(예: 2월 30일)는 `None`입니다.
fn parse_bsd_timestamp(ts: &str, year: i32) -> Option<DateTime<Utc>> {
    let mut parts = ts.split_whitespace();
    let (month, day, time) = (parts.next()?, parts.next()?, parts.next()?);
    let day: u32 = day.parse().ok()?;
    let normalized = format!("{year} {month} {day:02} {time}");
    NaiveDateTime::parse_from_str(&normalized, "%Y %b %d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}
