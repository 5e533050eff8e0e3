//! 작업 알림 추출기
//!
//! 알림 채널로 라우팅된 봉투의 본문에서 필드를 추출하고 세 개의 관문을
//! 순서대로 통과시킵니다.
//!
//! ```text
//! RECEIVED -> EXTRACTED -> freshness -> dedup -> severity -> ACCEPTED
//!                             |           |         |
//!                       DroppedStale  DroppedDuplicate  DroppedSeverity
//! ```
//!
//! dedup 관문은 severity 관문보다 먼저 실행되며, 통과한 id는 이후 관문의
//! 결과와 상관없이 원장에 남습니다. 수락된 알림만 우선순위를 계산하고
//! 두 줄의 레코드로 직렬화합니다.

pub mod fields;
pub mod priority;
pub mod render;

use std::fmt;
use std::sync::Arc;

use chrono::{Local, NaiveDate};
use tracing::{debug, info, warn};

pub use fields::{AlertCandidate, AlertField, FieldTokenizer};
pub use priority::{FALLBACK_GROUP_CODE, IncidentPriority, PRIORITY_OVERRIDE_MARKER};

use crate::catalog::{JobCatalog, JobMetadata};
use crate::error::LogPipelineError;
use crate::ledger::DedupLedger;
use crate::parser::Envelope;
use render::RenderInput;

/// 수락된 작업 알림
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobAlert {
    /// 알림 ID
    pub alert_id: String,
    /// 작업 이름
    pub job_name: Option<String>,
    /// 감지 시각 (`YYYY-MM-DD HH:MM:SS`)
    pub detected_entry: String,
    /// 심각도 문자 (항상 V 계열)
    pub severity_letter: String,
    /// 최종 우선순위
    pub priority: IncidentPriority,
    /// 담당 그룹 코드
    pub group_code: String,
    /// 담당 그룹 이름
    pub group_name: Option<String>,
    /// 추출된 전체 필드
    pub candidate: AlertCandidate,
    /// 내부 감사 로그 줄
    pub internal_line: String,
    /// 외부 소비자 줄
    pub external_line: String,
}

/// 추출 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionOutcome {
    /// 모든 관문 통과
    Accepted(Box<JobAlert>),
    /// detected_entry가 오늘이 아니거나 없음
    DroppedStale,
    /// 이미 처리한 alert_id이거나 alert_id 없음
    DroppedDuplicate,
    /// 심각도 문자가 V가 아님
    DroppedSeverity,
}

impl ExtractionOutcome {
    /// 로그와 메트릭 레이블에 쓰는 결과 이름
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Accepted(_) => "accepted",
            Self::DroppedStale => "stale",
            Self::DroppedDuplicate => "duplicate",
            Self::DroppedSeverity => "severity",
        }
    }

    /// 수락된 알림을 반환합니다.
    pub fn alert(&self) -> Option<&JobAlert> {
        match self {
            Self::Accepted(alert) => Some(alert.as_ref()),
            _ => None,
        }
    }
}

impl fmt::Display for ExtractionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

/// 알림 추출기
///
/// 원장과 카탈로그는 주입받습니다. 여러 스레드에서 공유해도 안전합니다.
pub struct AlertExtractor {
    tokenizer: FieldTokenizer,
    ledger: Arc<dyn DedupLedger>,
    catalog: Arc<dyn JobCatalog>,
}

impl AlertExtractor {
    /// 새 추출기를 생성합니다.
    pub fn new(
        ledger: Arc<dyn DedupLedger>,
        catalog: Arc<dyn JobCatalog>,
    ) -> Result<Self, LogPipelineError> {
        Ok(Self {
            tokenizer: FieldTokenizer::new()?,
            ledger,
            catalog,
        })
    }

    /// 현재 로컬 날짜를 기준으로 봉투를 평가합니다.
    pub fn evaluate(
        &self,
        envelope: &Envelope,
        channel: &str,
    ) -> Result<ExtractionOutcome, LogPipelineError> {
        self.evaluate_on(envelope, channel, Local::now().date_naive())
    }

    /// `today`를 기준 날짜로 봉투를 평가합니다.
    ///
    /// 원장 I/O 실패만 에러로 반환합니다. 이 경우 알림은 만들어지지 않습니다.
    pub fn evaluate_on(
        &self,
        envelope: &Envelope,
        channel: &str,
        today: NaiveDate,
    ) -> Result<ExtractionOutcome, LogPipelineError> {
        let candidate = self.tokenizer.extract(&envelope.message);
        debug!(
            channel,
            populated = candidate.populated(),
            detected_entry = candidate.detected_entry(),
            "extracted alert candidate"
        );

        // freshness
        let detected_date = candidate.detected_at().map(|dt| dt.date());
        if detected_date != Some(today) {
            info!(
                channel,
                alert_id = candidate.get(AlertField::AlertId),
                detected_entry = candidate.detected_entry(),
                %today,
                "dropping alert: stale detected_entry"
            );
            return Ok(ExtractionOutcome::DroppedStale);
        }

        // dedup
        let Some(alert_id) = candidate.get(AlertField::AlertId) else {
            info!(channel, "dropping alert: missing alert_id");
            return Ok(ExtractionOutcome::DroppedDuplicate);
        };
        if !self.ledger.check_and_insert(alert_id)? {
            info!(channel, alert_id, "dropping alert: duplicate alert_id");
            return Ok(ExtractionOutcome::DroppedDuplicate);
        }

        // severity
        let severity_letter = candidate.get(AlertField::Severity).unwrap_or_default();
        if !severity_letter.eq_ignore_ascii_case("V") {
            info!(
                channel,
                alert_id,
                severity = severity_letter,
                "dropping alert: severity is not V"
            );
            return Ok(ExtractionOutcome::DroppedSeverity);
        }

        let job_name = candidate.get(AlertField::JobName);
        let metadata = job_name.map(|job| self.lookup(job)).unwrap_or_default();
        let priority = IncidentPriority::assign(metadata.severity, &envelope.message);
        let group_code = metadata
            .group_code
            .filter(|code| !code.trim().is_empty())
            .unwrap_or_else(|| FALLBACK_GROUP_CODE.to_owned());

        let input = RenderInput {
            channel,
            hostname: envelope.hostname.as_deref(),
            candidate: &candidate,
            priority,
            group_code: &group_code,
        };
        let internal_line = render::internal_line(&input);
        let external_line = render::external_line(&input);

        info!(
            channel,
            alert_id,
            job_name,
            %priority,
            group_code = %group_code,
            "accepted job alert"
        );

        Ok(ExtractionOutcome::Accepted(Box::new(JobAlert {
            alert_id: alert_id.to_owned(),
            job_name: job_name.map(str::to_owned),
            detected_entry: candidate.detected_entry().unwrap_or_default().to_owned(),
            severity_letter: severity_letter.to_owned(),
            priority,
            group_code,
            group_name: metadata.group_name,
            internal_line,
            external_line,
            candidate,
        })))
    }

    /// 카탈로그를 조회합니다. 실패는 미등록 작업으로 취급합니다.
    fn lookup(&self, job_name: &str) -> JobMetadata {
        match self.catalog.lookup(job_name) {
            Ok(Some(metadata)) => metadata,
            Ok(None) => {
                debug!(job_name, "job not found in catalog");
                JobMetadata::default()
            }
            Err(e) => {
                warn!(job_name, error = %e, "job lookup failed, treating as unknown job");
                JobMetadata::default()
            }
        }
    }
}
