//! 패킷 처리 단계
//!
//! 큐에서 꺼낸 [`RawPacket`] 하나를 동기적으로 처리합니다.
//!
//! ```text
//! parse -> route -> archive -> [알림 채널] channel log -> extract -> gates -> alert sink
//! ```
//!
//! 싱크 실패는 기록하고 계속 진행합니다. 원장 실패만 에러로 반환되며
//! 이 경우 해당 패킷의 알림은 발행되지 않습니다.

use std::sync::Arc;

use chrono::{Local, NaiveDate};
use tracing::{debug, warn};
use watchtower_core::metrics as m;

use crate::alert::{AlertExtractor, ExtractionOutcome};
use crate::collector::RawPacket;
use crate::error::LogPipelineError;
use crate::parser::{Envelope, EnvelopeParser};
use crate::router::{MatchReason, RouteMatch, Router};
use crate::sink::{ArchivedEvent, EventSink, SinkSet};
use crate::stats::PipelineStats;

/// 패킷 하나의 처리 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketOutcome {
    /// 라우팅된 채널
    pub channel: String,
    /// 라우팅 근거
    pub reason: MatchReason,
    /// 봉투가 축약되었는지
    pub degraded: bool,
    /// 알림 채널인 경우 추출 결과
    pub extraction: Option<ExtractionOutcome>,
}

/// 패킷 처리기
///
/// 모든 상태가 불변이거나 내부 동기화되어 있어 `Arc`로 공유해
/// 블로킹 스레드에서 실행할 수 있습니다.
pub struct PacketProcessor {
    parser: EnvelopeParser,
    router: Router,
    extractor: AlertExtractor,
    sinks: SinkSet,
    stats: Arc<PipelineStats>,
}

impl PacketProcessor {
    /// 새 처리기를 생성합니다.
    pub fn new(
        router: Router,
        extractor: AlertExtractor,
        sinks: SinkSet,
        stats: Arc<PipelineStats>,
    ) -> Result<Self, LogPipelineError> {
        Ok(Self {
            parser: EnvelopeParser::new()?,
            router,
            extractor,
            sinks,
            stats,
        })
    }

    /// 현재 로컬 날짜 기준으로 패킷을 처리합니다.
    pub fn process(&self, packet: &RawPacket) -> Result<PacketOutcome, LogPipelineError> {
        self.process_on(packet, Local::now().date_naive())
    }

    /// `today`를 신선도 기준 날짜로 패킷을 처리합니다.
    pub fn process_on(
        &self,
        packet: &RawPacket,
        today: NaiveDate,
    ) -> Result<PacketOutcome, LogPipelineError> {
        let envelope = self.parser.parse(&packet.text);
        let degraded = envelope.is_degraded();
        if degraded {
            self.stats.record_degraded();
            metrics::counter!(m::PIPELINE_ENVELOPES_DEGRADED_TOTAL).increment(1);
            debug!(source_ip = %packet.source_ip, "envelope grammar mismatch, archiving raw text");
        }

        let source_ip = packet.source_ip.to_string();
        let route = self.router.resolve(&source_ip, envelope.hostname.as_deref());
        debug!(
            source_ip = %source_ip,
            hostname = envelope.hostname.as_deref(),
            channel = %route.channel,
            reason = %route.reason,
            "routed packet"
        );

        self.record_event(self.sinks.archive.as_ref(), "archive", packet, &route, &envelope);

        let extraction = if self.router.is_alert_bearing(&route.channel) {
            self.record_event(
                self.sinks.channel_log.as_ref(),
                "channel_log",
                packet,
                &route,
                &envelope,
            );
            let outcome = self.extractor.evaluate_on(&envelope, &route.channel, today)?;
            self.record_outcome(&route.channel, &outcome);
            Some(outcome)
        } else {
            None
        };

        Ok(PacketOutcome {
            channel: route.channel,
            reason: route.reason,
            degraded,
            extraction,
        })
    }

    fn record_event(
        &self,
        sink: &dyn EventSink,
        sink_name: &'static str,
        packet: &RawPacket,
        route: &RouteMatch,
        envelope: &Envelope,
    ) {
        let event = ArchivedEvent {
            received_at: packet.received_at,
            source_ip: packet.source_ip,
            source_port: packet.source_port,
            channel: &route.channel,
            match_reason: route.reason,
            envelope,
        };
        if let Err(e) = sink.record(&event) {
            self.sink_failed(sink_name, &e);
        }
    }

    fn record_outcome(&self, channel: &str, outcome: &ExtractionOutcome) {
        match outcome {
            ExtractionOutcome::Accepted(alert) => {
                self.stats.record_accepted();
                metrics::counter!(m::ALERT_ACCEPTED_TOTAL, m::LABEL_CHANNEL => channel.to_owned())
                    .increment(1);
                if let Err(e) = self.sinks.alerts.write(alert) {
                    self.sink_failed("alerts", &e);
                }
            }
            dropped => {
                match dropped {
                    ExtractionOutcome::DroppedStale => self.stats.record_stale(),
                    ExtractionOutcome::DroppedDuplicate => self.stats.record_duplicate(),
                    _ => self.stats.record_severity(),
                }
                metrics::counter!(m::ALERT_DROPPED_TOTAL, m::LABEL_REASON => dropped.reason())
                    .increment(1);
            }
        }
    }

    fn sink_failed(&self, sink: &'static str, err: &LogPipelineError) {
        self.stats.record_sink_failure();
        metrics::counter!(m::SINK_WRITE_FAILURES_TOTAL, m::LABEL_SINK => sink).increment(1);
        warn!(sink, error = %err, "sink write failed, continuing");
    }
}
