//! 파이프라인 처리 통계
//!
//! 수신 태스크와 처리 태스크가 같은 [`PipelineStats`]를 `Arc`로 공유하며
//! 원자적 카운터만 갱신합니다. 외부에는 [`StatsSnapshot`]으로 복사본을 노출합니다.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// 원자적 파이프라인 카운터
#[derive(Debug, Default)]
pub struct PipelineStats {
    packets_received: AtomicU64,
    packets_dropped: AtomicU64,
    recv_errors: AtomicU64,
    packets_processed: AtomicU64,
    handler_failures: AtomicU64,
    envelopes_degraded: AtomicU64,
    alerts_accepted: AtomicU64,
    dropped_stale: AtomicU64,
    dropped_duplicate: AtomicU64,
    dropped_severity: AtomicU64,
    sink_failures: AtomicU64,
}

/// 특정 시점의 카운터 복사본
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// 수신된 데이터그램 수
    pub packets_received: u64,
    /// 큐 포화/종료로 버려진 데이터그램 수
    pub packets_dropped: u64,
    /// 일시적 소켓 읽기 오류 수
    pub recv_errors: u64,
    /// 처리 완료된 패킷 수
    pub packets_processed: u64,
    /// 에러, 패닉, 시간 초과로 실패한 처리 수
    pub handler_failures: u64,
    /// 봉투 문법에 맞지 않아 축약 처리된 패킷 수
    pub envelopes_degraded: u64,
    /// 발행된 알림 수
    pub alerts_accepted: u64,
    /// 신선도 게이트에서 폐기된 후보 수
    pub dropped_stale: u64,
    /// 중복 게이트에서 폐기된 후보 수
    pub dropped_duplicate: u64,
    /// 심각도 게이트에서 폐기된 후보 수
    pub dropped_severity: u64,
    /// 싱크 기록 실패 수
    pub sink_failures: u64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl PipelineStats {
    /// 새 통계 객체를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_received(&self) {
        bump(&self.packets_received);
    }

    pub(crate) fn record_dropped(&self) {
        bump(&self.packets_dropped);
    }

    pub(crate) fn record_recv_error(&self) {
        bump(&self.recv_errors);
    }

    pub(crate) fn record_processed(&self) {
        bump(&self.packets_processed);
    }

    pub(crate) fn record_handler_failure(&self) {
        bump(&self.handler_failures);
    }

    pub(crate) fn record_degraded(&self) {
        bump(&self.envelopes_degraded);
    }

    pub(crate) fn record_accepted(&self) {
        bump(&self.alerts_accepted);
    }

    pub(crate) fn record_stale(&self) {
        bump(&self.dropped_stale);
    }

    pub(crate) fn record_duplicate(&self) {
        bump(&self.dropped_duplicate);
    }

    pub(crate) fn record_severity(&self) {
        bump(&self.dropped_severity);
    }

    pub(crate) fn record_sink_failure(&self) {
        bump(&self.sink_failures);
    }

    /// 현재 카운터 값을 복사합니다.
    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            packets_received: load(&self.packets_received),
            packets_dropped: load(&self.packets_dropped),
            recv_errors: load(&self.recv_errors),
            packets_processed: load(&self.packets_processed),
            handler_failures: load(&self.handler_failures),
            envelopes_degraded: load(&self.envelopes_degraded),
            alerts_accepted: load(&self.alerts_accepted),
            dropped_stale: load(&self.dropped_stale),
            dropped_duplicate: load(&self.dropped_duplicate),
            dropped_severity: load(&self.dropped_severity),
            sink_failures: load(&self.sink_failures),
        }
    }
}
