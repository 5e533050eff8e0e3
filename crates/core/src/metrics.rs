//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `watchtower_`
//! - 단계명: `receiver_`, `pipeline_`, `alert_`, `sink_`
//! - 접미어: `_total` (counter), `_seconds` (histogram/latency), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(watchtower_core::metrics::RECEIVER_PACKETS_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 채널 레이블 키 (controlm, raw, ...)
pub const LABEL_CHANNEL: &str = "channel";

/// 폐기 사유 레이블 키 (stale, duplicate, severity)
pub const LABEL_REASON: &str = "reason";

/// 싱크 레이블 키 (archive, channel_log, alerts)
pub const LABEL_SINK: &str = "sink";

/// 처리 실패 종류 레이블 키 (error, panic, timeout)
pub const LABEL_FAILURE: &str = "failure";

// ─── Receiver 메트릭 ───────────────────────────────────────────────

/// Receiver: 수신된 데이터그램 수 (counter)
pub const RECEIVER_PACKETS_TOTAL: &str = "watchtower_receiver_packets_total";

/// Receiver: 큐 포화로 버려진 데이터그램 수 (counter)
pub const RECEIVER_PACKETS_DROPPED_TOTAL: &str = "watchtower_receiver_packets_dropped_total";

/// Receiver: 소켓 읽기 오류 수 (counter)
pub const RECEIVER_RECV_ERRORS_TOTAL: &str = "watchtower_receiver_recv_errors_total";

/// Receiver: 처리 대기 중인 패킷 수 (gauge)
pub const RECEIVER_QUEUE_DEPTH: &str = "watchtower_receiver_queue_depth";

// ─── Pipeline 메트릭 ───────────────────────────────────────────────

/// Pipeline: 처리 완료된 패킷 수 (counter, 실패 포함)
pub const PIPELINE_PACKETS_PROCESSED_TOTAL: &str = "watchtower_pipeline_packets_processed_total";

/// Pipeline: 처리 실패 수 (counter, label: failure)
pub const PIPELINE_HANDLER_FAILURES_TOTAL: &str = "watchtower_pipeline_handler_failures_total";

/// Pipeline: 구조 파싱에 실패해 축약 처리된 봉투 수 (counter)
pub const PIPELINE_ENVELOPES_DEGRADED_TOTAL: &str = "watchtower_pipeline_envelopes_degraded_total";

/// Pipeline: 패킷 하나의 처리 시간 (histogram, 초)
pub const PIPELINE_PROCESSING_DURATION_SECONDS: &str =
    "watchtower_pipeline_processing_duration_seconds";

// ─── Alert 메트릭 ──────────────────────────────────────────────────

/// Alert: 발행된 알림 수 (counter)
pub const ALERT_ACCEPTED_TOTAL: &str = "watchtower_alert_accepted_total";

/// Alert: 게이트에서 폐기된 후보 수 (counter, label: reason)
pub const ALERT_DROPPED_TOTAL: &str = "watchtower_alert_dropped_total";

// ─── Sink 메트릭 ───────────────────────────────────────────────────

/// Sink: 기록 실패 수 (counter, label: sink)
pub const SINK_WRITE_FAILURES_TOTAL: &str = "watchtower_sink_write_failures_total";

// ─── Daemon 메트릭 ─────────────────────────────────────────────────

/// Daemon: 빌드 정보 (gauge, 항상 1, label: version)
pub const DAEMON_BUILD_INFO: &str = "watchtower_daemon_build_info";

// ─── 히스토그램 버킷 정의 ────────────────────────────────────────────

/// 패킷 처리 시간 히스토그램 버킷 (초)
///
/// 100us ~ 10s 범위. 상한은 기본 처리 제한 시간(5초)을 넘도록 잡았습니다.
pub const PROCESSING_DURATION_BUCKETS: [f64; 10] = [
    0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 10.0,
];

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출해야 합니다.
/// 일반적으로 `watchtower-daemon`의 시작 시점에서 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    // Receiver
    describe_counter!(
        RECEIVER_PACKETS_TOTAL,
        "Total number of UDP datagrams received"
    );
    describe_counter!(
        RECEIVER_PACKETS_DROPPED_TOTAL,
        "Datagrams dropped because the processing queue was full or closed"
    );
    describe_counter!(
        RECEIVER_RECV_ERRORS_TOTAL,
        "Socket read errors observed by the receiver"
    );
    describe_gauge!(
        RECEIVER_QUEUE_DEPTH,
        "Packets waiting between the receiver and the processing stage"
    );

    // Pipeline
    describe_counter!(
        PIPELINE_PACKETS_PROCESSED_TOTAL,
        "Packets taken off the queue and handled, including failures"
    );
    describe_counter!(
        PIPELINE_HANDLER_FAILURES_TOTAL,
        "Packet handler failures (error, panic or timeout)"
    );
    describe_counter!(
        PIPELINE_ENVELOPES_DEGRADED_TOTAL,
        "Packets whose syslog envelope could not be parsed"
    );
    describe_histogram!(
        PIPELINE_PROCESSING_DURATION_SECONDS,
        "Time to process a single packet in seconds"
    );

    // Alert
    describe_counter!(ALERT_ACCEPTED_TOTAL, "Job alerts emitted to alert sinks");
    describe_counter!(
        ALERT_DROPPED_TOTAL,
        "Alert candidates dropped by a gate, labelled by reason"
    );

    // Sink
    describe_counter!(
        SINK_WRITE_FAILURES_TOTAL,
        "Failed writes to an output sink, labelled by sink"
    );

    // Daemon
    describe_gauge!(
        DAEMON_BUILD_INFO,
        "Build information (always 1, with version label)"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_METRIC_NAMES: &[&str] = &[
        RECEIVER_PACKETS_TOTAL,
        RECEIVER_PACKETS_DROPPED_TOTAL,
        RECEIVER_RECV_ERRORS_TOTAL,
        RECEIVER_QUEUE_DEPTH,
        PIPELINE_PACKETS_PROCESSED_TOTAL,
        PIPELINE_HANDLER_FAILURES_TOTAL,
        PIPELINE_ENVELOPES_DEGRADED_TOTAL,
        PIPELINE_PROCESSING_DURATION_SECONDS,
        ALERT_ACCEPTED_TOTAL,
        ALERT_DROPPED_TOTAL,
        SINK_WRITE_FAILURES_TOTAL,
        DAEMON_BUILD_INFO,
    ];

    #[test]
    fn all_metrics_start_with_watchtower_prefix() {
        for name in ALL_METRIC_NAMES {
            assert!(
                name.starts_with("watchtower_"),
                "Metric '{}' does not start with 'watchtower_' prefix",
                name
            );
        }
    }

    #[test]
    fn metric_names_are_unique() {
        let mut names = ALL_METRIC_NAMES.to_vec();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), ALL_METRIC_NAMES.len());
    }

    #[test]
    fn describe_all_does_not_panic() {
        // 레코더가 설치되지 않아도 패닉하지 않아야 합니다.
        describe_all();
    }

    #[test]
    fn label_keys_are_lowercase() {
        for label in [LABEL_CHANNEL, LABEL_REASON, LABEL_SINK, LABEL_FAILURE] {
            assert_eq!(label.to_lowercase(), label);
        }
    }

    #[test]
    fn processing_duration_buckets_are_sorted() {
        let buckets = PROCESSING_DURATION_BUCKETS;
        for i in 1..buckets.len() {
            assert!(
                buckets[i] > buckets[i - 1],
                "Bucket values must be in ascending order"
            );
        }
    }
}
