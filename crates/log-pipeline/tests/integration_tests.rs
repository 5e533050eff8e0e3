//! 통합 테스트 -- 파이프라인 전체 흐름 검증
//!
//! 봉투 파싱부터 관문, 원장, 알림 로그 기록까지의 흐름과
//! 실제 UDP 소켓을 통한 왕복을 검증합니다.

use std::net::UdpSocket;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDate};

use watchtower_core::pipeline::Pipeline;
use watchtower_log_pipeline::{
    AlertExtractor, AlertSink, AlertLogWriter, EnvelopeParser, ExtractionOutcome, FileJobCatalog,
    FileLedger, IncidentPriority, JobCatalog, LogPipelineBuilder, PipelineConfigBuilder,
    RouteTable,
};

const CATALOG: &str = r#"[
    { "job_name": "KMWHD001", "group_code": "G-DWH-01", "group_name": "DWH Ops", "severity": 4 },
    { "job_name": "KMWHD900", "group_code": "G-DWH-09", "severity": 3 }
]"#;

/// 작업 스케줄러가 보내는 실패 알림 본문
fn alert_body(date: NaiveDate, alert_id: &str) -> String {
    format!(
        "{} 07:09:52 call_type: I alert_id: {alert_id} data_center: CTMlinux \
         memname: BPHXCTLM.ksh order_id: 1oje6 severity: V status: Not_Noticed \
         send_time: 20250209070952 last_user: ctmadm last_time: 20250209070952 \
         message: Ended not OK run_as: cntrlm sub_application: KXWHD_PROD-GP \
         application: KXWHD job_name: KMWHD001 host_id: kcmcsappp alert_type: R \
         closed_from_em: N ticket_number: 0 run_counter: 00002",
        date.format("%Y-%m-%d")
    )
}

fn syslog_line(body: &str) -> String {
    format!("<13>Feb  9 07:09:52 ctm01 ctmlog[4242]: {body}")
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn extractor(ledger_path: &Path) -> AlertExtractor {
    let ledger = Arc::new(FileLedger::open(ledger_path).expect("open ledger"));
    let catalog: Arc<dyn JobCatalog> =
        Arc::new(FileJobCatalog::from_json(CATALOG).expect("parse catalog"));
    AlertExtractor::new(ledger, catalog).expect("build extractor")
}

/// KMWHD001 (심각도 4) 알림은 Priority 3으로 수락됩니다.
#[test]
fn test_job_alert_scenario_priority_three() {
    let dir = tempfile::tempdir().unwrap();
    let extractor = extractor(&dir.path().join("ids_alerted.log"));
    let parser = EnvelopeParser::new().unwrap();

    let envelope = parser.parse(&syslog_line(&alert_body(today(), "170172")));
    assert_eq!(envelope.hostname.as_deref(), Some("ctm01"));

    let outcome = extractor.evaluate(&envelope, "controlm").unwrap();
    let alert = outcome.alert().expect("alert accepted");
    assert_eq!(alert.priority, IncidentPriority::P3);
    assert_eq!(alert.group_code, "G-DWH-01");

    // 두 줄은 공유 필드에서 일치해야 합니다.
    for needle in ["alert_id:170172", "severity:V", "KMWHD001", "Priority 3"] {
        assert!(alert.internal_line.contains(needle), "internal: {needle}");
        assert!(alert.external_line.contains(needle), "external: {needle}");
    }
}

/// 본문의 표지는 카탈로그 결과와 상관없이 Priority 4를 강제합니다.
#[test]
fn test_marker_forces_priority_four() {
    let dir = tempfile::tempdir().unwrap();
    let extractor = extractor(&dir.path().join("ids_alerted.log"));
    let parser = EnvelopeParser::new().unwrap();

    let body = alert_body(today(), "170173")
        .replace("Ended not OK", "Ended not OK BSNAGT_MESSAGES_PULL");
    let outcome = extractor.evaluate(&parser.parse(&syslog_line(&body)), "controlm").unwrap();
    assert_eq!(outcome.alert().unwrap().priority, IncidentPriority::P4);
}

/// 같은 alert_id는 한 번만 수락됩니다.
#[test]
fn test_duplicate_alert_id_accepted_once() {
    let dir = tempfile::tempdir().unwrap();
    let extractor = extractor(&dir.path().join("ids_alerted.log"));
    let parser = EnvelopeParser::new().unwrap();
    let envelope = parser.parse(&syslog_line(&alert_body(today(), "170174")));

    let outcomes: Vec<_> = (0..3)
        .map(|_| extractor.evaluate(&envelope, "controlm").unwrap())
        .collect();
    let accepted = outcomes.iter().filter(|o| o.alert().is_some()).count();
    assert_eq!(accepted, 1);
    assert_eq!(outcomes[1], ExtractionOutcome::DroppedDuplicate);
}

/// 어제 날짜의 알림은 id가 처음이어도 수락되지 않습니다.
#[test]
fn test_yesterday_is_stale() {
    let dir = tempfile::tempdir().unwrap();
    let extractor = extractor(&dir.path().join("ids_alerted.log"));
    let parser = EnvelopeParser::new().unwrap();

    let yesterday = today().pred_opt().unwrap();
    let envelope = parser.parse(&syslog_line(&alert_body(yesterday, "170175")));
    assert_eq!(
        extractor.evaluate(&envelope, "controlm").unwrap(),
        ExtractionOutcome::DroppedStale
    );
}

/// 프로세스 재시작 후에도 이미 수락된 id는 중복입니다.
#[test]
fn test_ledger_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let ledger_path = dir.path().join("state/ids_alerted.log");
    let parser = EnvelopeParser::new().unwrap();
    let envelope = parser.parse(&syslog_line(&alert_body(today(), "170176")));

    {
        let extractor = extractor(&ledger_path);
        assert!(extractor.evaluate(&envelope, "controlm").unwrap().alert().is_some());
    }

    let restarted = extractor(&ledger_path);
    assert_eq!(
        restarted.evaluate(&envelope, "controlm").unwrap(),
        ExtractionOutcome::DroppedDuplicate
    );
}

/// 알림 로그 작성기는 두 파일에 한 줄씩 추가합니다.
#[test]
fn test_alert_log_writer_appends_both_lines() {
    let dir = tempfile::tempdir().unwrap();
    let internal = dir.path().join("controlm_log_alerts.txt");
    let external = dir.path().join("alerts_to_work.log");
    let writer = AlertLogWriter::open(&internal, &external).unwrap();

    let extractor = extractor(&dir.path().join("ids_alerted.log"));
    let parser = EnvelopeParser::new().unwrap();
    for id in ["1", "2"] {
        let envelope = parser.parse(&syslog_line(&alert_body(today(), id)));
        let outcome = extractor.evaluate(&envelope, "controlm").unwrap();
        writer.write(outcome.alert().unwrap()).unwrap();
    }

    let internal = std::fs::read_to_string(internal).unwrap();
    let external = std::fs::read_to_string(external).unwrap();
    assert_eq!(internal.lines().count(), 2);
    assert_eq!(external.lines().count(), 2);
    assert!(internal.lines().all(|l| l.starts_with("ctm01,KMWHD001,")));
    assert!(external.lines().all(|l| l.starts_with("controlm_router:controlm,")));
}

async fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    false
}

/// 실제 UDP 소켓으로 보낸 알림이 파일 싱크까지 도달합니다.
#[tokio::test]
async fn test_udp_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let config = PipelineConfigBuilder::new()
        .bind_addr("127.0.0.1:0")
        .alert_channels(vec!["controlm".to_owned()])
        .data_dir(dir.path())
        .build()
        .unwrap();
    let mut pipeline = LogPipelineBuilder::new()
        .config(config.clone())
        .route_table(RouteTable::new("raw").with_ip("127.0.0.1", "controlm"))
        .catalog(Arc::new(FileJobCatalog::from_json(CATALOG).unwrap()))
        .build()
        .unwrap();

    pipeline.start().await.unwrap();
    let addr = pipeline.local_addr().unwrap();

    let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
    let line = syslog_line(&alert_body(today(), "880001"));
    sender.send_to(line.as_bytes(), addr).unwrap();
    sender.send_to(line.as_bytes(), addr).unwrap();
    sender.send_to(b"garbage without envelope", addr).unwrap();

    assert!(wait_for(|| pipeline.stats().packets_processed == 3).await);
    pipeline.stop().await.unwrap();

    let stats = pipeline.stats();
    assert_eq!(stats.packets_received, 3);
    assert_eq!(stats.alerts_accepted, 1);
    assert_eq!(stats.dropped_duplicate, 1);
    assert_eq!(stats.envelopes_degraded, 1);
    assert_eq!(stats.handler_failures, 0);

    let archive = std::fs::read_to_string(&config.events_path).unwrap();
    assert_eq!(archive.lines().count(), 3);
    let channel_log = std::fs::read_to_string(&config.channel_log_path).unwrap();
    assert_eq!(channel_log.lines().count(), 3);

    let internal = std::fs::read_to_string(&config.internal_alerts_path).unwrap();
    assert_eq!(internal.lines().count(), 1);
    assert!(internal.contains("alert_id:880001"));
    assert!(internal.contains("group:G-DWH-01"));

    let ledger = std::fs::read_to_string(&config.ledger_path).unwrap();
    assert_eq!(ledger, "880001\n");
}

/// 알림 채널이 아닌 송신자의 메시지는 아카이브에만 기록됩니다.
#[tokio::test]
async fn test_non_alert_channel_is_archived_only() {
    let dir = tempfile::tempdir().unwrap();
    let routes = dir.path().join("routes.json");
    std::fs::write(
        &routes,
        r#"{"version": 2, "default_router": "raw",
            "routers": [{"name": "controlm", "hostnames": ["ctm-other."]}]}"#,
    )
    .unwrap();

    let config = PipelineConfigBuilder::new()
        .bind_addr("127.0.0.1:0")
        .routes_path(routes.display().to_string())
        .alert_channels(vec!["controlm".to_owned()])
        .data_dir(dir.path())
        .build()
        .unwrap();
    let mut pipeline = LogPipelineBuilder::new().config(config.clone()).build().unwrap();
    pipeline.start().await.unwrap();
    let addr = pipeline.local_addr().unwrap();

    let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
    let line = syslog_line(&alert_body(today(), "990001"));
    sender.send_to(line.as_bytes(), addr).unwrap();

    assert!(wait_for(|| pipeline.stats().packets_processed == 1).await);
    pipeline.stop().await.unwrap();

    let archive = std::fs::read_to_string(&config.events_path).unwrap();
    let event: serde_json::Value = serde_json::from_str(archive.trim()).unwrap();
    assert_eq!(event["channel"], "raw");
    assert_eq!(event["match_reason"], "default");
    assert_eq!(event["hostname"], "ctm01");

    assert_eq!(std::fs::read_to_string(&config.channel_log_path).unwrap(), "");
    assert_eq!(std::fs::read_to_string(&config.internal_alerts_path).unwrap(), "");
    assert_eq!(pipeline.stats().alerts_accepted, 0);
}
