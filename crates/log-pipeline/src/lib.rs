#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`collector`]: UDP 데이터그램 수신 ([`PacketReceiver`])
//! - [`parser`]: BSD syslog 봉투 파서 ([`EnvelopeParser`])
//! - [`router`]: 송신 IP/호스트명 기반 채널 결정
//! - [`alert`]: 본문 필드 토크나이저, 관문, 우선순위, 두 줄 직렬화
//! - [`ledger`]: alert_id 중복 제거 원장
//! - [`catalog`]: 작업 메타데이터 조회
//! - [`sink`]: 이벤트 아카이브와 알림 로그 출력
//! - [`processor`]: 패킷 하나의 동기 처리
//! - [`pipeline`]: 전체 생명주기 관리 (Pipeline trait 구현)
//! - [`config`]: 파이프라인 설정 (core 설정에서 변환)
//! - [`stats`]: 원자적 처리 카운터
//! - [`error`]: 도메인 에러 타입

pub mod alert;
pub mod catalog;
pub mod config;
pub mod error;
pub mod ledger;
pub mod pipeline;
pub mod processor;
pub mod router;
pub mod sink;
pub mod stats;

pub mod collector;
pub mod parser;

// --- 주요 타입 re-export ---

// 파이프라인
pub use pipeline::{LogPipeline, LogPipelineBuilder};
pub use processor::{PacketOutcome, PacketProcessor};

// 설정
pub use config::{PipelineConfig, PipelineConfigBuilder};

// 에러
pub use error::LogPipelineError;

// 수집/파싱/라우팅
pub use collector::{PacketReceiver, RawPacket, UdpReceiverConfig};
pub use parser::{Envelope, EnvelopeParser};
pub use router::{MatchReason, RouteMatch, RouteTable, Router};

// 알림
pub use alert::{AlertCandidate, AlertExtractor, AlertField, ExtractionOutcome, IncidentPriority, JobAlert};
pub use catalog::{EmptyJobCatalog, FileJobCatalog, JobCatalog, JobMetadata};
pub use ledger::{DedupLedger, FileLedger, MemoryLedger};
pub use sink::{AlertLogWriter, AlertSink, ArchivedEvent, EventSink, JsonlEventSink, SinkSet};

// 통계
pub use stats::{PipelineStats, StatsSnapshot};
