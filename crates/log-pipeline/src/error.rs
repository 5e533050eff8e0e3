//! 로그 파이프라인 에러 타입
//!
//! [`LogPipelineError`]는 로그 파이프라인 내부에서 발생하는 모든 에러를 표현합니다.
//! `From<LogPipelineError> for WatchtowerError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.

use watchtower_core::error::{PipelineError, WatchtowerError};

/// 로그 파이프라인 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum LogPipelineError {
    /// UDP 수신기 에러 (바인드 실패, 소켓 에러)
    #[error("receiver error: {bind_addr}: {reason}")]
    Receiver {
        /// 바인드 주소
        bind_addr: String,
        /// 에러 사유
        reason: String,
    },

    /// 라우트 테이블 로딩 실패
    #[error("route table error: {path}: {reason}")]
    RouteTable {
        /// 라우트 문서 경로
        path: String,
        /// 로딩 실패 사유
        reason: String,
    },

    /// 중복 제거 원장 에러
    #[error("ledger error: {path}: {reason}")]
    Ledger {
        /// 원장 파일 경로
        path: String,
        /// 에러 사유
        reason: String,
    },

    /// 출력 싱크 에러
    #[error("sink error: {sink}: {reason}")]
    Sink {
        /// 싱크 이름 (archive, internal_alerts 등)
        sink: String,
        /// 에러 사유
        reason: String,
    },

    /// 작업 메타데이터 조회 실패
    #[error("job lookup error: {0}")]
    JobLookup(String),

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 채널 통신 에러
    #[error("channel error: {0}")]
    Channel(String),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON 직렬화/역직렬화 에러
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// 정규식 컴파일 에러
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl From<LogPipelineError> for WatchtowerError {
    fn from(err: LogPipelineError) -> Self {
        WatchtowerError::Pipeline(PipelineError::InitFailed(err.to_string()))
    }
}
