//! 봉투 파싱 모듈 -- 수신 텍스트를 구조화된 [`Envelope`]로 변환합니다.
//!
//! 파서는 순수 함수처럼 동작하며 실패하지 않습니다. 문법에 맞지 않는
//! 입력은 구조 필드가 비어 있는 축약 봉투로 표현됩니다.

pub mod syslog;

pub use syslog::{Envelope, EnvelopeParser};
