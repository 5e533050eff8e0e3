//! 사고 우선순위 산정
//!
//! 작업 카탈로그의 숫자 심각도를 우선순위로 옮기고, 본문에 고정 표지가 있으면
//! 결과와 상관없이 최고 수준으로 덮어씁니다.

use std::fmt;

use serde::Serialize;

/// 미등록 작업에 쓰는 담당 그룹 코드
pub const FALLBACK_GROUP_CODE: &str = "Z-HPO-00A-SEV4";

/// 본문에 있으면 우선순위를 `Priority 4`로 고정하는 표지
pub const PRIORITY_OVERRIDE_MARKER: &str = "BSNAGT_MESSAGES_PULL";

/// 사고 우선순위
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum IncidentPriority {
    /// `Priority 2`
    P2,
    /// `Priority 3` (기본값)
    P3,
    /// `Priority 4`
    P4,
}

impl IncidentPriority {
    /// 카탈로그의 숫자 심각도로 우선순위를 정합니다.
    ///
    /// 3은 `Priority 2`, 5는 `Priority 4`, 그 밖의 값과 미지정은 `Priority 3`입니다.
    pub fn from_severity(severity: Option<i64>) -> Self {
        match severity {
            Some(3) => Self::P2,
            Some(5) => Self::P4,
            _ => Self::P3,
        }
    }

    /// 본문 표지를 반영한 최종 우선순위를 정합니다.
    pub fn assign(severity: Option<i64>, body: &str) -> Self {
        if body.contains(PRIORITY_OVERRIDE_MARKER) {
            Self::P4
        } else {
            Self::from_severity(severity)
        }
    }

    /// 출력 레코드에 쓰는 문자열
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::P2 => "Priority 2",
            Self::P3 => "Priority 3",
            Self::P4 => "Priority 4",
        }
    }
}

impl fmt::Display for IncidentPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
