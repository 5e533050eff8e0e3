//! 알림 레코드 직렬화
//!
//! 하위 소비자가 레이블과 필드 순서에 의존하므로 형식은 고정입니다.
//! 비어 있는 값과 문자열 `None`은 `-`로 씁니다.

use super::fields::{AlertCandidate, AlertField};
use super::priority::IncidentPriority;

/// 비어 있는 값 자리표시자
pub const PLACEHOLDER: &str = "-";

/// 값이 없으면 자리표시자를 돌려줍니다.
pub fn or_placeholder(value: Option<&str>) -> &str {
    match value {
        Some(v) if !v.is_empty() && v != "None" => v,
        _ => PLACEHOLDER,
    }
}

/// 렌더링에 필요한 알림 값
pub struct RenderInput<'a> {
    /// 라우팅된 채널 이름
    pub channel: &'a str,
    /// 봉투의 호스트명
    pub hostname: Option<&'a str>,
    /// 추출된 후보
    pub candidate: &'a AlertCandidate,
    /// 최종 우선순위
    pub priority: IncidentPriority,
    /// 담당 그룹 코드
    pub group_code: &'a str,
}

/// 내부 감사 로그 한 줄
///
/// `{host},{job},{detected},alert_id:..,severity:..,priority:..,group:..,message:..`
pub fn internal_line(input: &RenderInput<'_>) -> String {
    let c = input.candidate;
    format!(
        "{},{},{},alert_id:{},severity:{},priority:{},group:{},message:{}",
        or_placeholder(input.hostname),
        or_placeholder(c.get(AlertField::JobName)),
        or_placeholder(c.detected_entry()),
        or_placeholder(c.get(AlertField::AlertId)),
        or_placeholder(c.get(AlertField::Severity)),
        input.priority,
        or_placeholder(Some(input.group_code)),
        or_placeholder(c.get(AlertField::Message)),
    )
}

/// 외부 소비자용 한 줄
///
/// 라우터, 서버, 작업, detected_entry가 앞에 오고 나머지 필드가 표 순서로 이어지며
/// 우선순위와 그룹 코드로 끝납니다. job_name은 앞쪽에서 이미 쓰므로 반복하지 않습니다.
pub fn external_line(input: &RenderInput<'_>) -> String {
    let c = input.candidate;
    let mut line = format!(
        "controlm_router:{},controlm_server:{},job_name:{},detected_entry:{}",
        or_placeholder(Some(input.channel)),
        or_placeholder(input.hostname),
        or_placeholder(c.get(AlertField::JobName)),
        or_placeholder(c.detected_entry()),
    );

    for field in AlertField::ALL {
        if field == AlertField::JobName {
            continue;
        }
        line.push(',');
        line.push_str(field.label());
        line.push(':');
        line.push_str(or_placeholder(c.get(field)));
    }

    line.push_str(&format!(
        ",Incident_Priority:{},AssignmentGroupCode:{}",
        input.priority,
        or_placeholder(Some(input.group_code)),
    ));
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate() -> AlertCandidate {
        let mut c = AlertCandidate::default();
        c.set(AlertField::AlertId, "170172");
        c.set(AlertField::Severity, "V");
        c.set(AlertField::JobName, "KMWHD001");
        c.set(AlertField::Message, "Ended not OK");
        c.set(AlertField::Status, "None");
        c
    }

    #[test]
    fn placeholder_rules() {
        assert_eq!(or_placeholder(None), "-");
        assert_eq!(or_placeholder(Some("")), "-");
        assert_eq!(or_placeholder(Some("None")), "-");
        assert_eq!(or_placeholder(Some("x")), "x");
    }

    #[test]
    fn internal_line_layout() {
        let c = candidate();
        let line = internal_line(&RenderInput {
            channel: "controlm",
            hostname: Some("ctm01"),
            candidate: &c,
            priority: IncidentPriority::P3,
            group_code: "G-1",
        });
        assert_eq!(
            line,
            "ctm01,KMWHD001,-,alert_id:170172,severity:V,priority:Priority 3,group:G-1,message:Ended not OK"
        );
    }

    #[test]
    fn external_line_layout() {
        let c = candidate();
        let line = external_line(&RenderInput {
            channel: "controlm",
            hostname: None,
            candidate: &c,
            priority: IncidentPriority::P4,
            group_code: "G-1",
        });
        assert!(line.starts_with(
            "controlm_router:controlm,controlm_server:-,job_name:KMWHD001,detected_entry:-,call_type:-,alert_id:170172,"
        ));
        assert!(line.contains(",status:-,"));
        assert!(line.contains(",application:-,host_id:-,"));
        assert!(line.ends_with(",run_counter:-,Incident_Priority:Priority 4,AssignmentGroupCode:G-1"));
        assert_eq!(line.matches("job_name:").count(), 1);
        // 4개 머리 + 19개 필드 + 2개 꼬리
        assert_eq!(line.split(',').count(), 25);
    }
}
