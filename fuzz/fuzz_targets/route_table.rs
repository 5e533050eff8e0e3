#![no_main]

use libfuzzer_sys::fuzz_target;
use watchtower_log_pipeline::router::{MatchReason, RouteTable};

fuzz_target!(|data: &[u8]| {
    let Ok(json) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(table) = RouteTable::from_json(json) else {
        return;
    };

    // 일치가 없으면 항상 기본 채널로 떨어진다
    let m = table.resolve("198.51.100.255", Some("fuzz.invalid"));
    if m.reason == MatchReason::Default {
        assert_eq!(m.channel, table.default_router());
    }
});
