#![no_main]

use libfuzzer_sys::fuzz_target;
use watchtower_log_pipeline::parser::EnvelopeParser;

fuzz_target!(|data: &[u8]| {
    let Ok(parser) = EnvelopeParser::new() else {
        return;
    };

    // 어떤 입력이든 패닉 없이 원문을 보존한 Envelope을 돌려줘야 한다
    let text = String::from_utf8_lossy(data);
    let envelope = parser.parse(&text);
    assert_eq!(envelope.raw, text);
    if envelope.is_degraded() {
        assert_eq!(envelope.message, text.trim());
    }
});
