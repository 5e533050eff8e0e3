#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use watchtower_log_pipeline::alert::{AlertField, FieldTokenizer};

/// 레이블과 값을 섞어 만든 구조적 본문
#[derive(Arbitrary, Debug)]
struct FuzzBody {
    prefix: String,
    fields: Vec<(u8, String)>,
}

fuzz_target!(|input: FuzzBody| {
    let Ok(tokenizer) = FieldTokenizer::new() else {
        return;
    };

    let mut body = input.prefix;
    for (idx, value) in input.fields.iter().take(32) {
        let field = AlertField::ALL[usize::from(*idx) % AlertField::ALL.len()];
        body.push_str(field.label());
        body.push_str(": ");
        body.push_str(value);
        body.push(' ');
    }

    let candidate = tokenizer.extract(&body);
    assert!(candidate.populated() <= AlertField::ALL.len());
    let _ = candidate.detected_at();
});
