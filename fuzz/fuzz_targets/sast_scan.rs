#![no_main]

use arbitrary::Arbitrary;
use ecuscan_analysis::RuleSet;
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input {
    extension: u8,
    content: String,
}

const EXTENSIONS: [&str; 6] = ["c", "h", "cpp", "py", "js", "rs"];

fuzz_target!(|input: Input| {
    let Ok(rules) = RuleSet::builtin() else {
        return;
    };
    let ext = EXTENSIONS[input.extension as usize % EXTENSIONS.len()];
    let path = format!("src/fuzz.{ext}");

    // 줄 번호는 항상 1 이상이고 입력 줄 수를 넘지 않아야 한다
    let line_count = input.content.lines().count() as u32;
    for vuln in rules.scan_file(&path, &input.content) {
        if let Some(line) = vuln.line_number {
            assert!(line >= 1 && line <= line_count);
        }
    }
});
