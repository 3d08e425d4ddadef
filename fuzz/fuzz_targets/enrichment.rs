#![no_main]

use ecuscan_analysis::gateway::parse_enrichment;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = parse_enrichment(text);
    }
});
