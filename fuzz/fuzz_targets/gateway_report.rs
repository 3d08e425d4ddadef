#![no_main]

use ecuscan_analysis::GatewayReport;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // 게이트웨이 응답은 텍스트이므로 UTF-8 변환 필요
    if let Ok(text) = std::str::from_utf8(data) {
        if let Ok(report) = GatewayReport::parse(text) {
            let findings = report.into_findings("fuzz.c");
            if let Some(score) = findings.risk_score {
                assert!(score <= 100, "risk score must be clamped");
            }
        }
    }
});
