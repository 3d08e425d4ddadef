#![no_main]

use ecuscan_core::EcuscanConfig;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        // 크래시나 패닉 없이 Ok 또는 Err을 반환해야 한다
        if let Ok(config) = EcuscanConfig::parse(text) {
            let _ = config.validate();
        }
    }
});
