#![no_main]

use libfuzzer_sys::fuzz_target;
use sevensenders_config::{parse_utc_offset, Config};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(offset) = parse_utc_offset(text) {
        assert!(offset.local_minus_utc().abs() <= 14 * 3600 + 59 * 60);
    }

    if let Ok(config) = Config::from_toml_str(text) {
        for url in [config.api_base_url(), config.tracking_page_base_url()]
            .into_iter()
            .flatten()
        {
            assert!(!url.ends_with('/'));
            assert_eq!(url, url.trim());
            assert!(!url.is_empty());
        }
        let _ = config.validate();
        assert_eq!(config.settings_exist(), config.missing_required().is_empty());
    }
});
