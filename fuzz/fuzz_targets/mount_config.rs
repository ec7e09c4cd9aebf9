#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    // Parsing arbitrary input must fail cleanly, and anything that parses
    // must survive a round trip through TOML.
    let Ok(config) = hookfs_common::MountConfig::from_toml_str(text) else {
        return;
    };
    let _ = config.validate();
    if let Ok(serialized) = toml::to_string(&config) {
        let reparsed = hookfs_common::MountConfig::from_toml_str(&serialized)
            .expect("serialized config must parse");
        assert_eq!(reparsed, config);
    }
});
