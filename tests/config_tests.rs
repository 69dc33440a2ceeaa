use timestamp_bus::config::{self, Config};
use timestamp_bus::{AudioTimestampBus, LookupPolicy};

#[test]
fn test_defaults() {
    let cfg = Config::default();
    assert_eq!(cfg.bus.capacity, 8);
    assert_eq!(cfg.bus.lookup, LookupPolicy::Nearest);
    assert_eq!(cfg.bus.block_frames, None);
    assert_eq!(cfg.demo.block_frames(), Some(480));
}

#[test]
fn test_parse_partial_toml() {
    let cfg = config::parse(
        r#"
        [bus]
        name = "capture"
        capacity = 16
        block_frames = 256
        lookup = "prefer_past"
        push_lock_timeout_us = 50

        [demo]
        consumers = 4
        tolerance_ms = 20
        "#,
    )
    .unwrap();

    assert_eq!(cfg.bus.name, "capture");
    assert_eq!(cfg.bus.capacity, 16);
    assert_eq!(cfg.bus.block_frames, Some(256));
    assert_eq!(cfg.bus.lookup, LookupPolicy::PreferPast);
    assert_eq!(cfg.bus.push_lock_timeout_us, Some(50));
    assert_eq!(cfg.bus.notify_capacity, 16);
    assert_eq!(cfg.demo.consumers, 4);
    assert_eq!(cfg.demo.sample_rate, 48_000);

    let bus = AudioTimestampBus::with_config(cfg.bus);
    assert_eq!(bus.capacity(), 16);
    assert_eq!(bus.name(), "capture");
}

#[test]
fn test_empty_toml_is_default() {
    assert_eq!(config::parse("").unwrap(), Config::default());
}

#[test]
fn test_rejects_invalid_values() {
    assert!(config::parse("[bus]\ncapacity = 0\n").is_err());
    assert!(config::parse("[demo]\nchannels = 0\n").is_err());
    assert!(config::parse("[demo]\nsample_rate = 100\nblock_ms = 1\n").is_err());
    assert!(config::parse("[bus]\nlookup = \"sideways\"\n").is_err());
}

#[test]
fn test_oversized_block_is_an_error() {
    let cfg = Config {
        demo: timestamp_bus::config::DemoConfig {
            sample_rate: u32::MAX,
            block_ms: u64::MAX,
            ..Default::default()
        },
        ..Default::default()
    };
    assert_eq!(cfg.demo.block_frames(), None);

    let err = config::parse("[demo]\nsample_rate = 4294967295\nblock_ms = 9223372036854775807\n")
        .unwrap_err();
    assert!(err.to_string().contains("too large"), "{}", err);
}

#[test]
fn test_load_missing_file() {
    assert!(config::load("/nonexistent/timestamp-bus.toml").is_err());
}
