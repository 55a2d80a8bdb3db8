use bedrock_bridge::config::{Config, TierConfig};
use bedrock_bridge::connection::ConnectionSettings;
use bedrock_bridge::core::subject::SubjectKind;
use std::io::Write;
use std::time::Duration;

#[test]
fn test_defaults() {
    let config = Config::from_toml_str("").unwrap();
    assert_eq!(config.log_level, "info");
    assert!(!config.debug);
    assert_eq!(config.connection.host, "localhost");
    assert_eq!(config.connection.port, 19132);
    assert_eq!(config.connection.connect_timeout(), Duration::from_millis(5000));
    assert_eq!(config.connection.reconnect_delay, Duration::from_secs(5));
    assert_eq!(config.health.interval, Duration::from_secs(30));
    assert_eq!(config.health.inactivity_threshold, Duration::from_secs(30));
    assert_eq!(config.scheduler.threads, 0);
    assert_eq!(config.cache.memory_fraction, 0.25);
    assert_eq!(config.cache.blocks, TierConfig::blocks());
    assert_eq!(config.cache.items, TierConfig::items());
    assert_eq!(config.cache.entities, TierConfig::entities());
    assert_eq!(config.translation.fallback, "minecraft:unknown");
    assert!(config.integrations.is_empty());
    assert!(!config.metrics.enabled);
    assert!(config.available_memory > 0);
}

#[test]
fn test_full_file_is_parsed() {
    let config = Config::from_toml_str(
        r#"
        log_level = "warn"
        debug = true

        [connection]
        host = "bedrock.example.net"
        port = 25565
        connect_timeout_ms = 2500
        write_timeout = "3s"
        reconnect_delay = "1s"
        reconnect_max_delay = "30s"
        reconnect_jitter = "250ms"

        [health]
        interval = "10s"
        inactivity_threshold = "1m"

        [scheduler]
        threads = 3
        shutdown_grace = "2s"

        [cache]
        memory_fraction = 0.5
        memory_budget_bytes = 1048576
        maintenance_interval = "1m"

        [cache.blocks]
        max_entries = 2048
        ttl = "30m"

        [translation]
        fallback = "minecraft:stone"

        [translation.mappings]
        "minecraft:grass_block" = "minecraft:grass"

        [translation.warmup]
        delay = "5s"
        blocks = ["minecraft:grass_block"]

        [[integration]]
        id = "extra"
        mappings = { "extra:ruby" = "minecraft:emerald" }

        [[integration]]
        id = "off"
        enabled = false

        [metrics]
        enabled = true
        port = 9100
        "#,
    )
    .unwrap();

    assert_eq!(config.log_level, "warn");
    assert!(config.debug);
    assert_eq!(config.connection.host, "bedrock.example.net");
    assert_eq!(config.connection.port, 25565);
    assert_eq!(config.connection.connect_timeout(), Duration::from_millis(2500));
    assert_eq!(config.connection.write_timeout, Duration::from_secs(3));
    assert_eq!(config.connection.reconnect_max_delay, Duration::from_secs(30));
    assert_eq!(config.connection.reconnect_jitter, Duration::from_millis(250));
    assert_eq!(config.health.interval, Duration::from_secs(10));
    assert_eq!(config.health.inactivity_threshold, Duration::from_secs(60));
    assert_eq!(config.scheduler.threads, 3);
    assert_eq!(config.scheduler.shutdown_grace, Duration::from_secs(2));
    assert_eq!(config.cache.memory_fraction, 0.5);
    assert_eq!(config.available_memory, 1_048_576);
    assert_eq!(config.cache.blocks.max_entries, 2048);
    assert_eq!(config.cache.blocks.ttl, Duration::from_secs(30 * 60));
    assert_eq!(config.cache.tier(SubjectKind::Item), &TierConfig::items());
    assert_eq!(config.translation.fallback, "minecraft:stone");
    assert_eq!(
        config.translation.mappings.get("minecraft:grass_block").map(String::as_str),
        Some("minecraft:grass")
    );
    assert_eq!(config.translation.warmup.delay, Duration::from_secs(5));
    assert_eq!(
        config.translation.warmup.subjects(SubjectKind::Block),
        ["minecraft:grass_block".to_string()]
    );
    assert_eq!(config.integrations.len(), 2);
    assert!(config.integrations[0].enabled);
    assert_eq!(config.integrations[0].mappings.len(), 1);
    assert!(!config.integrations[1].enabled);
    assert!(config.metrics.enabled);
    assert_eq!(config.metrics.port, 9100);

    let settings = ConnectionSettings::from_config(&config);
    assert_eq!(settings.reconnect.delay, Duration::from_secs(1));
    assert_eq!(settings.health_interval, Duration::from_secs(10));
}

#[test]
fn test_out_of_range_values_fall_back_to_defaults() {
    let config = Config::from_toml_str(
        r#"
        [connection]
        port = 80
        connect_timeout_ms = 100
        host = "   "

        [scheduler]
        threads = -4

        [cache]
        memory_fraction = 1.5

        [cache.blocks]
        max_entries = 10
        ttl = "0s"

        [cache.items]
        max_entries = 1000000

        [cache.entities]
        max_entries = 256
        "#,
    )
    .unwrap();

    assert_eq!(config.connection.port, 19132);
    assert_eq!(config.connection.connect_timeout_ms, 5000);
    assert_eq!(config.connection.host, "localhost");
    assert_eq!(config.scheduler.threads, 0);
    assert_eq!(config.cache.memory_fraction, 0.25);
    assert_eq!(config.cache.blocks.max_entries, 8192);
    assert_eq!(config.cache.blocks.ttl, Duration::from_secs(2 * 60 * 60));
    assert_eq!(config.cache.items.max_entries, 4096);
    // Valid values next to invalid ones are kept.
    assert_eq!(config.cache.entities.max_entries, 256);
}

#[test]
fn test_range_boundaries_are_inclusive() {
    let config = Config::from_toml_str(
        r#"
        [connection]
        port = 1024
        connect_timeout_ms = 30000

        [cache.blocks]
        max_entries = 65536
        "#,
    )
    .unwrap();
    assert_eq!(config.connection.port, 1024);
    assert_eq!(config.connection.connect_timeout_ms, 30000);
    assert_eq!(config.cache.blocks.max_entries, 65536);
}

#[test]
fn test_reconnect_max_delay_below_delay_is_raised() {
    let config = Config::from_toml_str(
        r#"
        [connection]
        reconnect_delay = "10s"
        reconnect_max_delay = "1s"
        "#,
    )
    .unwrap();
    assert_eq!(config.connection.reconnect_max_delay, Duration::from_secs(10));
}

#[test]
fn test_missing_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::from_file(dir.path().join("absent.toml")).unwrap();
    assert_eq!(config.connection.port, 19132);
}

#[test]
fn test_from_file_reads_toml() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[connection]\nport = 20000").unwrap();
    let config = Config::from_file(file.path()).unwrap();
    assert_eq!(config.connection.port, 20000);
}

#[test]
fn test_malformed_file_is_an_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[connection\nport = ").unwrap();
    let err = Config::from_file(file.path()).unwrap_err();
    assert!(format!("{err:#}").contains("Failed to parse TOML"));
}

#[test]
fn test_wrong_type_is_an_error() {
    assert!(Config::from_toml_str("[connection]\nport = \"high\"").is_err());
}
