use chrono::TimeDelta;
use zonetrack::config::{Config, DEFAULT_MIN_DWELL_SECONDS};

// One test covering defaults, overrides, and rejection; env mutation is
// process-global, so the cases run sequentially in a single test.
#[test]
fn config_from_env_defaults_overrides_and_rejects_garbage() {
    unsafe {
        std::env::remove_var("ZONETRACK_DB");
        std::env::remove_var("MIN_DWELL_SECONDS");
        std::env::remove_var("LOG_LEVEL");
    }

    let config = Config::from_env().unwrap();
    assert_eq!(config.min_dwell_seconds, DEFAULT_MIN_DWELL_SECONDS);
    assert_eq!(config.log_level, "info");
    assert_eq!(
        config.database_path,
        std::path::PathBuf::from("./zonetrack.db")
    );

    unsafe {
        std::env::set_var("ZONETRACK_DB", "/tmp/zonetrack-test.db");
        std::env::set_var("MIN_DWELL_SECONDS", "3");
        std::env::set_var("LOG_LEVEL", "debug");
    }

    let config = Config::from_env().unwrap();
    assert_eq!(
        config.database_path,
        std::path::PathBuf::from("/tmp/zonetrack-test.db")
    );
    assert_eq!(config.min_dwell_seconds, 3);
    assert_eq!(config.engine_config().min_dwell, TimeDelta::seconds(3));
    assert_eq!(config.log_level, "debug");

    unsafe {
        std::env::set_var("MIN_DWELL_SECONDS", "ten");
    }
    assert!(Config::from_env().is_err());

    // Clean up
    unsafe {
        std::env::remove_var("ZONETRACK_DB");
        std::env::remove_var("MIN_DWELL_SECONDS");
        std::env::remove_var("LOG_LEVEL");
    }
}
