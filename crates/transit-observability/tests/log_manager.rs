use transit_observability::{Config, LogManager};

// one subscriber per process, so everything runs in a single test
#[test]
fn installs_once_and_reloads_level() {
    let config = Config::default().with_log_level("info").with_ansi_colors(false);

    let mut manager = LogManager::new(&config).unwrap();
    assert_eq!(manager.config().level, "info");

    manager.update_level("debug").unwrap();
    assert_eq!(manager.config().level, "debug");
    assert!(tracing::enabled!(tracing::Level::DEBUG));

    assert!(manager.update_level("transit=loud").is_err());
    assert_eq!(manager.config().level, "debug");

    assert!(LogManager::new(&config).is_err());
}
