use std::time::Duration;
use tempfile::TempDir;
use transit_config::{ConfigManager, LogLevel};

#[tokio::test]
async fn loads_session_and_logging_sections() {
    std::env::set_var("TRANSIT_IT_PASS", "s3cret");

    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.json");
    tokio::fs::write(
        &path,
        r#"{
            "session": {
                "appletId": "weather",
                "accepts": ["weather", "ext"],
                "authPass": "${TRANSIT_IT_PASS}",
                "controlPlaneUri": "${TRANSIT_IT_HOST:-10.0.0.5}",
                "reconnectionTimer": 1500,
                "autoReconnect": false
            },
            "logging": { "level": "debug", "json": true }
        }"#,
    )
    .await
    .unwrap();

    let manager = ConfigManager::load(&path).await.unwrap();
    let session = manager.session_config().await.unwrap();
    let file = manager.get().read().await.clone();

    assert_eq!(session.applet_id, "weather");
    assert!(session.accepts.contains("ext"));
    assert_eq!(session.credentials.pass, "s3cret");
    assert_eq!(session.control_plane_url(), "ws://10.0.0.5:10022/");
    assert_eq!(session.reconnect_interval, Duration::from_millis(1500));
    assert!(!session.auto_reconnect);
    assert_eq!(file.logging.level, LogLevel::Debug);
    assert!(file.logging.json);
}

#[tokio::test]
async fn missing_applet_id_surfaces_at_session_config() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.json");
    tokio::fs::write(&path, r#"{"session": {"accepts": "ext"}}"#).await.unwrap();

    let manager = ConfigManager::load(&path).await.unwrap();
    let err = manager.session_config().await.unwrap_err();
    assert!(err.to_string().contains("appletId"));
}
