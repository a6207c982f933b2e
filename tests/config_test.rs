use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;
use yapper::config::{AuthSection, Config, HttpConfig, LoggingConfig, StorageConfig};

#[test]
fn test_config_default_has_expected_values() {
    let config = Config::default();

    // Logging defaults
    assert_eq!(config.logging.filter, "warn");

    // HTTP defaults
    assert_eq!(config.http.connect_timeout_secs, 10);
    assert!(config.http.user_agent.starts_with("yapper/"));

    // Auth seed defaults
    assert_eq!(config.auth.issuer_url, "https://auth.example.com");
    assert_eq!(config.auth.client_id, "yapper-client");
    assert_eq!(config.auth.redirect_uri, "http://localhost:8080/callback");
    assert_eq!(config.auth.scope, "openid profile email");

    assert!(config.storage.data_dir.is_none());
}

#[test]
fn test_http_config_timeout() {
    let http = HttpConfig {
        connect_timeout_secs: 3,
        ..HttpConfig::default()
    };
    assert_eq!(http.connect_timeout(), std::time::Duration::from_secs(3));
}

#[test]
fn test_storage_paths_use_data_dir() {
    let storage = StorageConfig {
        data_dir: Some(PathBuf::from("/tmp/yapper-test")),
    };
    assert_eq!(
        storage.state_path(),
        PathBuf::from("/tmp/yapper-test/state.json")
    );
    assert_eq!(
        storage.login_attempt_path(),
        PathBuf::from("/tmp/yapper-test/login_attempt.json")
    );
}

#[test]
fn test_auth_section_to_auth_config() {
    let section = AuthSection {
        client_id: "c1".to_string(),
        ..AuthSection::default()
    };
    let config = section.to_auth_config();
    assert_eq!(config.client_id, "c1");
    assert_eq!(config.issuer_url, "https://auth.example.com");
}

#[test]
fn test_config_save_and_load_roundtrip() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config_path = temp_dir.path().join("nested").join("config.toml");

    // Create a custom config
    let mut config = Config::default();
    config.storage.data_dir = Some(temp_dir.path().join("data"));
    config.logging.filter = "yapper=debug".to_string();
    config.auth.issuer_url = "https://sso.example.org".to_string();

    // Save it
    config
        .save_to_path(&config_path)
        .expect("Failed to save config");

    // Verify file exists
    assert!(config_path.exists());

    // Load it back
    let loaded = Config::load_from_path(&config_path).expect("Failed to load config");
    assert_eq!(loaded, config);
}

#[test]
fn test_config_load_from_path_with_partial_toml() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config_path = temp_dir.path().join("config.toml");

    let toml_content = r#"
[logging]
filter = "info"

[auth]
client_id = "desktop"
"#;

    fs::write(&config_path, toml_content).expect("Failed to write test config");

    let config = Config::load_from_path(&config_path).expect("Failed to load config");

    assert_eq!(
        config.logging,
        LoggingConfig {
            filter: "info".to_string()
        }
    );
    assert_eq!(config.auth.client_id, "desktop");
    // Unspecified fields keep their defaults
    assert_eq!(config.auth.scope, "openid profile email");
    assert_eq!(config.http, HttpConfig::default());
}

#[test]
fn test_config_load_from_path_missing_file() {
    let result = Config::load_from_path("/nonexistent/path/config.toml");
    assert!(result.is_err());
}

#[test]
fn test_config_load_from_path_invalid_toml() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "[logging\nfilter = ").expect("Failed to write test config");

    assert!(Config::load_from_path(&config_path).is_err());
}
