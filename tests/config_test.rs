//! Integration tests for configuration loading

use std::io::Write;
use tempfile::NamedTempFile;
use triplog::infra::Config;

#[test]
fn test_load_config_from_file() {
    let mut temp_file = NamedTempFile::new().unwrap();

    let config_content = r#"
[can]
device = "/dev/ttyUSB3"
baud = 230400
bitrate = 500000

[database]
path = "/var/lib/triplog/triplog.db"

[recorder]
summary_every = 25
"#;

    temp_file.write_all(config_content.as_bytes()).unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();
    assert_eq!(config.can_device(), "/dev/ttyUSB3");
    assert_eq!(config.can_baud(), 230_400);
    assert_eq!(config.can_bitrate(), 500_000);
    assert_eq!(config.database_path(), "/var/lib/triplog/triplog.db");
    assert_eq!(config.summary_every(), 25);
    assert_eq!(config.config_file(), temp_file.path().display().to_string());
}

#[test]
fn test_optional_sections_take_defaults() {
    let mut temp_file = NamedTempFile::new().unwrap();

    // only the serial device is mandatory
    let config_content = r#"
[can]
device = "/dev/ttyACM1"
"#;

    temp_file.write_all(config_content.as_bytes()).unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();
    assert_eq!(config.can_device(), "/dev/ttyACM1");
    assert_eq!(config.can_baud(), 115_200);
    assert_eq!(config.can_bitrate(), 125_000);
    assert_eq!(config.database_path(), "triplog.db");
    assert_eq!(config.summary_every(), 10);
}

#[test]
fn test_malformed_file_is_an_error() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(b"[can\ndevice = ").unwrap();

    assert!(Config::from_file(temp_file.path()).is_err());
}

#[test]
fn test_load_falls_back_to_defaults() {
    let config = Config::load("/nonexistent/triplog.toml");
    assert_eq!(config.can_device(), "/dev/ttyACM0");
    assert_eq!(config.database_path(), "triplog.db");
    assert_eq!(config.config_file(), "default");
}
