//! Engine configuration loading
//!
//! # Test Coverage
//!
//! - YAML and TOML files, partial files keeping defaults
//! - Read and parse failures carrying the file path
//! - `BRRTE_*` environment overrides

use brrtengine::EngineConfig;
use std::io::Write;
use std::time::Duration;
use tempfile::Builder;

fn write_config(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
    let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_yaml_file() {
    let file = write_config(
        ".yaml",
        "continuation_duration_ms: 60000\n\
         reaper_interval_ms: 5000\n\
         stack_size: 0x20000\n\
         continuation_cookie: flow\n\
         pretty_exceptions: true\n",
    );
    let config = EngineConfig::from_file(file.path()).unwrap();
    assert_eq!(config.continuation_duration(), Duration::from_secs(60));
    assert_eq!(config.reaper_interval(), Some(Duration::from_secs(5)));
    assert_eq!(config.stack_size, 0x20000);
    assert_eq!(config.continuation_cookie, "flow");
    assert!(config.pretty_exceptions);
    assert_eq!(config.continuation_param, "contId");
}

#[test]
fn test_toml_file() {
    let file = write_config(
        ".toml",
        "purge_frequency = 1\npurge_scale = 10\nstack_size = \"0x8000\"\nsession_cookie = \"sid\"\n",
    );
    let config = EngineConfig::from_file(file.path()).unwrap();
    assert_eq!(config.purge_frequency, 1);
    assert_eq!(config.purge_scale, 10);
    assert_eq!(config.stack_size, 0x8000);
    assert_eq!(config.session_cookie, "sid");
    assert_eq!(config.continuation_duration_ms, 1_200_000);
}

#[test]
fn test_zero_reaper_interval_disables_reaper() {
    let file = write_config(".yml", "reaper_interval_ms: 0\n");
    let config = EngineConfig::from_file(file.path()).unwrap();
    assert_eq!(config.reaper_interval_ms, Some(0));
    assert!(config.reaper_interval().is_none());
}

#[test]
fn test_missing_file_names_path() {
    let err = EngineConfig::from_file("/definitely/not/here.yaml").unwrap_err();
    assert!(err.to_string().contains("/definitely/not/here.yaml"));
}

#[test]
fn test_invalid_contents_are_rejected() {
    let file = write_config(".yaml", "stack_size: huge\n");
    let err = EngineConfig::from_file(file.path()).unwrap_err();
    assert!(format!("{err:#}").contains("Failed to parse YAML config"));

    let file = write_config(".toml", "purge_scale = [1, 2]\n");
    assert!(EngineConfig::from_file(file.path()).is_err());
}

#[test]
fn test_env_overrides() {
    // Only this test touches the process environment
    std::env::set_var("BRRTE_CONTINUATION_DURATION_MS", "1500");
    std::env::set_var("BRRTE_STACK_SIZE", "0x10000");
    std::env::set_var("BRRTE_CONTINUATION_PARAM", "resume");
    std::env::set_var("BRRTE_PURGE_SCALE", "not a number");

    let config = EngineConfig::from_env();

    std::env::remove_var("BRRTE_CONTINUATION_DURATION_MS");
    std::env::remove_var("BRRTE_STACK_SIZE");
    std::env::remove_var("BRRTE_CONTINUATION_PARAM");
    std::env::remove_var("BRRTE_PURGE_SCALE");

    assert_eq!(config.continuation_duration_ms, 1500);
    assert_eq!(config.stack_size, 0x10000);
    assert_eq!(config.continuation_param, "resume");
    assert_eq!(config.purge_scale, 1000, "unparsable values fall back to defaults");
}
