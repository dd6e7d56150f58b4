//! Configuration loading tests: file formats, layering and environment overrides.

use std::io::Write;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serial_test::serial;
use tempfile::NamedTempFile;

use herd::config::Config;
use herd::inventory::SortKey;
use herd::logging::LogFormat;

const ENV_VARS: &[&str] = &[
    "HERD_PARALLEL",
    "HERD_SPLAY",
    "HERD_TIMEOUT",
    "HERD_HOST_TIMEOUT",
    "HERD_CONNECT_TIMEOUT",
    "HERD_SORT",
    "NO_COLOR",
];

fn clear_env() {
    for var in ENV_VARS {
        std::env::remove_var(var);
    }
}

fn config_file(suffix: &str, content: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
#[serial]
fn test_load_toml_file() {
    clear_env();
    let file = config_file(
        ".toml",
        r#"
        [runner]
        parallel = 10
        splay = "2s"
        host_timeout = "45s"
        sort = ["exitstatus", "name"]

        [output]
        timestamp = true

        [logging]
        format = "json"
        "#,
    );

    let config = Config::load(Some(file.path())).unwrap();
    assert_eq!(config.runner.parallel, 10);
    assert_eq!(config.runner.splay, Duration::from_secs(2));
    assert_eq!(config.runner.host_timeout, Duration::from_secs(45));
    assert_eq!(config.runner.timeout, Duration::from_secs(60));
    assert_eq!(config.runner.sort, vec![SortKey::ExitStatus, SortKey::Name]);
    assert!(config.output.timestamp);
    assert!(config.output.color);
    assert_eq!(config.logging.format, LogFormat::Json);
}

#[test]
#[serial]
fn test_load_yaml_and_json_files() {
    clear_env();
    let yaml = config_file(".yaml", "runner:\n  parallel: 3\n  timeout: 5m\n");
    let config = Config::load(Some(yaml.path())).unwrap();
    assert_eq!(config.runner.parallel, 3);
    assert_eq!(config.runner.timeout, Duration::from_secs(300));

    let json = config_file(".json", r#"{"runner": {"drain_grace": "250ms"}}"#);
    let config = Config::load(Some(json.path())).unwrap();
    assert_eq!(config.runner.drain_grace, Duration::from_millis(250));
    assert_eq!(config.runner.parallel, 0);
}

#[test]
#[serial]
fn test_env_overrides_file() {
    clear_env();
    let file = config_file(".toml", "[runner]\nparallel = 10\ntimeout = \"30s\"\n");
    std::env::set_var("HERD_PARALLEL", "4");
    std::env::set_var("HERD_HOST_TIMEOUT", "1500ms");
    std::env::set_var("HERD_SORT", "stderr, name");
    std::env::set_var("NO_COLOR", "1");

    let config = Config::load(Some(file.path()));
    clear_env();
    let config = config.unwrap();

    assert_eq!(config.runner.parallel, 4);
    assert_eq!(config.runner.timeout, Duration::from_secs(30));
    assert_eq!(config.runner.host_timeout, Duration::from_millis(1500));
    assert_eq!(config.runner.sort, vec![SortKey::Stderr, SortKey::Name]);
    assert!(!config.output.color);
}

#[test]
#[serial]
fn test_invalid_env_value_is_rejected() {
    clear_env();
    std::env::set_var("HERD_TIMEOUT", "eventually");
    let result = Config::load(None);
    clear_env();

    let err = result.unwrap_err();
    assert!(err.is_precondition());
    assert!(err.to_string().contains("HERD_TIMEOUT"));
}

#[test]
#[serial]
fn test_missing_explicit_file_is_an_error() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.toml");
    assert!(Config::load(Some(missing.as_path())).is_err());
}

#[test]
fn test_malformed_file_reports_path() {
    let file = config_file(".toml", "[runner\nparallel = ");
    let err = Config::from_file(file.path()).unwrap_err();
    assert!(err.to_string().contains(&file.path().display().to_string()));
}

#[test]
fn test_unknown_duration_in_file_is_rejected() {
    let file = config_file(".toml", "[runner]\ntimeout = \"whenever\"\n");
    assert!(Config::from_file(file.path()).is_err());
}

#[cfg(feature = "local")]
#[test]
#[serial]
fn test_cli_rejects_invalid_env_instead_of_dropping_file_settings() {
    use clap::Parser;
    use herd::cli::Cli;

    clear_env();
    let file = config_file(".toml", "[runner]\nhost_timeout = \"45s\"\n");
    let path = file.path().to_str().unwrap().to_string();
    let cli = Cli::try_parse_from(["herd", "-c", path.as_str(), "hosts", "localhost"]).unwrap();

    std::env::set_var("HERD_PARALLEL", "abc");
    let result = cli.load_config();
    clear_env();

    let err = result.unwrap_err();
    assert!(err.is_precondition());
    assert!(err.to_string().contains("HERD_PARALLEL"));
}

#[cfg(feature = "local")]
#[test]
#[serial]
fn test_cli_keeps_env_overrides_without_explicit_file() {
    use clap::Parser;
    use herd::cli::Cli;

    clear_env();
    let cli = Cli::try_parse_from(["herd", "hosts", "localhost"]).unwrap();
    std::env::set_var("HERD_SPLAY", "750ms");
    let result = cli.load_config();
    clear_env();

    assert_eq!(result.unwrap().runner.splay, Duration::from_millis(750));
}
