//! Configuration loading and validation.

use std::io::Write;

use ripple::config::Config;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn partial_file_fills_in_defaults() {
    let file = write_config(
        r#"
[gateway]
bind_addr = "0.0.0.0:9999"

[filter]
frequency_threshold = 5
"#,
    );

    let config = Config::load(file.path()).unwrap();

    assert_eq!(config.gateway.bind_addr, "0.0.0.0:9999");
    assert_eq!(config.filter.frequency_threshold, 5);
    // Untouched sections keep their defaults.
    assert_eq!(config.gateway.rate_limit_max_commands, 60);
    assert_eq!(config.engine.trending_size, 10);
    assert_eq!(config.dedup.comment_ttl_secs, 300);
}

#[test]
fn invalid_values_are_rejected() {
    let file = write_config(
        r#"
[gateway]
rate_limit_max_commands = 0
"#,
    );
    assert!(Config::load(file.path()).is_err());

    let file = write_config(
        r#"
[engine]
max_recommendations = 0
"#,
    );
    assert!(Config::load(file.path()).is_err());
}

#[test]
fn malformed_toml_is_a_parse_error() {
    let file = write_config("gateway = [not toml");
    assert!(Config::load(file.path()).is_err());
}

#[test]
fn missing_file_is_an_error() {
    assert!(Config::load("/nonexistent/ripple.toml").is_err());
}
