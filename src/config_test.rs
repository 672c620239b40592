//! Tests for configuration resolution.

use std::collections::HashMap;
use std::time::Duration;

use crate::config::*;
use crate::error::ConfigError;

fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key: &str| map.get(key).cloned()
}

fn missing(name: &str) -> ConfigError {
    ConfigError::MissingVar {
        name: name.to_string(),
    }
}

#[test]
fn test_n8n_requires_url_and_key() {
    let err = N8nConfig::from_lookup(lookup(&[])).unwrap_err();
    assert_eq!(err, missing(N8N_API_URL));

    let err = N8nConfig::from_lookup(lookup(&[(N8N_API_URL, "http://localhost:5678")])).unwrap_err();
    assert_eq!(err, missing(N8N_API_KEY));
    assert!(err.to_string().contains("N8N_API_KEY"));
}

#[test]
fn test_n8n_blank_value_counts_as_missing() {
    let err = N8nConfig::from_lookup(lookup(&[
        (N8N_API_URL, "http://localhost:5678"),
        (N8N_API_KEY, "   "),
    ]))
    .unwrap_err();
    assert_eq!(err, missing(N8N_API_KEY));
}

#[test]
fn test_n8n_trims_trailing_slash_and_defaults_timeout() {
    let config = N8nConfig::from_lookup(lookup(&[
        (N8N_API_URL, "http://localhost:5678/"),
        (N8N_API_KEY, "secret"),
    ]))
    .unwrap();
    assert_eq!(config.base_url, "http://localhost:5678");
    assert_eq!(config.timeout, Duration::from_secs(30));
}

#[test]
fn test_n8n_rejects_non_http_url() {
    let err = N8nConfig::from_lookup(lookup(&[
        (N8N_API_URL, "ftp://example.com"),
        (N8N_API_KEY, "secret"),
    ]))
    .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidVar { ref name, .. } if name == N8N_API_URL));
}

#[test]
fn test_n8n_rejects_bad_timeout() {
    let err = N8nConfig::from_lookup(lookup(&[
        (N8N_API_URL, "http://localhost:5678"),
        (N8N_API_KEY, "secret"),
        (N8N_TIMEOUT_SECS, "soon"),
    ]))
    .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidVar { ref name, .. } if name == N8N_TIMEOUT_SECS));
}

#[test]
fn test_gemini_defaults() {
    let config = GeminiConfig::from_lookup(lookup(&[(GEMINI_API_KEY, "key")])).unwrap();
    assert_eq!(config.model, DEFAULT_GEMINI_MODEL);
    assert_eq!(config.base_url, DEFAULT_GEMINI_URL);
    assert_eq!(config.output_dir, std::path::PathBuf::from("."));
    assert_eq!(config.timeout, Duration::from_secs(120));
}

#[test]
fn test_gemini_requires_key() {
    let err = GeminiConfig::from_lookup(lookup(&[])).unwrap_err();
    assert_eq!(err, missing(GEMINI_API_KEY));
}

#[test]
fn test_obsidian_defaults_to_unverified_local_plugin() {
    let config = ObsidianConfig::from_lookup(lookup(&[(OBSIDIAN_API_KEY, "token")])).unwrap();
    assert_eq!(config.base_url, DEFAULT_OBSIDIAN_URL);
    assert!(!config.verify_tls);
}

#[test]
fn test_obsidian_verify_flag() {
    let config = ObsidianConfig::from_lookup(lookup(&[
        (OBSIDIAN_API_KEY, "token"),
        (OBSIDIAN_VERIFY_TLS, "TRUE"),
    ]))
    .unwrap();
    assert!(config.verify_tls);

    let err = ObsidianConfig::from_lookup(lookup(&[
        (OBSIDIAN_API_KEY, "token"),
        (OBSIDIAN_VERIFY_TLS, "maybe"),
    ]))
    .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidVar { .. }));
}

#[test]
fn test_postgres_requires_connections() {
    let err = PostgresConfig::from_lookup(lookup(&[])).unwrap_err();
    assert_eq!(err, missing(POSTGRES_CONNECTIONS));
}

#[test]
fn test_postgres_database_url_becomes_default() {
    let config =
        PostgresConfig::from_lookup(lookup(&[(DATABASE_URL, "postgres://u:p@localhost/db")]))
            .unwrap();
    assert_eq!(config.default_connection, DEFAULT_CONNECTION_NAME);
    assert_eq!(
        config.connections.get(DEFAULT_CONNECTION_NAME).unwrap(),
        "postgres://u:p@localhost/db"
    );
    assert_eq!(config.pool, PoolSettings::default());
}

#[test]
fn test_postgres_named_connections_with_explicit_default() {
    let config = PostgresConfig::from_lookup(lookup(&[
        (
            POSTGRES_CONNECTIONS,
            r#"{"main": "postgres://localhost/main", "reporting": "postgresql://localhost/rep"}"#,
        ),
        (POSTGRES_DEFAULT_CONNECTION, "reporting"),
        (POSTGRES_POOL_CACHE_CAPACITY, "4"),
        (POSTGRES_STATEMENT_TIMEOUT_MS, "2500"),
    ]))
    .unwrap();
    assert_eq!(config.connections.len(), 2);
    assert_eq!(config.default_connection, "reporting");
    assert_eq!(config.pool.cache_capacity, Some(4));
    assert_eq!(config.pool.statement_timeout, Some(Duration::from_millis(2500)));
}

#[test]
fn test_postgres_single_connection_is_implicit_default() {
    let config = PostgresConfig::from_lookup(lookup(&[(
        POSTGRES_CONNECTIONS,
        r#"{"only": "postgres://localhost/only"}"#,
    )]))
    .unwrap();
    assert_eq!(config.default_connection, "only");
}

#[test]
fn test_postgres_ambiguous_default_is_rejected() {
    let err = PostgresConfig::from_lookup(lookup(&[(
        POSTGRES_CONNECTIONS,
        r#"{"a": "postgres://localhost/a", "b": "postgres://localhost/b"}"#,
    )]))
    .unwrap_err();
    assert_eq!(err, missing(POSTGRES_DEFAULT_CONNECTION));
}

#[test]
fn test_postgres_unknown_default_is_rejected() {
    let err = PostgresConfig::from_lookup(lookup(&[
        (POSTGRES_CONNECTIONS, r#"{"a": "postgres://localhost/a"}"#),
        (POSTGRES_DEFAULT_CONNECTION, "b"),
    ]))
    .unwrap_err();
    assert!(
        matches!(err, ConfigError::InvalidVar { ref name, .. } if name == POSTGRES_DEFAULT_CONNECTION)
    );
}

#[test]
fn test_postgres_rejects_malformed_json_and_non_postgres_urls() {
    let err = PostgresConfig::from_lookup(lookup(&[(POSTGRES_CONNECTIONS, "{not json")]))
        .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidVar { .. }));

    let err = PostgresConfig::from_lookup(lookup(&[(
        POSTGRES_CONNECTIONS,
        r#"{"a": "mysql://localhost/a"}"#,
    )]))
    .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidVar { .. }));
}

#[test]
fn test_is_postgres_url() {
    assert!(is_postgres_url("postgres://localhost/db"));
    assert!(is_postgres_url("  postgresql://localhost/db"));
    assert!(!is_postgres_url("reporting"));
}
