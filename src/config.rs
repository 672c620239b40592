//! Configuration resolution.
//!
//! Every server resolves its configuration exactly once at startup and
//! passes it by value into its adapter. `from_env` reads the process
//! environment; `from_lookup` takes any key lookup so tests can supply a map
//! instead of mutating global state.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use reqwest::Url;

use crate::error::ConfigError;

pub const N8N_API_URL: &str = "N8N_API_URL";
pub const N8N_API_KEY: &str = "N8N_API_KEY";
pub const N8N_TIMEOUT_SECS: &str = "N8N_TIMEOUT_SECS";

pub const GEMINI_API_KEY: &str = "GEMINI_API_KEY";
pub const GEMINI_IMAGE_MODEL: &str = "GEMINI_IMAGE_MODEL";
pub const GEMINI_API_URL: &str = "GEMINI_API_URL";
pub const GEMINI_OUTPUT_DIR: &str = "GEMINI_OUTPUT_DIR";
pub const GEMINI_TIMEOUT_SECS: &str = "GEMINI_TIMEOUT_SECS";

pub const OBSIDIAN_API_KEY: &str = "OBSIDIAN_API_KEY";
pub const OBSIDIAN_API_URL: &str = "OBSIDIAN_API_URL";
pub const OBSIDIAN_VERIFY_TLS: &str = "OBSIDIAN_VERIFY_TLS";
pub const OBSIDIAN_TIMEOUT_SECS: &str = "OBSIDIAN_TIMEOUT_SECS";

pub const POSTGRES_CONNECTIONS: &str = "POSTGRES_CONNECTIONS";
pub const POSTGRES_DEFAULT_CONNECTION: &str = "POSTGRES_DEFAULT_CONNECTION";
pub const DATABASE_URL: &str = "DATABASE_URL";
pub const POSTGRES_MAX_CONNECTIONS: &str = "POSTGRES_MAX_CONNECTIONS";
pub const POSTGRES_ACQUIRE_TIMEOUT_SECS: &str = "POSTGRES_ACQUIRE_TIMEOUT_SECS";
pub const POSTGRES_STATEMENT_TIMEOUT_MS: &str = "POSTGRES_STATEMENT_TIMEOUT_MS";
pub const POSTGRES_POOL_CACHE_CAPACITY: &str = "POSTGRES_POOL_CACHE_CAPACITY";
pub const POSTGRES_POOL_IDLE_TTL_SECS: &str = "POSTGRES_POOL_IDLE_TTL_SECS";

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash-preview-image-generation";
pub const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_OBSIDIAN_URL: &str = "https://127.0.0.1:27124";

/// Name under which a lone `DATABASE_URL` is registered.
pub const DEFAULT_CONNECTION_NAME: &str = "default";

/// Source of configuration values.
///
/// Blanket-implemented for closures so `|key| map.get(key).cloned()` works.
pub trait Lookup {
    fn get(&self, key: &str) -> Option<String>;
}

impl<F> Lookup for F
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        self(key)
    }
}

/// Reads the real process environment.
pub fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn optional(lookup: &impl Lookup, name: &str) -> Option<String> {
    lookup
        .get(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(lookup: &impl Lookup, name: &str) -> Result<String, ConfigError> {
    optional(lookup, name).ok_or_else(|| ConfigError::MissingVar {
        name: name.to_string(),
    })
}

fn invalid(name: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidVar {
        name: name.to_string(),
        message: message.into(),
    }
}

fn parsed<T: FromStr>(lookup: &impl Lookup, name: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    optional(lookup, name)
        .map(|raw| raw.parse::<T>().map_err(|e| invalid(name, e.to_string())))
        .transpose()
}

fn seconds(lookup: &impl Lookup, name: &str, default: u64) -> Result<Duration, ConfigError> {
    Ok(Duration::from_secs(parsed(lookup, name)?.unwrap_or(default)))
}

fn flag(lookup: &impl Lookup, name: &str, default: bool) -> Result<bool, ConfigError> {
    match optional(lookup, name).map(|v| v.to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
        Some(v) => Err(invalid(name, format!("expected a boolean, got '{v}'"))),
    }
}

/// Validates an http(s) base URL and strips any trailing slash.
fn base_url(name: &str, raw: String) -> Result<String, ConfigError> {
    let url = Url::parse(&raw).map_err(|e| invalid(name, e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(name, "expected an http:// or https:// URL"));
    }
    Ok(raw.trim_end_matches('/').to_string())
}

/// n8n workflow API configuration.
#[derive(Debug, Clone)]
pub struct N8nConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
}

impl N8nConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Lookup) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: base_url(N8N_API_URL, required(&lookup, N8N_API_URL)?)?,
            api_key: required(&lookup, N8N_API_KEY)?,
            timeout: seconds(&lookup, N8N_TIMEOUT_SECS, 30)?,
        })
    }
}

/// Gemini image generation configuration.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub output_dir: PathBuf,
    pub timeout: Duration,
}

impl GeminiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Lookup) -> Result<Self, ConfigError> {
        let base = optional(&lookup, GEMINI_API_URL).unwrap_or_else(|| DEFAULT_GEMINI_URL.into());
        Ok(Self {
            api_key: required(&lookup, GEMINI_API_KEY)?,
            model: optional(&lookup, GEMINI_IMAGE_MODEL)
                .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            base_url: base_url(GEMINI_API_URL, base)?,
            output_dir: optional(&lookup, GEMINI_OUTPUT_DIR)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            timeout: seconds(&lookup, GEMINI_TIMEOUT_SECS, 120)?,
        })
    }
}

/// Obsidian Local REST API configuration.
#[derive(Debug, Clone)]
pub struct ObsidianConfig {
    pub base_url: String,
    pub api_key: String,
    /// The plugin serves a self-signed certificate, so verification is off
    /// unless explicitly requested.
    pub verify_tls: bool,
    pub timeout: Duration,
}

impl ObsidianConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Lookup) -> Result<Self, ConfigError> {
        let base =
            optional(&lookup, OBSIDIAN_API_URL).unwrap_or_else(|| DEFAULT_OBSIDIAN_URL.into());
        Ok(Self {
            base_url: base_url(OBSIDIAN_API_URL, base)?,
            api_key: required(&lookup, OBSIDIAN_API_KEY)?,
            verify_tls: flag(&lookup, OBSIDIAN_VERIFY_TLS, false)?,
            timeout: seconds(&lookup, OBSIDIAN_TIMEOUT_SECS, 30)?,
        })
    }
}

/// Pool sizing and pool-cache eviction settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub statement_timeout: Option<Duration>,
    /// Maximum number of cached pools; `None` keeps every pool.
    pub cache_capacity: Option<usize>,
    /// Pools unused for this long are evicted on the next lookup.
    pub idle_ttl: Option<Duration>,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout: Duration::from_secs(30),
            statement_timeout: None,
            cache_capacity: None,
            idle_ttl: None,
        }
    }
}

/// PostgreSQL configuration: named connection strings plus a default.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub connections: BTreeMap<String, String>,
    pub default_connection: String,
    pub pool: PoolSettings,
}

impl PostgresConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Lookup) -> Result<Self, ConfigError> {
        let connections = match optional(&lookup, POSTGRES_CONNECTIONS) {
            Some(raw) => serde_json::from_str::<BTreeMap<String, String>>(&raw)
                .map_err(|e| invalid(POSTGRES_CONNECTIONS, e.to_string()))?,
            None => match optional(&lookup, DATABASE_URL) {
                Some(url) => BTreeMap::from([(DEFAULT_CONNECTION_NAME.to_string(), url)]),
                None => {
                    return Err(ConfigError::MissingVar {
                        name: POSTGRES_CONNECTIONS.to_string(),
                    });
                }
            },
        };
        if connections.is_empty() {
            return Err(invalid(POSTGRES_CONNECTIONS, "at least one connection is required"));
        }
        if let Some((name, _)) = connections.iter().find(|(_, url)| !is_postgres_url(url)) {
            return Err(invalid(
                POSTGRES_CONNECTIONS,
                format!("connection '{name}' is not a postgres:// URL"),
            ));
        }

        let default_connection = match optional(&lookup, POSTGRES_DEFAULT_CONNECTION) {
            Some(name) if connections.contains_key(&name) => name,
            Some(name) => {
                return Err(invalid(
                    POSTGRES_DEFAULT_CONNECTION,
                    format!("'{name}' is not a key of {POSTGRES_CONNECTIONS}"),
                ));
            }
            None if connections.contains_key(DEFAULT_CONNECTION_NAME) => {
                DEFAULT_CONNECTION_NAME.to_string()
            }
            None if connections.len() == 1 => connections.keys().next().cloned().unwrap_or_default(),
            None => return Err(ConfigError::MissingVar {
                name: POSTGRES_DEFAULT_CONNECTION.to_string(),
            }),
        };

        let defaults = PoolSettings::default();
        let pool = PoolSettings {
            max_connections: parsed(&lookup, POSTGRES_MAX_CONNECTIONS)?
                .unwrap_or(defaults.max_connections),
            acquire_timeout: seconds(&lookup, POSTGRES_ACQUIRE_TIMEOUT_SECS, 30)?,
            statement_timeout: parsed::<u64>(&lookup, POSTGRES_STATEMENT_TIMEOUT_MS)?
                .map(Duration::from_millis),
            cache_capacity: parsed::<usize>(&lookup, POSTGRES_POOL_CACHE_CAPACITY)?
                .filter(|c| *c > 0),
            idle_ttl: parsed::<u64>(&lookup, POSTGRES_POOL_IDLE_TTL_SECS)?
                .map(Duration::from_secs),
        };

        Ok(Self {
            connections,
            default_connection,
            pool,
        })
    }
}

/// True for `postgres://` and `postgresql://` URLs.
pub fn is_postgres_url(raw: &str) -> bool {
    let raw = raw.trim();
    raw.starts_with("postgres://") || raw.starts_with("postgresql://")
}
