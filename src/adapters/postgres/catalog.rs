//! Named connection strings.
//!
//! Seeded from configuration. Additions and removals made through the tools
//! last for the lifetime of the process and are never written back.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use reqwest::Url;
use serde::Serialize;
use tracing::info;

use super::pool::normalize_key;
use crate::config::is_postgres_url;
use crate::error::{ToolError, ToolResult};

/// How long catalog changes survive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Persistence {
    ProcessLifetime,
}

/// Listing entry. The connection string has its password masked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
    pub name: String,
    pub connection_string: String,
    pub is_default: bool,
    pub is_active: bool,
}

/// A connection resolved from a name or a raw URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConnection {
    /// Catalog name, or the masked URL for ad-hoc connections.
    pub label: String,
    pub url: String,
}

/// Masks the password component of a connection URL.
pub fn mask_password(raw: &str) -> String {
    match Url::parse(raw.trim()) {
        Ok(mut url) if url.password().is_some() => {
            let _ = url.set_password(Some("****"));
            url.to_string()
        }
        Ok(url) => url.to_string(),
        Err(_) => "<invalid connection string>".to_string(),
    }
}

struct State {
    connections: BTreeMap<String, String>,
    default: String,
}

pub struct ConnectionCatalog {
    state: RwLock<State>,
}

impl ConnectionCatalog {
    pub fn new(connections: BTreeMap<String, String>, default: String) -> Self {
        Self {
            state: RwLock::new(State {
                connections,
                default,
            }),
        }
    }

    pub fn persistence(&self) -> Persistence {
        Persistence::ProcessLifetime
    }

    pub fn default_name(&self) -> String {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .default
            .clone()
    }

    /// Resolves a catalog name or a raw `postgres://` URL; `None` means the default.
    pub fn resolve(&self, connection: Option<&str>) -> ToolResult<ResolvedConnection> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let requested = connection
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(state.default.as_str());

        if let Some(url) = state.connections.get(requested) {
            return Ok(ResolvedConnection {
                label: requested.to_string(),
                url: url.clone(),
            });
        }
        if is_postgres_url(requested) {
            validate_url(requested)?;
            return Ok(ResolvedConnection {
                label: mask_password(requested),
                url: requested.to_string(),
            });
        }
        Err(ToolError::not_found(format!(
            "unknown connection '{requested}'"
        )))
    }

    /// Adds or replaces a named connection.
    pub fn add(&self, name: &str, url: &str, make_default: bool) -> ToolResult<ConnectionInfo> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ToolError::validation("connection name must not be empty"));
        }
        if is_postgres_url(name) {
            return Err(ToolError::validation(
                "connection name must not be a connection string",
            ));
        }
        validate_url(url)?;

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let replaced = state
            .connections
            .insert(name.to_string(), url.trim().to_string())
            .is_some();
        if make_default {
            state.default = name.to_string();
        }
        info!(name, replaced, make_default, "connection added");
        Ok(ConnectionInfo {
            name: name.to_string(),
            connection_string: mask_password(url),
            is_default: state.default == name,
            is_active: false,
        })
    }

    /// Removes a named connection, returning its URL. The default cannot be removed.
    pub fn remove(&self, name: &str) -> ToolResult<String> {
        let name = name.trim();
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.default == name {
            return Err(ToolError::validation(format!(
                "'{name}' is the default connection and cannot be removed"
            )));
        }
        let url = state
            .connections
            .remove(name)
            .ok_or_else(|| ToolError::not_found(format!("unknown connection '{name}'")))?;
        info!(name, "connection removed");
        Ok(url)
    }

    /// True when some named connection still points at `url`.
    pub fn references(&self, url: &str) -> bool {
        let key = normalize_key(url);
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .connections
            .values()
            .any(|u| normalize_key(u) == key)
    }

    /// Lists every named connection; `active` marks the one last used.
    pub fn list(&self, active: Option<&str>) -> Vec<ConnectionInfo> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state
            .connections
            .iter()
            .map(|(name, url)| ConnectionInfo {
                name: name.clone(),
                connection_string: mask_password(url),
                is_default: *name == state.default,
                is_active: active == Some(name.as_str()),
            })
            .collect()
    }
}

fn validate_url(raw: &str) -> ToolResult<()> {
    if !is_postgres_url(raw) {
        return Err(ToolError::validation(
            "connection string must start with postgres:// or postgresql://",
        ));
    }
    Url::parse(raw.trim())
        .map(|_| ())
        .map_err(|e| ToolError::validation(format!("invalid connection string: {e}")))
}
