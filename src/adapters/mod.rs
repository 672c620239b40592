//! External-system adapters.
//!
//! Each adapter exposes a narrow async trait that the tool layer depends on,
//! plus one concrete client speaking the external system's protocol:
//! - `n8n`: workflow automation REST API
//! - `gemini`: image generation via `generateContent`
//! - `obsidian`: vault access via the Local REST API plugin
//! - `postgres`: SQL over pooled `sqlx` connections

pub mod gemini;
pub mod http;
pub mod n8n;
pub mod obsidian;
pub mod postgres;

#[cfg(test)]
mod obsidian_test;
