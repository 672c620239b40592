pub mod adapters;
pub mod config;
pub mod error;
pub mod mcp;

#[cfg(test)]
mod config_test;
