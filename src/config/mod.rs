//! Configuration Module
//!
//! Loads and validates engine configuration from TOML files and environment.

pub mod loader;

pub use loader::{
    EngineConfig, ConfigError, load_config, parse_config,
};
