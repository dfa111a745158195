//! Configuration module for convertd
//!
//! Handles loading daemon settings and conversion profiles from TOML files,
//! with environment variable overrides.

pub mod config;
pub mod profile;

pub use config::*;
pub use profile::*;
