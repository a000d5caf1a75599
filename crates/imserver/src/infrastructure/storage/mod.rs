//! Storage infrastructure: configuration file persistence.
//!
//! The `config` sub-module reads the TOML configuration file, supplies
//! defaults when it does not exist yet, and can write it back.

pub mod config;
