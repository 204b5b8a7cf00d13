//! Infrastructure layer for hostdesk.
//!
//! Contains implementations of the ports defined in `hostdesk-core`:
//! SQLite storage for sessions, messages, and the portal user directory,
//! plus the TOML configuration loader.

pub mod config;
pub mod sqlite;
