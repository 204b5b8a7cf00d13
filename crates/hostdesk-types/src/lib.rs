//! Shared domain types for the hostdesk support chat service.
//!
//! This crate contains the types used across the platform: chat sessions
//! and messages, portal identities, the wire-level event envelopes, and
//! the error taxonomy.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod chat;
pub mod config;
pub mod error;
pub mod event;
pub mod identity;
