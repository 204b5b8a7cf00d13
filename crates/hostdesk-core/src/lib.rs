//! Business logic and port definitions for the hostdesk chat service.
//!
//! This crate defines the "ports" (repository and identity traits) that the
//! infrastructure layer implements, plus the in-memory chat machinery:
//! connection registry, session lifecycle manager, message router, typing
//! presence tracker, and admin assignment policy. It depends only on
//! `hostdesk-types` -- never on `hostdesk-infra` or any database/IO crate.

pub mod chat;
pub mod event;
pub mod identity;
