//! SQLite storage adapters.

pub mod chat;
pub mod identity;
pub mod pool;
