//! Shared infrastructure for the circa services
//!
//! This crate provides shared infrastructure used by the services: PostgreSQL
//! connectivity, the ephemeral key-value store used for sessions and nonces,
//! and the infrastructure error types.

pub mod cache;
pub mod database;
pub mod error;

pub use cache::{EphemeralStore, MemoryCache, RedisConfig, RedisPool};
pub use error::{CacheError, CacheResult, DatabaseError, DatabaseResult};
