//! Capgate - Multi-tenant capability authorization engine
//!
//! This crate decides which capabilities (installable functional units) a
//! calling actor may reach and which actions within them the actor may
//! perform, backed by a config-discovered capability registry, per-tenant
//! access grants, and per-member action grants.

pub mod api;
pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod middleware;
pub mod migration;
pub mod policy;
pub mod registry;
pub mod repository;
pub mod server;
pub mod service;

// Re-export commonly used types
pub use config::Config;
pub use error::{AppError, Result};
