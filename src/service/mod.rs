//! Business logic services

pub mod grants;

pub use grants::GrantService;
