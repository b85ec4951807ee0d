//! Authorization policy: the permission resolver

pub mod resolver;

pub use resolver::PermissionResolver;
