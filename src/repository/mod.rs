//! Persistence layer: async repository traits and their MySQL implementations
//!
//! Every decision-path query is a point lookup over a unique key; nothing in
//! the check pipeline scans.

pub mod capability;
pub mod member_grant;
pub mod tenant_access;

pub use capability::{CapabilityRepository, CapabilityRepositoryImpl};
pub use member_grant::{MemberGrantRepository, MemberGrantRepositoryImpl};
pub use tenant_access::{TenantAccessRepository, TenantAccessRepositoryImpl};
