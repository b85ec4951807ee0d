//! HTTP middleware
//!
//! - `CurrentActor` extractor for handlers needing the calling actor
//! - Access pipeline middleware enforcing route requirements in order

pub mod access;

pub use access::{require_access, AccessGuard, AccessRequirement, CurrentActor, DenialReason};
