//! Domain models for Capgate

pub mod actor;
pub mod capability;
pub mod grant;

pub use actor::*;
pub use capability::*;
pub use grant::*;
