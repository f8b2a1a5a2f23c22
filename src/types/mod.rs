//! Core value types: validated identifiers and tokens

pub mod identifiers;
pub mod token;

pub use identifiers::{OFFLINE_ACCESS, Scope, TenantId};
pub use token::{EXPIRY_SKEW_SECS, Token};
