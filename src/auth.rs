//! Scope sets and cached access tokens.

pub mod access;
pub mod scope;

pub use access::*;
pub use scope::*;
