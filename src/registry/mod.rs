//! Registry naming
//!
//! Identifies the registry a transport authenticates against, and builds the
//! token scopes requested for its repositories.

pub mod name;

pub use name::{DEFAULT_REGISTRY, Registry, Repository, Scheme};
