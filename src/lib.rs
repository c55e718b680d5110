//! Registry Bearer Transport Library
//!
//! Authenticating HTTP transports for Docker/OCI registry clients: a preflight
//! ping discovers how the registry wants to be authenticated, and the resulting
//! transport attaches Basic credentials or exchanges them for scoped bearer tokens.

pub mod auth;
pub mod config;
pub mod error;
pub mod logging;
pub mod registry;
pub mod transport;

pub use auth::{AuthConfig, Authenticator};
pub use config::Config;
pub use error::{Result, TransportError};
pub use registry::{Registry, Repository, Scheme};
pub use transport::{Transport, new_transport};
