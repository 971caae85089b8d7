//! Authorization and session primitives
//!
//! Everything that decides *who may touch which track*: the centralized
//! authorization service, the in-memory grant table it mints into, the
//! login session registry, the JWT token service, and the IP binding
//! helpers shared by all of them.

pub mod grants;
pub mod ip;
pub mod service;
pub mod sessions;
pub mod tokens;
pub mod totp;

pub use grants::{AccessGrant, GrantTable, Operation};
pub use service::AuthorizationService;
pub use sessions::SessionRegistry;
pub use tokens::{TokenClaims, TokenPurpose, TokenService};
