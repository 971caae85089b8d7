mod argon2_auth;
mod signal;

pub use argon2_auth::{hash_password, verify_password};
pub use signal::shutdown_signal_with_cleanup;
