//! Core error types

use thiserror::Error;

use crate::crypto::CryptoError;

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors surfaced by the core. The HTTP layer translates these to status
/// codes exactly once; nothing below it inspects status codes.
#[derive(Debug, Error)]
pub enum CoreError {
	/// The caller is anonymous but the operation requires a user
	#[error("Authentication required")]
	AuthRequired,

	/// The caller is authenticated but not permitted. The message never
	/// reveals whether the underlying resource exists.
	#[error("Access denied")]
	Forbidden,

	/// Resource absent, expired, or deliberately indistinguishable from absent
	#[error("{0} not found")]
	NotFound(String),

	/// Malformed input (bad UUID, empty upload, bad 2FA code, ...)
	#[error("Invalid request: {0}")]
	BadRequest(String),

	/// Uniqueness violation (duplicate email, duplicate track)
	#[error("Conflict: {0}")]
	Conflict(String),

	/// Server-side integrity failure (HMAC or manifest mismatch). Detail is
	/// logged, never sent on the wire.
	#[error("Integrity verification failed")]
	Integrity,

	/// Worker-queue saturation or rate limiting
	#[error("Too many requests")]
	Throttled { retry_after_seconds: u64 },

	/// Recoverable I/O race (reaper vs read); retried once before surfacing
	#[error("Transient failure: {0}")]
	Transient(String),

	/// Invalid configuration detected at startup
	#[error("Invalid configuration: {0}")]
	InvalidConfig(String),

	#[error("Internal error: {0}")]
	Internal(String),

	#[error(transparent)]
	Crypto(#[from] CryptoError),

	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),
}

impl CoreError {
	/// Collapse crypto integrity failures into the detail-free variant so
	/// callers cannot leak HMAC internals by stringifying the error.
	pub fn sanitized(self) -> Self {
		match self {
			CoreError::Crypto(CryptoError::Integrity) => CoreError::Integrity,
			other => other,
		}
	}
}
