//! HTTP error surface
//!
//! Domain errors are translated to status codes exactly once, here. Every
//! error renders as problem+json `{kind, message}`; denial messages never
//! reveal whether the underlying resource exists, and integrity failures
//! never expose detail.

use axum::{
	http::{header, StatusCode},
	response::{IntoResponse, Response},
	Json,
};
use serde::Serialize;
use thiserror::Error;

use sectify_core::CoreError;

/// Result type for API handlers
pub type APIResult<T> = Result<T, APIError>;

/// Errors surfaced over HTTP
#[derive(Debug, Error)]
pub enum APIError {
	#[error("Authentication required")]
	AuthRequired,

	#[error("Access denied")]
	Forbidden,

	#[error("{0} not found")]
	NotFound(String),

	#[error("{0}")]
	BadRequest(String),

	#[error("{0}")]
	Conflict(String),

	/// Server-side HMAC or manifest mismatch; detail stays in the logs
	#[error("Integrity verification failed")]
	Integrity,

	/// Rate limit tripped (429)
	#[error("Too many requests")]
	RateLimited { retry_after_seconds: u64 },

	/// Worker queue saturated (503)
	#[error("Service temporarily unavailable")]
	Saturated { retry_after_seconds: u64 },

	/// Recoverable I/O race that exhausted its retry
	#[error("Service temporarily unavailable")]
	Transient,

	#[error("Internal server error")]
	Internal(String),
}

impl APIError {
	fn status(&self) -> StatusCode {
		match self {
			APIError::AuthRequired => StatusCode::UNAUTHORIZED,
			APIError::Forbidden => StatusCode::FORBIDDEN,
			APIError::NotFound(_) => StatusCode::NOT_FOUND,
			APIError::BadRequest(_) => StatusCode::BAD_REQUEST,
			APIError::Conflict(_) => StatusCode::CONFLICT,
			APIError::Integrity | APIError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
			APIError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
			APIError::Saturated { .. } | APIError::Transient => {
				StatusCode::SERVICE_UNAVAILABLE
			}
		}
	}

	fn kind(&self) -> &'static str {
		match self {
			APIError::AuthRequired => "AuthRequired",
			APIError::Forbidden => "Forbidden",
			APIError::NotFound(_) => "NotFound",
			APIError::BadRequest(_) => "Invalid",
			APIError::Conflict(_) => "Conflict",
			APIError::Integrity => "IntegrityError",
			APIError::RateLimited { .. } | APIError::Saturated { .. } => "Throttled",
			APIError::Transient => "Transient",
			APIError::Internal(_) => "Internal",
		}
	}

	fn retry_after(&self) -> Option<u64> {
		match self {
			APIError::RateLimited {
				retry_after_seconds,
			}
			| APIError::Saturated {
				retry_after_seconds,
			} => Some(*retry_after_seconds),
			_ => None,
		}
	}
}

#[derive(Serialize)]
struct ProblemBody {
	kind: &'static str,
	message: String,
}

impl IntoResponse for APIError {
	fn into_response(self) -> Response {
		let status = self.status();

		// Internal detail is for the logs, not the wire
		let message = match &self {
			APIError::Internal(detail) => {
				tracing::error!(%detail, "Internal server error");
				"Internal server error".to_string()
			}
			other => other.to_string(),
		};

		let body = Json(ProblemBody {
			kind: self.kind(),
			message,
		});

		match self.retry_after() {
			Some(seconds) => (
				status,
				[
					(header::RETRY_AFTER, seconds.to_string()),
					(
						header::CONTENT_TYPE,
						"application/problem+json".to_string(),
					),
				],
				body,
			)
				.into_response(),
			None => (
				status,
				[(
					header::CONTENT_TYPE,
					"application/problem+json".to_string(),
				)],
				body,
			)
				.into_response(),
		}
	}
}

impl From<CoreError> for APIError {
	fn from(error: CoreError) -> Self {
		match error.sanitized() {
			CoreError::AuthRequired => APIError::AuthRequired,
			CoreError::Forbidden => APIError::Forbidden,
			CoreError::NotFound(resource) => APIError::NotFound(resource),
			CoreError::BadRequest(message) => APIError::BadRequest(message),
			CoreError::Conflict(message) => APIError::Conflict(message),
			CoreError::Integrity | CoreError::Crypto(_) => APIError::Integrity,
			CoreError::Throttled {
				retry_after_seconds,
			} => APIError::Saturated {
				retry_after_seconds,
			},
			CoreError::Transient(_) => APIError::Transient,
			CoreError::InvalidConfig(message) => APIError::Internal(message),
			CoreError::Internal(message) => APIError::Internal(message),
			CoreError::Io(error) => APIError::Internal(error.to_string()),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn forbidden_and_not_found_messages_carry_no_detail() {
		let forbidden = APIError::from(CoreError::Forbidden);
		assert_eq!(forbidden.to_string(), "Access denied");

		let integrity = APIError::from(CoreError::Integrity);
		assert_eq!(integrity.to_string(), "Integrity verification failed");
	}

	#[test]
	fn crypto_errors_collapse_to_integrity() {
		let error = CoreError::Crypto(sectify_core::crypto::CryptoError::Integrity);
		assert!(matches!(APIError::from(error), APIError::Integrity));
	}

	#[test]
	fn worker_saturation_maps_to_service_unavailable() {
		let error = CoreError::Throttled {
			retry_after_seconds: 2,
		};
		let api = APIError::from(error);
		assert_eq!(api.status(), StatusCode::SERVICE_UNAVAILABLE);
		assert_eq!(api.retry_after(), Some(2));
	}
}
