//! Login session registry
//!
//! Access tokens embed a login session id; the registry is what makes
//! revocation effective for otherwise-valid JWTs. In-memory by design —
//! restart logs everyone out, which is the safe direction to fail.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use tokio::sync::RwLock;

use crate::crypto::sizes::SESSION_ID_SIZE;

/// One authenticated login
#[derive(Debug, Clone)]
pub struct LoginSession {
	pub session_id: String,
	pub user_id: String,
	pub created_at: DateTime<Utc>,
	pub expires_at: DateTime<Utc>,
}

/// In-memory session registry keyed by unforgeable session id
#[derive(Default)]
pub struct SessionRegistry {
	sessions: RwLock<HashMap<String, LoginSession>>,
}

impl SessionRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Create a session for `user_id` with the given TTL.
	///
	/// The session id is 32 bytes from the OS CSPRNG, hex-encoded.
	pub async fn create(&self, user_id: &str, ttl_minutes: i64) -> LoginSession {
		let mut raw = [0u8; SESSION_ID_SIZE];
		rand::rngs::OsRng.fill_bytes(&mut raw);

		let now = Utc::now();
		let session = LoginSession {
			session_id: hex::encode(raw),
			user_id: user_id.to_string(),
			created_at: now,
			expires_at: now + Duration::minutes(ttl_minutes),
		};

		self.sessions
			.write()
			.await
			.insert(session.session_id.clone(), session.clone());

		tracing::debug!(user_id = %user_id, "Created login session");
		session
	}

	/// Whether the session exists and has not expired. Expired entries are
	/// purged as a side effect of the lookup.
	pub async fn is_active(&self, session_id: &str) -> bool {
		let now = Utc::now();
		let mut sessions = self.sessions.write().await;
		sessions.retain(|_, session| session.expires_at > now);
		sessions.contains_key(session_id)
	}

	/// Revoke every session belonging to `user_id`, returning the count.
	pub async fn revoke_user(&self, user_id: &str) -> usize {
		let mut sessions = self.sessions.write().await;
		let before = sessions.len();
		sessions.retain(|_, session| session.user_id != user_id);
		let revoked = before - sessions.len();

		if revoked > 0 {
			tracing::info!(user_id = %user_id, revoked, "Revoked login sessions");
		}
		revoked
	}

	/// Drop expired sessions, returning how many were removed.
	pub async fn sweep(&self) -> usize {
		let now = Utc::now();
		let mut sessions = self.sessions.write().await;
		let before = sessions.len();
		sessions.retain(|_, session| session.expires_at > now);
		before - sessions.len()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn create_and_check() {
		let registry = SessionRegistry::new();
		let session = registry.create("user-1", 30).await;

		assert_eq!(session.session_id.len(), SESSION_ID_SIZE * 2);
		assert!(registry.is_active(&session.session_id).await);
		assert!(!registry.is_active("unknown").await);
	}

	#[tokio::test]
	async fn revoke_user_removes_all_their_sessions() {
		let registry = SessionRegistry::new();
		let a = registry.create("user-1", 30).await;
		let b = registry.create("user-1", 30).await;
		let other = registry.create("user-2", 30).await;

		assert_eq!(registry.revoke_user("user-1").await, 2);
		assert!(!registry.is_active(&a.session_id).await);
		assert!(!registry.is_active(&b.session_id).await);
		assert!(registry.is_active(&other.session_id).await);
	}

	#[tokio::test]
	async fn session_ids_are_unique() {
		let registry = SessionRegistry::new();
		let a = registry.create("user-1", 30).await;
		let b = registry.create("user-1", 30).await;
		assert_ne!(a.session_id, b.session_id);
	}
}
