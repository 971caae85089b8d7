//! Track access grants
//!
//! A grant is the short-lived, in-memory record that an authorization
//! decision has been made for one `(track, user, operation)` at one origin
//! IP. Everything downstream — packaging, segment serving, key aliases —
//! hangs off the grant's session id rather than re-deciding access.

use std::{collections::HashMap, net::IpAddr};

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use tokio::sync::RwLock;

use crate::{auth::ip::ip_prefix_matches, crypto::sizes::SESSION_ID_SIZE};

/// Grant lifetime
pub const GRANT_TTL_MINUTES: i64 = 5;

/// Track operations subject to authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
	Read,
	Stream,
	Write,
	Delete,
}

impl Operation {
	pub fn as_str(&self) -> &'static str {
		match self {
			Operation::Read => "read",
			Operation::Stream => "stream",
			Operation::Write => "write",
			Operation::Delete => "delete",
		}
	}
}

impl std::fmt::Display for Operation {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Short-lived authorization record bound to track, user, operation, and IP
#[derive(Debug, Clone)]
pub struct AccessGrant {
	/// Unforgeable handle: 32 bytes of CSPRNG output, hex-encoded
	pub session_id: String,
	pub track_id: String,
	/// `None` for anonymous access to public tracks
	pub user_id: Option<String>,
	pub operation: Operation,
	/// IP the grant was minted for; prefix-matched on validation
	pub client_ip: Option<IpAddr>,
	pub created_at: DateTime<Utc>,
	pub expires_at: DateTime<Utc>,
}

/// In-memory grant table. Reads dominate (every segment and key request
/// validates a grant), so the map sits behind a readers/writer lock and
/// takes the write lock only to mint, purge, or revoke.
#[derive(Default)]
pub struct GrantTable {
	grants: RwLock<HashMap<String, AccessGrant>>,
}

impl GrantTable {
	pub fn new() -> Self {
		Self::default()
	}

	/// Mint a grant for a decided access request.
	pub async fn mint(
		&self,
		track_id: &str,
		user_id: Option<&str>,
		operation: Operation,
		client_ip: Option<IpAddr>,
	) -> AccessGrant {
		let mut raw = [0u8; SESSION_ID_SIZE];
		rand::rngs::OsRng.fill_bytes(&mut raw);

		let now = Utc::now();
		let grant = AccessGrant {
			session_id: hex::encode(raw),
			track_id: track_id.to_string(),
			user_id: user_id.map(str::to_string),
			operation,
			client_ip,
			created_at: now,
			expires_at: now + Duration::minutes(GRANT_TTL_MINUTES),
		};

		let mut grants = self.grants.write().await;
		grants.retain(|_, existing| existing.expires_at > now);
		grants.insert(grant.session_id.clone(), grant.clone());

		grant
	}

	/// Validate a session id presented back by a client.
	///
	/// Checks existence and expiry (expired entries are purged on every
	/// lookup), exact `(track, user, operation)` match, and — when both the
	/// grant and the caller carry an IP — the /16 prefix binding.
	pub async fn validate(
		&self,
		session_id: &str,
		track_id: &str,
		user_id: Option<&str>,
		operation: Operation,
		caller_ip: Option<IpAddr>,
	) -> Option<AccessGrant> {
		let now = Utc::now();
		let mut grants = self.grants.write().await;
		grants.retain(|_, existing| existing.expires_at > now);

		let grant = grants.get(session_id)?;

		if grant.track_id != track_id {
			tracing::warn!(session = %&session_id[..8], "Grant track mismatch");
			return None;
		}
		if grant.user_id.as_deref() != user_id {
			tracing::warn!(session = %&session_id[..8], "Grant user mismatch");
			return None;
		}
		if grant.operation != operation {
			tracing::warn!(session = %&session_id[..8], "Grant operation mismatch");
			return None;
		}
		if let (Some(minted), Some(caller)) = (grant.client_ip.as_ref(), caller_ip.as_ref()) {
			if !ip_prefix_matches(minted, caller) {
				tracing::warn!(session = %&session_id[..8], "Grant IP binding mismatch");
				return None;
			}
		}

		Some(grant.clone())
	}

	/// Validate a streaming session presented without caller identity.
	///
	/// Segment requests arrive from players that do not attach bearer
	/// tokens; the 256-bit session id is the credential. Track, operation,
	/// expiry, and IP prefix are still enforced.
	pub async fn validate_for_stream(
		&self,
		session_id: &str,
		track_id: &str,
		caller_ip: Option<IpAddr>,
	) -> Option<AccessGrant> {
		let now = Utc::now();
		let mut grants = self.grants.write().await;
		grants.retain(|_, existing| existing.expires_at > now);

		let grant = grants.get(session_id)?;

		if grant.track_id != track_id || grant.operation != Operation::Stream {
			return None;
		}
		if let (Some(minted), Some(caller)) = (grant.client_ip.as_ref(), caller_ip.as_ref()) {
			if !ip_prefix_matches(minted, caller) {
				tracing::warn!(session = %&session_id[..8], "Stream grant IP binding mismatch");
				return None;
			}
		}

		Some(grant.clone())
	}

	/// Remove grants whose expiry has passed, returning the count.
	pub async fn sweep(&self) -> usize {
		let now = Utc::now();
		let mut grants = self.grants.write().await;
		let before = grants.len();
		grants.retain(|_, existing| existing.expires_at > now);
		before - grants.len()
	}

	/// Remove every grant belonging to `user_id`, returning the count.
	pub async fn revoke_user(&self, user_id: &str) -> usize {
		let mut grants = self.grants.write().await;
		let before = grants.len();
		grants.retain(|_, existing| existing.user_id.as_deref() != Some(user_id));
		let revoked = before - grants.len();

		if revoked > 0 {
			tracing::info!(user_id = %user_id, revoked, "Revoked access grants");
		}
		revoked
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn mint_and_validate() {
		let table = GrantTable::new();
		let ip: IpAddr = "192.168.0.1".parse().unwrap();

		let grant = table
			.mint("track-1", Some("user-1"), Operation::Stream, Some(ip))
			.await;
		assert_eq!(grant.session_id.len(), SESSION_ID_SIZE * 2);

		let validated = table
			.validate(
				&grant.session_id,
				"track-1",
				Some("user-1"),
				Operation::Stream,
				Some(ip),
			)
			.await;
		assert!(validated.is_some());
	}

	#[tokio::test]
	async fn parameter_mismatches_are_rejected() {
		let table = GrantTable::new();
		let ip: IpAddr = "192.168.0.1".parse().unwrap();
		let grant = table
			.mint("track-1", Some("user-1"), Operation::Stream, Some(ip))
			.await;

		// Wrong track
		assert!(table
			.validate(&grant.session_id, "track-2", Some("user-1"), Operation::Stream, Some(ip))
			.await
			.is_none());
		// Wrong user
		assert!(table
			.validate(&grant.session_id, "track-1", Some("user-2"), Operation::Stream, Some(ip))
			.await
			.is_none());
		// Wrong operation
		assert!(table
			.validate(&grant.session_id, "track-1", Some("user-1"), Operation::Delete, Some(ip))
			.await
			.is_none());
	}

	#[tokio::test]
	async fn ip_prefix_binding() {
		let table = GrantTable::new();
		let minted: IpAddr = "192.168.0.1".parse().unwrap();
		let roamed: IpAddr = "192.168.40.7".parse().unwrap();
		let elsewhere: IpAddr = "10.0.0.1".parse().unwrap();

		let grant = table
			.mint("track-1", None, Operation::Stream, Some(minted))
			.await;

		assert!(table
			.validate(&grant.session_id, "track-1", None, Operation::Stream, Some(roamed))
			.await
			.is_some());
		assert!(table
			.validate(&grant.session_id, "track-1", None, Operation::Stream, Some(elsewhere))
			.await
			.is_none());
	}

	#[tokio::test]
	async fn revoke_user_counts_only_their_grants() {
		let table = GrantTable::new();
		table.mint("track-1", Some("user-1"), Operation::Read, None).await;
		table.mint("track-2", Some("user-1"), Operation::Stream, None).await;
		table.mint("track-1", Some("user-2"), Operation::Read, None).await;
		table.mint("track-1", None, Operation::Read, None).await;

		assert_eq!(table.revoke_user("user-1").await, 2);
		assert_eq!(table.revoke_user("user-1").await, 0);
	}
}
