//! Just-in-time key alias store
//!
//! Segment keys are never embedded in manifests. The manifest references an
//! opaque 128-bit alias; the store releases the underlying key only while
//! the alias lives and only to callers that pass its bindings. Aliases are
//! deliberately not persisted — a restart drops them all and players simply
//! re-negotiate.

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use subtle::ConstantTimeEq;
use tokio::sync::RwLock;
use zeroize::Zeroizing;

use crate::crypto::sizes::{ALIAS_SIZE, IP_HASH_SIZE, SEGMENT_KEY_SIZE};

/// Alias lifetime
pub const ALIAS_TTL_MINUTES: i64 = 5;

struct AliasEntry {
	alias: [u8; ALIAS_SIZE],
	segment_key: Zeroizing<[u8; SEGMENT_KEY_SIZE]>,
	track_id: String,
	/// Set only for private tracks; public aliases are not user-bound
	owner_user_id: Option<String>,
	/// IP binding from mint time; `None` when the minting request had no
	/// resolvable address
	allowed_ip_hash: Option<[u8; IP_HASH_SIZE]>,
	expires_at: DateTime<Utc>,
}

/// Outcome of an alias resolution
#[derive(Debug)]
pub enum AliasResolution {
	/// Bindings passed; here is the raw segment key
	Key(Zeroizing<[u8; SEGMENT_KEY_SIZE]>),
	/// Alias exists but a binding check failed. The HTTP layer must render
	/// this identically whether or not the alias exists.
	Denied,
	/// Absent or expired
	NotFound,
}

/// In-memory alias table behind a readers/writer lock
#[derive(Default)]
pub struct KeyAliasStore {
	entries: RwLock<Vec<AliasEntry>>,
}

impl KeyAliasStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Mint an alias for a segment key. Returns the alias as 32 hex chars.
	pub async fn mint(
		&self,
		segment_key: Zeroizing<[u8; SEGMENT_KEY_SIZE]>,
		track_id: &str,
		owner_user_id: Option<&str>,
		allowed_ip_hash: Option<[u8; IP_HASH_SIZE]>,
	) -> String {
		let mut alias = [0u8; ALIAS_SIZE];
		rand::rngs::OsRng.fill_bytes(&mut alias);

		let now = Utc::now();
		let mut entries = self.entries.write().await;
		entries.retain(|entry| entry.expires_at > now);
		entries.push(AliasEntry {
			alias,
			segment_key,
			track_id: track_id.to_string(),
			owner_user_id: owner_user_id.map(str::to_string),
			allowed_ip_hash,
			expires_at: now + Duration::minutes(ALIAS_TTL_MINUTES),
		});

		hex::encode(alias)
	}

	/// Resolve an alias under binding checks.
	///
	/// The lookup compares every live entry with constant-time equality and
	/// never exits early, so response timing does not reveal whether an
	/// alias exists or where it sits in the table.
	pub async fn resolve(
		&self,
		alias_hex: &str,
		caller_ip_hash: Option<[u8; IP_HASH_SIZE]>,
		caller_user_id: Option<&str>,
	) -> AliasResolution {
		let needle: [u8; ALIAS_SIZE] = match hex::decode(alias_hex) {
			Ok(raw) => match raw.try_into() {
				Ok(arr) => arr,
				Err(_) => return AliasResolution::NotFound,
			},
			Err(_) => return AliasResolution::NotFound,
		};

		let now = Utc::now();
		let mut entries = self.entries.write().await;
		entries.retain(|entry| entry.expires_at > now);

		let mut found: Option<usize> = None;
		for (index, entry) in entries.iter().enumerate() {
			let matches: bool = entry.alias[..].ct_eq(&needle[..]).into();
			if matches && found.is_none() {
				found = Some(index);
			}
		}

		let Some(index) = found else {
			return AliasResolution::NotFound;
		};
		let entry = &entries[index];

		if let Some(bound) = entry.allowed_ip_hash.as_ref() {
			let ip_ok = caller_ip_hash
				.map(|caller| bool::from(bound[..].ct_eq(&caller[..])))
				.unwrap_or(false);
			if !ip_ok {
				tracing::warn!(track_id = %entry.track_id, "Alias IP binding failed");
				return AliasResolution::Denied;
			}
		}

		if let Some(owner) = entry.owner_user_id.as_deref() {
			if caller_user_id != Some(owner) {
				tracing::warn!(track_id = %entry.track_id, "Alias owner binding failed");
				return AliasResolution::Denied;
			}
		}

		AliasResolution::Key(entry.segment_key.clone())
	}

	/// Drop every alias for a track (track deletion).
	pub async fn evict_track(&self, track_id: &str) -> usize {
		let mut entries = self.entries.write().await;
		let before = entries.len();
		entries.retain(|entry| entry.track_id != track_id);
		before - entries.len()
	}

	/// Drop expired aliases, returning the count removed.
	pub async fn sweep(&self) -> usize {
		let now = Utc::now();
		let mut entries = self.entries.write().await;
		let before = entries.len();
		entries.retain(|entry| entry.expires_at > now);
		before - entries.len()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn key() -> Zeroizing<[u8; SEGMENT_KEY_SIZE]> {
		Zeroizing::new([0xAB; SEGMENT_KEY_SIZE])
	}

	#[tokio::test]
	async fn mint_resolve_roundtrip() {
		let store = KeyAliasStore::new();
		let ip_hash = Some([1u8; IP_HASH_SIZE]);

		let alias = store.mint(key(), "track-1", None, ip_hash).await;
		assert_eq!(alias.len(), ALIAS_SIZE * 2);

		match store.resolve(&alias, ip_hash, None).await {
			AliasResolution::Key(resolved) => assert_eq!(*resolved, *key()),
			other => panic!("expected key, got {other:?}"),
		}
	}

	#[tokio::test]
	async fn ip_mismatch_is_denied_not_missing() {
		let store = KeyAliasStore::new();
		let alias = store
			.mint(key(), "track-1", None, Some([1u8; IP_HASH_SIZE]))
			.await;

		let result = store
			.resolve(&alias, Some([2u8; IP_HASH_SIZE]), None)
			.await;
		assert!(matches!(result, AliasResolution::Denied));
	}

	#[tokio::test]
	async fn private_track_alias_is_owner_bound() {
		let store = KeyAliasStore::new();
		let ip_hash = Some([1u8; IP_HASH_SIZE]);
		let alias = store.mint(key(), "track-1", Some("owner-1"), ip_hash).await;

		assert!(matches!(
			store.resolve(&alias, ip_hash, Some("owner-1")).await,
			AliasResolution::Key(_)
		));
		assert!(matches!(
			store.resolve(&alias, ip_hash, Some("intruder")).await,
			AliasResolution::Denied
		));
		assert!(matches!(
			store.resolve(&alias, ip_hash, None).await,
			AliasResolution::Denied
		));
	}

	#[tokio::test]
	async fn unknown_and_malformed_aliases_are_not_found() {
		let store = KeyAliasStore::new();

		let absent = hex::encode([0u8; ALIAS_SIZE]);
		assert!(matches!(
			store.resolve(&absent, None, None).await,
			AliasResolution::NotFound
		));
		assert!(matches!(
			store.resolve("zz-not-hex", None, None).await,
			AliasResolution::NotFound
		));
		assert!(matches!(
			store.resolve("abcd", None, None).await,
			AliasResolution::NotFound
		));
	}

	#[tokio::test]
	async fn evict_track_removes_its_aliases() {
		let store = KeyAliasStore::new();
		let alias = store.mint(key(), "track-1", None, None).await;
		store.mint(key(), "track-2", None, None).await;

		assert_eq!(store.evict_track("track-1").await, 1);
		assert!(matches!(
			store.resolve(&alias, None, None).await,
			AliasResolution::NotFound
		));
	}
}
