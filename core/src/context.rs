//! Long-lived application context
//!
//! All shared state lives here and is passed explicitly: stores, the grant
//! table, the alias store, the render cache, the watermark registry, and
//! the worker pool. There are no ambient singletons; dropping the context
//! zeroes the master secret and every key derived into it.

use std::{collections::HashMap, sync::Arc};

use chrono::Utc;
use tokio::sync::{RwLock, Semaphore};
use zeroize::Zeroizing;

use crate::{
	auth::{GrantTable, SessionRegistry, TokenService},
	config::SectifyConfig,
	crypto::{kdf::Kdf, MasterSecret},
	error::CoreResult,
	hls::{transcode::Transcoder, KeyAliasStore, PackagedRender},
	store::{TrackStore, UserStore},
};

/// Cache of packaged renders, keyed by `(track_id, session_id)`.
///
/// This is what makes packaging idempotent per grant: a repeated playlist
/// or segment request inside the grant window sees the first render
/// instead of triggering another pipeline run.
#[derive(Default)]
pub struct RenderCache {
	renders: RwLock<HashMap<(String, String), Arc<PackagedRender>>>,
}

impl RenderCache {
	pub async fn get(&self, track_id: &str, session_id: &str) -> Option<Arc<PackagedRender>> {
		let now = Utc::now();
		let mut renders = self.renders.write().await;
		renders.retain(|_, render| render.expires_at > now);
		renders
			.get(&(track_id.to_string(), session_id.to_string()))
			.cloned()
	}

	pub async fn insert(&self, render: Arc<PackagedRender>) {
		self.renders.write().await.insert(
			(render.track_id.clone(), render.session_id.clone()),
			render,
		);
	}

	/// Drop every cached render for a track, returning the evicted entries
	/// so the caller can delete their directories.
	pub async fn evict_track(&self, track_id: &str) -> Vec<Arc<PackagedRender>> {
		let mut renders = self.renders.write().await;
		let evicted: Vec<Arc<PackagedRender>> = renders
			.values()
			.filter(|render| render.track_id == track_id)
			.cloned()
			.collect();
		renders.retain(|_, render| render.track_id != track_id);
		evicted
	}
}

/// Record of one watermarked render, for offline leak attribution
#[derive(Debug, Clone)]
pub struct WatermarkRecord {
	pub session_id: String,
	pub track_id: String,
	pub user_id: Option<String>,
	pub created_at: chrono::DateTime<Utc>,
}

/// Registry mapping session ids to the renders they watermarked
#[derive(Default)]
pub struct WatermarkRegistry {
	records: RwLock<HashMap<String, WatermarkRecord>>,
}

impl WatermarkRegistry {
	pub async fn register(&self, record: WatermarkRecord) {
		self.records
			.write()
			.await
			.insert(record.session_id.clone(), record);
	}

	pub async fn session_ids(&self) -> Vec<String> {
		self.records.read().await.keys().cloned().collect()
	}

	pub async fn find(&self, session_id: &str) -> Option<WatermarkRecord> {
		self.records.read().await.get(session_id).cloned()
	}
}

/// The application context
pub struct Ctx {
	pub config: SectifyConfig,
	pub kdf: Kdf,
	pub tokens: TokenService,
	pub users: UserStore,
	pub tracks: TrackStore,
	pub sessions: SessionRegistry,
	pub grants: GrantTable,
	pub aliases: KeyAliasStore,
	pub renders: RenderCache,
	pub watermarks: WatermarkRegistry,
	pub transcoder: Transcoder,
	/// Bounded CPU pool for cipher, watermark, and packaging work
	pub workers: Arc<Semaphore>,
	mfa_wrap_key: Zeroizing<[u8; 32]>,
	// Held so the secret is zeroed exactly when the context drops
	_master: MasterSecret,
}

impl Ctx {
	pub fn new(config: SectifyConfig) -> CoreResult<Self> {
		let master = MasterSecret::new(config.master_secret.clone())?;
		let kdf = Kdf::with_iterations(&master, config.kdf_iterations);
		let tokens =
			TokenService::new(&kdf, config.token_ttl_access_min, config.token_ttl_mfa_min);

		let mfa_wrap_key = {
			let derived = kdf.derive(
				crate::crypto::kdf::KeyPurpose::SessionBind,
				b"mfa-secret-wrap",
			);
			let mut key = Zeroizing::new([0u8; 32]);
			key.copy_from_slice(derived.as_ref());
			key
		};

		let parallelism = std::thread::available_parallelism()
			.map(|n| n.get())
			.unwrap_or(4);

		let transcoder = Transcoder::new(config.transcoder_bin.clone());

		Ok(Self {
			config,
			kdf,
			tokens,
			users: UserStore::new(),
			tracks: TrackStore::new(),
			sessions: SessionRegistry::new(),
			grants: GrantTable::new(),
			aliases: KeyAliasStore::new(),
			renders: RenderCache::default(),
			watermarks: WatermarkRegistry::default(),
			transcoder,
			workers: Arc::new(Semaphore::new(parallelism)),
			mfa_wrap_key,
			_master: master,
		})
	}

	pub fn arced(self) -> Arc<Self> {
		Arc::new(self)
	}

	/// Key under which MFA secrets are sealed at rest
	pub fn mfa_wrap_key(&self) -> &[u8; 32] {
		&self.mfa_wrap_key
	}

	/// Revoke everything session-shaped for a user: login sessions and
	/// track access grants. Returns the total count, which callers use to
	/// confirm the revocation actually bit.
	pub async fn revoke_user_sessions(&self, user_id: &str) -> usize {
		let sessions = self.sessions.revoke_user(user_id).await;
		let grants = self.grants.revoke_user(user_id).await;
		sessions + grants
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn render_cache_expires_with_the_grant() {
		let cache = RenderCache::default();
		let render = Arc::new(PackagedRender {
			track_id: "track-1".to_string(),
			session_id: "sess-1".to_string(),
			dir: "hls/track-1/sess-1".into(),
			playlist: "#EXTM3U\n".to_string(),
			segment_durations: vec![4.0],
			alias: "a".repeat(32),
			created_at: Utc::now(),
			expires_at: Utc::now() - chrono::Duration::seconds(1),
		});

		cache.insert(render).await;
		assert!(cache.get("track-1", "sess-1").await.is_none());
	}

	#[tokio::test]
	async fn revoke_user_sessions_counts_both_kinds() {
		let ctx = Ctx::new(SectifyConfig::debug()).unwrap();
		ctx.sessions.create("user-1", 30).await;
		ctx.grants
			.mint("track-1", Some("user-1"), crate::auth::Operation::Stream, None)
			.await;

		assert_eq!(ctx.revoke_user_sessions("user-1").await, 2);
		assert_eq!(ctx.revoke_user_sessions("user-1").await, 0);
	}
}
