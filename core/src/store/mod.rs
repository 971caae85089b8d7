//! In-process repositories
//!
//! The production deployment fronts an external document store (`DB_URL`);
//! that driver is an external collaborator, so the core carries repositories
//! with the driver's interface shape backed by in-memory maps. Everything
//! above this module is storage-agnostic.

pub mod entity;

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::error::{CoreError, CoreResult};
use entity::{Track, User};

/// User repository keyed by id with a unique email index
#[derive(Default)]
pub struct UserStore {
	users: RwLock<HashMap<String, User>>,
}

impl UserStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Insert a new user; duplicate emails are a conflict.
	pub async fn create(&self, user: User) -> CoreResult<User> {
		let mut users = self.users.write().await;

		if users.values().any(|existing| existing.email == user.email) {
			return Err(CoreError::Conflict("email already registered".to_string()));
		}

		users.insert(user.user_id.clone(), user.clone());
		Ok(user)
	}

	pub async fn find_by_id(&self, user_id: &str) -> Option<User> {
		self.users.read().await.get(user_id).cloned()
	}

	pub async fn find_by_email(&self, email: &str) -> Option<User> {
		self.users
			.read()
			.await
			.values()
			.find(|user| user.email == email)
			.cloned()
	}

	/// Replace the stored password hash.
	pub async fn update_password(&self, user_id: &str, password_hash: String) -> CoreResult<()> {
		let mut users = self.users.write().await;
		let user = users
			.get_mut(user_id)
			.ok_or_else(|| CoreError::NotFound("User".to_string()))?;
		user.password_hash = password_hash;
		Ok(())
	}

	/// Attach an encrypted MFA secret to the user.
	pub async fn set_mfa_secret(&self, user_id: &str, sealed: Vec<u8>) -> CoreResult<()> {
		let mut users = self.users.write().await;
		let user = users
			.get_mut(user_id)
			.ok_or_else(|| CoreError::NotFound("User".to_string()))?;
		user.mfa_secret = Some(sealed);
		Ok(())
	}
}

/// Track repository
#[derive(Default)]
pub struct TrackStore {
	tracks: RwLock<HashMap<String, Track>>,
}

impl TrackStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Insert a new track; duplicate ids are a conflict.
	pub async fn create(&self, track: Track) -> CoreResult<Track> {
		let mut tracks = self.tracks.write().await;

		if tracks.contains_key(&track.track_id) {
			return Err(CoreError::Conflict("track already exists".to_string()));
		}

		tracks.insert(track.track_id.clone(), track.clone());
		Ok(track)
	}

	pub async fn find_by_id(&self, track_id: &str) -> Option<Track> {
		self.tracks.read().await.get(track_id).cloned()
	}

	/// Update the only mutable fields: title and visibility.
	pub async fn update(
		&self,
		track_id: &str,
		title: Option<String>,
		is_public: Option<bool>,
	) -> CoreResult<Track> {
		let mut tracks = self.tracks.write().await;
		let track = tracks
			.get_mut(track_id)
			.ok_or_else(|| CoreError::NotFound("Track".to_string()))?;

		if let Some(title) = title {
			track.title = title;
		}
		if let Some(is_public) = is_public {
			track.is_public = is_public;
		}
		Ok(track.clone())
	}

	/// Remove the record; the caller is responsible for deleting the
	/// ciphertext blob and any cached HLS artifacts.
	pub async fn delete(&self, track_id: &str) -> CoreResult<Track> {
		self.tracks
			.write()
			.await
			.remove(track_id)
			.ok_or_else(|| CoreError::NotFound("Track".to_string()))
	}

	pub async fn list_public(&self) -> Vec<Track> {
		let mut public: Vec<Track> = self
			.tracks
			.read()
			.await
			.values()
			.filter(|track| track.is_public)
			.cloned()
			.collect();
		public.sort_by(|a, b| b.created_at.cmp(&a.created_at));
		public
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Utc;

	fn test_user(id: &str, email: &str) -> User {
		User {
			user_id: id.to_string(),
			name: "Tester".to_string(),
			email: email.to_string(),
			password_hash: "$argon2id$stub".to_string(),
			mfa_secret: None,
			created_at: Utc::now(),
		}
	}

	fn test_track(id: &str, owner: &str, public: bool) -> Track {
		Track {
			track_id: id.to_string(),
			owner_id: owner.to_string(),
			title: "Title".to_string(),
			is_public: public,
			ciphertext_path: format!("uploads/{id}.enc").into(),
			content_hash: "0".repeat(64),
			segment_salt: [0u8; 16],
			created_at: Utc::now(),
		}
	}

	#[tokio::test]
	async fn duplicate_email_conflicts() {
		let store = UserStore::new();
		store.create(test_user("u1", "a@example.com")).await.unwrap();

		let result = store.create(test_user("u2", "a@example.com")).await;
		assert!(matches!(result, Err(CoreError::Conflict(_))));
	}

	#[tokio::test]
	async fn public_listing_excludes_private_tracks() {
		let store = TrackStore::new();
		store.create(test_track("t1", "u1", true)).await.unwrap();
		store.create(test_track("t2", "u1", false)).await.unwrap();

		let public = store.list_public().await;
		assert_eq!(public.len(), 1);
		assert_eq!(public[0].track_id, "t1");
	}

	#[tokio::test]
	async fn update_touches_only_mutable_fields() {
		let store = TrackStore::new();
		let original = store.create(test_track("t1", "u1", false)).await.unwrap();

		let updated = store
			.update("t1", Some("Renamed".to_string()), Some(true))
			.await
			.unwrap();

		assert_eq!(updated.title, "Renamed");
		assert!(updated.is_public);
		assert_eq!(updated.content_hash, original.content_hash);
		assert_eq!(updated.owner_id, original.owner_id);
	}
}
