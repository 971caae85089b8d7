//! Domain entities

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A registered user.
///
/// The password hash and MFA secret never cross the wire: neither field is
/// serializable, and API responses use [`UserSummary`].
#[derive(Debug, Clone)]
pub struct User {
	pub user_id: String,
	pub name: String,
	/// Unique across the store
	pub email: String,
	/// Argon2id PHC string
	pub password_hash: String,
	/// AES-256-GCM sealed TOTP secret; `None` when 2FA is not enrolled
	pub mfa_secret: Option<Vec<u8>>,
	pub created_at: DateTime<Utc>,
}

/// Wire shape for a user
#[derive(Debug, Clone, Serialize)]
pub struct UserSummary {
	pub user_id: String,
	pub name: String,
	pub email: String,
	pub created_at: DateTime<Utc>,
}

impl From<&User> for UserSummary {
	fn from(user: &User) -> Self {
		Self {
			user_id: user.user_id.clone(),
			name: user.name.clone(),
			email: user.email.clone(),
			created_at: user.created_at,
		}
	}
}

/// An uploaded track. Immutable after creation except `title` and
/// `is_public`; deletion must also remove the ciphertext blob and any
/// cached HLS artifacts.
#[derive(Debug, Clone)]
pub struct Track {
	pub track_id: String,
	pub owner_id: String,
	pub title: String,
	pub is_public: bool,
	/// Location of the chaotic-cipher envelope on disk
	pub ciphertext_path: PathBuf,
	/// SHA-256 of the uploaded plaintext, hex
	pub content_hash: String,
	/// Stored CSPRNG salt for segment key derivation
	pub segment_salt: [u8; 16],
	pub created_at: DateTime<Utc>,
}

/// Wire shape for a track listing
#[derive(Debug, Clone, Serialize)]
pub struct TrackSummary {
	pub track_id: String,
	pub title: String,
	pub is_public: bool,
	pub created_at: DateTime<Utc>,
}

impl From<&Track> for TrackSummary {
	fn from(track: &Track) -> Self {
		Self {
			track_id: track.track_id.clone(),
			title: track.title.clone(),
			is_public: track.is_public,
			created_at: track.created_at,
		}
	}
}
