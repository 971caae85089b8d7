//! Centralized authorization
//!
//! Every track operation funnels through [`AuthorizationService::check_track_access`];
//! handlers never compare owner ids themselves. This is the single place
//! where the IDOR class of bugs can exist, which is what makes it
//! reviewable.

use std::net::IpAddr;

use uuid::Uuid;

use crate::{
	auth::grants::{AccessGrant, GrantTable, Operation},
	error::{CoreError, CoreResult},
	store::{entity::Track, TrackStore},
};

/// Stateless decision logic over the track store and grant table
pub struct AuthorizationService;

impl AuthorizationService {
	/// Decide a track access request and mint a grant on success.
	///
	/// Decision table:
	/// - `read` / `stream`: allowed if the track is public or the caller
	///   owns it
	/// - `write` / `delete`: owner only
	///
	/// Denials carry no detail beyond the status class: anonymous callers
	/// get 401, authenticated non-owners get 403, and neither response
	/// differs from the track-absent case in headers or body shape.
	pub async fn check_track_access(
		tracks: &TrackStore,
		grants: &GrantTable,
		track_id: &str,
		user_id: Option<&str>,
		operation: Operation,
		client_ip: Option<IpAddr>,
	) -> CoreResult<(Track, AccessGrant)> {
		// Syntactic validation before any store lookup
		if Uuid::parse_str(track_id).is_err() {
			return Err(CoreError::NotFound("Track".to_string()));
		}

		let track = tracks.find_by_id(track_id).await.ok_or_else(|| {
			tracing::warn!(
				track_id = %track_id,
				user = user_id.unwrap_or("anonymous"),
				"Track not found"
			);
			CoreError::NotFound("Track".to_string())
		})?;

		let is_owner = user_id.is_some_and(|id| id == track.owner_id);
		let allowed = match operation {
			Operation::Read | Operation::Stream => track.is_public || is_owner,
			Operation::Write | Operation::Delete => is_owner,
		};

		if !allowed {
			tracing::warn!(
				track_id = %track_id,
				operation = %operation,
				user = user_id.unwrap_or("anonymous"),
				"Access denied"
			);
			return Err(match user_id {
				None => CoreError::AuthRequired,
				Some(_) => CoreError::Forbidden,
			});
		}

		let grant = grants.mint(track_id, user_id, operation, client_ip).await;

		tracing::info!(
			track_id = %track_id,
			operation = %operation,
			user = user_id.unwrap_or("anonymous"),
			session = %&grant.session_id[..8],
			"Access granted"
		);

		Ok((track, grant))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Utc;

	async fn seed_track(tracks: &TrackStore, public: bool) -> String {
		let track_id = Uuid::new_v4().to_string();
		tracks
			.create(Track {
				track_id: track_id.clone(),
				owner_id: "owner-1".to_string(),
				title: "Seeded".to_string(),
				is_public: public,
				ciphertext_path: "uploads/test.enc".into(),
				content_hash: "0".repeat(64),
				segment_salt: [0u8; 16],
				created_at: Utc::now(),
			})
			.await
			.unwrap();
		track_id
	}

	#[tokio::test]
	async fn malformed_track_id_is_not_found() {
		let tracks = TrackStore::new();
		let grants = GrantTable::new();

		let result = AuthorizationService::check_track_access(
			&tracks,
			&grants,
			"../../../etc/passwd",
			Some("owner-1"),
			Operation::Read,
			None,
		)
		.await;

		assert!(matches!(result, Err(CoreError::NotFound(_))));
	}

	#[tokio::test]
	async fn anonymous_read_of_private_track_requires_auth() {
		let tracks = TrackStore::new();
		let grants = GrantTable::new();
		let track_id = seed_track(&tracks, false).await;

		let result = AuthorizationService::check_track_access(
			&tracks,
			&grants,
			&track_id,
			None,
			Operation::Stream,
			None,
		)
		.await;

		assert!(matches!(result, Err(CoreError::AuthRequired)));
	}

	#[tokio::test]
	async fn non_owner_is_forbidden_on_private_track() {
		let tracks = TrackStore::new();
		let grants = GrantTable::new();
		let track_id = seed_track(&tracks, false).await;

		for operation in [
			Operation::Read,
			Operation::Stream,
			Operation::Write,
			Operation::Delete,
		] {
			let result = AuthorizationService::check_track_access(
				&tracks,
				&grants,
				&track_id,
				Some("intruder"),
				operation,
				None,
			)
			.await;
			assert!(
				matches!(result, Err(CoreError::Forbidden)),
				"{operation} should be forbidden"
			);
		}
	}

	#[tokio::test]
	async fn public_track_streams_anonymously_but_stays_owner_writable() {
		let tracks = TrackStore::new();
		let grants = GrantTable::new();
		let track_id = seed_track(&tracks, true).await;

		let (_, grant) = AuthorizationService::check_track_access(
			&tracks,
			&grants,
			&track_id,
			None,
			Operation::Stream,
			None,
		)
		.await
		.unwrap();
		assert!(grant.user_id.is_none());

		let result = AuthorizationService::check_track_access(
			&tracks,
			&grants,
			&track_id,
			Some("listener"),
			Operation::Write,
			None,
		)
		.await;
		assert!(matches!(result, Err(CoreError::Forbidden)));

		let owner_write = AuthorizationService::check_track_access(
			&tracks,
			&grants,
			&track_id,
			Some("owner-1"),
			Operation::Write,
			None,
		)
		.await;
		assert!(owner_write.is_ok());
	}
}
