//! Upload ingestion and track deletion
//!
//! Ingest: derive the per-file key, encrypt with the chaotic cipher, and
//! write the envelope to the upload root. The plaintext never touches the
//! filesystem.
//!
//! Deletion: remove the store record, the ciphertext blob, and every
//! cached HLS artifact for the track.

use std::sync::Arc;

use chrono::Utc;
use rand::RngCore;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{
	context::Ctx,
	crypto::chaotic,
	error::{CoreError, CoreResult},
	store::entity::Track,
};

/// Encrypt and register an uploaded audio blob.
pub async fn ingest_upload(
	ctx: &Arc<Ctx>,
	owner_id: &str,
	title: &str,
	audio: Vec<u8>,
) -> CoreResult<Track> {
	if audio.is_empty() {
		return Err(CoreError::BadRequest("upload is empty".to_string()));
	}

	let track_id = Uuid::new_v4().to_string();
	let content_hash = hex::encode(Sha256::digest(&audio));

	let mut segment_salt = [0u8; 16];
	rand::rngs::OsRng.fill_bytes(&mut segment_salt);

	// Key derivation and the stream cipher are CPU-bound; both run off the
	// request dispatcher.
	let envelope = {
		let ctx = ctx.clone();
		let owner = owner_id.to_string();
		let track = track_id.clone();
		tokio::task::spawn_blocking(move || {
			let file_key = ctx.kdf.file_at_rest_key(&owner, &track);
			chaotic::encrypt(&audio, file_key.as_ref())
		})
		.await
		.map_err(|e| CoreError::Internal(format!("ingest task panicked: {e}")))??
	};

	tokio::fs::create_dir_all(&ctx.config.upload_root).await?;
	let ciphertext_path = ctx.config.upload_root.join(format!("{track_id}.enc"));
	tokio::fs::write(&ciphertext_path, &envelope).await?;

	let track = Track {
		track_id: track_id.clone(),
		owner_id: owner_id.to_string(),
		title: title.to_string(),
		is_public: false,
		ciphertext_path: ciphertext_path.clone(),
		content_hash,
		segment_salt,
		created_at: Utc::now(),
	};

	match ctx.tracks.create(track).await {
		Ok(track) => {
			tracing::info!(track_id = %track_id, owner = %owner_id, "Ingested upload");
			Ok(track)
		}
		Err(error) => {
			// Orphaned ciphertext would never be reaped; remove it now
			let _ = tokio::fs::remove_file(&ciphertext_path).await;
			Err(error)
		}
	}
}

/// Load and decrypt a track's source audio.
pub async fn load_source(ctx: &Arc<Ctx>, track: &Track) -> CoreResult<Vec<u8>> {
	let envelope = tokio::fs::read(&track.ciphertext_path).await?;

	let ctx_clone = ctx.clone();
	let owner = track.owner_id.clone();
	let track_id = track.track_id.clone();
	let plaintext = tokio::task::spawn_blocking(move || {
		let file_key = ctx_clone.kdf.file_at_rest_key(&owner, &track_id);
		chaotic::decrypt(&envelope, file_key.as_ref())
	})
	.await
	.map_err(|e| CoreError::Internal(format!("decrypt task panicked: {e}")))?
	.map_err(|error| {
		tracing::error!(track_id = %track.track_id, ?error, "Source decryption failed");
		CoreError::from(error).sanitized()
	})?;

	Ok(plaintext.to_vec())
}

/// Delete a track: store record, ciphertext, HLS artifacts, aliases, and
/// cached renders.
pub async fn delete_track(ctx: &Arc<Ctx>, track_id: &str) -> CoreResult<()> {
	let track = ctx.tracks.delete(track_id).await?;

	if let Err(error) = tokio::fs::remove_file(&track.ciphertext_path).await {
		if error.kind() != std::io::ErrorKind::NotFound {
			tracing::error!(?error, track_id = %track_id, "Failed to remove ciphertext");
		}
	}

	ctx.renders.evict_track(track_id).await;
	ctx.aliases.evict_track(track_id).await;

	let hls_dir = ctx.config.hls_root.join(track_id);
	if let Err(error) = tokio::fs::remove_dir_all(&hls_dir).await {
		if error.kind() != std::io::ErrorKind::NotFound {
			tracing::error!(?error, track_id = %track_id, "Failed to remove HLS artifacts");
		}
	}

	tracing::info!(track_id = %track_id, "Deleted track");
	Ok(())
}
