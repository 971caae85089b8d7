//! Playback orchestration
//!
//! Ties the pipeline together for one authorized playback: decrypt the
//! source, decode to PCM, watermark for the session, package into
//! encrypted segments, mint the key alias, and render the manifest. The
//! alias is always minted strictly after the authorizing grant and before
//! the manifest exists anywhere a player could fetch it.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use zeroize::Zeroizing;

use crate::{
	auth::AccessGrant,
	context::{Ctx, WatermarkRecord},
	crypto::watermark::PcmAudio,
	error::{CoreError, CoreResult},
	hls::packager::{self, PackagedRender},
	services::ingest,
	store::entity::Track,
};

/// Seconds a saturated worker pool asks the client to back off
const RETRY_AFTER_SECS: u64 = 2;

/// Produce (or return the cached) render for `(track, grant)`.
///
/// Callers serialize concurrent invocations per `(track_id, session_id)`
/// with a keyed lock; this function handles idempotency via the render
/// cache, so the second flight of a single-flight pair sees the first
/// one's output.
pub async fn prepare_render(
	ctx: &Arc<Ctx>,
	track: &Track,
	grant: &AccessGrant,
	cancel: CancellationToken,
) -> CoreResult<Arc<PackagedRender>> {
	if let Some(render) = ctx.renders.get(&track.track_id, &grant.session_id).await {
		return Ok(render);
	}

	let source = ingest::load_source(ctx, track).await?;
	let pcm = ctx.transcoder.decode_to_pcm(&source).await?;
	package_pcm_render(ctx, track, grant, pcm, cancel).await
}

/// Package an already-decoded PCM stream for a grant.
///
/// Split out from [`prepare_render`] so the pipeline below the transcoder
/// seam stays exercisable without the external binary.
pub async fn package_pcm_render(
	ctx: &Arc<Ctx>,
	track: &Track,
	grant: &AccessGrant,
	pcm: PcmAudio,
	cancel: CancellationToken,
) -> CoreResult<Arc<PackagedRender>> {
	if let Some(render) = ctx.renders.get(&track.track_id, &grant.session_id).await {
		return Ok(render);
	}

	// Bounded CPU pool; saturation surfaces as 503 + Retry-After
	let _permit = ctx.workers.clone().try_acquire_owned().map_err(|_| {
		CoreError::Throttled {
			retry_after_seconds: RETRY_AFTER_SECS,
		}
	})?;

	// Fresh render nonce -> fresh segment key, derived under the track's
	// stored salt and never written anywhere near the segments
	let segment_key = {
		let ctx = ctx.clone();
		let track_salt = track.segment_salt;
		let nonce = {
			use rand::RngCore;
			let mut nonce = [0u8; 16];
			rand::rngs::OsRng.fill_bytes(&mut nonce);
			nonce
		};
		tokio::task::spawn_blocking(move || ctx.kdf.segment_key(&track_salt, &nonce))
			.await
			.map_err(|e| CoreError::Internal(format!("kdf task panicked: {e}")))?
	};

	let dir = packager::render_dir(&ctx.config.hls_root, &track.track_id, &grant.session_id);
	let durations = packager::package_segments(
		pcm,
		&grant.session_id,
		Zeroizing::new(*segment_key),
		&dir,
		cancel,
	)
	.await?;

	ctx.watermarks
		.register(WatermarkRecord {
			session_id: grant.session_id.clone(),
			track_id: track.track_id.clone(),
			user_id: grant.user_id.clone(),
			created_at: grant.created_at,
		})
		.await;

	// Alias mint happens-before the manifest can be observed
	let allowed_ip_hash = grant
		.client_ip
		.as_ref()
		.map(|ip| ctx.tokens.ip_hash_raw(ip));
	let owner_binding = (!track.is_public).then_some(track.owner_id.as_str());
	let alias = ctx
		.aliases
		.mint(segment_key, &track.track_id, owner_binding, allowed_ip_hash)
		.await;

	let playlist =
		packager::render_manifest(&track.track_id, &grant.session_id, &durations, &alias);
	tokio::fs::write(dir.join("playlist.m3u8"), &playlist).await?;

	let render = Arc::new(PackagedRender {
		track_id: track.track_id.clone(),
		session_id: grant.session_id.clone(),
		dir,
		playlist,
		segment_durations: durations,
		alias,
		created_at: grant.created_at,
		expires_at: grant.expires_at,
	});

	ctx.renders.insert(render.clone()).await;

	tracing::info!(
		track_id = %track.track_id,
		session = %&grant.session_id[..8],
		segments = render.segment_count(),
		"Packaged render"
	);

	Ok(render)
}

/// Read one encrypted segment from a render.
///
/// A read can race the reaper unlinking an expired file; that class of
/// failure gets one retry before surfacing as transient.
pub async fn read_segment(render: &PackagedRender, index: usize) -> CoreResult<Vec<u8>> {
	if index >= render.segment_count() {
		return Err(CoreError::NotFound("Segment".to_string()));
	}

	let path = render.segment_path(index);
	match tokio::fs::read(&path).await {
		Ok(bytes) => Ok(bytes),
		Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
			tokio::time::sleep(std::time::Duration::from_millis(20)).await;
			tokio::fs::read(&path).await.map_err(|retry_error| {
				tracing::warn!(
					?retry_error,
					path = %path.display(),
					"Segment read failed after retry"
				);
				CoreError::Transient("segment unavailable".to_string())
			})
		}
		Err(error) => Err(error.into()),
	}
}
