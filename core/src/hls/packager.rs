//! HLS packaging pipeline
//!
//! Turns a watermarked PCM stream into `seg_000.ts … seg_N.ts` under the
//! render directory, each segment AES-128-CBC encrypted with the render's
//! key and an IV equal to the big-endian segment index. The manifest is
//! rendered separately, after the key alias has been minted, so a player
//! can never observe a key URI whose alias does not yet resolve.
//!
//! The pipeline runs as three stages — watermark, segment-encode,
//! encrypt-and-write — connected by bounded channels of capacity 4.
//! Backpressure falls out of the channel capacity; a slow disk stalls the
//! watermark stage instead of buffering the whole track.

use std::path::{Path, PathBuf};

use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use zeroize::Zeroizing;

use crate::{
	crypto::{
		sizes::SEGMENT_KEY_SIZE,
		watermark::{PcmAudio, WatermarkEmbedder, SAMPLE_RATE},
	},
	error::{CoreError, CoreResult},
};

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

/// Target segment duration in seconds (±10 % after frame alignment)
pub const SEGMENT_TARGET_SECS: f64 = 4.0;

/// Audio frame granularity; segment boundaries land on frame boundaries
pub const FRAME_SAMPLES: usize = 1024;

/// Bounded capacity of the inter-stage channels
const STAGE_CAPACITY: usize = 4;

/// Frames per full segment: the frame-aligned count closest to the 4 s
/// target (integer arithmetic keeps this usable in a const)
const FRAMES_PER_SEGMENT: usize =
	(4 * SAMPLE_RATE as usize + FRAME_SAMPLES / 2) / FRAME_SAMPLES;

/// A finished render of one track for one session
#[derive(Debug, Clone)]
pub struct PackagedRender {
	pub track_id: String,
	pub session_id: String,
	/// Directory holding the playlist and segments
	pub dir: PathBuf,
	/// Rendered manifest, byte-for-byte what the playlist endpoint serves
	pub playlist: String,
	pub segment_durations: Vec<f64>,
	/// Key alias referenced by the manifest
	pub alias: String,
	pub created_at: DateTime<Utc>,
	/// Render is served only while the authorizing grant lives
	pub expires_at: DateTime<Utc>,
}

impl PackagedRender {
	pub fn segment_count(&self) -> usize {
		self.segment_durations.len()
	}

	pub fn segment_path(&self, index: usize) -> PathBuf {
		self.dir.join(segment_file_name(index))
	}
}

/// `seg_000.ts`-style segment file name
pub fn segment_file_name(index: usize) -> String {
	format!("seg_{index:03}.ts")
}

/// Render directory: `<hls_root>/<track_id>/<first 8 hex of session>`
///
/// Session-scoping the subdirectory keeps concurrent renders of one track
/// from ever writing the same segment filename.
pub fn render_dir(hls_root: &Path, track_id: &str, session_id: &str) -> PathBuf {
	let session_prefix = &session_id[..session_id.len().min(8)];
	hls_root.join(track_id).join(session_prefix)
}

/// Segment IV: the 16-byte big-endian segment index
pub fn segment_iv(index: u64) -> [u8; 16] {
	let mut iv = [0u8; 16];
	iv[8..].copy_from_slice(&index.to_be_bytes());
	iv
}

/// AES-128-CBC + PKCS#7 encrypt one segment payload.
pub fn encrypt_segment(
	key: &[u8; SEGMENT_KEY_SIZE],
	index: u64,
	plaintext: &[u8],
) -> Vec<u8> {
	let iv = segment_iv(index);
	Aes128CbcEnc::new(key.into(), (&iv).into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext)
}

/// Inverse of [`encrypt_segment`]; exercised by the player-side tests.
pub fn decrypt_segment(
	key: &[u8; SEGMENT_KEY_SIZE],
	index: u64,
	ciphertext: &[u8],
) -> CoreResult<Vec<u8>> {
	let iv = segment_iv(index);
	Aes128CbcDec::new(key.into(), (&iv).into())
		.decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
		.map_err(|_| CoreError::Integrity)
}

/// Watermark, segment, encrypt, and write one render's segments.
///
/// Returns per-segment durations in seconds. On any error — including
/// cancellation — every partially written segment is deleted before the
/// error surfaces.
pub async fn package_segments(
	pcm: PcmAudio,
	session_id: &str,
	key: Zeroizing<[u8; SEGMENT_KEY_SIZE]>,
	dir: &Path,
	cancel: CancellationToken,
) -> CoreResult<Vec<f64>> {
	if pcm.frames() == 0 {
		return Err(CoreError::BadRequest("empty audio stream".to_string()));
	}

	tokio::fs::create_dir_all(dir).await?;

	let result = run_pipeline(pcm, session_id.to_string(), key, dir.to_path_buf(), cancel).await;

	if result.is_err() {
		if let Err(error) = tokio::fs::remove_dir_all(dir).await {
			if error.kind() != std::io::ErrorKind::NotFound {
				tracing::error!(?error, dir = %dir.display(), "Failed to clean partial render");
			}
		}
	}

	result
}

async fn run_pipeline(
	pcm: PcmAudio,
	session_id: String,
	key: Zeroizing<[u8; SEGMENT_KEY_SIZE]>,
	dir: PathBuf,
	cancel: CancellationToken,
) -> CoreResult<Vec<f64>> {
	let channels = pcm.channels;
	let peak = pcm.peak();
	let samples_per_segment = FRAMES_PER_SEGMENT * FRAME_SAMPLES * channels as usize;

	let (marked_tx, mut marked_rx) = mpsc::channel::<(usize, Vec<i16>)>(STAGE_CAPACITY);
	let (encoded_tx, mut encoded_rx) = mpsc::channel::<(usize, Vec<u8>, f64)>(STAGE_CAPACITY);

	// Stage 1: watermark each segment window, chip position continuous
	// across windows
	let watermark_cancel = cancel.clone();
	let watermark = tokio::task::spawn_blocking(move || -> CoreResult<()> {
		let mut embedder = WatermarkEmbedder::new(&session_id, peak);

		for (index, window) in pcm.samples.chunks(samples_per_segment).enumerate() {
			if watermark_cancel.is_cancelled() {
				return Err(CoreError::Transient("packaging cancelled".to_string()));
			}

			let mut window = window.to_vec();
			embedder.apply(&mut window, channels);

			if marked_tx.blocking_send((index, window)).is_err() {
				// Receiver dropped: a downstream stage already failed
				return Ok(());
			}
		}
		Ok(())
	});

	// Stage 2: serialize PCM windows to little-endian segment payloads
	let encode_cancel = cancel.clone();
	let encode = tokio::task::spawn_blocking(move || -> CoreResult<()> {
		while let Some((index, window)) = marked_rx.blocking_recv() {
			if encode_cancel.is_cancelled() {
				return Err(CoreError::Transient("packaging cancelled".to_string()));
			}

			let duration =
				window.len() as f64 / (channels as f64 * SAMPLE_RATE as f64);
			let mut payload = Vec::with_capacity(window.len() * 2);
			for sample in window {
				payload.extend_from_slice(&sample.to_le_bytes());
			}

			if encoded_tx.blocking_send((index, payload, duration)).is_err() {
				return Ok(());
			}
		}
		Ok(())
	});

	// Stage 3: encrypt and write. Segment filenames are never overwritten;
	// an existing file means another writer got here, which is a bug.
	let mut durations = Vec::new();
	let write_result: CoreResult<()> = async {
		while let Some((index, payload, duration)) = encoded_rx.recv().await {
			if cancel.is_cancelled() {
				return Err(CoreError::Transient("packaging cancelled".to_string()));
			}

			let ciphertext = encrypt_segment(&key, index as u64, &payload);
			let path = dir.join(segment_file_name(index));
			if tokio::fs::try_exists(&path).await.unwrap_or(false) {
				return Err(CoreError::Internal(format!(
					"segment already exists: {}",
					path.display()
				)));
			}
			tokio::fs::write(&path, &ciphertext).await?;
			durations.push(duration);
		}
		Ok(())
	}
	.await;

	let watermark_result = watermark
		.await
		.map_err(|e| CoreError::Internal(format!("watermark stage panicked: {e}")))?;
	let encode_result = encode
		.await
		.map_err(|e| CoreError::Internal(format!("encode stage panicked: {e}")))?;

	watermark_result?;
	encode_result?;
	write_result?;

	Ok(durations)
}

/// Render the manifest for a packaged set of segments.
///
/// Exactly one `#EXT-X-KEY` line references the alias URI; segment URIs
/// carry the grant's session so the segment endpoint can validate the
/// binding before serving ciphertext.
pub fn render_manifest(
	track_id: &str,
	session_id: &str,
	durations: &[f64],
	alias: &str,
) -> String {
	let target = durations
		.iter()
		.fold(0.0f64, |max, &d| max.max(d))
		.ceil()
		.max(1.0) as u64;

	let mut manifest = String::new();
	manifest.push_str("#EXTM3U\n");
	manifest.push_str("#EXT-X-VERSION:3\n");
	manifest.push_str(&format!("#EXT-X-TARGETDURATION:{target}\n"));
	manifest.push_str("#EXT-X-MEDIA-SEQUENCE:0\n");
	manifest.push_str(&format!(
		"#EXT-X-KEY:METHOD=AES-128,URI=\"/api/v1/stream/key/{alias}\",IV=0x{}\n",
		hex::encode(segment_iv(0))
	));

	for (index, duration) in durations.iter().enumerate() {
		manifest.push_str(&format!("#EXTINF:{duration:.3},\n"));
		manifest.push_str(&format!(
			"/api/v1/stream/segment/{track_id}/{index}?session={session_id}\n"
		));
	}

	manifest.push_str("#EXT-X-ENDLIST\n");
	manifest
}
