//! External transcoder subprocess
//!
//! Uploads arrive as whatever the user had (MP3, WAV, FLAC, ...). The
//! pipeline needs 16-bit 44.1 kHz PCM, and decoding is delegated to an
//! external tool invoked as a subprocess — the binary is configurable and
//! defaults to `ffmpeg`.

use tokio::{io::AsyncWriteExt, process::Command};

use crate::{
	crypto::watermark::{PcmAudio, SAMPLE_RATE},
	error::{CoreError, CoreResult},
};

/// Channel count requested from the transcoder
const CHANNELS: u16 = 2;

/// Wrapper around the external decode tool
#[derive(Debug, Clone)]
pub struct Transcoder {
	bin: String,
}

impl Transcoder {
	pub fn new(bin: impl Into<String>) -> Self {
		Self { bin: bin.into() }
	}

	/// Decode an in-memory audio blob to interleaved s16le PCM.
	///
	/// The blob is piped through stdin and raw samples read from stdout, so
	/// no plaintext audio ever touches the filesystem.
	pub async fn decode_to_pcm(&self, input: &[u8]) -> CoreResult<PcmAudio> {
		let mut child = Command::new(&self.bin)
			.args([
				"-hide_banner",
				"-loglevel",
				"error",
				"-i",
				"pipe:0",
				"-f",
				"s16le",
				"-acodec",
				"pcm_s16le",
				"-ar",
			])
			.arg(SAMPLE_RATE.to_string())
			.arg("-ac")
			.arg(CHANNELS.to_string())
			.arg("pipe:1")
			.stdin(std::process::Stdio::piped())
			.stdout(std::process::Stdio::piped())
			.stderr(std::process::Stdio::piped())
			.spawn()
			.map_err(|e| {
				CoreError::Internal(format!("failed to spawn transcoder '{}': {e}", self.bin))
			})?;

		let mut stdin = child
			.stdin
			.take()
			.ok_or_else(|| CoreError::Internal("transcoder stdin unavailable".to_string()))?;

		let input = input.to_vec();
		let writer = tokio::spawn(async move {
			let _ = stdin.write_all(&input).await;
			// Dropping stdin closes the pipe and lets the decoder finish
		});

		let output = child
			.wait_with_output()
			.await
			.map_err(|e| CoreError::Internal(format!("transcoder I/O failed: {e}")))?;
		let _ = writer.await;

		if !output.status.success() {
			let stderr = String::from_utf8_lossy(&output.stderr);
			tracing::error!(status = ?output.status, %stderr, "Transcoder failed");
			return Err(CoreError::BadRequest("unsupported audio input".to_string()));
		}

		Ok(pcm_from_s16le(&output.stdout))
	}
}

/// Interpret raw s16le bytes as interleaved PCM; a trailing odd byte is
/// dropped.
pub fn pcm_from_s16le(raw: &[u8]) -> PcmAudio {
	let samples = raw
		.chunks_exact(2)
		.map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
		.collect();

	PcmAudio {
		sample_rate: SAMPLE_RATE,
		channels: CHANNELS,
		samples,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn s16le_parsing_is_little_endian() {
		let pcm = pcm_from_s16le(&[0x01, 0x00, 0xFF, 0x7F, 0x00, 0x80, 0xEE]);
		assert_eq!(pcm.samples, vec![1, i16::MAX, i16::MIN]);
		assert_eq!(pcm.channels, CHANNELS);
		assert_eq!(pcm.sample_rate, SAMPLE_RATE);
	}
}
