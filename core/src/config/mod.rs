//! Environment-driven configuration
//!
//! All configuration is loaded once at startup and carried explicitly on the
//! [`Ctx`](crate::context::Ctx); there are no ambient singletons.

pub mod logging;

use std::path::PathBuf;

use crate::error::{CoreError, CoreResult};

/// Minimum accepted master secret length in bytes
pub const MIN_MASTER_SECRET_LEN: usize = 32;

/// Runtime configuration for the Sectify core and server
#[derive(Debug, Clone)]
pub struct SectifyConfig {
	/// Master secret used for all key derivation. Never logged, never
	/// serialized; at least [`MIN_MASTER_SECRET_LEN`] bytes.
	pub master_secret: Vec<u8>,
	/// Root directory for packaged HLS renders
	pub hls_root: PathBuf,
	/// Root directory for encrypted source uploads
	pub upload_root: PathBuf,
	/// Connection string for the external document store. The driver itself
	/// is an external collaborator; the core only carries the URL through.
	pub db_url: String,
	/// Access token TTL in minutes
	pub token_ttl_access_min: i64,
	/// MFA verification token TTL in minutes
	pub token_ttl_mfa_min: i64,
	/// Reaper wake interval in seconds
	pub reaper_interval_s: u64,
	/// Segment age threshold for reaping, in seconds
	pub reaper_age_s: u64,
	/// HTTP listen port
	pub port: u16,
	/// External transcoder binary, invoked as a subprocess to decode
	/// uploads into raw PCM
	pub transcoder_bin: String,
	/// PBKDF2 iteration count. Overridable only so tests can avoid paying
	/// 200k rounds per derivation; production always uses the default.
	pub kdf_iterations: u32,
}

impl SectifyConfig {
	/// Load configuration from the environment.
	///
	/// Required: `MASTER_SECRET` (>= 32 bytes). Everything else falls back
	/// to documented defaults.
	pub fn from_env() -> CoreResult<Self> {
		let master_secret = std::env::var("MASTER_SECRET")
			.map_err(|_| CoreError::InvalidConfig("MASTER_SECRET is not set".to_string()))?
			.into_bytes();

		let config = Self {
			master_secret,
			hls_root: env_path("HLS_ROOT", "hls"),
			upload_root: env_path("UPLOAD_ROOT", "uploads_encrypted"),
			db_url: std::env::var("DB_URL").unwrap_or_default(),
			token_ttl_access_min: env_parse("TOKEN_TTL_ACCESS_MIN", 30),
			token_ttl_mfa_min: env_parse("TOKEN_TTL_MFA_MIN", 5),
			reaper_interval_s: env_parse("REAPER_INTERVAL_S", 120),
			reaper_age_s: env_parse("REAPER_AGE_S", 600),
			port: env_parse("PORT", 10801),
			transcoder_bin: std::env::var("TRANSCODER_BIN")
				.unwrap_or_else(|_| "ffmpeg".to_string()),
			kdf_iterations: crate::crypto::kdf::PBKDF2_ITERATIONS,
		};

		config.validate()?;
		Ok(config)
	}

	/// Validate invariants that would otherwise fail much later
	pub fn validate(&self) -> CoreResult<()> {
		if self.master_secret.len() < MIN_MASTER_SECRET_LEN {
			return Err(CoreError::InvalidConfig(format!(
				"MASTER_SECRET must be at least {} bytes, got {}",
				MIN_MASTER_SECRET_LEN,
				self.master_secret.len()
			)));
		}
		if self.token_ttl_access_min <= 0 || self.token_ttl_mfa_min <= 0 {
			return Err(CoreError::InvalidConfig(
				"token TTLs must be positive".to_string(),
			));
		}
		if self.reaper_interval_s == 0 {
			return Err(CoreError::InvalidConfig(
				"REAPER_INTERVAL_S must be positive".to_string(),
			));
		}
		Ok(())
	}

	/// Configuration for tests: temp-friendly paths and a cheap KDF so unit
	/// tests do not pay 200k PBKDF2 rounds per derivation.
	pub fn debug() -> Self {
		Self {
			master_secret: b"debug-master-secret-0123456789abcdef".to_vec(),
			hls_root: PathBuf::from("hls"),
			upload_root: PathBuf::from("uploads_encrypted"),
			db_url: String::new(),
			token_ttl_access_min: 30,
			token_ttl_mfa_min: 5,
			reaper_interval_s: 120,
			reaper_age_s: 600,
			port: 0,
			transcoder_bin: "ffmpeg".to_string(),
			kdf_iterations: 1_000,
		}
	}
}

fn env_path(key: &str, default: &str) -> PathBuf {
	std::env::var(key)
		.map(PathBuf::from)
		.unwrap_or_else(|_| PathBuf::from(default))
}

fn env_parse<T: std::str::FromStr + Copy>(key: &str, default: T) -> T {
	std::env::var(key)
		.ok()
		.and_then(|raw| raw.parse().ok())
		.unwrap_or(default)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn debug_config_is_valid() {
		SectifyConfig::debug().validate().unwrap();
	}

	#[test]
	fn short_master_secret_is_rejected() {
		let mut config = SectifyConfig::debug();
		config.master_secret = b"too-short".to_vec();

		let result = config.validate();
		assert!(matches!(result, Err(CoreError::InvalidConfig(_))));
	}
}
