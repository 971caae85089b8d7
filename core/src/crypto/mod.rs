//! # Cryptography Module
//!
//! Core cryptographic functionality for the Sectify streaming pipeline:
//!
//! - **Master secret**: process-wide key material loaded once at startup,
//!   zeroed on shutdown, never emitted
//! - **KDF**: PBKDF2-HMAC-SHA256 derivation of per-file and per-segment
//!   keys with strict purpose separation
//! - **Chaotic cipher**: fixed-point chaotic stream cipher protecting
//!   source audio at rest, wrapped in an HMAC-SHA256 envelope
//! - **Watermark**: inaudible per-session spread-spectrum fingerprint for
//!   leak attribution
//!
//! ## Key Technologies
//!
//! - PBKDF2-HMAC-SHA256 (200k rounds) for key derivation
//! - HKDF-SHA256 for seed expansion (cipher state, watermark payloads)
//! - HMAC-SHA256 for at-rest envelope authentication
//! - AES-128-CBC for HLS segment encryption (see `crate::hls`)
//! - `zeroize` and `secrecy` for key-material hygiene

pub mod chaotic;
pub mod errors;
pub mod kdf;
pub mod master;
pub mod watermark;

pub use errors::{CryptoError, CryptoResult};
pub use master::MasterSecret;

/// Size constants for cryptographic material
pub mod sizes {
	/// Derived key size for at-rest encryption (32 bytes)
	pub const DERIVED_KEY_SIZE: usize = 32;

	/// AES-128 segment key size (16 bytes)
	pub const SEGMENT_KEY_SIZE: usize = 16;

	/// Per-file cipher nonce size (16 bytes)
	pub const FILE_NONCE_SIZE: usize = 16;

	/// HMAC-SHA256 envelope tag size (32 bytes)
	pub const ENVELOPE_TAG_SIZE: usize = 32;

	/// Truncated IP hash size (first 16 bytes of SHA-256)
	pub const IP_HASH_SIZE: usize = 16;

	/// Access grant session id size (32 bytes of CSPRNG output)
	pub const SESSION_ID_SIZE: usize = 32;

	/// Key alias size (128 bits)
	pub const ALIAS_SIZE: usize = 16;
}
