//! Cryptography error types

use thiserror::Error;

/// Result type for cryptographic operations
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors that can occur during cryptographic operations
#[derive(Debug, Error)]
pub enum CryptoError {
	/// Invalid key size
	#[error("Invalid key size: expected {expected}, got {actual}")]
	InvalidKeySize { expected: usize, actual: usize },

	/// Envelope authentication failed. Raised before any plaintext byte is
	/// emitted; the message deliberately carries no detail.
	#[error("Integrity verification failed")]
	Integrity,

	/// Envelope is structurally invalid (truncated, bad magic, bad version)
	#[error("Invalid envelope: {0}")]
	InvalidEnvelope(String),

	/// Key derivation failed
	#[error("Key derivation failed: {0}")]
	KeyDerivationFailed(String),

	/// Encryption failed
	#[error("Encryption failed: {0}")]
	EncryptionFailed(String),

	/// Decryption failed
	#[error("Decryption failed: {0}")]
	DecryptionFailed(String),

	/// Audio input not usable for watermarking
	#[error("Unsupported audio: {0}")]
	UnsupportedAudio(String),
}
