//! Master secret handling
//!
//! The master secret is loaded once at startup, held behind `secrecy` so it
//! is zeroed on drop, and is never serialized, logged, or sent anywhere.
//! Every other key in the system is derived from it (see [`crate::crypto::kdf`]);
//! the secret itself never leaves this wrapper.

use secrecy::{ExposeSecret, Secret};
use zeroize::Zeroize;

use crate::crypto::errors::{CryptoError, CryptoResult};

/// Minimum master secret length in bytes
pub const MIN_SECRET_LEN: usize = 32;

/// Process-wide master secret with automatic zeroization on drop
pub struct MasterSecret {
	secret: Secret<Vec<u8>>,
}

impl MasterSecret {
	/// Wrap raw secret bytes, enforcing the minimum length.
	pub fn new(mut bytes: Vec<u8>) -> CryptoResult<Self> {
		if bytes.len() < MIN_SECRET_LEN {
			let actual = bytes.len();
			bytes.zeroize();
			return Err(CryptoError::InvalidKeySize {
				expected: MIN_SECRET_LEN,
				actual,
			});
		}

		Ok(Self {
			secret: Secret::new(bytes),
		})
	}

	/// Expose the secret key material to a derivation function.
	pub fn expose_secret(&self) -> &[u8] {
		self.secret.expose_secret()
	}
}

impl std::fmt::Debug for MasterSecret {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str("MasterSecret(..)")
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rejects_short_secret() {
		let result = MasterSecret::new(b"short".to_vec());
		assert!(result.is_err());
	}

	#[test]
	fn debug_does_not_leak() {
		let secret = MasterSecret::new(vec![7u8; 32]).unwrap();
		let rendered = format!("{secret:?}");
		assert!(!rendered.contains('7'));
	}
}
