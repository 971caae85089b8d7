//! TOTP verification and MFA secret sealing
//!
//! Code verification is RFC 6238 (HMAC-SHA1, 30 s step, 6 digits, ±1 step
//! window). Enrolment is handled outside this core; the server only ever
//! verifies codes against a secret it unseals from the user record.
//!
//! Secrets rest AES-256-GCM sealed under a key derived from the master
//! secret, so a leaked user store does not leak TOTP seeds.

use aes_gcm::{
	aead::{Aead, KeyInit},
	Aes256Gcm, Nonce,
};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha1::Sha1;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::crypto::errors::{CryptoError, CryptoResult};

type HmacSha1 = Hmac<Sha1>;

/// TOTP time step in seconds
pub const STEP_SECS: u64 = 30;

/// Code length in digits
pub const DIGITS: u32 = 6;

/// Accepted step drift in either direction
const DRIFT_STEPS: i64 = 1;

/// AES-GCM nonce length prefixed to sealed secrets
const NONCE_LEN: usize = 12;

/// Compute the TOTP code for a Unix timestamp.
pub fn code_at(secret: &[u8], unix_time: u64) -> String {
	let counter = unix_time / STEP_SECS;

	let mut mac = <HmacSha1 as Mac>::new_from_slice(secret).expect("HMAC accepts any key length");
	mac.update(&counter.to_be_bytes());
	let digest = mac.finalize().into_bytes();

	// RFC 4226 dynamic truncation
	let offset = (digest[digest.len() - 1] & 0x0f) as usize;
	let binary = ((digest[offset] as u32 & 0x7f) << 24)
		| ((digest[offset + 1] as u32) << 16)
		| ((digest[offset + 2] as u32) << 8)
		| (digest[offset + 3] as u32);

	format!("{:06}", binary % 10u32.pow(DIGITS))
}

/// Verify a submitted code, tolerating ±1 time step of drift.
pub fn verify_code(secret: &[u8], code: &str, unix_time: u64) -> bool {
	if code.len() != DIGITS as usize || !code.bytes().all(|b| b.is_ascii_digit()) {
		return false;
	}

	(-DRIFT_STEPS..=DRIFT_STEPS).any(|drift| {
		let shifted = unix_time as i64 + drift * STEP_SECS as i64;
		if shifted < 0 {
			return false;
		}
		let expected = code_at(secret, shifted as u64);
		expected.as_bytes().ct_eq(code.as_bytes()).into()
	})
}

/// Seal an MFA secret for storage: `nonce(12) ∥ AES-256-GCM ciphertext`.
pub fn seal_mfa_secret(wrap_key: &[u8; 32], secret: &[u8]) -> CryptoResult<Vec<u8>> {
	let cipher = Aes256Gcm::new(wrap_key.into());

	let mut nonce = [0u8; NONCE_LEN];
	rand::rngs::OsRng.fill_bytes(&mut nonce);

	let ciphertext = cipher
		.encrypt(Nonce::from_slice(&nonce), secret)
		.map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

	let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
	sealed.extend_from_slice(&nonce);
	sealed.extend_from_slice(&ciphertext);
	Ok(sealed)
}

/// Unseal a stored MFA secret.
pub fn open_mfa_secret(wrap_key: &[u8; 32], sealed: &[u8]) -> CryptoResult<Zeroizing<Vec<u8>>> {
	if sealed.len() < NONCE_LEN {
		return Err(CryptoError::InvalidEnvelope("sealed secret too short".to_string()));
	}
	let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);

	let cipher = Aes256Gcm::new(wrap_key.into());
	let secret = cipher
		.decrypt(Nonce::from_slice(nonce), ciphertext)
		.map_err(|_| CryptoError::Integrity)?;

	Ok(Zeroizing::new(secret))
}
