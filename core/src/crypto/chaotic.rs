//! Chaotic stream cipher for at-rest audio
//!
//! XORs plaintext with a keystream produced by iterating a 1-D logistic map
//! seeded from `(file_key, file_nonce)`. This is a deterrent and obfuscation
//! layer for files whose primary protection is filesystem ACLs; the
//! HMAC-SHA256 envelope supplies the authenticity the raw stream lacks.
//!
//! All map arithmetic is integer-only in Q2.62 fixed point. IEEE-754 would
//! make the keystream depend on the host's floating-point behavior; two
//! machines must reproduce the identical stream from the same key material.
//!
//! Keystream generation is strictly sequential: the map state chains across
//! the whole file, so decrypting byte N requires iterating through all
//! earlier state. There is deliberately no CTR-style parallel mode.
//!
//! File envelope:
//!
//! ```text
//! magic(4) ∥ version(1) ∥ nonce(16) ∥ ciphertext(N) ∥ HMAC-SHA256(file_key, prior)(32)
//! ```

use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::crypto::{
	errors::{CryptoError, CryptoResult},
	sizes::{ENVELOPE_TAG_SIZE, FILE_NONCE_SIZE},
};

type HmacSha256 = Hmac<Sha256>;

/// Envelope magic: `"SEC"` followed by format id 0x01
pub const MAGIC: [u8; 4] = [0x53, 0x45, 0x43, 0x01];

/// Envelope version
pub const VERSION: u8 = 0x01;

/// Header length: magic ∥ version ∥ nonce
pub const HEADER_LEN: usize = 4 + 1 + FILE_NONCE_SIZE;

/// Fixed-point one in Q2.62
const ONE: u64 = 1 << 62;

/// Iterations of the map per emitted keystream byte
const ITERATIONS_PER_BYTE: usize = 8;

/// Transient iterations discarded before the first output byte, letting the
/// map leave the neighborhood of its seed before any state is observable.
const TRANSIENT_STEPS: usize = 500;

/// Odd diffusion constant for top-byte extraction
const DIFFUSION: u64 = 0x9E37_79B9_7F4A_7C15;

/// Q2.62 multiply. Both operands stay below 4.0 everywhere in the map, so
/// the shifted product always fits back into a u64.
#[inline]
fn qmul(a: u64, b: u64) -> u64 {
	((a as u128 * b as u128) >> 62) as u64
}

/// Deterministic keystream generator over a logistic map in Q2.62.
///
/// The map parameter `r` is confined to [3.8, 4.0) and the initial state to
/// [0.1, 0.9], keeping the iteration inside the chaotic regime and away
/// from fixed points.
pub struct ChaoticKeystream {
	x: u64,
	r: u64,
	reseed: u64,
	counter: u64,
}

impl ChaoticKeystream {
	/// Seed the map from `(file_key, file_nonce)` and run the transient.
	pub fn new(file_key: &[u8], nonce: &[u8; FILE_NONCE_SIZE]) -> Self {
		let hkdf = Hkdf::<Sha256>::new(Some(nonce), file_key);
		let mut okm = Zeroizing::new([0u8; 24]);
		hkdf.expand(b"chaotic-map-seed-v1", okm.as_mut())
			.expect("24 bytes is a valid HKDF-SHA256 output length");

		let state_seed =
			u64::from_be_bytes(okm[0..8].try_into().expect("fixed 8-byte slice"));
		let param_seed =
			u64::from_be_bytes(okm[8..16].try_into().expect("fixed 8-byte slice"));
		let reseed =
			u64::from_be_bytes(okm[16..24].try_into().expect("fixed 8-byte slice"));

		// Seeds as Q2.62 fractions in [0, 1)
		let state_frac = state_seed >> 2;
		let param_frac = param_seed >> 2;

		// x0 in [0.1, 0.9], r in [3.8, 4.0)
		let x = ONE / 10 + qmul(state_frac, (ONE / 10) * 8);
		let r = (ONE / 5) * 19 + qmul(param_frac, ONE / 5);

		let mut stream = Self {
			x,
			r,
			reseed: (reseed & (ONE - 1)) | 1,
			counter: 0,
		};

		for _ in 0..TRANSIENT_STEPS {
			stream.step();
		}

		stream
	}

	#[inline]
	fn step(&mut self) {
		// x' = r·x·(1−x); truncation can only collapse to zero, never to one
		self.x = qmul(self.r, qmul(self.x, ONE - self.x));

		// Low-bit counter perturbation: [3.8, 4.0) contains periodic
		// windows (r ≈ 3.83 among them) that would trap a bare map in a
		// short cycle. Touching only the bottom 10 bits leaves the
		// dynamics intact while making exact cycles impossible.
		self.counter = self.counter.wrapping_add(1);
		self.x ^= self.counter & 0x3FF;

		if self.x == 0 {
			// Escape the absorbing fixed point with key-dependent state
			self.x = self.reseed;
		}
	}

	/// Emit one keystream byte: 8 map iterations, then top-byte extraction
	/// of the diffused state. The raw logistic state is arcsine-distributed;
	/// the odd-constant multiply folds the high-entropy low bits into the
	/// extracted byte, which is what makes the output pass χ² uniformity.
	#[inline]
	pub fn next_byte(&mut self) -> u8 {
		for _ in 0..ITERATIONS_PER_BYTE {
			self.step();
		}
		(self.x.wrapping_mul(DIFFUSION) >> 56) as u8
	}

	/// XOR the keystream into `buf` in place, advancing the chained state.
	pub fn apply(&mut self, buf: &mut [u8]) {
		for byte in buf.iter_mut() {
			*byte ^= self.next_byte();
		}
	}
}

/// Encrypt `plaintext` into a self-describing envelope.
///
/// A fresh 16-byte nonce is drawn per file, so re-encrypting the same
/// plaintext under the same key produces an unrelated ciphertext.
pub fn encrypt(plaintext: &[u8], file_key: &[u8]) -> CryptoResult<Vec<u8>> {
	let mut nonce = [0u8; FILE_NONCE_SIZE];
	rand::rngs::OsRng.fill_bytes(&mut nonce);
	encrypt_with_nonce(plaintext, file_key, &nonce)
}

fn encrypt_with_nonce(
	plaintext: &[u8],
	file_key: &[u8],
	nonce: &[u8; FILE_NONCE_SIZE],
) -> CryptoResult<Vec<u8>> {
	let mut out = Vec::with_capacity(HEADER_LEN + plaintext.len() + ENVELOPE_TAG_SIZE);
	out.extend_from_slice(&MAGIC);
	out.push(VERSION);
	out.extend_from_slice(nonce);
	out.extend_from_slice(plaintext);

	let mut stream = ChaoticKeystream::new(file_key, nonce);
	stream.apply(&mut out[HEADER_LEN..]);

	let mut mac = HmacSha256::new_from_slice(file_key)
		.map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;
	mac.update(&out);
	out.extend_from_slice(&mac.finalize().into_bytes());

	Ok(out)
}

/// Decrypt an envelope produced by [`encrypt`].
///
/// The HMAC is verified (constant-time) over the full header and ciphertext
/// before a single plaintext byte is produced; tampering with any byte of
/// the envelope fails with [`CryptoError::Integrity`].
pub fn decrypt(data: &[u8], file_key: &[u8]) -> CryptoResult<Zeroizing<Vec<u8>>> {
	if data.len() < HEADER_LEN + ENVELOPE_TAG_SIZE {
		return Err(CryptoError::InvalidEnvelope("envelope too short".to_string()));
	}
	if data[..4] != MAGIC {
		return Err(CryptoError::InvalidEnvelope("bad magic".to_string()));
	}
	if data[4] != VERSION {
		return Err(CryptoError::InvalidEnvelope(format!(
			"unsupported version {}",
			data[4]
		)));
	}

	let tag_offset = data.len() - ENVELOPE_TAG_SIZE;
	let (body, tag) = data.split_at(tag_offset);

	let mut mac = HmacSha256::new_from_slice(file_key)
		.map_err(|e| CryptoError::DecryptionFailed(e.to_string()))?;
	mac.update(body);
	mac.verify_slice(tag).map_err(|_| CryptoError::Integrity)?;

	let nonce: [u8; FILE_NONCE_SIZE] = body[5..HEADER_LEN]
		.try_into()
		.expect("header length checked above");

	let mut plaintext = Zeroizing::new(body[HEADER_LEN..].to_vec());
	let mut stream = ChaoticKeystream::new(file_key, &nonce);
	stream.apply(&mut plaintext);

	Ok(plaintext)
}

#[cfg(test)]
mod tests {
	use super::*;

	const KEY: &[u8; 32] = b"0123456789abcdef0123456789abcdef";
	const OTHER_KEY: &[u8; 32] = b"fedcba9876543210fedcba9876543210";

	#[test]
	fn roundtrip() {
		let plaintext = b"An audio blob that deserves at-rest protection".to_vec();
		let envelope = encrypt(&plaintext, KEY).unwrap();

		assert_eq!(&envelope[..4], &MAGIC);
		assert_eq!(envelope[4], VERSION);

		let decrypted = decrypt(&envelope, KEY).unwrap();
		assert_eq!(plaintext, *decrypted);
	}

	#[test]
	fn wrong_key_fails_before_emitting_plaintext() {
		let envelope = encrypt(b"secret", KEY).unwrap();
		let result = decrypt(&envelope, OTHER_KEY);
		assert!(matches!(result, Err(CryptoError::Integrity)));
	}

	#[test]
	fn any_flipped_byte_fails_integrity() {
		let envelope = encrypt(b"tamper target", KEY).unwrap();

		for index in 0..envelope.len() {
			let mut tampered = envelope.clone();
			tampered[index] ^= 0x01;

			let result = decrypt(&tampered, KEY);
			assert!(result.is_err(), "byte {index} accepted after tampering");
		}
	}

	#[test]
	fn keystream_is_deterministic_per_key_and_nonce() {
		let nonce = [3u8; FILE_NONCE_SIZE];
		let mut a = ChaoticKeystream::new(KEY, &nonce);
		let mut b = ChaoticKeystream::new(KEY, &nonce);

		let bytes_a: Vec<u8> = (0..256).map(|_| a.next_byte()).collect();
		let bytes_b: Vec<u8> = (0..256).map(|_| b.next_byte()).collect();
		assert_eq!(bytes_a, bytes_b);

		let mut c = ChaoticKeystream::new(KEY, &[4u8; FILE_NONCE_SIZE]);
		let bytes_c: Vec<u8> = (0..256).map(|_| c.next_byte()).collect();
		assert_ne!(bytes_a, bytes_c);
	}

	#[test]
	fn truncated_envelope_is_rejected() {
		let result = decrypt(&MAGIC, KEY);
		assert!(matches!(result, Err(CryptoError::InvalidEnvelope(_))));
	}

	#[test]
	fn keystream_passes_chi_squared_uniformity() {
		// 1 MiB sample, 256 bins. Critical value for 255 degrees of
		// freedom at 1% significance is 310.457.
		const SAMPLE: usize = 1 << 20;
		let mut stream = ChaoticKeystream::new(KEY, &[7u8; FILE_NONCE_SIZE]);

		let mut counts = [0u64; 256];
		for _ in 0..SAMPLE {
			counts[stream.next_byte() as usize] += 1;
		}

		let expected = SAMPLE as f64 / 256.0;
		let chi2: f64 = counts
			.iter()
			.map(|&count| {
				let delta = count as f64 - expected;
				delta * delta / expected
			})
			.sum();

		assert!(chi2 < 310.457, "χ² = {chi2:.2} exceeds the 1% critical value");
	}
}
