//! Argon2id password hashing and verification

use argon2::{
	password_hash::{
		rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
	},
	Argon2,
};

use crate::errors::APIError;

/// Hash a password using Argon2id
///
/// # Returns
/// The password hash in PHC string format
///
/// # Security
/// Uses Argon2id with default parameters:
/// - Memory: 19 MiB (19456 KiB)
/// - Iterations: 2
/// - Parallelism: 1
/// - Output: 32 bytes
pub fn hash_password(password: &str) -> Result<String, APIError> {
	let salt = SaltString::generate(&mut OsRng);
	let argon2 = Argon2::default();

	let password_hash = argon2
		.hash_password(password.as_bytes(), &salt)
		.map_err(|e| APIError::Internal(format!("Password hashing failed: {e}")))?
		.to_string();

	Ok(password_hash)
}

/// Verify a password against an Argon2id hash
///
/// # Returns
/// `true` if the password matches, `false` otherwise
pub fn verify_password(hash: &str, password: &str) -> Result<bool, APIError> {
	let parsed_hash = PasswordHash::new(hash)
		.map_err(|e| APIError::Internal(format!("Stored hash is malformed: {e}")))?;

	let result = Argon2::default().verify_password(password.as_bytes(), &parsed_hash);

	Ok(result.is_ok())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_hash_and_verify() {
		let password = "test_password_123";

		let hash = hash_password(password).unwrap();
		assert!(hash.starts_with("$argon2id$"));

		assert!(verify_password(&hash, password).unwrap());
		assert!(!verify_password(&hash, "wrong_password").unwrap());
	}

	#[test]
	fn hashes_are_salted() {
		let a = hash_password("same-password").unwrap();
		let b = hash_password("same-password").unwrap();
		assert_ne!(a, b);
	}
}
