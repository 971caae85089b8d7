//! HS256 session tokens
//!
//! Two token purposes exist: short-lived MFA verification tokens and access
//! tokens. Both are symmetric HS256 JWTs signed with a key derived from the
//! master secret under the `session-bind` purpose.
//!
//! A token is valid iff the signature verifies, the purpose matches the
//! endpoint's required purpose, `exp` is in the future, the absolute age
//! (now − iat) does not exceed 24 hours, and — when both sides carry one —
//! the embedded IP hash matches the caller's. Clock skew tolerance: 30 s.

use std::net::IpAddr;

use chrono::{DateTime, Duration, Utc};
use hkdf::Hkdf;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::{
	auth::ip::ip_hash,
	crypto::kdf::Kdf,
	error::{CoreError, CoreResult},
};

/// Hard ceiling on token age regardless of `exp`
pub const MAX_TOKEN_AGE_SECS: i64 = 86_400;

/// Accepted clock skew in seconds
pub const LEEWAY_SECS: u64 = 30;

/// What a token is allowed to be used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
	/// Full API access
	Access,
	/// Only valid at the 2FA verification endpoint
	MfaVerification,
}

/// Signed token payload
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenClaims {
	/// Subject (user id)
	pub sub: String,
	/// Purpose discriminator; endpoints require an exact match
	pub purpose: TokenPurpose,
	/// Issued at (Unix timestamp)
	pub iat: i64,
	/// Expiry (Unix timestamp)
	pub exp: i64,
	/// Truncated hash of the issuing IP, hex
	#[serde(skip_serializing_if = "Option::is_none")]
	pub ip_hash: Option<String>,
	/// Login session this token belongs to (access tokens only)
	#[serde(skip_serializing_if = "Option::is_none")]
	pub session_id: Option<String>,
}

/// A freshly issued token plus its expiry
#[derive(Debug)]
pub struct IssuedToken {
	pub token: String,
	pub expires_at: DateTime<Utc>,
}

/// Issues and verifies session tokens
pub struct TokenService {
	signing_key: Zeroizing<[u8; 32]>,
	binding_secret: Zeroizing<[u8; 32]>,
	access_ttl: Duration,
	mfa_ttl: Duration,
}

impl TokenService {
	/// Derive the signing and IP-binding keys from the KDF's session-bind
	/// purpose. The two keys are expanded separately so neither can stand
	/// in for the other.
	pub fn new(kdf: &Kdf, access_ttl_min: i64, mfa_ttl_min: i64) -> Self {
		let root = kdf.session_bind_key();
		let hkdf = Hkdf::<Sha256>::new(None, root.as_ref());

		let mut signing_key = Zeroizing::new([0u8; 32]);
		hkdf.expand(b"jwt-hs256", signing_key.as_mut())
			.expect("32 bytes is a valid HKDF-SHA256 output length");

		let mut binding_secret = Zeroizing::new([0u8; 32]);
		hkdf.expand(b"ip-binding", binding_secret.as_mut())
			.expect("32 bytes is a valid HKDF-SHA256 output length");

		Self {
			signing_key,
			binding_secret,
			access_ttl: Duration::minutes(access_ttl_min),
			mfa_ttl: Duration::minutes(mfa_ttl_min),
		}
	}

	/// IP hash under the service's binding secret
	pub fn ip_hash_raw(&self, ip: &IpAddr) -> [u8; crate::crypto::sizes::IP_HASH_SIZE] {
		ip_hash(self.binding_secret.as_ref(), ip)
	}

	/// Hex IP hash under the service's binding secret
	pub fn ip_hash_hex(&self, ip: &IpAddr) -> String {
		hex::encode(self.ip_hash_raw(ip))
	}

	/// Issue a 30-minute access token bound to a login session and IP.
	pub fn issue_access(
		&self,
		user_id: &str,
		session_id: &str,
		ip: Option<&IpAddr>,
	) -> CoreResult<IssuedToken> {
		self.issue_at(
			TokenPurpose::Access,
			user_id,
			Some(session_id),
			ip,
			self.access_ttl,
			Utc::now(),
		)
	}

	/// Issue a 5-minute token accepted only by the 2FA verify endpoint.
	pub fn issue_mfa(&self, user_id: &str, ip: Option<&IpAddr>) -> CoreResult<IssuedToken> {
		self.issue_at(TokenPurpose::MfaVerification, user_id, None, ip, self.mfa_ttl, Utc::now())
	}

	fn issue_at(
		&self,
		purpose: TokenPurpose,
		user_id: &str,
		session_id: Option<&str>,
		ip: Option<&IpAddr>,
		ttl: Duration,
		now: DateTime<Utc>,
	) -> CoreResult<IssuedToken> {
		let expires_at = now + ttl;
		let claims = TokenClaims {
			sub: user_id.to_string(),
			purpose,
			iat: now.timestamp(),
			exp: expires_at.timestamp(),
			ip_hash: ip.map(|ip| self.ip_hash_hex(ip)),
			session_id: session_id.map(str::to_string),
		};

		let token = encode(
			&Header::new(Algorithm::HS256),
			&claims,
			&EncodingKey::from_secret(self.signing_key.as_ref()),
		)
		.map_err(|e| CoreError::Internal(format!("failed to sign token: {e}")))?;

		Ok(IssuedToken { token, expires_at })
	}

	/// Verify a token for the given purpose and caller IP.
	///
	/// Every failure maps to [`CoreError::AuthRequired`]; callers cannot
	/// distinguish a bad signature from a stale or misbound token.
	pub fn verify(
		&self,
		token: &str,
		required: TokenPurpose,
		caller_ip: Option<&IpAddr>,
	) -> CoreResult<TokenClaims> {
		let mut validation = Validation::new(Algorithm::HS256);
		validation.leeway = LEEWAY_SECS;
		validation.set_required_spec_claims(&["exp"]);

		let data = decode::<TokenClaims>(
			token,
			&DecodingKey::from_secret(self.signing_key.as_ref()),
			&validation,
		)
		.map_err(|error| {
			tracing::debug!(?error, "Token rejected");
			CoreError::AuthRequired
		})?;
		let claims = data.claims;

		if claims.purpose != required {
			tracing::warn!(
				purpose = ?claims.purpose,
				required = ?required,
				"Token presented for the wrong purpose"
			);
			return Err(CoreError::AuthRequired);
		}

		// Absolute age ceiling: a token older than a day is dead even if
		// its exp claim says otherwise.
		let age = Utc::now().timestamp() - claims.iat;
		if age > MAX_TOKEN_AGE_SECS + LEEWAY_SECS as i64 || age < -(LEEWAY_SECS as i64) {
			tracing::warn!(age, sub = %claims.sub, "Token outside the permitted age window");
			return Err(CoreError::AuthRequired);
		}

		if let (Some(bound), Some(ip)) = (claims.ip_hash.as_deref(), caller_ip) {
			if bound != self.ip_hash_hex(ip) {
				tracing::warn!(sub = %claims.sub, "Token IP binding mismatch");
				return Err(CoreError::AuthRequired);
			}
		}

		Ok(claims)
	}
}
