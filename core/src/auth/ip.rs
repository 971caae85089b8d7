//! IP binding helpers
//!
//! Tokens and key aliases are bound to the originating address without ever
//! storing the raw IP: the binding is a truncated `SHA-256(ip ∥ secret)`.
//! Access grants use a looser prefix match (first two IPv4 octets, first 32
//! IPv6 bits) so legitimate mobile roamers are not dropped mid-stream.

use std::net::IpAddr;

use sha2::{Digest, Sha256};

use crate::crypto::sizes::IP_HASH_SIZE;

/// First 16 bytes of `SHA-256(ip ∥ secret)`
pub fn ip_hash(secret: &[u8], ip: &IpAddr) -> [u8; IP_HASH_SIZE] {
	let mut hasher = Sha256::new();
	hasher.update(ip.to_string().as_bytes());
	hasher.update(secret);
	let digest = hasher.finalize();

	let mut out = [0u8; IP_HASH_SIZE];
	out.copy_from_slice(&digest[..IP_HASH_SIZE]);
	out
}

/// Prefix match used for grant validation: first two octets of IPv4,
/// first 32 bits of IPv6. Mixed address families never match.
pub fn ip_prefix_matches(minted: &IpAddr, caller: &IpAddr) -> bool {
	match (minted, caller) {
		(IpAddr::V4(a), IpAddr::V4(b)) => a.octets()[..2] == b.octets()[..2],
		(IpAddr::V6(a), IpAddr::V6(b)) => a.octets()[..4] == b.octets()[..4],
		_ => false,
	}
}
