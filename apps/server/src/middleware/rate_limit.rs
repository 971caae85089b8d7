//! Rate limiting for authentication endpoints
//!
//! Prevents credential brute force by limiting login attempts per
//! username/IP pair: 5 attempts per 60-second window, in-memory, with a
//! background cleanup task. Successful login clears the counter.

use std::{
	collections::HashMap,
	sync::Arc,
	time::{Duration, Instant},
};

use tokio::sync::RwLock;

use crate::errors::APIError;

const MAX_ATTEMPTS: usize = 5;
const WINDOW_DURATION: Duration = Duration::from_secs(60);

/// Tracks attempts for one identifier
#[derive(Debug, Clone, Default)]
struct AttemptRecord {
	attempts: Vec<Instant>,
}

impl AttemptRecord {
	fn record_attempt(&mut self, now: Instant) {
		self.attempts
			.retain(|&attempt| now.duration_since(attempt) < WINDOW_DURATION);
		self.attempts.push(now);
	}

	fn is_rate_limited(&self, now: Instant) -> bool {
		self.attempts
			.iter()
			.filter(|&&attempt| now.duration_since(attempt) < WINDOW_DURATION)
			.count() >= MAX_ATTEMPTS
	}

	fn time_until_reset(&self, now: Instant) -> Option<Duration> {
		let oldest = self
			.attempts
			.iter()
			.filter(|&&attempt| now.duration_since(attempt) < WINDOW_DURATION)
			.min()?;
		Some(WINDOW_DURATION.saturating_sub(now.duration_since(*oldest)))
	}
}

/// In-memory rate limiter
#[derive(Clone)]
pub struct RateLimiter {
	store: Arc<RwLock<HashMap<String, AttemptRecord>>>,
}

impl RateLimiter {
	pub fn new() -> Self {
		let limiter = Self {
			store: Arc::new(RwLock::new(HashMap::new())),
		};

		let store = Arc::clone(&limiter.store);
		tokio::spawn(async move {
			cleanup_task(store).await;
		});

		limiter
	}

	/// Record an attempt and report whether the identifier is over limit.
	pub async fn check_rate_limit(&self, identifier: &str) -> Result<(), u64> {
		let now = Instant::now();
		let mut store = self.store.write().await;
		let record = store.entry(identifier.to_string()).or_default();

		if record.is_rate_limited(now) {
			let retry_after = record
				.time_until_reset(now)
				.unwrap_or(WINDOW_DURATION)
				.as_secs()
				.max(1);
			Err(retry_after)
		} else {
			record.record_attempt(now);
			Ok(())
		}
	}

	/// Clear the counter after a successful login.
	pub async fn clear_rate_limit(&self, identifier: &str) {
		self.store.write().await.remove(identifier);
	}
}

impl Default for RateLimiter {
	fn default() -> Self {
		Self::new()
	}
}

async fn cleanup_task(store: Arc<RwLock<HashMap<String, AttemptRecord>>>) {
	let mut interval = tokio::time::interval(Duration::from_secs(5 * 60));

	loop {
		interval.tick().await;

		let now = Instant::now();
		let mut store = store.write().await;
		store.retain(|_, record| {
			record
				.attempts
				.iter()
				.any(|&attempt| now.duration_since(attempt) < WINDOW_DURATION)
		});

		tracing::debug!(remaining_entries = store.len(), "Rate limiter cleanup completed");
	}
}

/// Gate a login attempt on the username/IP pair.
pub async fn check_login_rate_limit(
	rate_limiter: &RateLimiter,
	username: &str,
	ip_addr: &str,
) -> Result<(), APIError> {
	let identifier = format!("{username}:{ip_addr}");

	rate_limiter
		.check_rate_limit(&identifier)
		.await
		.map_err(|retry_after_seconds| {
			tracing::warn!(username, ip_addr, "Login rate limit exceeded");
			APIError::RateLimited {
				retry_after_seconds,
			}
		})
}

/// Clear the counter after a successful login.
pub async fn clear_login_rate_limit(rate_limiter: &RateLimiter, username: &str, ip_addr: &str) {
	rate_limiter
		.clear_rate_limit(&format!("{username}:{ip_addr}"))
		.await;
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn sixth_attempt_in_window_is_limited() {
		let limiter = RateLimiter::new();
		let identifier = "user@example.com:127.0.0.1";

		for attempt in 0..MAX_ATTEMPTS {
			assert!(
				limiter.check_rate_limit(identifier).await.is_ok(),
				"attempt {} should pass",
				attempt + 1
			);
		}

		let retry_after = limiter
			.check_rate_limit(identifier)
			.await
			.expect_err("sixth attempt should be limited");
		assert!(retry_after > 0);
	}

	#[tokio::test]
	async fn clear_resets_the_window() {
		let limiter = RateLimiter::new();
		let identifier = "user@example.com:127.0.0.1";

		for _ in 0..MAX_ATTEMPTS {
			let _ = limiter.check_rate_limit(identifier).await;
		}
		assert!(limiter.check_rate_limit(identifier).await.is_err());

		limiter.clear_rate_limit(identifier).await;
		assert!(limiter.check_rate_limit(identifier).await.is_ok());
	}

	#[tokio::test]
	async fn identifiers_are_isolated() {
		let limiter = RateLimiter::new();

		for _ in 0..MAX_ATTEMPTS {
			let _ = limiter.check_rate_limit("alice:10.0.0.1").await;
		}

		assert!(limiter.check_rate_limit("alice:10.0.0.1").await.is_err());
		assert!(limiter.check_rate_limit("bob:10.0.0.1").await.is_ok());
		assert!(limiter.check_rate_limit("alice:10.0.0.2").await.is_ok());
	}
}
