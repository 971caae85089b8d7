use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;

use sectify_core::Ctx;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::middleware::rate_limit::RateLimiter;

/// Application state wrapping the core Ctx with server-specific state
#[derive(Clone)]
pub struct AppState {
	pub ctx: Arc<Ctx>,
	pub rate_limiter: RateLimiter,
	packaging_locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl AppState {
	pub fn new(ctx: Arc<Ctx>) -> Self {
		Self {
			ctx,
			rate_limiter: RateLimiter::new(),
			packaging_locks: Arc::new(Mutex::new(HashMap::new())),
		}
	}

	/// Single-flight guard for packaging one `(track, session)`: a second
	/// concurrent packaging run waits here and then observes the first
	/// run's cached render instead of racing it on disk.
	pub async fn lock_packaging(&self, track_id: &str, session_id: &str) -> OwnedMutexGuard<()> {
		let key = format!("{track_id}:{session_id}");
		let lock = {
			let mut locks = self.packaging_locks.lock().await;
			locks
				.entry(key)
				.or_insert_with(|| Arc::new(Mutex::new(())))
				.clone()
		};
		lock.lock_owned().await
	}
}

// Transparent access to Ctx fields
impl Deref for AppState {
	type Target = Ctx;

	fn deref(&self) -> &Self::Target {
		&self.ctx
	}
}
