//! Sectify core
//!
//! The cryptographic and authorization heart of the Sectify secure audio
//! streaming platform: per-file chaotic encryption at rest, per-session
//! watermarking, HLS packaging with just-in-time key delivery, centralized
//! track authorization, and the background segment reaper.

pub mod auth;
pub mod config;
pub mod context;
pub mod crypto;
pub mod error;
pub mod hls;
pub mod services;
pub mod store;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

pub use config::SectifyConfig;
pub use context::Ctx;
pub use error::{CoreError, CoreResult};

/// Owner of the long-lived context and background tasks
pub struct SectifyCore {
	ctx: Arc<Ctx>,
	reaper_cancel: CancellationToken,
}

impl SectifyCore {
	/// Build the core from configuration. Fails fast on an invalid master
	/// secret rather than limping into a server that cannot derive keys.
	pub fn new(config: SectifyConfig) -> CoreResult<Self> {
		config.validate()?;
		let ctx = Ctx::new(config)?.arced();

		Ok(Self {
			ctx,
			reaper_cancel: CancellationToken::new(),
		})
	}

	pub fn get_context(&self) -> Arc<Ctx> {
		self.ctx.clone()
	}

	/// Spawn the segment reaper; it runs until [`SectifyCore::shutdown`].
	pub fn spawn_reaper(&self) -> tokio::task::JoinHandle<()> {
		let config = &self.ctx.config;
		tokio::spawn(hls::reaper::run(
			config.hls_root.clone(),
			config.reaper_interval_s,
			config.reaper_age_s,
			self.reaper_cancel.clone(),
		))
	}

	/// Stop background tasks. The master secret is zeroed when the last
	/// reference to the context drops.
	pub fn shutdown(&self) {
		self.reaper_cancel.cancel();
	}
}
