//! Graceful shutdown signal handling

use std::future::Future;

/// Resolve on SIGINT or SIGTERM, then run the provided cleanup before
/// letting the server finish its graceful shutdown.
pub async fn shutdown_signal_with_cleanup<F, Fut>(cleanup: Option<F>)
where
	F: FnOnce() -> Fut,
	Fut: Future<Output = ()>,
{
	let ctrl_c = async {
		tokio::signal::ctrl_c()
			.await
			.expect("Failed to install Ctrl+C handler");
	};

	#[cfg(unix)]
	let terminate = async {
		tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
			.expect("Failed to install SIGTERM handler")
			.recv()
			.await;
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}

	if let Some(cleanup) = cleanup {
		cleanup().await;
	}
}
