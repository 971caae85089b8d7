use std::net::SocketAddr;

use axum::{extract::connect_info::Connected, serve::IncomingStream, Router};
use sectify_core::{SectifyConfig, SectifyCore};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::{
	config::{cors, state::AppState},
	routers,
	utils::shutdown_signal_with_cleanup,
};

/// Server entry errors
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
	#[error("Failed to start server: {0}")]
	ServerStartError(String),
}

pub async fn run_http_server(config: SectifyConfig) -> Result<(), ServerError> {
	let port = config.port;

	let core = SectifyCore::new(config)
		.map_err(|e| ServerError::ServerStartError(e.to_string()))?;

	// The reaper is the only deleter of segment files; start it before the
	// first packaging run can write any.
	let reaper = core.spawn_reaper();

	let app_state = AppState::new(core.get_context());
	let cors_layer = cors::get_cors_layer();

	let app = Router::new()
		.merge(routers::mount(app_state.clone()))
		.with_state(app_state)
		.layer(cors_layer)
		.layer(TraceLayer::new_for_http());

	let cleanup = || async move {
		tracing::info!("Initializing graceful shutdown");
		core.shutdown();
		let _ = reaper.await;
	};

	let addr = SocketAddr::from(([0, 0, 0, 0], port));
	let listener = TcpListener::bind(&addr)
		.await
		.map_err(|e| ServerError::ServerStartError(e.to_string()))?;

	tracing::info!("Sectify HTTP server starting on http://{}", addr);

	axum::serve(
		listener,
		app.into_make_service_with_connect_info::<SectifyRequestInfo>(),
	)
	.with_graceful_shutdown(shutdown_signal_with_cleanup(Some(cleanup)))
	.await
	.map_err(|e| ServerError::ServerStartError(e.to_string()))?;

	Ok(())
}

/// Per-connection request info, used for IP binding throughout the API
#[derive(Clone, Debug)]
pub struct SectifyRequestInfo {
	pub ip_addr: std::net::IpAddr,
}

impl Connected<IncomingStream<'_, TcpListener>> for SectifyRequestInfo {
	fn connect_info(target: IncomingStream<'_, TcpListener>) -> Self {
		SectifyRequestInfo {
			ip_addr: target.remote_addr().ip(),
		}
	}
}
