//! Streaming endpoints: manifest, encrypted segments, and just-in-time
//! key delivery.

use axum::{
	extract::{ConnectInfo, Path, Query, State},
	http::header,
	middleware,
	response::IntoResponse,
	routing::get,
	Extension, Router,
};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use sectify_core::{
	auth::{AuthorizationService, Operation},
	hls::AliasResolution,
	services::playback,
};

use crate::{
	config::state::AppState,
	errors::{APIError, APIResult},
	http_server::SectifyRequestInfo,
	middleware::auth::{soft_auth_middleware, MaybeRequestContext},
};

const MANIFEST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";
const SEGMENT_CONTENT_TYPE: &str = "video/mp2t";

pub(crate) fn mount(app_state: AppState) -> Router<AppState> {
	Router::new()
		.route("/stream/playlist/{track_id}", get(serve_playlist))
		.route("/stream/segment/{track_id}/{n}", get(serve_segment))
		.route("/stream/key/{alias}", get(serve_key))
		.layer(middleware::from_fn_with_state(
			app_state.clone(),
			soft_auth_middleware,
		))
		.with_state(app_state)
}

#[utoipa::path(
	get,
	path = "/api/v1/stream/playlist/{track_id}",
	tag = "stream",
	params(("track_id" = String, Path, description = "Track ID")),
	responses(
		(status = 200, description = "HLS manifest with alias key URI"),
		(status = 401, description = "Anonymous caller on a private track"),
		(status = 403, description = "Authenticated caller without access"),
		(status = 404, description = "No such track"),
		(status = 503, description = "Worker pool saturated; retry later"),
	)
)]
async fn serve_playlist(
	Path(track_id): Path<String>,
	State(state): State<AppState>,
	ConnectInfo(request_info): ConnectInfo<SectifyRequestInfo>,
	Extension(maybe_user): Extension<MaybeRequestContext>,
) -> APIResult<impl IntoResponse> {
	let user_id = maybe_user.0.as_ref().map(|req| req.user_id().to_string());

	let (track, grant) = AuthorizationService::check_track_access(
		&state.tracks,
		&state.grants,
		&track_id,
		user_id.as_deref(),
		Operation::Stream,
		Some(request_info.ip_addr),
	)
	.await?;

	// Serialize packaging per (track, session); the second flight sees the
	// first one's cached render.
	let _guard = state.lock_packaging(&track.track_id, &grant.session_id).await;
	let render =
		playback::prepare_render(&state.ctx, &track, &grant, CancellationToken::new())
			.await?;

	Ok((
		[(header::CONTENT_TYPE, MANIFEST_CONTENT_TYPE)],
		render.playlist.clone(),
	))
}

#[derive(Deserialize)]
struct SegmentQuery {
	session: String,
}

#[utoipa::path(
	get,
	path = "/api/v1/stream/segment/{track_id}/{n}",
	tag = "stream",
	params(
		("track_id" = String, Path, description = "Track ID"),
		("n" = usize, Path, description = "Segment index"),
		("session" = String, Query, description = "Grant session id from the manifest"),
	),
	responses(
		(status = 200, description = "Encrypted segment bytes"),
		(status = 403, description = "Session binding failed"),
		(status = 404, description = "Unknown track, session, or segment"),
	)
)]
async fn serve_segment(
	Path((track_id, n)): Path<(String, usize)>,
	Query(query): Query<SegmentQuery>,
	State(state): State<AppState>,
	ConnectInfo(request_info): ConnectInfo<SectifyRequestInfo>,
	Extension(maybe_user): Extension<MaybeRequestContext>,
) -> APIResult<impl IntoResponse> {
	let grant = state
		.grants
		.validate_for_stream(&query.session, &track_id, Some(request_info.ip_addr))
		.await
		.ok_or_else(|| APIError::NotFound("Segment".to_string()))?;

	// When the caller is authenticated the grant must actually be theirs
	if let (Some(req), Some(grant_user)) = (maybe_user.0.as_ref(), grant.user_id.as_deref()) {
		if req.user_id() != grant_user {
			return Err(APIError::Forbidden);
		}
	}

	let render = state
		.renders
		.get(&track_id, &grant.session_id)
		.await
		.ok_or_else(|| APIError::NotFound("Segment".to_string()))?;

	let bytes = playback::read_segment(&render, n).await?;
	Ok(([(header::CONTENT_TYPE, SEGMENT_CONTENT_TYPE)], bytes))
}

#[utoipa::path(
	get,
	path = "/api/v1/stream/key/{alias}",
	tag = "stream",
	params(("alias" = String, Path, description = "Key alias from the manifest")),
	responses(
		(status = 200, description = "16 raw bytes of segment key"),
		(status = 403, description = "Binding check failed"),
		(status = 404, description = "Unknown or expired alias"),
	)
)]
async fn serve_key(
	Path(alias): Path<String>,
	State(state): State<AppState>,
	ConnectInfo(request_info): ConnectInfo<SectifyRequestInfo>,
	Extension(maybe_user): Extension<MaybeRequestContext>,
) -> APIResult<impl IntoResponse> {
	let caller_ip_hash = state.tokens.ip_hash_raw(&request_info.ip_addr);
	let caller_user = maybe_user.0.as_ref().map(|req| req.user_id().to_string());

	match state
		.aliases
		.resolve(&alias, Some(caller_ip_hash), caller_user.as_deref())
		.await
	{
		AliasResolution::Key(key) => Ok((
			[(header::CONTENT_TYPE, "application/octet-stream")],
			key.to_vec(),
		)),
		// Same body and headers as any other 403; existence stays hidden
		AliasResolution::Denied => Err(APIError::Forbidden),
		AliasResolution::NotFound => Err(APIError::NotFound("Key".to_string())),
	}
}
