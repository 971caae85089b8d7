//! Track catalog endpoints: public listing, upload, metadata update, and
//! deletion.

use axum::{
	extract::{ConnectInfo, DefaultBodyLimit, Multipart, Path, State},
	http::StatusCode,
	middleware,
	routing::{get, patch, post},
	Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use sectify_core::{
	auth::{AuthorizationService, Operation},
	services::ingest,
	store::entity::TrackSummary,
};

use crate::{
	config::state::AppState,
	errors::{APIError, APIResult},
	http_server::SectifyRequestInfo,
	middleware::auth::{auth_middleware, RequestContext},
};

/// Upload cap: 50 MiB of source audio
const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

pub(crate) fn mount(app_state: AppState) -> Router<AppState> {
	let public = Router::new()
		.route("/audio/tracks/public", get(list_public_tracks))
		.with_state(app_state.clone());

	let protected = Router::new()
		.route("/audio/upload", post(upload_track))
		.layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
		.route(
			"/audio/tracks/{track_id}",
			patch(update_track).delete(delete_track),
		)
		.layer(middleware::from_fn_with_state(
			app_state.clone(),
			auth_middleware,
		))
		.with_state(app_state);

	public.merge(protected)
}

#[utoipa::path(
	get,
	path = "/api/v1/audio/tracks/public",
	tag = "audio",
	responses(
		(status = 200, description = "All public track summaries"),
	)
)]
async fn list_public_tracks(
	State(state): State<AppState>,
) -> APIResult<Json<Vec<TrackSummary>>> {
	let tracks = state.tracks.list_public().await;
	Ok(Json(tracks.iter().map(TrackSummary::from).collect()))
}

#[derive(Serialize, ToSchema)]
pub struct UploadResponse {
	pub track_id: String,
}

#[utoipa::path(
	post,
	path = "/api/v1/audio/upload",
	tag = "audio",
	responses(
		(status = 201, description = "Track ingested and encrypted at rest", body = UploadResponse),
		(status = 400, description = "Missing or empty audio part"),
		(status = 401, description = "Not authenticated"),
	)
)]
async fn upload_track(
	State(state): State<AppState>,
	Extension(req): Extension<RequestContext>,
	mut upload: Multipart,
) -> APIResult<(StatusCode, Json<UploadResponse>)> {
	let mut title: Option<String> = None;
	let mut audio: Option<Vec<u8>> = None;

	while let Some(field) = upload
		.next_field()
		.await
		.map_err(|e| APIError::BadRequest(format!("malformed multipart body: {e}")))?
	{
		match field.name() {
			Some("title") => {
				let text = field
					.text()
					.await
					.map_err(|e| APIError::BadRequest(format!("unreadable title: {e}")))?;
				title = Some(text);
			}
			Some("file") => {
				let file_name = field.file_name().map(str::to_string);
				let bytes = field
					.bytes()
					.await
					.map_err(|e| APIError::BadRequest(format!("unreadable file: {e}")))?;
				if title.is_none() {
					title = file_name;
				}
				audio = Some(bytes.to_vec());
			}
			_ => continue,
		}
	}

	let audio = audio
		.ok_or_else(|| APIError::BadRequest("missing 'file' part".to_string()))?;
	let title = title.unwrap_or_else(|| "Untitled".to_string());

	let track = ingest::ingest_upload(&state.ctx, req.user_id(), &title, audio).await?;

	Ok((
		StatusCode::CREATED,
		Json(UploadResponse {
			track_id: track.track_id,
		}),
	))
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateTrackArgs {
	pub title: Option<String>,
	pub is_public: Option<bool>,
}

#[utoipa::path(
	patch,
	path = "/api/v1/audio/tracks/{track_id}",
	tag = "audio",
	params(("track_id" = String, Path, description = "Track ID")),
	request_body = UpdateTrackArgs,
	responses(
		(status = 200, description = "Updated track summary"),
		(status = 403, description = "Caller does not own the track"),
		(status = 404, description = "No such track"),
	)
)]
async fn update_track(
	Path(track_id): Path<String>,
	State(state): State<AppState>,
	ConnectInfo(request_info): ConnectInfo<SectifyRequestInfo>,
	Extension(req): Extension<RequestContext>,
	Json(args): Json<UpdateTrackArgs>,
) -> APIResult<Json<TrackSummary>> {
	AuthorizationService::check_track_access(
		&state.tracks,
		&state.grants,
		&track_id,
		Some(req.user_id()),
		Operation::Write,
		Some(request_info.ip_addr),
	)
	.await?;

	let updated = state
		.tracks
		.update(&track_id, args.title, args.is_public)
		.await?;

	Ok(Json(TrackSummary::from(&updated)))
}

#[utoipa::path(
	delete,
	path = "/api/v1/audio/tracks/{track_id}",
	tag = "audio",
	params(("track_id" = String, Path, description = "Track ID")),
	responses(
		(status = 204, description = "Track, ciphertext, and HLS artifacts removed"),
		(status = 403, description = "Caller does not own the track"),
		(status = 404, description = "No such track"),
	)
)]
async fn delete_track(
	Path(track_id): Path<String>,
	State(state): State<AppState>,
	ConnectInfo(request_info): ConnectInfo<SectifyRequestInfo>,
	Extension(req): Extension<RequestContext>,
) -> APIResult<StatusCode> {
	AuthorizationService::check_track_access(
		&state.tracks,
		&state.grants,
		&track_id,
		Some(req.user_id()),
		Operation::Delete,
		Some(request_info.ip_addr),
	)
	.await?;

	ingest::delete_track(&state.ctx, &track_id).await?;
	Ok(StatusCode::NO_CONTENT)
}
