use axum::Router;

use crate::config::state::AppState;

pub(crate) mod audio;
pub(crate) mod auth;
pub(crate) mod stream;

pub(crate) fn mount(app_state: AppState) -> Router<AppState> {
	Router::new()
		.merge(auth::mount(app_state.clone()))
		.merge(audio::mount(app_state.clone()))
		.merge(stream::mount(app_state))
}
