use axum::Router;

use crate::config::state::AppState;

mod api;

pub(crate) fn mount(app_state: AppState) -> Router<AppState> {
	Router::new().merge(api::mount(app_state))
}
