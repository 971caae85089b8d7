//! Bearer token authentication middleware
//!
//! Verifies the access token (signature, purpose, age, IP binding), checks
//! that its login session is still active — which is what makes
//! `revoke_user_sessions` bite on otherwise-valid JWTs — and loads the
//! user into a request extension.

use axum::{
	body::Body,
	extract::{ConnectInfo, Request, State},
	http::header,
	middleware::Next,
	response::Response,
};

use sectify_core::{auth::TokenPurpose, store::entity::User};

use crate::{
	config::state::AppState,
	errors::{APIError, APIResult},
	http_server::SectifyRequestInfo,
};

/// Authenticated request identity
#[derive(Debug, Clone)]
pub struct RequestContext {
	user: User,
	session_id: String,
}

impl RequestContext {
	pub fn user(&self) -> &User {
		&self.user
	}

	pub fn user_id(&self) -> &str {
		&self.user.user_id
	}

	pub fn session_id(&self) -> &str {
		&self.session_id
	}
}

/// Identity for endpoints that also serve anonymous callers. A present but
/// invalid token is still a 401; only a missing header yields `None`.
#[derive(Debug, Clone, Default)]
pub struct MaybeRequestContext(pub Option<RequestContext>);

pub fn bearer_token(request: &Request<Body>) -> Option<String> {
	let raw = request
		.headers()
		.get(header::AUTHORIZATION)?
		.to_str()
		.ok()?;
	raw.strip_prefix("Bearer ").map(str::to_string)
}

async fn authenticate(
	state: &AppState,
	token: &str,
	request_info: &SectifyRequestInfo,
) -> APIResult<RequestContext> {
	let claims = state
		.tokens
		.verify(token, TokenPurpose::Access, Some(&request_info.ip_addr))?;

	let session_id = claims.session_id.ok_or(APIError::AuthRequired)?;
	if !state.sessions.is_active(&session_id).await {
		tracing::warn!(sub = %claims.sub, "Access token for a revoked session");
		return Err(APIError::AuthRequired);
	}

	let user = state
		.users
		.find_by_id(&claims.sub)
		.await
		.ok_or(APIError::AuthRequired)?;

	Ok(RequestContext { user, session_id })
}

/// Require a valid access token.
pub async fn auth_middleware(
	State(state): State<AppState>,
	ConnectInfo(request_info): ConnectInfo<SectifyRequestInfo>,
	mut request: Request<Body>,
	next: Next,
) -> APIResult<Response> {
	let token = bearer_token(&request).ok_or(APIError::AuthRequired)?;
	let context = authenticate(&state, &token, &request_info).await?;

	request.extensions_mut().insert(context);
	Ok(next.run(request).await)
}

/// Accept anonymous callers, but reject bad tokens outright.
pub async fn soft_auth_middleware(
	State(state): State<AppState>,
	ConnectInfo(request_info): ConnectInfo<SectifyRequestInfo>,
	mut request: Request<Body>,
	next: Next,
) -> APIResult<Response> {
	let context = match bearer_token(&request) {
		Some(token) => {
			MaybeRequestContext(Some(authenticate(&state, &token, &request_info).await?))
		}
		None => MaybeRequestContext(None),
	};

	request.extensions_mut().insert(context);
	Ok(next.run(request).await)
}
