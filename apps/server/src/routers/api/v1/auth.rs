//! Authentication endpoints: signup, login, 2FA verification, password
//! change, and bulk logout.

use axum::{
	extract::{ConnectInfo, State},
	http::{header, HeaderMap, StatusCode},
	middleware,
	routing::post,
	Extension, Form, Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use sectify_core::{
	auth::{totp, TokenPurpose},
	store::entity::User,
};

use crate::{
	config::state::AppState,
	errors::{APIError, APIResult},
	http_server::SectifyRequestInfo,
	middleware::{
		auth::{auth_middleware, RequestContext},
		rate_limit::{check_login_rate_limit, clear_login_rate_limit},
	},
	utils::{hash_password, verify_password},
};

pub(crate) fn mount(app_state: AppState) -> Router<AppState> {
	let public = Router::new()
		.route("/auth/signup", post(signup))
		.route("/auth/login", post(login))
		.route("/auth/login/verify-2fa", post(verify_2fa))
		.with_state(app_state.clone());

	let protected = Router::new()
		.route("/auth/change-password", post(change_password))
		.route("/auth/logout-all", post(logout_all))
		.layer(middleware::from_fn_with_state(
			app_state.clone(),
			auth_middleware,
		))
		.with_state(app_state);

	public.merge(protected)
}

#[derive(Deserialize, ToSchema)]
pub struct SignupArgs {
	pub name: String,
	pub email: String,
	pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct SignupResponse {
	pub user_id: String,
}

#[utoipa::path(
	post,
	path = "/api/v1/auth/signup",
	tag = "auth",
	request_body = SignupArgs,
	responses(
		(status = 201, description = "Account created", body = SignupResponse),
		(status = 400, description = "Invalid name, email, or password"),
		(status = 409, description = "Email already registered"),
	)
)]
async fn signup(
	State(state): State<AppState>,
	Json(args): Json<SignupArgs>,
) -> APIResult<(StatusCode, Json<SignupResponse>)> {
	let SignupArgs {
		name,
		email,
		password,
	} = args;

	if name.trim().is_empty() {
		return Err(APIError::BadRequest("name must not be empty".to_string()));
	}
	if !email.contains('@') {
		return Err(APIError::BadRequest("invalid email address".to_string()));
	}
	if password.len() < 8 {
		return Err(APIError::BadRequest(
			"password must be at least 8 characters".to_string(),
		));
	}

	// Argon2id is deliberately slow; keep it off the dispatcher
	let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
		.await
		.map_err(|e| APIError::Internal(format!("hashing task panicked: {e}")))??;

	let user = state
		.users
		.create(User {
			user_id: Uuid::new_v4().to_string(),
			name: name.trim().to_string(),
			email: email.trim().to_lowercase(),
			password_hash,
			mfa_secret: None,
			created_at: Utc::now(),
		})
		.await?;

	tracing::info!(user_id = %user.user_id, "New account registered");

	Ok((
		StatusCode::CREATED,
		Json(SignupResponse {
			user_id: user.user_id,
		}),
	))
}

#[derive(Deserialize, ToSchema)]
pub struct LoginArgs {
	pub username: String,
	pub password: String,
}

#[derive(Serialize, ToSchema)]
#[serde(untagged)]
pub enum LoginResponse {
	/// Password accepted but 2FA is enrolled; finish at the verify endpoint
	MfaRequired {
		mfa_required: bool,
		mfa_token: String,
	},
	/// Fully authenticated
	Access { access_token: String },
}

#[utoipa::path(
	post,
	path = "/api/v1/auth/login",
	tag = "auth",
	responses(
		(status = 200, description = "Either an access token or an MFA challenge", body = LoginResponse),
		(status = 401, description = "Unknown user or wrong password"),
		(status = 429, description = "Too many attempts for this username/IP"),
	)
)]
async fn login(
	State(state): State<AppState>,
	ConnectInfo(request_info): ConnectInfo<SectifyRequestInfo>,
	Form(args): Form<LoginArgs>,
) -> APIResult<Json<LoginResponse>> {
	let ip = request_info.ip_addr;
	check_login_rate_limit(&state.rate_limiter, &args.username, &ip.to_string()).await?;

	let user = state
		.users
		.find_by_email(&args.username.trim().to_lowercase())
		.await;

	// Verify against a dummy hash when the user is unknown so response
	// timing does not distinguish the two failure modes.
	let (password_hash, known_user) = match &user {
		Some(user) => (user.password_hash.clone(), true),
		None => (dummy_hash(), false),
	};
	let password = args.password.clone();
	let verified = tokio::task::spawn_blocking(move || verify_password(&password_hash, &password))
		.await
		.map_err(|e| APIError::Internal(format!("verification task panicked: {e}")))??;

	if !verified || !known_user {
		tracing::warn!(username = %args.username, ip = %ip, "Failed login attempt");
		return Err(APIError::AuthRequired);
	}
	let user = user.expect("known_user implies presence");

	clear_login_rate_limit(&state.rate_limiter, &args.username, &ip.to_string()).await;

	if user.mfa_secret.is_some() {
		let issued = state.tokens.issue_mfa(&user.user_id, Some(&ip))?;
		return Ok(Json(LoginResponse::MfaRequired {
			mfa_required: true,
			mfa_token: issued.token,
		}));
	}

	let session = state
		.sessions
		.create(&user.user_id, state.config.token_ttl_access_min)
		.await;
	let issued = state
		.tokens
		.issue_access(&user.user_id, &session.session_id, Some(&ip))?;

	tracing::info!(user_id = %user.user_id, "Login succeeded");
	Ok(Json(LoginResponse::Access {
		access_token: issued.token,
	}))
}

#[derive(Deserialize, ToSchema)]
pub struct Verify2faArgs {
	pub code: String,
}

#[derive(Serialize, ToSchema)]
pub struct Verify2faResponse {
	pub access_token: String,
}

#[utoipa::path(
	post,
	path = "/api/v1/auth/login/verify-2fa",
	tag = "auth",
	request_body = Verify2faArgs,
	responses(
		(status = 200, description = "Access token issued", body = Verify2faResponse),
		(status = 400, description = "Wrong or malformed code"),
		(status = 401, description = "Missing or invalid MFA token"),
	)
)]
async fn verify_2fa(
	State(state): State<AppState>,
	ConnectInfo(request_info): ConnectInfo<SectifyRequestInfo>,
	headers: HeaderMap,
	Json(args): Json<Verify2faArgs>,
) -> APIResult<Json<Verify2faResponse>> {
	let ip = request_info.ip_addr;

	let token = headers
		.get(header::AUTHORIZATION)
		.and_then(|value| value.to_str().ok())
		.and_then(|value| value.strip_prefix("Bearer "))
		.ok_or(APIError::AuthRequired)?;

	let claims = state
		.tokens
		.verify(token, TokenPurpose::MfaVerification, Some(&ip))?;

	let user = state
		.users
		.find_by_id(&claims.sub)
		.await
		.ok_or(APIError::AuthRequired)?;

	let sealed = user.mfa_secret.as_deref().ok_or_else(|| {
		APIError::BadRequest("2FA is not enrolled for this account".to_string())
	})?;
	let secret = totp::open_mfa_secret(state.mfa_wrap_key(), sealed)
		.map_err(|_| APIError::Integrity)?;

	let now = Utc::now().timestamp().max(0) as u64;
	if !totp::verify_code(&secret, args.code.trim(), now) {
		tracing::warn!(user_id = %user.user_id, "Rejected 2FA code");
		return Err(APIError::BadRequest("invalid 2FA code".to_string()));
	}

	let session = state
		.sessions
		.create(&user.user_id, state.config.token_ttl_access_min)
		.await;
	let issued = state
		.tokens
		.issue_access(&user.user_id, &session.session_id, Some(&ip))?;

	tracing::info!(user_id = %user.user_id, "2FA verification succeeded");
	Ok(Json(Verify2faResponse {
		access_token: issued.token,
	}))
}

#[derive(Deserialize, ToSchema)]
pub struct ChangePasswordArgs {
	pub current_password: String,
	pub new_password: String,
}

#[utoipa::path(
	post,
	path = "/api/v1/auth/change-password",
	tag = "auth",
	request_body = ChangePasswordArgs,
	responses(
		(status = 204, description = "Password changed; all sessions revoked"),
		(status = 401, description = "Not authenticated or wrong current password"),
	)
)]
async fn change_password(
	State(state): State<AppState>,
	Extension(req): Extension<RequestContext>,
	Json(args): Json<ChangePasswordArgs>,
) -> APIResult<StatusCode> {
	if args.new_password.len() < 8 {
		return Err(APIError::BadRequest(
			"password must be at least 8 characters".to_string(),
		));
	}

	let current_hash = req.user().password_hash.clone();
	let current = args.current_password.clone();
	let verified = tokio::task::spawn_blocking(move || verify_password(&current_hash, &current))
		.await
		.map_err(|e| APIError::Internal(format!("verification task panicked: {e}")))??;
	if !verified {
		return Err(APIError::AuthRequired);
	}

	let new_hash = tokio::task::spawn_blocking(move || hash_password(&args.new_password))
		.await
		.map_err(|e| APIError::Internal(format!("hashing task panicked: {e}")))??;

	state
		.users
		.update_password(req.user_id(), new_hash)
		.await?;

	// Every outstanding session and grant dies with the old password
	let revoked = state.ctx.revoke_user_sessions(req.user_id()).await;
	tracing::info!(user_id = %req.user_id(), revoked, "Password changed");

	Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize, ToSchema)]
pub struct LogoutAllResponse {
	pub revoked: usize,
}

#[utoipa::path(
	post,
	path = "/api/v1/auth/logout-all",
	tag = "auth",
	responses(
		(status = 200, description = "All sessions for the caller revoked", body = LogoutAllResponse),
		(status = 401, description = "Not authenticated"),
	)
)]
async fn logout_all(
	State(state): State<AppState>,
	Extension(req): Extension<RequestContext>,
) -> APIResult<Json<LogoutAllResponse>> {
	let revoked = state.ctx.revoke_user_sessions(req.user_id()).await;
	Ok(Json(LogoutAllResponse { revoked }))
}

/// A throwaway Argon2id hash used to equalize verification time for
/// unknown usernames.
fn dummy_hash() -> String {
	"$argon2id$v=19$m=19456,t=2,p=1$YW5vbnltb3VzLXNhbHQ$\
	 2Qx5o5PaVg0tO2qW8FwF0J8Zl0m6T5cKqO9d0H1R2bA"
		.to_string()
}
