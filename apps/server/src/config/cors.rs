use axum::http::{
	header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
	HeaderValue, Method,
};
use tower_http::cors::CorsLayer;

const DEFAULT_ALLOWED_ORIGINS: &[&str] = &[
	"http://localhost:3000",
	"http://127.0.0.1:3000",
	"http://localhost:10801",
];

/// CORS layer for the API. Origins come from `SECTIFY_ALLOWED_ORIGINS`
/// (comma-separated) with localhost development defaults.
pub fn get_cors_layer() -> CorsLayer {
	let configured = std::env::var("SECTIFY_ALLOWED_ORIGINS").unwrap_or_default();

	let origins: Vec<HeaderValue> = configured
		.split(',')
		.map(str::trim)
		.filter(|origin| !origin.is_empty())
		.chain(DEFAULT_ALLOWED_ORIGINS.iter().copied())
		.filter_map(|origin| origin.parse().ok())
		.collect();

	CorsLayer::new()
		.allow_methods([
			Method::GET,
			Method::POST,
			Method::PATCH,
			Method::DELETE,
			Method::OPTIONS,
		])
		.allow_headers([ACCEPT, AUTHORIZATION, CONTENT_TYPE])
		.allow_origin(origins)
		.allow_credentials(true)
}
