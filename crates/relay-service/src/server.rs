//! HTTP server for the relay API.
//!
//! Exposes request submission, replay-state reads and fee endpoints under
//! the `/api` base path.

use crate::apis::{fees, relay};
use axum::{
	extract::DefaultBodyLimit,
	http::HeaderValue,
	routing::{get, post},
	Router,
};
use relay_config::{ApiConfig, CorsConfig};
use relay_core::RelayEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
	/// Reference to the relay engine for processing requests.
	pub relay: Arc<RelayEngine>,
}

fn cors_layer(cors: Option<&CorsConfig>) -> CorsLayer {
	let Some(cors) = cors else {
		return CorsLayer::permissive();
	};
	if cors.allowed_origins.iter().any(|origin| origin == "*") {
		return CorsLayer::permissive();
	}

	let origins: Vec<HeaderValue> = cors
		.allowed_origins
		.iter()
		.filter_map(|origin| match origin.parse() {
			Ok(value) => Some(value),
			Err(_) => {
				tracing::warn!("Ignoring invalid CORS origin: {}", origin);
				None
			}
		})
		.collect();
	CorsLayer::new()
		.allow_origin(origins)
		.allow_methods(tower_http::cors::Any)
		.allow_headers(tower_http::cors::Any)
}

/// Builds the API router.
pub fn router(api_config: &ApiConfig, relay: Arc<RelayEngine>) -> Router {
	Router::new()
		.nest(
			"/api",
			Router::new()
				.route("/relay/{target}", post(relay::submit))
				.route("/relay/{target}/nonce/{user}", get(relay::get_nonce))
				.route("/relay/{target}/salts/{user}/{salt}", get(relay::get_salt))
				.route("/fees/quote", get(fees::get_quote))
				.route("/fees/settle", post(fees::settle)),
		)
		.layer(
			ServiceBuilder::new()
				.layer(TraceLayer::new_for_http())
				.layer(TimeoutLayer::new(Duration::from_secs(
					api_config.timeout_seconds,
				)))
				.layer(DefaultBodyLimit::max(api_config.max_request_size))
				.layer(cors_layer(api_config.cors.as_ref())),
		)
		.with_state(AppState { relay })
}

/// Starts the HTTP server for the API.
pub async fn start_server(
	api_config: ApiConfig,
	relay: Arc<RelayEngine>,
) -> Result<(), Box<dyn std::error::Error>> {
	let app = router(&api_config, relay);

	let bind_address = format!("{}:{}", api_config.host, api_config.port);
	let listener = TcpListener::bind(&bind_address).await?;

	tracing::info!("Relay API server starting on {}", bind_address);

	axum::serve(listener, app).await?;

	Ok(())
}
