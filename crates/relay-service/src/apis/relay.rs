//! Relay endpoints.
//!
//! Submission of signed requests to a target, and the read surface over
//! each target's replay ledger. Targets are addressed by configured name or
//! by address.

use super::{engine_error, invalid_parameter, json_rejection, path_rejection};
use crate::server::AppState;
use axum::{
	extract::{
		rejection::{JsonRejection, PathRejection},
		Path, State,
	},
	Json,
};
use relay_types::{
	parse_address, APIError, AuthorizationRequest, NonceResponse, RelayResponse, SaltResponse, B256,
};

/// Handles POST /api/relay/{target} requests.
pub async fn submit(
	State(state): State<AppState>,
	target: Result<Path<String>, PathRejection>,
	request: Result<Json<AuthorizationRequest>, JsonRejection>,
) -> Result<Json<RelayResponse>, APIError> {
	let Path(target) = target.map_err(path_rejection)?;
	let Json(request) = request.map_err(json_rejection)?;

	match state.relay.submit(&target, &request).await {
		Ok(response) => Ok(Json(response)),
		Err(e) => {
			tracing::warn!(target_name = %target, user = %request.user, reason = e.name(), "Relay request failed: {}", e);
			Err(engine_error(e))
		}
	}
}

/// Handles GET /api/relay/{target}/nonce/{user} requests.
pub async fn get_nonce(
	State(state): State<AppState>,
	params: Result<Path<(String, String)>, PathRejection>,
) -> Result<Json<NonceResponse>, APIError> {
	let Path((target, user)) = params.map_err(path_rejection)?;
	let user = parse_address(&user).map_err(|e| invalid_parameter("user", e))?;

	let nonce = state
		.relay
		.nonce(&target, user)
		.await
		.map_err(engine_error)?;
	Ok(Json(NonceResponse { user, nonce }))
}

/// Handles GET /api/relay/{target}/salts/{user}/{salt} requests.
pub async fn get_salt(
	State(state): State<AppState>,
	params: Result<Path<(String, String, String)>, PathRejection>,
) -> Result<Json<SaltResponse>, APIError> {
	let Path((target, user, salt)) = params.map_err(path_rejection)?;
	let user = parse_address(&user).map_err(|e| invalid_parameter("user", e))?;
	let salt: B256 = salt
		.parse()
		.map_err(|e| invalid_parameter("salt", format!("{}", e)))?;

	let consumed = state
		.relay
		.is_salt_consumed(&target, user, salt)
		.await
		.map_err(engine_error)?;
	Ok(Json(SaltResponse {
		user,
		salt,
		consumed,
	}))
}
