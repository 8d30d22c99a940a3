//! API handlers for the relay service.

pub mod fees;
pub mod relay;

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use relay_auth::AuthorizationError;
use relay_core::EngineError;
use relay_types::APIError;
use serde_json::json;

/// Maps an engine failure onto its HTTP representation.
///
/// Refusals of the request itself are 422 with the failure name as the
/// error code. Lookup misses are 404 and everything else is 500.
pub fn engine_error(error: EngineError) -> APIError {
	let error_type = error.name().to_string();
	let message = error.to_string();

	if let EngineError::UnknownTarget(_) = error {
		return APIError::NotFound {
			error_type,
			message,
		};
	}
	if !error.is_rejection() {
		return APIError::InternalServerError {
			error_type,
			message,
		};
	}

	let details = match &error {
		EngineError::Authorization(AuthorizationError::SignerMismatch { claimed, recovered }) => {
			Some(json!({ "claimed": claimed, "recovered": recovered }))
		}
		EngineError::Authorization(AuthorizationError::AuthorizationExpired { deadline, now }) => {
			Some(json!({ "deadline": deadline, "now": now }))
		}
		_ => None,
	};
	APIError::UnprocessableEntity {
		error_type,
		message,
		details,
	}
}

fn bad_request(error_type: &str, message: impl Into<String>) -> APIError {
	APIError::BadRequest {
		error_type: error_type.to_string(),
		message: message.into(),
	}
}

pub fn json_rejection(rejection: JsonRejection) -> APIError {
	bad_request("InvalidRequest", rejection.body_text())
}

pub fn query_rejection(rejection: QueryRejection) -> APIError {
	bad_request("InvalidQuery", rejection.body_text())
}

pub fn path_rejection(rejection: PathRejection) -> APIError {
	bad_request("InvalidPath", rejection.body_text())
}

pub fn invalid_parameter(name: &str, message: impl Into<String>) -> APIError {
	bad_request("InvalidParameter", format!("{}: {}", name, message.into()))
}
