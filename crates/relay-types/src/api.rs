//! API types for the relay HTTP API.
//!
//! This module defines the request and response types of the relay endpoints
//! and the error type that maps relay failures onto HTTP responses.

use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Response for a successfully forwarded call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayResponse {
	/// Verified signer the call was executed for.
	pub sender: Address,
	/// Target the call was forwarded to.
	pub target: Address,
	/// Return data of the wrapped operation.
	pub result: Bytes,
}

/// Response containing a signer's current sequential nonce.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NonceResponse {
	pub user: Address,
	#[serde(with = "u256_serde")]
	pub nonce: U256,
}

/// Response describing whether a concurrent salt has been consumed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaltResponse {
	pub user: Address,
	pub salt: B256,
	pub consumed: bool,
}

/// Query parameters for a fee quote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeQuoteQuery {
	pub token: Address,
	#[serde(default = "default_gas_limit")]
	pub gas_limit: u64,
}

fn default_gas_limit() -> u64 {
	100_000
}

/// API error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
	/// Error type/code
	pub error: String,
	/// Human-readable description
	pub message: String,
	/// Additional error context
	pub details: Option<serde_json::Value>,
}

/// Structured API error type with appropriate HTTP status mapping.
#[derive(Debug)]
pub enum APIError {
	/// Malformed input (400)
	BadRequest { error_type: String, message: String },
	/// Unknown target or resource (404)
	NotFound { error_type: String, message: String },
	/// Request rejected by the relay's authorization or fee rules (422)
	UnprocessableEntity {
		error_type: String,
		message: String,
		details: Option<serde_json::Value>,
	},
	/// Internal server error (500)
	InternalServerError { error_type: String, message: String },
}

impl APIError {
	/// Get the HTTP status code for this error.
	pub fn status_code(&self) -> u16 {
		match self {
			APIError::BadRequest { .. } => 400,
			APIError::NotFound { .. } => 404,
			APIError::UnprocessableEntity { .. } => 422,
			APIError::InternalServerError { .. } => 500,
		}
	}

	/// Convert to ErrorResponse for JSON serialization.
	pub fn to_error_response(&self) -> ErrorResponse {
		match self {
			APIError::BadRequest {
				error_type,
				message,
			}
			| APIError::NotFound {
				error_type,
				message,
			}
			| APIError::InternalServerError {
				error_type,
				message,
			} => ErrorResponse {
				error: error_type.clone(),
				message: message.clone(),
				details: None,
			},
			APIError::UnprocessableEntity {
				error_type,
				message,
				details,
			} => ErrorResponse {
				error: error_type.clone(),
				message: message.clone(),
				details: details.clone(),
			},
		}
	}
}

impl fmt::Display for APIError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			APIError::BadRequest { message, .. } => write!(f, "Bad Request: {}", message),
			APIError::NotFound { message, .. } => write!(f, "Not Found: {}", message),
			APIError::UnprocessableEntity { message, .. } => {
				write!(f, "Unprocessable Entity: {}", message)
			},
			APIError::InternalServerError { message, .. } => {
				write!(f, "Internal Server Error: {}", message)
			},
		}
	}
}

impl std::error::Error for APIError {}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for APIError {
	fn into_response(self) -> axum::response::Response {
		use axum::{http::StatusCode, response::Json};

		let status = StatusCode::from_u16(self.status_code())
			.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
		let error_response = self.to_error_response();
		(status, Json(error_response)).into_response()
	}
}

/// Serde module for U256 values carried as decimal strings.
pub mod u256_serde {
	use alloy_primitives::U256;
	use serde::{de::Error, Deserialize, Deserializer, Serialize, Serializer};

	pub fn serialize<S>(value: &U256, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		value.to_string().serialize(serializer)
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<U256, D::Error>
	where
		D: Deserializer<'de>,
	{
		let s = String::deserialize(deserializer)?;
		U256::from_str_radix(&s, 10).map_err(D::Error::custom)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_status_codes() {
		let err = APIError::UnprocessableEntity {
			error_type: "ReplayRejected".to_string(),
			message: "nonce already used".to_string(),
			details: None,
		};
		assert_eq!(err.status_code(), 422);
		assert_eq!(err.to_error_response().error, "ReplayRejected");

		let err = APIError::NotFound {
			error_type: "UnknownTarget".to_string(),
			message: "no target".to_string(),
		};
		assert_eq!(err.status_code(), 404);
	}

	#[test]
	fn test_u256_decimal_string() {
		#[derive(Serialize, Deserialize)]
		struct Wrapper {
			#[serde(with = "u256_serde")]
			value: U256,
		}

		let json = serde_json::to_string(&Wrapper {
			value: U256::from(1_000_000u64),
		})
		.unwrap();
		assert_eq!(json, r#"{"value":"1000000"}"#);

		let parsed: Wrapper = serde_json::from_str(r#"{"value":"42"}"#).unwrap();
		assert_eq!(parsed.value, U256::from(42));
		assert!(serde_json::from_str::<Wrapper>(r#"{"value":"forty"}"#).is_err());
	}
}
