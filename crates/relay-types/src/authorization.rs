//! Authorization request types.
//!
//! An authorization request is built and signed by the user off-band and
//! submitted by a relayer. The signature covers the payload, the claimed
//! user and the replay token, so any mutation of those fields invalidates it.

use crate::api::u256_serde;
use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Length of a serialized `r || s || v` signature.
pub const SIGNATURE_LENGTH: usize = 65;

/// Replay protection strategy selected by the signer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplayMode {
	/// Strictly increasing per-signer nonce. One request in flight per signer.
	Sequential,
	/// Single-use random salts. Many requests in flight per signer.
	Concurrent,
}

impl fmt::Display for ReplayMode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ReplayMode::Sequential => write!(f, "sequential"),
			ReplayMode::Concurrent => write!(f, "concurrent"),
		}
	}
}

/// What happens to a consumed replay token when the wrapped call fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
	/// The token stays consumed. A failed call cannot be retried with the
	/// same signature.
	#[default]
	Consume,
	/// The consumption is rolled back together with the failed call.
	Rollback,
}

impl fmt::Display for FailurePolicy {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			FailurePolicy::Consume => write!(f, "consume"),
			FailurePolicy::Rollback => write!(f, "rollback"),
		}
	}
}

/// Token that makes a signed request single-use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum ReplayToken {
	/// Sequential mode: must equal the signer's current nonce.
	#[serde(rename = "sequential")]
	Nonce {
		#[serde(with = "u256_serde")]
		nonce: U256,
	},
	/// Concurrent mode: random salt plus an expiry timestamp (Unix seconds).
	#[serde(rename = "concurrent")]
	Salt { salt: B256, deadline: u64 },
}

impl ReplayToken {
	/// Returns the replay mode this token belongs to.
	pub fn mode(&self) -> ReplayMode {
		match self {
			ReplayToken::Nonce { .. } => ReplayMode::Sequential,
			ReplayToken::Salt { .. } => ReplayMode::Concurrent,
		}
	}

	/// Returns the expiry of the token, if it carries one.
	pub fn deadline(&self) -> Option<u64> {
		match self {
			ReplayToken::Nonce { .. } => None,
			ReplayToken::Salt { deadline, .. } => Some(*deadline),
		}
	}
}

impl fmt::Display for ReplayToken {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ReplayToken::Nonce { nonce } => write!(f, "nonce {}", nonce),
			ReplayToken::Salt { salt, deadline } => {
				write!(f, "salt {} (deadline {})", salt, deadline)
			},
		}
	}
}

/// A signed request to execute `data` on behalf of `user`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationRequest {
	/// Opaque calldata for the wrapped operation.
	pub data: Bytes,
	/// Address the caller claims signed the request.
	pub user: Address,
	/// Nonce or salt protecting the request against replay.
	pub replay: ReplayToken,
	/// Raw `r || s || v` signature bytes.
	pub signature: Bytes,
}

/// Error returned when raw signature bytes cannot be split into components.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid signature length: expected 65 bytes, got {0}")]
pub struct SignatureLengthError(pub usize);

/// ECDSA signature split into its three fixed-width components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureParts {
	pub v: u8,
	pub r: B256,
	pub s: B256,
}

impl SignatureParts {
	/// Splits a 65-byte `r || s || v` signature.
	pub fn from_bytes(bytes: &[u8]) -> Result<Self, SignatureLengthError> {
		if bytes.len() != SIGNATURE_LENGTH {
			return Err(SignatureLengthError(bytes.len()));
		}
		Ok(Self {
			r: B256::from_slice(&bytes[0..32]),
			s: B256::from_slice(&bytes[32..64]),
			v: bytes[64],
		})
	}

	/// Joins the components back into the 65-byte wire form.
	pub fn to_bytes(&self) -> [u8; SIGNATURE_LENGTH] {
		let mut out = [0u8; SIGNATURE_LENGTH];
		out[0..32].copy_from_slice(self.r.as_slice());
		out[32..64].copy_from_slice(self.s.as_slice());
		out[64] = self.v;
		out
	}
}

impl TryFrom<&Bytes> for SignatureParts {
	type Error = SignatureLengthError;

	fn try_from(bytes: &Bytes) -> Result<Self, Self::Error> {
		Self::from_bytes(bytes.as_ref())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_signature_parts_split() {
		let mut raw = [0u8; 65];
		raw[0] = 0xaa;
		raw[63] = 0xbb;
		raw[64] = 28;

		let parts = SignatureParts::from_bytes(&raw).unwrap();
		assert_eq!(parts.r[0], 0xaa);
		assert_eq!(parts.s[31], 0xbb);
		assert_eq!(parts.v, 28);
		assert_eq!(parts.to_bytes(), raw);
	}

	#[test]
	fn test_signature_wrong_length_rejected() {
		assert_eq!(
			SignatureParts::from_bytes(&[0u8; 64]),
			Err(SignatureLengthError(64))
		);
		assert_eq!(
			SignatureParts::from_bytes(&[0u8; 66]),
			Err(SignatureLengthError(66))
		);
	}

	#[test]
	fn test_replay_token_json_shape() {
		let token = ReplayToken::Nonce {
			nonce: U256::from(7),
		};
		let json = serde_json::to_value(&token).unwrap();
		assert_eq!(json["mode"], "sequential");
		assert_eq!(json["nonce"], "7");

		let parsed: ReplayToken = serde_json::from_value(serde_json::json!({
			"mode": "concurrent",
			"salt": format!("0x{}", "11".repeat(32)),
			"deadline": 1700000000u64,
		}))
		.unwrap();
		assert_eq!(parsed.mode(), ReplayMode::Concurrent);
		assert_eq!(parsed.deadline(), Some(1_700_000_000));
	}
}
