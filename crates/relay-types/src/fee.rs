//! Fee quote and fee payment types.
//!
//! Quotes come from an external fee API and are treated as untrusted input:
//! only the collector and token are checked for non-nullity, the amount is
//! passed through as quoted.

use crate::api::u256_serde;
use alloy_primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

/// Request for a fee estimate in a given payment token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeRequest {
	/// Chain the fee will be paid on.
	pub chain_id: u64,
	/// Token the fee is paid in.
	pub token: Address,
	/// Gas the relayed call is expected to use.
	pub gas_limit: u64,
}

/// Fee quote returned by the fee API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeQuote {
	pub token: Address,
	pub collector: Address,
	#[serde(with = "u256_serde")]
	pub amount: U256,
	/// Token units per unit of native gas currency, scaled by 1e18.
	#[serde(with = "u256_serde", rename = "exchangeRate")]
	pub exchange_rate: U256,
}

/// Gasless approval attached to a fee payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermitAuthorization {
	/// Unix timestamp after which the permit is no longer valid.
	pub deadline: u64,
	/// Raw `r || s || v` permit signature.
	pub signature: Bytes,
}

/// A single fee payment from `payer` to `collector`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeePayment {
	pub token: Address,
	pub payer: Address,
	pub collector: Address,
	#[serde(with = "u256_serde")]
	pub amount: U256,
	/// Optional permit performed before the transfer.
	#[serde(default)]
	pub permit: Option<PermitAuthorization>,
}

/// Record of a completed fee payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeReceipt {
	pub token: Address,
	pub payer: Address,
	pub collector: Address,
	#[serde(with = "u256_serde")]
	pub amount: U256,
	/// Whether a permit was consumed as part of the payment.
	pub used_permit: bool,
	pub settled_at: u64,
}
