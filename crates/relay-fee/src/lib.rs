//! Fee module for the sponsored-call relay.
//!
//! Relayed calls can be paid for in ERC-20 tokens. This module provides the
//! fee oracle that quotes a fee and names its collector, the token interface
//! the relay pulls fees through, and the [`FeeSettlement`] helper that moves
//! a fee from payer to collector, optionally after an EIP-2612 permit.

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use relay_storage::StorageError;
use relay_types::{
	ConfigSchema, DomainDescriptor, FeeQuote, FeeRequest, ImplementationRegistry, SignatureParts,
};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

pub mod settlement;

pub use settlement::FeeSettlement;

/// Re-export implementations
pub mod implementations {
	pub mod mock;
	pub mod mock_erc20;
}

/// Errors that can occur while quoting or settling fees.
#[derive(Debug, Error)]
pub enum FeeError {
	/// The fee collector is the zero address.
	#[error("Invalid fee collector: zero address")]
	InvalidFeeCollector,
	/// The fee token is the zero address.
	#[error("Invalid fee token: zero address")]
	InvalidFeeToken,
	/// The token refused the permit.
	#[error("Permit rejected: {0}")]
	PermitRejected(String),
	/// The token did not move the fee.
	#[error("Fee transfer failed: {0}")]
	FeeTransferFailed(String),
	/// The oracle could not produce a quote.
	#[error("Quote unavailable: {0}")]
	QuoteUnavailable(String),
	/// Error that occurs when configuration is invalid.
	#[error("Configuration error: {0}")]
	Configuration(String),
	/// Error that occurs when persisting receipts.
	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),
}

impl FeeError {
	/// Stable name of the failure, as reported to callers.
	pub fn name(&self) -> &'static str {
		match self {
			FeeError::InvalidFeeCollector => "InvalidFeeCollector",
			FeeError::InvalidFeeToken => "InvalidFeeToken",
			FeeError::PermitRejected(_) => "PermitRejected",
			FeeError::FeeTransferFailed(_) => "FeeTransferFailed",
			FeeError::QuoteUnavailable(_) => "QuoteUnavailable",
			FeeError::Configuration(_) => "ConfigurationError",
			FeeError::Storage(_) => "StorageError",
		}
	}

	/// Whether the payment itself was refused, as opposed to an
	/// infrastructure fault.
	pub fn is_rejection(&self) -> bool {
		matches!(
			self,
			FeeError::InvalidFeeCollector
				| FeeError::InvalidFeeToken
				| FeeError::PermitRejected(_)
				| FeeError::FeeTransferFailed(_)
		)
	}
}

/// Errors raised by a token while executing a call.
#[derive(Debug, Error)]
pub enum TokenError {
	/// The permit deadline has passed.
	#[error("Permit expired: deadline {deadline}, now {now}")]
	PermitExpired { deadline: u64, now: u64 },
	/// The permit signature does not recover to the owner.
	#[error("Invalid permit signature: {0}")]
	InvalidPermit(String),
	/// Any other revert.
	#[error("Reverted: {0}")]
	Reverted(String),
	/// Error that occurs when configuration is invalid.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Trait defining the interface for fee oracle implementations.
///
/// Quotes are untrusted: the relay checks the collector and token for
/// non-nullity and passes the amount through unchanged.
#[async_trait]
pub trait FeeOracleInterface: Send + Sync {
	/// Returns the configuration schema for this oracle implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Address fees are paid to.
	async fn fee_collector(&self) -> Result<Address, FeeError>;

	/// Estimates the fee for a call in the requested token.
	async fn estimate_fee(&self, request: &FeeRequest) -> Result<FeeQuote, FeeError>;
}

/// Trait defining the ERC-20 calls the settlement helper makes.
#[async_trait]
pub trait TokenInterface: Send + Sync {
	/// Returns the configuration schema for this token implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Address the token lives at.
	fn address(&self) -> Address;

	/// EIP-712 domain permits for this token are signed under.
	fn domain(&self) -> &DomainDescriptor;

	async fn balance_of(&self, owner: Address) -> Result<U256, TokenError>;

	async fn allowance(&self, owner: Address, spender: Address) -> Result<U256, TokenError>;

	/// Next permit nonce of `owner`.
	async fn nonces(&self, owner: Address) -> Result<U256, TokenError>;

	/// EIP-2612 gasless approval of `spender` by `owner`.
	async fn permit(
		&self,
		owner: Address,
		spender: Address,
		value: U256,
		deadline: u64,
		signature: &SignatureParts,
	) -> Result<(), TokenError>;

	/// Moves `amount` from `from` to `to` on behalf of `spender`.
	///
	/// Returns `false` when the balance or allowance is insufficient.
	async fn transfer_from(
		&self,
		spender: Address,
		from: Address,
		to: Address,
		amount: U256,
	) -> Result<bool, TokenError>;

	/// Applies a permit from `owner` to `spender` for `amount`, then moves
	/// `amount` from `owner` to `to`, as one call.
	///
	/// Either both steps take effect or neither does. A rejected permit is
	/// an error. An insufficient balance returns `false` and leaves the
	/// permit unapplied.
	async fn permit_and_transfer_from(
		&self,
		owner: Address,
		spender: Address,
		to: Address,
		amount: U256,
		deadline: u64,
		signature: &SignatureParts,
	) -> Result<bool, TokenError>;
}

/// Type alias for fee oracle factory functions.
pub type FeeOracleFactory = fn(&toml::Value) -> Result<Box<dyn FeeOracleInterface>, FeeError>;

/// Type alias for token factory functions.
pub type TokenFactory = fn(&toml::Value) -> Result<Box<dyn TokenInterface>, TokenError>;

/// Registry trait for fee oracle implementations.
pub trait FeeOracleRegistry: ImplementationRegistry<Factory = FeeOracleFactory> {}

/// Registry trait for token implementations.
pub trait TokenRegistry: ImplementationRegistry<Factory = TokenFactory> {}

/// Get all registered fee oracle implementations.
pub fn get_all_implementations() -> Vec<(&'static str, FeeOracleFactory)> {
	use implementations::mock;

	vec![(mock::Registry::NAME, mock::Registry::factory())]
}

/// Get all registered token implementations.
pub fn get_all_token_implementations() -> Vec<(&'static str, TokenFactory)> {
	use implementations::mock_erc20;

	vec![(mock_erc20::Registry::NAME, mock_erc20::Registry::factory())]
}

/// Service that quotes fees through the primary oracle implementation.
pub struct FeeOracleService {
	implementations: HashMap<String, Arc<dyn FeeOracleInterface>>,
	primary_implementation: String,
	chain_id: u64,
}

impl FeeOracleService {
	pub fn new(
		implementations: HashMap<String, Arc<dyn FeeOracleInterface>>,
		primary_implementation: String,
		chain_id: u64,
	) -> Result<Self, FeeError> {
		if !implementations.contains_key(&primary_implementation) {
			return Err(FeeError::Configuration(format!(
				"Primary implementation '{}' not found in available implementations",
				primary_implementation
			)));
		}

		Ok(Self {
			implementations,
			primary_implementation,
			chain_id,
		})
	}

	fn primary(&self) -> Result<&Arc<dyn FeeOracleInterface>, FeeError> {
		self.implementations
			.get(&self.primary_implementation)
			.ok_or_else(|| {
				FeeError::Configuration(format!(
					"Primary implementation '{}' not available",
					self.primary_implementation
				))
			})
	}

	/// Returns the collector, refusing the zero address.
	pub async fn fee_collector(&self) -> Result<Address, FeeError> {
		let collector = self.primary()?.fee_collector().await?;
		if collector.is_zero() {
			return Err(FeeError::InvalidFeeCollector);
		}
		Ok(collector)
	}

	/// Quotes a fee in `token` for a call using `gas_limit` gas.
	pub async fn quote(&self, token: Address, gas_limit: u64) -> Result<FeeQuote, FeeError> {
		if token.is_zero() {
			return Err(FeeError::InvalidFeeToken);
		}
		let request = FeeRequest {
			chain_id: self.chain_id,
			token,
			gas_limit,
		};
		let quote = self.primary()?.estimate_fee(&request).await?;
		if quote.collector.is_zero() {
			return Err(FeeError::InvalidFeeCollector);
		}
		if quote.token.is_zero() {
			return Err(FeeError::InvalidFeeToken);
		}
		tracing::debug!(
			token = %quote.token,
			collector = %quote.collector,
			amount = %quote.amount,
			gas_limit,
			"Quoted fee"
		);
		Ok(quote)
	}
}
