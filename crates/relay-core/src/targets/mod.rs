//! Wrapped operations the relay forwards authorized calls to.
//!
//! A target is the contract a signed request is bound to: its address is the
//! verifying contract of the request's EIP-712 domain, and it receives the
//! request payload as calldata with the verified sender attached.

use alloy_primitives::{Address, Bytes};
use async_trait::async_trait;
use relay_types::{ConfigSchema, ImplementationRegistry};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod counter;
}

/// Errors raised by a wrapped operation.
#[derive(Debug, Error)]
pub enum TargetError {
	/// The operation itself failed. Surfaced to the caller unchanged.
	#[error("Reverted: {0}")]
	Reverted(String),
	/// Error that occurs when configuration is invalid.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// A call delivered to a target by the forwarder.
#[derive(Debug, Clone)]
pub struct ForwardedCall {
	/// Immediate caller, i.e. the forwarder.
	pub caller: Address,
	/// Verified signer of the request.
	pub sender: Address,
	/// Request payload with `sender` appended in ERC-2771 form.
	pub calldata: Bytes,
}

/// Trait defining the interface for wrapped operations.
#[async_trait]
pub trait TargetInterface: Send + Sync {
	/// Returns the configuration schema for this target implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Address the target lives at.
	fn address(&self) -> Address;

	/// Executes a forwarded call and returns its raw return data.
	async fn execute(&self, call: &ForwardedCall) -> Result<Bytes, TargetError>;
}

/// Type alias for target factory functions.
///
/// The second argument is the forwarder address the target must trust.
pub type TargetFactory =
	fn(&toml::Value, Address) -> Result<Box<dyn TargetInterface>, TargetError>;

/// Registry trait for target implementations.
pub trait TargetRegistry: ImplementationRegistry<Factory = TargetFactory> {}

/// Get all registered target implementations.
pub fn get_all_implementations() -> Vec<(&'static str, TargetFactory)> {
	use implementations::counter;

	vec![(counter::Registry::NAME, counter::Registry::factory())]
}
