//! Per-sender counter target.
//!
//! Keeps one counter per effective sender. The sender is read from the
//! calldata in ERC-2771 form, so only calls arriving through the trusted
//! forwarder can act for someone other than the caller.

use crate::erc2771::Erc2771Context;
use crate::targets::{
	ForwardedCall, TargetError, TargetFactory, TargetInterface, TargetRegistry,
};
use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::{sol, SolInterface, SolValue};
use async_trait::async_trait;
use relay_types::utils::parse_nonzero_address;
use relay_types::{ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, ValidationError};
use std::collections::HashMap;
use tokio::sync::Mutex;

sol! {
	/// Calls accepted by the counter.
	interface ICounter {
		function increment() external returns (uint256);
		function incrementBy(uint256 amount) external returns (uint256);
		function counterOf(address account) external view returns (uint256);
	}
}

/// Counter keyed by effective sender.
pub struct Counter {
	address: Address,
	context: Erc2771Context,
	counts: Mutex<HashMap<Address, U256>>,
}

impl Counter {
	pub fn new(address: Address, trusted_forwarder: Address) -> Self {
		Self {
			address,
			context: Erc2771Context::new(trusted_forwarder),
			counts: Mutex::new(HashMap::new()),
		}
	}

	/// Current count of `account`.
	pub async fn count_of(&self, account: Address) -> U256 {
		self.counts
			.lock()
			.await
			.get(&account)
			.copied()
			.unwrap_or_default()
	}

	async fn add(&self, account: Address, amount: U256) -> Result<U256, TargetError> {
		let mut counts = self.counts.lock().await;
		let count = counts.entry(account).or_default();
		*count = count
			.checked_add(amount)
			.ok_or_else(|| TargetError::Reverted("counter overflow".to_string()))?;
		Ok(*count)
	}
}

#[async_trait]
impl TargetInterface for Counter {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(CounterSchema)
	}

	fn address(&self) -> Address {
		self.address
	}

	async fn execute(&self, call: &ForwardedCall) -> Result<Bytes, TargetError> {
		let sender = self.context.msg_sender(call.caller, &call.calldata);
		let data = self.context.msg_data(call.caller, &call.calldata);

		let decoded = ICounter::ICounterCalls::abi_decode(data, true)
			.map_err(|e| TargetError::Reverted(format!("unrecognized call: {}", e)))?;
		let value = match decoded {
			ICounter::ICounterCalls::increment(_) => self.add(sender, U256::from(1)).await?,
			ICounter::ICounterCalls::incrementBy(args) => self.add(sender, args.amount).await?,
			ICounter::ICounterCalls::counterOf(args) => self.count_of(args.account).await,
		};

		tracing::debug!(target_address = %self.address, sender = %sender, value = %value, "Counter call");
		Ok(value.abi_encode().into())
	}
}

/// Configuration schema for Counter.
pub struct CounterSchema;

impl ConfigSchema for CounterSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![Field::new("address", FieldType::Address { non_zero: true })],
			vec![Field::new("implementation", FieldType::String)],
		);
		schema.validate(config)
	}
}

/// Factory function to create a counter target from configuration.
///
/// Configuration parameters:
/// - `address`: address of the target (required, non-zero)
pub fn create_target(
	config: &toml::Value,
	trusted_forwarder: Address,
) -> Result<Box<dyn TargetInterface>, TargetError> {
	CounterSchema
		.validate(config)
		.map_err(|e| TargetError::Configuration(e.to_string()))?;

	let address = config
		.get("address")
		.and_then(|v| v.as_str())
		.ok_or_else(|| TargetError::Configuration("address is required".to_string()))
		.and_then(|s| parse_nonzero_address(s).map_err(TargetError::Configuration))?;

	Ok(Box::new(Counter::new(address, trusted_forwarder)))
}

/// Registry for the counter target implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "counter";
	type Factory = TargetFactory;

	fn factory() -> Self::Factory {
		create_target
	}
}

impl TargetRegistry for Registry {}
