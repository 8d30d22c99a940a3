//! Mock fee oracle for testing and development.
//!
//! Fees are computed from a fixed gas price and per-token exchange rates
//! read from configuration:
//!
//! `amount = gas_limit * gas_price * exchange_rate / 1e18`

use crate::{FeeError, FeeOracleFactory, FeeOracleInterface, FeeOracleRegistry};
use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use relay_types::utils::parse_nonzero_address;
use relay_types::{
	parse_address, ConfigSchema, FeeQuote, FeeRequest, Field, FieldType, ImplementationRegistry,
	Schema, ValidationError,
};
use std::collections::HashMap;

const DEFAULT_GAS_PRICE: u64 = 1_000_000_000;

fn one_ether() -> U256 {
	U256::from(1_000_000_000_000_000_000u64)
}

/// Oracle quoting fees from static configuration.
pub struct MockFeeOracle {
	collector: Address,
	gas_price: U256,
	/// Token units per native unit, scaled by 1e18.
	exchange_rates: HashMap<Address, U256>,
}

impl MockFeeOracle {
	pub fn new(collector: Address, gas_price: U256) -> Self {
		Self {
			collector,
			gas_price,
			exchange_rates: HashMap::new(),
		}
	}

	/// Sets the exchange rate of `token`. Unlisted tokens trade 1:1.
	pub fn with_rate(mut self, token: Address, rate: U256) -> Self {
		self.exchange_rates.insert(token, rate);
		self
	}

	fn rate(&self, token: &Address) -> U256 {
		self.exchange_rates
			.get(token)
			.copied()
			.unwrap_or_else(one_ether)
	}
}

#[async_trait]
impl FeeOracleInterface for MockFeeOracle {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MockFeeOracleSchema)
	}

	async fn fee_collector(&self) -> Result<Address, FeeError> {
		Ok(self.collector)
	}

	async fn estimate_fee(&self, request: &FeeRequest) -> Result<FeeQuote, FeeError> {
		let exchange_rate = self.rate(&request.token);
		let amount = U256::from(request.gas_limit)
			.checked_mul(self.gas_price)
			.and_then(|native| native.checked_mul(exchange_rate))
			.map(|scaled| scaled / one_ether())
			.ok_or_else(|| FeeError::QuoteUnavailable("fee overflows uint256".to_string()))?;

		Ok(FeeQuote {
			token: request.token,
			collector: self.collector,
			amount,
			exchange_rate,
		})
	}
}

/// Configuration schema for MockFeeOracle.
pub struct MockFeeOracleSchema;

impl ConfigSchema for MockFeeOracleSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![Field::new(
				"collector",
				FieldType::Address { non_zero: true },
			)],
			vec![
				Field::new(
					"gas_price",
					FieldType::Integer {
						min: Some(0),
						max: None,
					},
				),
				Field::new("exchange_rates", FieldType::Table(Schema::new(vec![], vec![])))
					.with_validator(|value| {
						let Some(table) = value.as_table() else {
							return Ok(());
						};
						for (token, rate) in table {
							parse_address(token)?;
							let rate = rate
								.as_str()
								.ok_or_else(|| format!("rate for {} must be a string", token))?;
							U256::from_str_radix(rate, 10)
								.map_err(|e| format!("rate for {}: {}", token, e))?;
						}
						Ok(())
					}),
			],
		);
		schema.validate(config)
	}
}

/// Factory function to create a mock fee oracle from configuration.
///
/// Configuration parameters:
/// - `collector`: fee collector address (required, non-zero)
/// - `gas_price`: gas price in wei (default: 1 gwei)
/// - `exchange_rates`: table of token address to decimal rate scaled by 1e18
pub fn create_oracle(config: &toml::Value) -> Result<Box<dyn FeeOracleInterface>, FeeError> {
	MockFeeOracleSchema
		.validate(config)
		.map_err(|e| FeeError::Configuration(e.to_string()))?;

	let collector = config
		.get("collector")
		.and_then(|v| v.as_str())
		.ok_or_else(|| FeeError::Configuration("collector is required".to_string()))
		.and_then(|s| parse_nonzero_address(s).map_err(FeeError::Configuration))?;
	let gas_price = config
		.get("gas_price")
		.and_then(|v| v.as_integer())
		.map(|v| U256::from(v as u64))
		.unwrap_or(U256::from(DEFAULT_GAS_PRICE));

	let mut oracle = MockFeeOracle::new(collector, gas_price);
	if let Some(rates) = config.get("exchange_rates").and_then(|v| v.as_table()) {
		for (token, rate) in rates {
			let token = parse_address(token).map_err(FeeError::Configuration)?;
			let rate = rate
				.as_str()
				.and_then(|r| U256::from_str_radix(r, 10).ok())
				.ok_or_else(|| FeeError::Configuration(format!("Invalid rate for {}", token)))?;
			oracle = oracle.with_rate(token, rate);
		}
	}

	Ok(Box::new(oracle))
}

/// Registry for the mock fee oracle implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "mock";
	type Factory = FeeOracleFactory;

	fn factory() -> Self::Factory {
		create_oracle
	}
}

impl FeeOracleRegistry for Registry {}
