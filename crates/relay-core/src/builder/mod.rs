//! Builder pattern for constructing relay engines.
//!
//! Composes a RelayEngine from pluggable storage, account, target, fee
//! oracle and token implementations using factory functions keyed by
//! implementation name.

use crate::engine::{Forwarder, RelayEngine};
use crate::targets::{TargetError, TargetInterface};
use relay_account::{AccountError, AccountInterface, AccountService};
use relay_config::Config;
use relay_fee::{
	FeeError, FeeOracleInterface, FeeOracleService, FeeSettlement, TokenError, TokenInterface,
};
use relay_storage::{StorageError, StorageInterface, StorageService};
use relay_types::{Address, ConfigSchema};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Token implementation used when a `[fee.tokens.*]` entry names none.
const DEFAULT_TOKEN_IMPLEMENTATION: &str = "mock_erc20";

/// Errors that can occur during relay engine construction.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Container for all factory functions needed to build a RelayEngine.
///
/// Each map is keyed by implementation name. Target factories also receive
/// the relay address, which the target must trust as its forwarder.
pub struct RelayFactories<SF, AF, TF, FF, TKF> {
	pub storage_factories: HashMap<String, SF>,
	pub account_factories: HashMap<String, AF>,
	pub target_factories: HashMap<String, TF>,
	pub fee_factories: HashMap<String, FF>,
	pub token_factories: HashMap<String, TKF>,
}

/// Builder for constructing a RelayEngine with pluggable implementations.
pub struct RelayBuilder {
	config: Config,
}

/// Implementation name of an entry keyed by `name`, defaulting to `fallback`.
fn implementation_name<'a>(config: &'a toml::Value, fallback: &'a str) -> &'a str {
	config
		.get("implementation")
		.and_then(|v| v.as_str())
		.unwrap_or(fallback)
}

/// Checks an entry against the schema its implementation declares.
fn validate_schema(
	component: &str,
	name: &str,
	schema: Box<dyn ConfigSchema>,
	config: &toml::Value,
) -> Result<(), BuilderError> {
	schema.validate(config).map_err(|e| {
		tracing::error!(
			component,
			implementation = %name,
			error = %e,
			"Invalid configuration"
		);
		BuilderError::Config(format!(
			"Invalid configuration for {} '{}': {}",
			component, name, e
		))
	})
}

impl RelayBuilder {
	/// Creates a new RelayBuilder with the given configuration.
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	/// Builds the RelayEngine using factories for each component type.
	pub async fn build<SF, AF, TF, FF, TKF>(
		self,
		factories: RelayFactories<SF, AF, TF, FF, TKF>,
	) -> Result<RelayEngine, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
		AF: Fn(&toml::Value) -> Result<Box<dyn AccountInterface>, AccountError>,
		TF: Fn(&toml::Value, Address) -> Result<Box<dyn TargetInterface>, TargetError>,
		FF: Fn(&toml::Value) -> Result<Box<dyn FeeOracleInterface>, FeeError>,
		TKF: Fn(&toml::Value) -> Result<Box<dyn TokenInterface>, TokenError>,
	{
		// Create storage implementations
		let mut storage_impls = HashMap::new();
		for (name, config) in &self.config.storage.implementations {
			if let Some(factory) = factories.storage_factories.get(name) {
				match factory(config) {
					Ok(implementation) => {
						validate_schema("storage", name, implementation.config_schema(), config)?;
						storage_impls.insert(name.clone(), implementation);
						let is_primary = &self.config.storage.primary == name;
						tracing::info!(component = "storage", implementation = %name, enabled = %is_primary, "Loaded");
					}
					Err(e) => {
						tracing::error!(
							component = "storage",
							implementation = %name,
							error = %e,
							"Failed to create storage implementation"
						);
						return Err(BuilderError::Config(format!(
							"Failed to create storage implementation '{}': {}",
							name, e
						)));
					}
				}
			}
		}

		let primary_storage = &self.config.storage.primary;
		let storage_backend = storage_impls.remove(primary_storage).ok_or_else(|| {
			BuilderError::Config(format!(
				"Primary storage '{}' failed to load or has invalid configuration",
				primary_storage
			))
		})?;
		let storage = Arc::new(StorageService::new(storage_backend));

		// Create the account
		let primary_account = &self.config.account.primary;
		let account_config = self
			.config
			.account
			.implementations
			.get(primary_account)
			.ok_or_else(|| {
				BuilderError::Config(format!(
					"Primary account '{}' has no configuration",
					primary_account
				))
			})?;
		let account_factory = factories
			.account_factories
			.get(primary_account)
			.ok_or_else(|| {
				BuilderError::MissingComponent(format!("account implementation '{}'", primary_account))
			})?;
		let account = match account_factory(account_config) {
			Ok(implementation) => {
				validate_schema(
					"account",
					primary_account,
					implementation.config_schema(),
					account_config,
				)?;
				tracing::info!(component = "account", implementation = %primary_account, enabled = true, "Loaded");
				Arc::new(AccountService::new(implementation))
			}
			Err(e) => {
				tracing::error!(
					component = "account",
					implementation = %primary_account,
					error = %e,
					"Failed to create account implementation"
				);
				return Err(BuilderError::Config(format!(
					"Failed to create account implementation '{}': {}",
					primary_account, e
				)));
			}
		};

		// The relay account is the forwarder every target trusts
		let relay_address = account.get_address().await.map_err(|e| {
			tracing::error!(component = "account", error = %e, "Failed to get relay address");
			BuilderError::Config(format!("Failed to get relay address: {}", e))
		})?;

		// Create one forwarder per target
		let mut forwarders = HashMap::new();
		for (name, config) in &self.config.targets.implementations {
			let implementation = implementation_name(config, name);
			let factory = factories.target_factories.get(implementation).ok_or_else(|| {
				BuilderError::MissingComponent(format!(
					"target implementation '{}' for '{}'",
					implementation, name
				))
			})?;
			let target: Arc<dyn TargetInterface> = match factory(config, relay_address) {
				Ok(target) => target.into(),
				Err(e) => {
					tracing::error!(
						component = "target",
						target_name = %name,
						implementation = %implementation,
						error = %e,
						"Failed to create target implementation"
					);
					return Err(BuilderError::Config(format!(
						"Failed to create target '{}': {}",
						name, e
					)));
				}
			};

			validate_schema("target", name, target.config_schema(), config)?;

			let domain = self.config.domain.descriptor(target.address());
			let forwarder = Forwarder::new(
				domain,
				target.clone(),
				relay_address,
				storage.clone(),
				self.config.relay.failure_policy,
			)
			.map_err(|e| BuilderError::Config(format!("Target '{}': {}", name, e)))?;
			tracing::info!(
				component = "target",
				target_name = %name,
				implementation = %implementation,
				address = %target.address(),
				separator = %forwarder.binder().separator(),
				"Loaded"
			);
			forwarders.insert(name.clone(), forwarder);
		}

		// Create fee oracle implementations
		let mut fee_impls: HashMap<String, Arc<dyn FeeOracleInterface>> = HashMap::new();
		for (name, config) in &self.config.fee.implementations {
			if let Some(factory) = factories.fee_factories.get(name) {
				match factory(config) {
					Ok(implementation) => {
						validate_schema("fee", name, implementation.config_schema(), config)?;
						fee_impls.insert(name.clone(), implementation.into());
						let is_primary = &self.config.fee.primary == name;
						tracing::info!(component = "fee", implementation = %name, enabled = %is_primary, "Loaded");
					}
					Err(e) => {
						tracing::error!(
							component = "fee",
							implementation = %name,
							error = %e,
							"Failed to create fee implementation"
						);
						return Err(BuilderError::Config(format!(
							"Failed to create fee implementation '{}': {}",
							name, e
						)));
					}
				}
			}
		}
		let fees = FeeOracleService::new(
			fee_impls,
			self.config.fee.primary.clone(),
			self.config.domain.chain_id,
		)
		.map_err(|e| BuilderError::Config(e.to_string()))?;

		// Create fee tokens
		let mut tokens: Vec<Arc<dyn TokenInterface>> = Vec::new();
		for (name, config) in &self.config.fee.tokens {
			let implementation = implementation_name(config, DEFAULT_TOKEN_IMPLEMENTATION);
			let factory = factories.token_factories.get(implementation).ok_or_else(|| {
				BuilderError::MissingComponent(format!(
					"token implementation '{}' for '{}'",
					implementation, name
				))
			})?;

			// Tokens live on the relay's chain unless configured otherwise
			let mut config = config.clone();
			if let Some(table) = config.as_table_mut() {
				if !table.contains_key("chain_id") {
					table.insert(
						"chain_id".to_string(),
						toml::Value::Integer(self.config.domain.chain_id as i64),
					);
				}
			}

			match factory(&config) {
				Ok(token) => {
					validate_schema("token", name, token.config_schema(), &config)?;
					tracing::info!(
						component = "token",
						token = %name,
						implementation = %implementation,
						address = %token.address(),
						"Loaded"
					);
					tokens.push(token.into());
				}
				Err(e) => {
					tracing::error!(
						component = "token",
						token = %name,
						implementation = %implementation,
						error = %e,
						"Failed to create token implementation"
					);
					return Err(BuilderError::Config(format!(
						"Failed to create token '{}': {}",
						name, e
					)));
				}
			}
		}
		if tokens.is_empty() {
			tracing::warn!("No fee tokens configured - fee settlement will reject every payment");
		}

		let settlement = FeeSettlement::new(relay_address, tokens).with_storage(storage.clone());

		Ok(RelayEngine::new(
			self.config,
			storage,
			account,
			relay_address,
			forwarders,
			Arc::new(fees),
			Arc::new(settlement),
		))
	}
}
