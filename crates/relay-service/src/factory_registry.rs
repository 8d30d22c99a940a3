//! Dynamic factory registry for relay implementations.
//!
//! Collects the factory functions every implementation crate registers so
//! the engine can be built from configuration alone.

use relay_account::AccountFactory;
use relay_config::Config;
use relay_core::targets::TargetFactory;
use relay_core::{RelayBuilder, RelayEngine, RelayFactories};
use relay_fee::{FeeOracleFactory, TokenFactory};
use relay_storage::StorageFactory;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Global registry for all implementation factories
pub struct FactoryRegistry {
	pub storage: HashMap<String, StorageFactory>,
	pub account: HashMap<String, AccountFactory>,
	pub target: HashMap<String, TargetFactory>,
	pub fee: HashMap<String, FeeOracleFactory>,
	pub token: HashMap<String, TokenFactory>,
}

impl FactoryRegistry {
	/// Create a new empty registry
	pub fn new() -> Self {
		Self {
			storage: HashMap::new(),
			account: HashMap::new(),
			target: HashMap::new(),
			fee: HashMap::new(),
			token: HashMap::new(),
		}
	}
}

impl Default for FactoryRegistry {
	fn default() -> Self {
		Self::new()
	}
}

static REGISTRY: OnceLock<FactoryRegistry> = OnceLock::new();

/// Get the global factory registry, initializing it on first use.
pub fn get_registry() -> &'static FactoryRegistry {
	REGISTRY.get_or_init(|| {
		let mut registry = FactoryRegistry::new();

		for (name, factory) in relay_storage::get_all_implementations() {
			tracing::debug!("Registering storage implementation: {}", name);
			registry.storage.insert(name.to_string(), factory);
		}

		for (name, factory) in relay_account::get_all_implementations() {
			tracing::debug!("Registering account implementation: {}", name);
			registry.account.insert(name.to_string(), factory);
		}

		for (name, factory) in relay_core::targets::get_all_implementations() {
			tracing::debug!("Registering target implementation: {}", name);
			registry.target.insert(name.to_string(), factory);
		}

		for (name, factory) in relay_fee::get_all_implementations() {
			tracing::debug!("Registering fee implementation: {}", name);
			registry.fee.insert(name.to_string(), factory);
		}

		for (name, factory) in relay_fee::get_all_token_implementations() {
			tracing::debug!("Registering token implementation: {}", name);
			registry.token.insert(name.to_string(), factory);
		}

		registry
	})
}

/// Macro to build factories from config implementations
macro_rules! build_factories {
	($registry:expr, $config_impls:expr, $registry_field:ident, $type_name:literal) => {{
		let mut factories = HashMap::new();
		for name in $config_impls.keys() {
			if let Some(factory) = $registry.$registry_field.get(name) {
				factories.insert(name.clone(), *factory);
			} else {
				let mut available: Vec<_> = $registry.$registry_field.keys().cloned().collect();
				available.sort();
				return Err(format!(
					"Unknown {} implementation '{}'. Available: [{}]",
					$type_name,
					name,
					available.join(", ")
				)
				.into());
			}
		}
		factories
	}};
}

/// Build the relay engine using the registry and config.
///
/// Storage, account and fee implementations are keyed by implementation
/// name in the config, so unknown names fail here. Targets and tokens are
/// keyed by instance name and resolved by the builder.
pub async fn build_relay_from_config(
	config: Config,
) -> Result<RelayEngine, Box<dyn std::error::Error>> {
	let registry = get_registry();

	let storage_factories =
		build_factories!(registry, config.storage.implementations, storage, "storage");
	let account_factories =
		build_factories!(registry, config.account.implementations, account, "account");
	let fee_factories = build_factories!(registry, config.fee.implementations, fee, "fee");

	let factories = RelayFactories {
		storage_factories,
		account_factories,
		target_factories: registry.target.clone(),
		fee_factories,
		token_factories: registry.token.clone(),
	};

	Ok(RelayBuilder::new(config).build(factories).await?)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_registry_contains_builtin_implementations() {
		let registry = get_registry();
		assert!(registry.storage.contains_key("memory"));
		assert!(registry.storage.contains_key("file"));
		assert!(registry.account.contains_key("local"));
		assert!(registry.target.contains_key("counter"));
		assert!(registry.fee.contains_key("mock"));
		assert!(registry.token.contains_key("mock_erc20"));
	}

	#[tokio::test]
	async fn test_unknown_storage_implementation_rejected() {
		let config: Config = crate::tests::TEST_CONFIG
			.replace("[storage.implementations.memory]", "[storage.implementations.redis]")
			.replace("primary = \"memory\"", "primary = \"redis\"")
			.parse()
			.unwrap();
		let err = build_relay_from_config(config).await.err().unwrap();
		assert!(err.to_string().contains("Unknown storage implementation 'redis'"));
	}
}
