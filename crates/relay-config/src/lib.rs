//! Configuration module for the sponsored-call relay.
//!
//! This module provides structures and utilities for managing relay configuration.
//! It supports loading configuration from TOML files and provides validation to ensure
//! all required configuration values are properly set.
//!
//! ## Modular Configuration Support
//!
//! Configurations can be split into multiple files for better organization:
//! - Use `include = ["file1.toml", "file2.toml"]` to include other config files
//! - Each top-level section must be unique across all files (no duplicates allowed)

mod loader;

pub use loader::ConfigLoader;

use regex::Regex;
use relay_types::{parse_address, Address, DomainDescriptor, FailurePolicy};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Extract just the message without the huge input dump
		let message = err.message().to_string();
		ConfigError::Parse(message)
	}
}

/// Main configuration structure for the relay.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Configuration specific to the relay instance.
	pub relay: RelayConfig,
	/// EIP-712 domain shared by every forwarding target.
	pub domain: DomainConfig,
	/// Configuration for the storage backend holding replay state.
	pub storage: StorageConfig,
	/// Configuration for the relay's own signing account.
	pub account: AccountConfig,
	/// Wrapped call targets the relay forwards to.
	pub targets: TargetsConfig,
	/// Fee oracle and fee token configuration.
	pub fee: FeeConfig,
	/// Configuration for the HTTP API server.
	pub api: Option<ApiConfig>,
}

/// Configuration specific to the relay instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RelayConfig {
	/// Unique identifier for this relay instance.
	pub id: String,
	/// Whether a failed wrapped call keeps its replay token consumed.
	#[serde(default)]
	pub failure_policy: FailurePolicy,
}

/// EIP-712 domain parameters. The verifying contract is the target address.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DomainConfig {
	pub name: String,
	pub version: String,
	pub chain_id: u64,
	/// Encode the chain id as a `bytes32 salt` domain member.
	#[serde(default)]
	pub use_chain_salt: bool,
}

impl DomainConfig {
	/// Builds the domain descriptor for a given verifying contract.
	pub fn descriptor(&self, verifying_contract: Address) -> DomainDescriptor {
		let descriptor = DomainDescriptor::new(
			self.name.clone(),
			self.version.clone(),
			self.chain_id,
			verifying_contract,
		);
		if self.use_chain_salt {
			descriptor.with_chain_salt()
		} else {
			descriptor
		}
	}
}

/// Configuration for the storage backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of storage implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
	/// Interval in seconds for cleaning up expired storage entries.
	pub cleanup_interval_seconds: u64,
}

/// Configuration for account management.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AccountConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of account implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration for forwarding targets.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TargetsConfig {
	/// Map of target implementation names to their configurations.
	/// Every entry must carry an `address` field.
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration for fee quoting and settlement.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeeConfig {
	/// Which fee oracle implementation to use as primary.
	pub primary: String,
	/// Map of fee oracle implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
	/// Map of token names to their configurations.
	/// Every entry must carry an `address` field and may name its
	/// `implementation` (defaults to "mock_erc20").
	#[serde(default)]
	pub tokens: HashMap<String, toml::Value>,
}

/// Configuration for the HTTP API server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
	/// Whether the API server is enabled.
	#[serde(default)]
	pub enabled: bool,
	/// Host address to bind the server to.
	#[serde(default = "default_api_host")]
	pub host: String,
	/// Port to bind the server to.
	#[serde(default = "default_api_port")]
	pub port: u16,
	/// Request timeout in seconds.
	#[serde(default = "default_api_timeout")]
	pub timeout_seconds: u64,
	/// Maximum request size in bytes.
	#[serde(default = "default_max_request_size")]
	pub max_request_size: usize,
	/// CORS configuration.
	pub cors: Option<CorsConfig>,
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CorsConfig {
	/// Allowed origins for CORS.
	pub allowed_origins: Vec<String>,
}

fn default_api_host() -> String {
	"127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
	3000
}

fn default_api_timeout() -> u64 {
	30
}

fn default_max_request_size() -> usize {
	1024 * 1024 // 1MB
}

/// Resolves environment variables in a string.
///
/// Replaces ${VAR_NAME} with the value of the environment variable VAR_NAME.
/// Supports default values with ${VAR_NAME:-default_value}.
///
/// Input strings are limited to 1MB to prevent ReDoS attacks.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = input.to_string();
	let mut replacements = Vec::new();

	for cap in re.captures_iter(input) {
		let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let var_name = var_name.as_str();
		let default_value = cap.get(2).map(|m| m.as_str());

		let value = match std::env::var(var_name) {
			Ok(v) => v,
			Err(_) => match default_value {
				Some(default) => default.to_string(),
				None => {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						var_name
					)))
				},
			},
		};

		replacements.push((full_match.start(), full_match.end(), value));
	}

	// Apply replacements in reverse order to maintain positions
	for (start, end, value) in replacements.iter().rev() {
		result.replace_range(start..end, value);
	}

	Ok(result)
}

/// Reads and parses the `address` field of an implementation table.
fn required_address(section: &str, name: &str, value: &toml::Value) -> Result<Address, ConfigError> {
	let raw = value
		.get("address")
		.and_then(|v| v.as_str())
		.ok_or_else(|| {
			ConfigError::Validation(format!("{} '{}' must have an address", section, name))
		})?;
	let address = parse_address(raw)
		.map_err(|e| ConfigError::Validation(format!("{} '{}': {}", section, name, e)))?;
	if address.is_zero() {
		return Err(ConfigError::Validation(format!(
			"{} '{}' cannot use the zero address",
			section, name
		)));
	}
	Ok(address)
}

fn check_primary(
	section: &str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
) -> Result<(), ConfigError> {
	if implementations.is_empty() {
		return Err(ConfigError::Validation(format!(
			"At least one {} implementation must be configured",
			section
		)));
	}
	if primary.is_empty() {
		return Err(ConfigError::Validation(format!(
			"{} primary implementation cannot be empty",
			section
		)));
	}
	if !implementations.contains_key(primary) {
		return Err(ConfigError::Validation(format!(
			"Primary {} '{}' not found in implementations",
			section, primary
		)));
	}
	Ok(())
}

impl Config {
	/// Loads configuration from a file with environment variable resolution.
	///
	/// This method supports modular configuration through include directives:
	/// - `include = ["file1.toml", "file2.toml"]` - Include specific files
	///
	/// Each top-level section must be unique across all configuration files.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let path_buf = Path::new(path);
		let base_dir = path_buf.parent().unwrap_or_else(|| Path::new("."));

		let mut loader = loader::ConfigLoader::new(base_dir);
		let file_name = path_buf
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path)))?;
		loader.load_config(file_name).await
	}

	/// Returns the parsed address of every configured target, keyed by name.
	pub fn target_addresses(&self) -> Result<HashMap<String, Address>, ConfigError> {
		self.targets
			.implementations
			.iter()
			.map(|(name, value)| Ok((name.clone(), required_address("Target", name, value)?)))
			.collect()
	}

	/// Validates the configuration to ensure all required fields are properly set.
	///
	/// Implementation sub-tables are only checked for the fields the relay
	/// itself reads; each implementation validates the rest through its own
	/// schema when it is constructed.
	fn validate(&self) -> Result<(), ConfigError> {
		if self.relay.id.is_empty() {
			return Err(ConfigError::Validation("Relay ID cannot be empty".into()));
		}

		if self.domain.name.is_empty() || self.domain.version.is_empty() {
			return Err(ConfigError::Validation(
				"Domain name and version cannot be empty".into(),
			));
		}
		if self.domain.chain_id == 0 {
			return Err(ConfigError::Validation(
				"Domain chain_id must be greater than 0".into(),
			));
		}

		check_primary(
			"storage",
			&self.storage.primary,
			&self.storage.implementations,
		)?;
		if self.storage.cleanup_interval_seconds == 0 {
			return Err(ConfigError::Validation(
				"Storage cleanup_interval_seconds must be greater than 0".into(),
			));
		}
		if self.storage.cleanup_interval_seconds > 86400 {
			return Err(ConfigError::Validation(
				"Storage cleanup_interval_seconds cannot exceed 86400 (24 hours)".into(),
			));
		}

		check_primary(
			"account",
			&self.account.primary,
			&self.account.implementations,
		)?;

		if self.targets.implementations.is_empty() {
			return Err(ConfigError::Validation(
				"At least one target implementation must be configured".into(),
			));
		}
		let mut seen = HashSet::new();
		for (name, address) in self.target_addresses()? {
			if !seen.insert(address) {
				return Err(ConfigError::Validation(format!(
					"Target '{}' reuses address {} of another target",
					name, address
				)));
			}
		}

		check_primary("fee", &self.fee.primary, &self.fee.implementations)?;
		let mut seen = HashSet::new();
		for (name, value) in &self.fee.tokens {
			let address = required_address("Token", name, value)?;
			if !seen.insert(address) {
				return Err(ConfigError::Validation(format!(
					"Token '{}' reuses address {} of another token",
					name, address
				)));
			}
		}

		Ok(())
	}
}

/// Parses configuration from a TOML string.
///
/// Environment variables are resolved and the configuration is validated
/// after parsing.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}

#[cfg(test)]
pub(crate) mod tests {
	use super::*;

	pub(crate) const BASE_CONFIG: &str = r#"
[relay]
id = "relay-test"

[domain]
name = "MetaCounter"
version = "1"
chain_id = 31337

[storage]
primary = "memory"
cleanup_interval_seconds = 3600
[storage.implementations.memory]

[account]
primary = "local"
[account.implementations.local]
private_key = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"

[targets.implementations.counter]
address = "0x5FbDB2315678afecb367f032d93F642f64180aa3"

[fee]
primary = "mock"
[fee.implementations.mock]
collector = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8"
[fee.tokens.usdc]
address = "0xe7f1725E7734CE288F8367e1Bb143E90bb3F0512"
"#;

	#[test]
	fn test_env_var_resolution() {
		std::env::set_var("RELAY_TEST_HOST", "localhost");
		std::env::set_var("RELAY_TEST_PORT", "5432");

		let input = "host = \"${RELAY_TEST_HOST}:${RELAY_TEST_PORT}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "host = \"localhost:5432\"");

		std::env::remove_var("RELAY_TEST_HOST");
		std::env::remove_var("RELAY_TEST_PORT");
	}

	#[test]
	fn test_env_var_with_default() {
		let input = "value = \"${RELAY_MISSING_VAR:-default_value}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "value = \"default_value\"");
	}

	#[test]
	fn test_missing_env_var_error() {
		let input = "value = \"${RELAY_MISSING_VAR}\"";
		let result = resolve_env_vars(input);
		assert!(result.is_err());
		assert!(result.unwrap_err().to_string().contains("RELAY_MISSING_VAR"));
	}

	#[test]
	fn test_parse_base_config() {
		let config: Config = BASE_CONFIG.parse().unwrap();
		assert_eq!(config.relay.id, "relay-test");
		assert_eq!(config.relay.failure_policy, FailurePolicy::Consume);
		assert!(config.api.is_none());

		let targets = config.target_addresses().unwrap();
		let counter = targets["counter"];
		let domain = config.domain.descriptor(counter);
		assert_eq!(domain.verifying_contract, counter);
		assert!(!domain.use_chain_salt);
	}

	#[test]
	fn test_failure_policy_and_salted_domain() {
		let config_str = BASE_CONFIG
			.replace(
				"id = \"relay-test\"",
				"id = \"relay-test\"\nfailure_policy = \"rollback\"",
			)
			.replace("chain_id = 31337", "chain_id = 31337\nuse_chain_salt = true");
		let config: Config = config_str.parse().unwrap();
		assert_eq!(config.relay.failure_policy, FailurePolicy::Rollback);
		assert!(config.domain.descriptor(Address::ZERO).use_chain_salt);
	}

	#[test]
	fn test_config_with_env_vars() {
		std::env::set_var("RELAY_TEST_ID", "from-env");
		let config: Config = BASE_CONFIG
			.replace("\"relay-test\"", "\"${RELAY_TEST_ID}\"")
			.parse()
			.unwrap();
		assert_eq!(config.relay.id, "from-env");
		std::env::remove_var("RELAY_TEST_ID");
	}

	#[test]
	fn test_unknown_primary_rejected() {
		let err = BASE_CONFIG
			.replace("primary = \"memory\"", "primary = \"redis\"")
			.parse::<Config>()
			.unwrap_err();
		assert!(err.to_string().contains("Primary storage 'redis'"));
	}

	#[test]
	fn test_zero_target_address_rejected() {
		let err = BASE_CONFIG
			.replace(
				"0x5FbDB2315678afecb367f032d93F642f64180aa3",
				"0x0000000000000000000000000000000000000000",
			)
			.parse::<Config>()
			.unwrap_err();
		assert!(err.to_string().contains("zero address"));
	}

	#[test]
	fn test_malformed_token_address_rejected() {
		let err = BASE_CONFIG
			.replace("0xe7f1725E7734CE288F8367e1Bb143E90bb3F0512", "0x1234")
			.parse::<Config>()
			.unwrap_err();
		assert!(matches!(err, ConfigError::Validation(_)));
		assert!(err.to_string().contains("Token 'usdc'"));
	}

	#[test]
	fn test_empty_relay_id_rejected() {
		let err = BASE_CONFIG
			.replace("id = \"relay-test\"", "id = \"\"")
			.parse::<Config>()
			.unwrap_err();
		assert!(err.to_string().contains("Relay ID"));
	}
}
