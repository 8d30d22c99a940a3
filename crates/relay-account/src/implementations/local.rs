//! Local private key account.
//!
//! The key is read from configuration and held in memory for the lifetime of
//! the process.

use crate::{AccountError, AccountFactory, AccountInterface, AccountRegistry};
use alloy_primitives::{Address, B256};
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use relay_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, SecretString, SignatureParts,
	ValidationError,
};

/// Account backed by an in-memory secp256k1 key.
pub struct LocalWallet {
	signer: PrivateKeySigner,
}

impl LocalWallet {
	/// Creates a wallet from a hex private key, with or without "0x".
	pub fn new(private_key: impl Into<SecretString>) -> Result<Self, AccountError> {
		let secret = private_key.into();
		let signer = secret.with_exposed(|key| {
			key.trim_start_matches("0x")
				.parse::<PrivateKeySigner>()
				.map_err(|e| AccountError::InvalidKey(e.to_string()))
		})?;
		Ok(Self { signer })
	}
}

#[async_trait]
impl AccountInterface for LocalWallet {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(LocalWalletSchema)
	}

	async fn address(&self) -> Result<Address, AccountError> {
		Ok(self.signer.address())
	}

	async fn sign_hash(&self, hash: &B256) -> Result<SignatureParts, AccountError> {
		let signature = self
			.signer
			.sign_hash_sync(hash)
			.map_err(|e| AccountError::SigningFailed(e.to_string()))?;
		SignatureParts::from_bytes(&signature.as_bytes())
			.map_err(|e| AccountError::SigningFailed(e.to_string()))
	}
}

/// Configuration schema for LocalWallet.
pub struct LocalWalletSchema;

impl ConfigSchema for LocalWalletSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![
				Field::new("private_key", FieldType::String).with_validator(|value| {
					let key = value.as_str().unwrap_or("");
					let hex_part = key.strip_prefix("0x").unwrap_or(key);
					if hex_part.len() != 64 {
						return Err("Private key must be 64 hex characters".to_string());
					}
					hex::decode(hex_part)
						.map(|_| ())
						.map_err(|_| "Private key must be valid hex".to_string())
				}),
			],
			vec![],
		);
		schema.validate(config)
	}
}

/// Factory function to create a local account from configuration.
///
/// Configuration parameters:
/// - `private_key`: hex-encoded secp256k1 key
pub fn create_account(config: &toml::Value) -> Result<Box<dyn AccountInterface>, AccountError> {
	LocalWalletSchema
		.validate(config)
		.map_err(|e| AccountError::InvalidKey(e.to_string()))?;

	let private_key = config
		.get("private_key")
		.and_then(|v| v.as_str())
		.ok_or_else(|| AccountError::InvalidKey("private_key is required".to_string()))?;

	Ok(Box::new(LocalWallet::new(private_key)?))
}

/// Registry for the local account implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "local";
	type Factory = AccountFactory;

	fn factory() -> Self::Factory {
		create_account
	}
}

impl AccountRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_primitives::address;

	#[tokio::test]
	async fn test_known_key_address() {
		let config: toml::Value = toml::from_str(
			r#"private_key = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80""#,
		)
		.unwrap();
		let account = create_account(&config).unwrap();
		assert_eq!(
			account.address().await.unwrap(),
			address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266")
		);
	}

	#[test]
	fn test_rejects_malformed_keys() {
		for bad in [
			r#"private_key = "0x1234""#,
			r#"private_key = "0xzz0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80""#,
			"other = 1",
		] {
			let config: toml::Value = toml::from_str(bad).unwrap();
			assert!(matches!(
				create_account(&config),
				Err(AccountError::InvalidKey(_))
			));
		}
	}

	#[tokio::test]
	async fn test_signatures_use_27_28_recovery_byte() {
		let wallet =
			LocalWallet::new("ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80")
				.unwrap();
		let parts = wallet.sign_hash(&B256::repeat_byte(7)).await.unwrap();
		assert!(parts.v == 27 || parts.v == 28);
	}
}
