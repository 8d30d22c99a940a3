//! Account management module for the relay.
//!
//! An account is a key that signs EIP-712 digests. The relay uses its own
//! account as the trusted forwarder identity and as the spender of fee
//! permits; clients use [`AccountService`] to build signed authorization
//! requests.

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use relay_auth::DomainBinder;
use relay_types::{
	AuthorizationRequest, ConfigSchema, ImplementationRegistry, ReplayToken, SignatureParts,
};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod local;
}

/// Errors that can occur during account operations.
#[derive(Debug, Error)]
pub enum AccountError {
	/// Error that occurs when signing operations fail.
	#[error("Signing failed: {0}")]
	SigningFailed(String),
	/// Error that occurs when a cryptographic key is invalid or malformed.
	#[error("Invalid key: {0}")]
	InvalidKey(String),
	/// Error that occurs when interacting with the account implementation.
	#[error("Implementation error: {0}")]
	Implementation(String),
}

/// Trait defining the interface for account implementations.
#[async_trait]
pub trait AccountInterface: Send + Sync {
	/// Returns the configuration schema for this account implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Retrieves the address associated with this account.
	async fn address(&self) -> Result<Address, AccountError>;

	/// Signs a 32-byte digest as-is, without any message prefix.
	async fn sign_hash(&self, hash: &B256) -> Result<SignatureParts, AccountError>;
}

/// Type alias for account factory functions.
pub type AccountFactory = fn(&toml::Value) -> Result<Box<dyn AccountInterface>, AccountError>;

/// Registry trait for account implementations.
pub trait AccountRegistry: ImplementationRegistry<Factory = AccountFactory> {}

/// Get all registered account implementations.
pub fn get_all_implementations() -> Vec<(&'static str, AccountFactory)> {
	use implementations::local;

	vec![(local::Registry::NAME, local::Registry::factory())]
}

/// Service that manages account operations.
pub struct AccountService {
	implementation: Box<dyn AccountInterface>,
}

impl AccountService {
	pub fn new(implementation: Box<dyn AccountInterface>) -> Self {
		Self { implementation }
	}

	pub async fn get_address(&self) -> Result<Address, AccountError> {
		self.implementation.address().await
	}

	pub async fn sign_hash(&self, hash: &B256) -> Result<SignatureParts, AccountError> {
		self.implementation.sign_hash(hash).await
	}

	/// Builds and signs a request for `binder`'s domain with this account as user.
	pub async fn sign_request(
		&self,
		binder: &DomainBinder,
		data: Bytes,
		replay: ReplayToken,
	) -> Result<AuthorizationRequest, AccountError> {
		let user = self.get_address().await?;
		let digest = binder.digest(user, &data, &replay);
		let signature = self.sign_hash(&digest).await?;
		Ok(AuthorizationRequest {
			data,
			user,
			replay,
			signature: Bytes::copy_from_slice(&signature.to_bytes()),
		})
	}

	/// Signs a sequential-mode request carrying `nonce`.
	pub async fn sign_sequential(
		&self,
		binder: &DomainBinder,
		data: Bytes,
		nonce: U256,
	) -> Result<AuthorizationRequest, AccountError> {
		self.sign_request(binder, data, ReplayToken::Nonce { nonce })
			.await
	}

	/// Signs a concurrent-mode request carrying `salt`, valid until `deadline`.
	pub async fn sign_concurrent(
		&self,
		binder: &DomainBinder,
		data: Bytes,
		salt: B256,
		deadline: u64,
	) -> Result<AuthorizationRequest, AccountError> {
		self.sign_request(binder, data, ReplayToken::Salt { salt, deadline })
			.await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use implementations::local::LocalWallet;
	use relay_auth::{EcdsaVerifier, SignatureVerifier};
	use relay_types::DomainDescriptor;

	const KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

	fn binder() -> DomainBinder {
		DomainBinder::new(DomainDescriptor::new(
			"MetaCounter",
			"1",
			31337,
			Address::repeat_byte(0x42),
		))
	}

	#[tokio::test]
	async fn test_signed_requests_recover_to_account() {
		let service = AccountService::new(Box::new(LocalWallet::new(KEY).unwrap()));
		let binder = binder();
		let address = service.get_address().await.unwrap();

		let sequential = service
			.sign_sequential(&binder, Bytes::from_static(b"call"), U256::from(3))
			.await
			.unwrap();
		let concurrent = service
			.sign_concurrent(&binder, Bytes::from_static(b"call"), B256::repeat_byte(1), 99)
			.await
			.unwrap();

		for request in [sequential, concurrent] {
			assert_eq!(request.user, address);
			let digest = binder.digest(request.user, &request.data, &request.replay);
			let parts = SignatureParts::try_from(&request.signature).unwrap();
			assert_eq!(EcdsaVerifier.recover(&digest, &parts).unwrap(), address);
		}
	}
}
