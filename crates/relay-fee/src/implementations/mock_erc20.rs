//! In-process ERC-20 token with EIP-2612 permits.
//!
//! Stands in for a token contract: balances, allowances and permit nonces
//! live in memory. Permit signatures are checked with the same binder and
//! verifier the relay uses for its own requests.

use crate::{TokenError, TokenFactory, TokenInterface, TokenRegistry};
use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use relay_auth::{DomainBinder, EcdsaVerifier, SignatureVerifier};
use relay_types::utils::{parse_nonzero_address, Eip712AbiEncoder, PERMIT_TYPE};
use relay_types::{
	current_timestamp, parse_address, ConfigSchema, DomainDescriptor, Field, FieldType,
	ImplementationRegistry, Schema, SignatureParts, ValidationError,
};
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Digest an owner signs to approve `spender` through [`TokenInterface::permit`].
pub fn permit_digest(
	binder: &DomainBinder,
	owner: Address,
	spender: Address,
	value: U256,
	nonce: U256,
	deadline: u64,
) -> B256 {
	let mut enc = Eip712AbiEncoder::for_type(PERMIT_TYPE);
	enc.push_address(&owner);
	enc.push_address(&spender);
	enc.push_u256(value);
	enc.push_u256(nonce);
	enc.push_u64(deadline);
	binder.typed_digest(&enc.hash())
}

#[derive(Debug, Default, Clone)]
struct Ledger {
	balances: HashMap<Address, U256>,
	allowances: HashMap<(Address, Address), U256>,
	nonces: HashMap<Address, U256>,
}

impl Ledger {
	fn transfer_from(&mut self, spender: Address, from: Address, to: Address, amount: U256) -> bool {
		let allowance = self
			.allowances
			.get(&(from, spender))
			.copied()
			.unwrap_or_default();
		let balance = self.balances.get(&from).copied().unwrap_or_default();
		if allowance < amount || balance < amount {
			return false;
		}

		if allowance != U256::MAX {
			self.allowances.insert((from, spender), allowance - amount);
		}
		self.balances.insert(from, balance - amount);
		let to_balance = self.balances.entry(to).or_default();
		*to_balance = to_balance.saturating_add(amount);
		true
	}
}

/// Mock permit token.
pub struct MockErc20 {
	binder: DomainBinder,
	verifier: EcdsaVerifier,
	ledger: Mutex<Ledger>,
}

impl MockErc20 {
	/// Creates a token whose permit domain is `domain`. The token address is
	/// the domain's verifying contract.
	pub fn new(domain: DomainDescriptor) -> Self {
		Self {
			binder: DomainBinder::new(domain),
			verifier: EcdsaVerifier::new(),
			ledger: Mutex::new(Ledger::default()),
		}
	}

	pub async fn mint(&self, to: Address, amount: U256) {
		let mut ledger = self.ledger.lock().await;
		let balance = ledger.balances.entry(to).or_default();
		*balance = balance.saturating_add(amount);
	}

	pub async fn approve(&self, owner: Address, spender: Address, amount: U256) {
		self.ledger
			.lock()
			.await
			.allowances
			.insert((owner, spender), amount);
	}

	pub fn binder(&self) -> &DomainBinder {
		&self.binder
	}

	fn apply_permit(
		&self,
		ledger: &mut Ledger,
		owner: Address,
		spender: Address,
		value: U256,
		deadline: u64,
		signature: &SignatureParts,
	) -> Result<(), TokenError> {
		let now = current_timestamp();
		if now > deadline {
			return Err(TokenError::PermitExpired { deadline, now });
		}

		let nonce = ledger.nonces.get(&owner).copied().unwrap_or_default();
		let digest = permit_digest(&self.binder, owner, spender, value, nonce, deadline);
		let recovered = self
			.verifier
			.recover(&digest, signature)
			.map_err(|e| TokenError::InvalidPermit(e.to_string()))?;
		if recovered != owner {
			return Err(TokenError::InvalidPermit(format!(
				"signature recovers {}, not owner {}",
				recovered, owner
			)));
		}

		ledger.nonces.insert(owner, nonce + U256::from(1));
		ledger.allowances.insert((owner, spender), value);
		Ok(())
	}
}

#[async_trait]
impl TokenInterface for MockErc20 {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MockErc20Schema)
	}

	fn address(&self) -> Address {
		self.binder.domain().verifying_contract
	}

	fn domain(&self) -> &DomainDescriptor {
		self.binder.domain()
	}

	async fn balance_of(&self, owner: Address) -> Result<U256, TokenError> {
		let ledger = self.ledger.lock().await;
		Ok(ledger.balances.get(&owner).copied().unwrap_or_default())
	}

	async fn allowance(&self, owner: Address, spender: Address) -> Result<U256, TokenError> {
		let ledger = self.ledger.lock().await;
		Ok(ledger
			.allowances
			.get(&(owner, spender))
			.copied()
			.unwrap_or_default())
	}

	async fn nonces(&self, owner: Address) -> Result<U256, TokenError> {
		let ledger = self.ledger.lock().await;
		Ok(ledger.nonces.get(&owner).copied().unwrap_or_default())
	}

	async fn permit(
		&self,
		owner: Address,
		spender: Address,
		value: U256,
		deadline: u64,
		signature: &SignatureParts,
	) -> Result<(), TokenError> {
		let mut ledger = self.ledger.lock().await;
		self.apply_permit(&mut ledger, owner, spender, value, deadline, signature)
	}

	async fn transfer_from(
		&self,
		spender: Address,
		from: Address,
		to: Address,
		amount: U256,
	) -> Result<bool, TokenError> {
		Ok(self
			.ledger
			.lock()
			.await
			.transfer_from(spender, from, to, amount))
	}

	async fn permit_and_transfer_from(
		&self,
		owner: Address,
		spender: Address,
		to: Address,
		amount: U256,
		deadline: u64,
		signature: &SignatureParts,
	) -> Result<bool, TokenError> {
		let mut ledger = self.ledger.lock().await;

		// Both steps run against a copy that replaces the ledger only if the
		// transfer goes through
		let mut staged = (*ledger).clone();
		self.apply_permit(&mut staged, owner, spender, amount, deadline, signature)?;
		if !staged.transfer_from(spender, owner, to, amount) {
			return Ok(false);
		}
		*ledger = staged;
		Ok(true)
	}
}

/// Configuration schema for MockErc20.
pub struct MockErc20Schema;

impl ConfigSchema for MockErc20Schema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![
				Field::new("address", FieldType::Address { non_zero: true }),
				Field::new(
					"chain_id",
					FieldType::Integer {
						min: Some(1),
						max: None,
					},
				),
			],
			vec![
				Field::new("implementation", FieldType::String),
				Field::new("name", FieldType::String),
				Field::new("version", FieldType::String),
				Field::new("balances", FieldType::Table(Schema::new(vec![], vec![])))
					.with_validator(|value| {
						let Some(table) = value.as_table() else {
							return Ok(());
						};
						for (holder, amount) in table {
							parse_address(holder)?;
							let amount = amount
								.as_str()
								.ok_or_else(|| format!("balance of {} must be a string", holder))?;
							U256::from_str_radix(amount, 10)
								.map_err(|e| format!("balance of {}: {}", holder, e))?;
						}
						Ok(())
					}),
			],
		);
		schema.validate(config)
	}
}

/// Factory function to create a mock token from configuration.
///
/// Configuration parameters:
/// - `address`: token address (required, non-zero)
/// - `chain_id`: chain the permit domain is bound to (required)
/// - `name`, `version`: permit domain name and version (default "Mock Token", "1")
/// - `balances`: table of holder address to decimal initial balance
pub fn create_token(config: &toml::Value) -> Result<Box<dyn TokenInterface>, TokenError> {
	MockErc20Schema
		.validate(config)
		.map_err(|e| TokenError::Configuration(e.to_string()))?;

	let address = config
		.get("address")
		.and_then(|v| v.as_str())
		.ok_or_else(|| TokenError::Configuration("address is required".to_string()))
		.and_then(|s| parse_nonzero_address(s).map_err(TokenError::Configuration))?;
	let chain_id = config
		.get("chain_id")
		.and_then(|v| v.as_integer())
		.ok_or_else(|| TokenError::Configuration("chain_id is required".to_string()))?;
	let name = config
		.get("name")
		.and_then(|v| v.as_str())
		.unwrap_or("Mock Token");
	let version = config
		.get("version")
		.and_then(|v| v.as_str())
		.unwrap_or("1");

	let mut ledger = Ledger::default();
	if let Some(balances) = config.get("balances").and_then(|v| v.as_table()) {
		for (holder, amount) in balances {
			let holder = parse_address(holder).map_err(TokenError::Configuration)?;
			let amount = amount
				.as_str()
				.and_then(|a| U256::from_str_radix(a, 10).ok())
				.ok_or_else(|| {
					TokenError::Configuration(format!("Invalid balance for {}", holder))
				})?;
			ledger.balances.insert(holder, amount);
		}
	}

	Ok(Box::new(MockErc20 {
		binder: DomainBinder::new(DomainDescriptor::new(
			name,
			version,
			chain_id as u64,
			address,
		)),
		verifier: EcdsaVerifier::new(),
		ledger: Mutex::new(ledger),
	}))
}

/// Registry for the mock token implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "mock_erc20";
	type Factory = TokenFactory;

	fn factory() -> Self::Factory {
		create_token
	}
}

impl TokenRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_signer::SignerSync;
	use alloy_signer_local::PrivateKeySigner;

	fn token() -> MockErc20 {
		MockErc20::new(DomainDescriptor::new(
			"USD Coin",
			"2",
			31337,
			Address::repeat_byte(0x70),
		))
	}

	fn sign_permit(
		token: &MockErc20,
		owner: &PrivateKeySigner,
		spender: Address,
		value: U256,
		nonce: U256,
		deadline: u64,
	) -> SignatureParts {
		let digest = permit_digest(token.binder(), owner.address(), spender, value, nonce, deadline);
		SignatureParts::from_bytes(&owner.sign_hash_sync(&digest).unwrap().as_bytes()).unwrap()
	}

	#[tokio::test]
	async fn test_permit_sets_allowance_and_bumps_nonce() {
		let token = token();
		let owner = PrivateKeySigner::random();
		let spender = Address::repeat_byte(0x5e);
		let deadline = current_timestamp() + 600;
		let value = U256::from(500);

		let sig = sign_permit(&token, &owner, spender, value, U256::ZERO, deadline);
		token
			.permit(owner.address(), spender, value, deadline, &sig)
			.await
			.unwrap();
		assert_eq!(token.allowance(owner.address(), spender).await.unwrap(), value);
		assert_eq!(token.nonces(owner.address()).await.unwrap(), U256::from(1));

		// The same signature is bound to the old nonce
		assert!(matches!(
			token.permit(owner.address(), spender, value, deadline, &sig).await,
			Err(TokenError::InvalidPermit(_))
		));
	}

	#[tokio::test]
	async fn test_expired_permit_rejected() {
		let token = token();
		let owner = PrivateKeySigner::random();
		let spender = Address::repeat_byte(0x5e);
		let deadline = current_timestamp() - 1;

		let sig = sign_permit(&token, &owner, spender, U256::from(1), U256::ZERO, deadline);
		assert!(matches!(
			token
				.permit(owner.address(), spender, U256::from(1), deadline, &sig)
				.await,
			Err(TokenError::PermitExpired { .. })
		));
	}

	#[tokio::test]
	async fn test_transfer_from_returns_false_when_short() {
		let token = token();
		let owner = Address::repeat_byte(0x01);
		let spender = Address::repeat_byte(0x02);
		let to = Address::repeat_byte(0x03);

		token.mint(owner, U256::from(100)).await;
		assert!(!token
			.transfer_from(spender, owner, to, U256::from(10))
			.await
			.unwrap());

		token.approve(owner, spender, U256::from(50)).await;
		assert!(!token
			.transfer_from(spender, owner, to, U256::from(60))
			.await
			.unwrap());
		assert!(token
			.transfer_from(spender, owner, to, U256::from(50))
			.await
			.unwrap());

		assert_eq!(token.balance_of(owner).await.unwrap(), U256::from(50));
		assert_eq!(token.balance_of(to).await.unwrap(), U256::from(50));
		assert_eq!(token.allowance(owner, spender).await.unwrap(), U256::ZERO);
	}

	#[tokio::test]
	async fn test_permit_and_transfer_is_all_or_nothing() {
		let token = token();
		let owner = PrivateKeySigner::random();
		let spender = Address::repeat_byte(0x5e);
		let to = Address::repeat_byte(0x03);
		let deadline = current_timestamp() + 600;
		let value = U256::from(250);
		token.mint(owner.address(), U256::from(10)).await;

		let sig = sign_permit(&token, &owner, spender, value, U256::ZERO, deadline);
		assert!(!token
			.permit_and_transfer_from(owner.address(), spender, to, value, deadline, &sig)
			.await
			.unwrap());
		assert_eq!(token.nonces(owner.address()).await.unwrap(), U256::ZERO);
		assert_eq!(token.allowance(owner.address(), spender).await.unwrap(), U256::ZERO);
		assert_eq!(token.balance_of(owner.address()).await.unwrap(), U256::from(10));

		// The unused signature still works once the balance is there
		token.mint(owner.address(), U256::from(240)).await;
		assert!(token
			.permit_and_transfer_from(owner.address(), spender, to, value, deadline, &sig)
			.await
			.unwrap());
		assert_eq!(token.nonces(owner.address()).await.unwrap(), U256::from(1));
		assert_eq!(token.allowance(owner.address(), spender).await.unwrap(), U256::ZERO);
		assert_eq!(token.balance_of(to).await.unwrap(), value);
	}

	#[tokio::test]
	async fn test_factory_loads_balances() {
		let config: toml::Value = toml::from_str(
			r#"
address = "0xe7f1725E7734CE288F8367e1Bb143E90bb3F0512"
chain_id = 31337
name = "USD Coin"

[balances]
"0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266" = "1000000"
"#,
		)
		.unwrap();
		let token = create_token(&config).unwrap();
		let holder = parse_address("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266").unwrap();
		assert_eq!(token.balance_of(holder).await.unwrap(), U256::from(1_000_000));
		assert_eq!(token.domain().name, "USD Coin");
		assert_eq!(token.domain().version, "1");
	}
}
