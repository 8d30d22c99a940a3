//! Fee settlement.
//!
//! Pulls a fee from a payer to a collector through a registered token. The
//! settler is the address that calls the token, so it is the `spender` a
//! permit must approve.
//!
//! The amount is taken as given. Bounding it against a quote is the
//! caller's responsibility.

use crate::{FeeError, TokenError, TokenInterface};
use alloy_primitives::Address;
use relay_storage::StorageService;
use relay_types::{current_timestamp, FeePayment, FeeReceipt, SignatureParts, StorageKey};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Settles fee payments in a fixed set of tokens.
pub struct FeeSettlement {
	settler: Address,
	tokens: HashMap<Address, Arc<dyn TokenInterface>>,
	storage: Option<Arc<StorageService>>,
	sequence: AtomicU64,
}

impl FeeSettlement {
	pub fn new(settler: Address, tokens: Vec<Arc<dyn TokenInterface>>) -> Self {
		Self {
			settler,
			tokens: tokens
				.into_iter()
				.map(|token| (token.address(), token))
				.collect(),
			storage: None,
			sequence: AtomicU64::new(0),
		}
	}

	/// Records receipts of settled payments in `storage`.
	pub fn with_storage(mut self, storage: Arc<StorageService>) -> Self {
		self.storage = Some(storage);
		self
	}

	pub fn settler(&self) -> Address {
		self.settler
	}

	pub fn token(&self, address: &Address) -> Option<&Arc<dyn TokenInterface>> {
		self.tokens.get(address)
	}

	/// Settles one payment.
	///
	/// Collector and token are checked before any token call. An address
	/// with no registered token behaves like a call to a non-contract and
	/// fails the transfer. A permit is applied in the same token call as
	/// the transfer, so a failed transfer leaves the permit unused.
	pub async fn settle(&self, payment: &FeePayment) -> Result<FeeReceipt, FeeError> {
		if payment.collector.is_zero() {
			return Err(FeeError::InvalidFeeCollector);
		}
		if payment.token.is_zero() {
			return Err(FeeError::InvalidFeeToken);
		}

		let token = self.tokens.get(&payment.token).ok_or_else(|| {
			FeeError::FeeTransferFailed(format!("no token contract at {}", payment.token))
		})?;

		let transferred = match &payment.permit {
			Some(permit) => {
				let signature = SignatureParts::try_from(&permit.signature)
					.map_err(|e| FeeError::PermitRejected(e.to_string()))?;
				token
					.permit_and_transfer_from(
						payment.payer,
						self.settler,
						payment.collector,
						payment.amount,
						permit.deadline,
						&signature,
					)
					.await
					.map_err(|e| match e {
						TokenError::PermitExpired { .. } | TokenError::InvalidPermit(_) => {
							FeeError::PermitRejected(e.to_string())
						}
						other => FeeError::FeeTransferFailed(other.to_string()),
					})?
			}
			None => token
				.transfer_from(self.settler, payment.payer, payment.collector, payment.amount)
				.await
				.map_err(|e| FeeError::FeeTransferFailed(e.to_string()))?,
		};
		if !transferred {
			return Err(FeeError::FeeTransferFailed(
				"token transfer returned false".to_string(),
			));
		}

		let receipt = FeeReceipt {
			token: payment.token,
			payer: payment.payer,
			collector: payment.collector,
			amount: payment.amount,
			used_permit: payment.permit.is_some(),
			settled_at: current_timestamp(),
		};
		tracing::info!(
			token = %receipt.token,
			payer = %receipt.payer,
			collector = %receipt.collector,
			amount = %receipt.amount,
			used_permit = receipt.used_permit,
			"FeePaid"
		);

		if let Some(storage) = &self.storage {
			let id = format!(
				"{}-{}",
				receipt.settled_at,
				self.sequence.fetch_add(1, Ordering::Relaxed)
			);
			// Receipt storage never fails a completed transfer
			if let Err(e) = storage.store(StorageKey::FeeReceipts, &id, &receipt).await {
				tracing::warn!(receipt = %id, error = %e, "Failed to store fee receipt");
			}
		}

		Ok(receipt)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::implementations::mock_erc20::{permit_digest, MockErc20};
	use alloy_primitives::{address, Bytes, U256};
	use alloy_signer::SignerSync;
	use alloy_signer_local::PrivateKeySigner;
	use relay_storage::implementations::memory::MemoryStorage;
	use relay_types::{DomainDescriptor, PermitAuthorization};

	const TOKEN: Address = address!("7070707070707070707070707070707070707070");
	const SETTLER: Address = address!("5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e");
	const COLLECTOR: Address = address!("c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0");

	fn mock_token() -> Arc<MockErc20> {
		Arc::new(MockErc20::new(DomainDescriptor::new(
			"USD Coin", "2", 31337, TOKEN,
		)))
	}

	fn settlement(token: Arc<MockErc20>) -> FeeSettlement {
		FeeSettlement::new(SETTLER, vec![token as Arc<dyn TokenInterface>])
	}

	fn payment(payer: Address, amount: u64) -> FeePayment {
		FeePayment {
			token: TOKEN,
			payer,
			collector: COLLECTOR,
			amount: U256::from(amount),
			permit: None,
		}
	}

	async fn signed_permit(
		token: &MockErc20,
		owner: &PrivateKeySigner,
		value: U256,
		deadline: u64,
	) -> PermitAuthorization {
		let nonce = token.nonces(owner.address()).await.unwrap();
		let digest = permit_digest(token.binder(), owner.address(), SETTLER, value, nonce, deadline);
		PermitAuthorization {
			deadline,
			signature: Bytes::copy_from_slice(&owner.sign_hash_sync(&digest).unwrap().as_bytes()),
		}
	}

	#[tokio::test]
	async fn test_settle_with_permit() {
		let token = mock_token();
		let fees = settlement(token.clone());
		let payer = PrivateKeySigner::random();
		token.mint(payer.address(), U256::from(1_000)).await;

		let mut p = payment(payer.address(), 250);
		p.permit = Some(signed_permit(&token, &payer, U256::from(250), current_timestamp() + 600).await);

		let receipt = fees.settle(&p).await.unwrap();
		assert!(receipt.used_permit);
		assert_eq!(token.balance_of(COLLECTOR).await.unwrap(), U256::from(250));
		assert_eq!(token.balance_of(payer.address()).await.unwrap(), U256::from(750));
	}

	#[tokio::test]
	async fn test_zero_collector_rejected_before_token_calls() {
		let token = mock_token();
		let fees = settlement(token.clone());
		let payer = PrivateKeySigner::random();
		token.mint(payer.address(), U256::from(1_000)).await;

		let mut p = payment(payer.address(), 250);
		p.collector = Address::ZERO;
		p.permit = Some(signed_permit(&token, &payer, U256::from(250), current_timestamp() + 600).await);

		assert!(matches!(
			fees.settle(&p).await,
			Err(FeeError::InvalidFeeCollector)
		));
		// No permit was consumed and nothing moved
		assert_eq!(token.nonces(payer.address()).await.unwrap(), U256::ZERO);
		assert_eq!(
			token.allowance(payer.address(), SETTLER).await.unwrap(),
			U256::ZERO
		);
		assert_eq!(token.balance_of(payer.address()).await.unwrap(), U256::from(1_000));
	}

	#[tokio::test]
	async fn test_zero_token_rejected() {
		let fees = settlement(mock_token());
		let mut p = payment(Address::repeat_byte(0x01), 1);
		p.token = Address::ZERO;
		assert!(matches!(fees.settle(&p).await, Err(FeeError::InvalidFeeToken)));
	}

	#[tokio::test]
	async fn test_permit_failures_map_to_permit_rejected() {
		let token = mock_token();
		let fees = settlement(token.clone());
		let payer = PrivateKeySigner::random();
		let stranger = PrivateKeySigner::random();
		token.mint(payer.address(), U256::from(1_000)).await;

		// Signed by someone else
		let mut p = payment(payer.address(), 10);
		p.permit = Some(signed_permit(&token, &stranger, U256::from(10), current_timestamp() + 600).await);
		let err = fees.settle(&p).await.unwrap_err();
		assert_eq!(err.name(), "PermitRejected");

		// Expired
		p.permit = Some(signed_permit(&token, &payer, U256::from(10), current_timestamp() - 10).await);
		assert!(matches!(fees.settle(&p).await, Err(FeeError::PermitRejected(_))));

		// Wrong length
		p.permit = Some(PermitAuthorization {
			deadline: current_timestamp() + 600,
			signature: Bytes::from_static(&[1, 2, 3]),
		});
		assert!(matches!(fees.settle(&p).await, Err(FeeError::PermitRejected(_))));
	}

	#[tokio::test]
	async fn test_transfer_failures() {
		let token = mock_token();
		let fees = settlement(token.clone());
		let payer = Address::repeat_byte(0x01);
		token.mint(payer, U256::from(5)).await;

		// No allowance
		assert!(matches!(
			fees.settle(&payment(payer, 5)).await,
			Err(FeeError::FeeTransferFailed(_))
		));

		// Unregistered token address
		let mut p = payment(payer, 5);
		p.token = Address::repeat_byte(0x71);
		assert_eq!(fees.settle(&p).await.unwrap_err().name(), "FeeTransferFailed");
	}

	#[tokio::test]
	async fn test_failed_transfer_leaves_permit_unused() {
		let token = mock_token();
		let fees = settlement(token.clone());
		let payer = PrivateKeySigner::random();
		token.mint(payer.address(), U256::from(10)).await;

		let mut p = payment(payer.address(), 250);
		p.permit = Some(signed_permit(&token, &payer, U256::from(250), current_timestamp() + 600).await);

		assert!(matches!(
			fees.settle(&p).await,
			Err(FeeError::FeeTransferFailed(_))
		));
		assert_eq!(token.nonces(payer.address()).await.unwrap(), U256::ZERO);
		assert_eq!(
			token.allowance(payer.address(), SETTLER).await.unwrap(),
			U256::ZERO
		);
		assert_eq!(token.balance_of(payer.address()).await.unwrap(), U256::from(10));

		// The same permit settles once the payer can cover it
		token.mint(payer.address(), U256::from(240)).await;
		fees.settle(&p).await.unwrap();
		assert_eq!(token.balance_of(COLLECTOR).await.unwrap(), U256::from(250));
	}

	#[tokio::test]
	async fn test_amount_is_not_bounded() {
		// Whatever the quote said, the settled amount is what the caller passed
		let token = mock_token();
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let fees = settlement(token.clone()).with_storage(storage);
		let payer = Address::repeat_byte(0x01);
		let everything = U256::from(u64::MAX);
		token.mint(payer, everything).await;
		token.approve(payer, SETTLER, U256::MAX).await;

		let receipt = fees.settle(&payment(payer, u64::MAX)).await.unwrap();
		assert_eq!(receipt.amount, everything);
		assert_eq!(token.balance_of(payer).await.unwrap(), U256::ZERO);
	}
}
