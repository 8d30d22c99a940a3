//! Forwarding executor for one target.
//!
//! A [`Forwarder`] authorizes a signed request against its target's domain
//! and replay ledger, then calls the target with the verified signer
//! attached. The ledger transaction stays open from the first check until
//! the call returns, so no two requests for the same target interleave.

use super::EngineError;
use crate::erc2771::encode_forwarded_calldata;
use crate::targets::{ForwardedCall, TargetInterface};
use alloy_primitives::{Address, B256, U256};
use relay_auth::{authorize, DomainBinder, EcdsaVerifier, ReplayLedger, SignatureVerifier};
use relay_storage::StorageService;
use relay_types::{
	current_timestamp, AuthorizationRequest, DomainDescriptor, FailurePolicy, RelayResponse,
};
use std::sync::Arc;

/// Authorizes and forwards requests to a single target.
pub struct Forwarder {
	binder: DomainBinder,
	verifier: Arc<dyn SignatureVerifier>,
	ledger: ReplayLedger,
	target: Arc<dyn TargetInterface>,
	/// Address the target sees as the immediate caller.
	address: Address,
	policy: FailurePolicy,
}

impl Forwarder {
	/// Creates a forwarder for `target`.
	///
	/// The domain's verifying contract must be the target. Replay state is
	/// scoped to the target address.
	pub fn new(
		domain: DomainDescriptor,
		target: Arc<dyn TargetInterface>,
		address: Address,
		storage: Arc<StorageService>,
		policy: FailurePolicy,
	) -> Result<Self, EngineError> {
		if domain.verifying_contract != target.address() {
			return Err(EngineError::Service(format!(
				"Domain verifying contract {} is not the target {}",
				domain.verifying_contract,
				target.address()
			)));
		}

		Ok(Self {
			binder: DomainBinder::new(domain),
			verifier: Arc::new(EcdsaVerifier::new()),
			ledger: ReplayLedger::new(target.address(), storage),
			target,
			address,
			policy,
		})
	}

	/// Replaces the signature verifier.
	pub fn with_verifier(mut self, verifier: Arc<dyn SignatureVerifier>) -> Self {
		self.verifier = verifier;
		self
	}

	pub fn binder(&self) -> &DomainBinder {
		&self.binder
	}

	pub fn target(&self) -> &Arc<dyn TargetInterface> {
		&self.target
	}

	pub fn policy(&self) -> FailurePolicy {
		self.policy
	}

	/// Submits `request` at the current time.
	pub async fn submit(&self, request: &AuthorizationRequest) -> Result<RelayResponse, EngineError> {
		self.submit_at(request, current_timestamp()).await
	}

	/// Submits `request` as if the current time were `now`.
	///
	/// Under [`FailurePolicy::Consume`] the replay token is committed before
	/// the target runs and stays consumed whatever the outcome. Under
	/// [`FailurePolicy::Rollback`] it is committed only once the target
	/// returns successfully.
	pub async fn submit_at(
		&self,
		request: &AuthorizationRequest,
		now: u64,
	) -> Result<RelayResponse, EngineError> {
		let target = self.target.address();
		let mut tx = self.ledger.begin().await;

		let sender = match authorize(&self.binder, self.verifier.as_ref(), &mut tx, request, now).await {
			Ok(sender) => sender,
			Err(e) => {
				tracing::warn!(
					target_address = %target,
					user = %request.user,
					replay = %request.replay,
					reason = e.name(),
					"Rejected request"
				);
				return Err(e.into());
			}
		};

		if self.policy == FailurePolicy::Consume {
			tx.commit().await?;
		}

		let call = ForwardedCall {
			caller: self.address,
			sender,
			calldata: encode_forwarded_calldata(&request.data, sender),
		};
		match self.target.execute(&call).await {
			Ok(result) => {
				if self.policy == FailurePolicy::Rollback {
					tx.commit().await?;
				}
				tracing::info!(
					target_address = %target,
					sender = %sender,
					replay = %request.replay,
					"Forwarded"
				);
				Ok(RelayResponse {
					sender,
					target,
					result,
				})
			}
			Err(e) => {
				if self.policy == FailurePolicy::Rollback {
					tx.rollback();
				}
				tracing::warn!(
					target_address = %target,
					sender = %sender,
					policy = %self.policy,
					error = %e,
					"Forwarded call failed"
				);
				Err(EngineError::ExecutionFailed(e))
			}
		}
	}

	/// Current sequential nonce of `user` for this target.
	pub async fn nonce(&self, user: Address) -> Result<U256, EngineError> {
		Ok(self.ledger.nonce(user).await?)
	}

	/// Whether `user` has consumed `salt` for this target.
	pub async fn is_consumed(&self, user: Address, salt: B256) -> Result<bool, EngineError> {
		Ok(self.ledger.is_consumed(user, salt).await?)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::targets::implementations::counter::{Counter, ICounter};
	use crate::targets::TargetError;
	use alloy_primitives::{address, Bytes};
	use alloy_signer::SignerSync;
	use alloy_signer_local::PrivateKeySigner;
	use alloy_sol_types::SolCall;
	use async_trait::async_trait;
	use relay_auth::AuthorizationError;
	use relay_storage::implementations::memory::MemoryStorage;
	use relay_storage::{StorageError, StorageInterface};
	use relay_types::{ConfigSchema, ReplayToken, Schema, ValidationError};
	use std::time::Duration;

	const COUNTER: Address = address!("5FbDB2315678afecb367f032d93F642f64180aa3");
	const RELAY: Address = address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
	const NOW: u64 = 1_700_000_000;

	fn storage() -> Arc<StorageService> {
		Arc::new(StorageService::new(Box::new(MemoryStorage::new())))
	}

	fn domain(contract: Address) -> DomainDescriptor {
		DomainDescriptor::new("MetaCounter", "1", 31337, contract)
	}

	fn counter_forwarder(policy: FailurePolicy) -> (Forwarder, Arc<Counter>) {
		let counter = Arc::new(Counter::new(COUNTER, RELAY));
		let forwarder = Forwarder::new(
			domain(COUNTER),
			counter.clone() as Arc<dyn TargetInterface>,
			RELAY,
			storage(),
			policy,
		)
		.unwrap();
		(forwarder, counter)
	}

	fn sign(
		forwarder: &Forwarder,
		signer: &PrivateKeySigner,
		data: Vec<u8>,
		replay: ReplayToken,
	) -> AuthorizationRequest {
		let digest = forwarder.binder().digest(signer.address(), &data, &replay);
		let signature = signer.sign_hash_sync(&digest).unwrap();
		AuthorizationRequest {
			data: data.into(),
			user: signer.address(),
			replay,
			signature: Bytes::copy_from_slice(&signature.as_bytes()),
		}
	}

	fn increment() -> Vec<u8> {
		ICounter::incrementCall {}.abi_encode()
	}

	/// Target that always fails.
	struct Failing;

	struct NoSchema;

	impl ConfigSchema for NoSchema {
		fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
			Schema::new(vec![], vec![]).validate(config)
		}
	}

	#[async_trait]
	impl TargetInterface for Failing {
		fn config_schema(&self) -> Box<dyn ConfigSchema> {
			Box::new(NoSchema)
		}

		fn address(&self) -> Address {
			COUNTER
		}

		async fn execute(&self, _call: &ForwardedCall) -> Result<Bytes, TargetError> {
			Err(TargetError::Reverted("always".to_string()))
		}
	}

	fn failing_forwarder(policy: FailurePolicy) -> Forwarder {
		Forwarder::new(domain(COUNTER), Arc::new(Failing), RELAY, storage(), policy).unwrap()
	}

	#[tokio::test]
	async fn test_counter_end_to_end() {
		let (forwarder, counter) = counter_forwarder(FailurePolicy::Consume);
		let user = PrivateKeySigner::random();
		let request = sign(
			&forwarder,
			&user,
			increment(),
			ReplayToken::Nonce { nonce: U256::ZERO },
		);

		let response = forwarder.submit_at(&request, NOW).await.unwrap();
		assert_eq!(response.sender, user.address());
		assert_eq!(response.target, COUNTER);
		assert_eq!(counter.count_of(user.address()).await, U256::from(1));
		assert_eq!(forwarder.nonce(user.address()).await.unwrap(), U256::from(1));

		let replay = forwarder.submit_at(&request, NOW).await.unwrap_err();
		assert_eq!(replay.name(), "ReplayRejected");
		assert_eq!(counter.count_of(user.address()).await, U256::from(1));
		assert_eq!(forwarder.nonce(user.address()).await.unwrap(), U256::from(1));
	}

	#[tokio::test]
	async fn test_sender_is_signer_not_relay() {
		let (forwarder, counter) = counter_forwarder(FailurePolicy::Consume);
		let user = PrivateKeySigner::random();
		let salt = B256::repeat_byte(0x33);
		let request = sign(
			&forwarder,
			&user,
			increment(),
			ReplayToken::Salt {
				salt,
				deadline: NOW + 60,
			},
		);

		forwarder.submit_at(&request, NOW).await.unwrap();
		assert_eq!(counter.count_of(user.address()).await, U256::from(1));
		assert_eq!(counter.count_of(RELAY).await, U256::ZERO);
		assert!(forwarder.is_consumed(user.address(), salt).await.unwrap());
	}

	#[tokio::test]
	async fn test_rejection_has_no_effect() {
		let (forwarder, counter) = counter_forwarder(FailurePolicy::Consume);
		let user = PrivateKeySigner::random();
		let mut request = sign(
			&forwarder,
			&user,
			increment(),
			ReplayToken::Nonce { nonce: U256::ZERO },
		);
		request.data = ICounter::incrementByCall {
			amount: U256::from(100),
		}
		.abi_encode()
		.into();

		let err = forwarder.submit_at(&request, NOW).await.unwrap_err();
		assert!(matches!(
			err,
			EngineError::Authorization(
				AuthorizationError::SignerMismatch { .. } | AuthorizationError::InvalidSignature(_)
			)
		));
		assert!(err.is_rejection());
		assert_eq!(counter.count_of(user.address()).await, U256::ZERO);
		assert_eq!(forwarder.nonce(user.address()).await.unwrap(), U256::ZERO);
	}

	#[tokio::test]
	async fn test_failed_call_consumes_nonce_by_default() {
		let forwarder = failing_forwarder(FailurePolicy::Consume);
		let user = PrivateKeySigner::random();
		let request = sign(
			&forwarder,
			&user,
			vec![1, 2, 3],
			ReplayToken::Nonce { nonce: U256::ZERO },
		);

		let err = forwarder.submit_at(&request, NOW).await.unwrap_err();
		assert!(matches!(err, EngineError::ExecutionFailed(TargetError::Reverted(_))));
		assert_eq!(forwarder.nonce(user.address()).await.unwrap(), U256::from(1));
		assert_eq!(
			forwarder.submit_at(&request, NOW).await.unwrap_err().name(),
			"ReplayRejected"
		);
	}

	#[tokio::test]
	async fn test_failed_call_rolls_back_under_rollback_policy() {
		let forwarder = failing_forwarder(FailurePolicy::Rollback);
		let user = PrivateKeySigner::random();
		let salt = B256::repeat_byte(0x44);
		let request = sign(
			&forwarder,
			&user,
			vec![1, 2, 3],
			ReplayToken::Salt {
				salt,
				deadline: NOW + 60,
			},
		);

		let err = forwarder.submit_at(&request, NOW).await.unwrap_err();
		assert_eq!(err.name(), "ExecutionFailed");
		assert!(!forwarder.is_consumed(user.address(), salt).await.unwrap());

		// Still usable, and still fails the same way
		assert_eq!(
			forwarder.submit_at(&request, NOW).await.unwrap_err().name(),
			"ExecutionFailed"
		);
	}

	#[tokio::test]
	async fn test_rollback_policy_commits_on_success() {
		let (forwarder, counter) = counter_forwarder(FailurePolicy::Rollback);
		let user = PrivateKeySigner::random();
		let request = sign(
			&forwarder,
			&user,
			increment(),
			ReplayToken::Nonce { nonce: U256::ZERO },
		);

		forwarder.submit_at(&request, NOW).await.unwrap();
		assert_eq!(counter.count_of(user.address()).await, U256::from(1));
		assert_eq!(forwarder.nonce(user.address()).await.unwrap(), U256::from(1));
	}

	/// Backend that reads as empty and refuses every write.
	struct ReadOnlyStorage;

	#[async_trait]
	impl StorageInterface for ReadOnlyStorage {
		async fn get_bytes(&self, _key: &str) -> Result<Vec<u8>, StorageError> {
			Err(StorageError::NotFound)
		}

		async fn set_bytes(
			&self,
			_key: &str,
			_value: Vec<u8>,
			_ttl: Option<Duration>,
		) -> Result<(), StorageError> {
			Err(StorageError::Backend("read-only".to_string()))
		}

		async fn delete(&self, _key: &str) -> Result<(), StorageError> {
			Ok(())
		}

		async fn exists(&self, _key: &str) -> Result<bool, StorageError> {
			Ok(false)
		}

		fn config_schema(&self) -> Box<dyn ConfigSchema> {
			Box::new(NoSchema)
		}
	}

	#[tokio::test]
	async fn test_unpersisted_commit_still_blocks_replay() {
		let counter = Arc::new(Counter::new(COUNTER, RELAY));
		let forwarder = Forwarder::new(
			domain(COUNTER),
			counter.clone(),
			RELAY,
			Arc::new(StorageService::new(Box::new(ReadOnlyStorage))),
			FailurePolicy::Rollback,
		)
		.unwrap();
		let user = PrivateKeySigner::random();
		let request = sign(
			&forwarder,
			&user,
			increment(),
			ReplayToken::Nonce { nonce: U256::ZERO },
		);

		// The call ran but its nonce could not be written
		let err = forwarder.submit_at(&request, NOW).await.unwrap_err();
		assert_eq!(err.name(), "StorageError");
		assert!(!err.is_rejection());
		assert_eq!(counter.count_of(user.address()).await, U256::from(1));

		assert_eq!(
			forwarder.submit_at(&request, NOW).await.unwrap_err().name(),
			"ReplayRejected"
		);
		assert_eq!(counter.count_of(user.address()).await, U256::from(1));
		assert_eq!(forwarder.nonce(user.address()).await.unwrap(), U256::from(1));
	}

	#[tokio::test]
	async fn test_concurrent_duplicates_execute_once() {
		let (forwarder, counter) = counter_forwarder(FailurePolicy::Consume);
		let forwarder = Arc::new(forwarder);
		let user = PrivateKeySigner::random();
		let request = sign(
			&forwarder,
			&user,
			increment(),
			ReplayToken::Nonce { nonce: U256::ZERO },
		);

		let mut handles = Vec::new();
		for _ in 0..8 {
			let forwarder = forwarder.clone();
			let request = request.clone();
			handles.push(tokio::spawn(async move {
				forwarder.submit_at(&request, NOW).await.is_ok()
			}));
		}
		let mut successes = 0;
		for handle in handles {
			if handle.await.unwrap() {
				successes += 1;
			}
		}
		assert_eq!(successes, 1);
		assert_eq!(counter.count_of(user.address()).await, U256::from(1));
	}

	/// Verifier that attributes every signature to one address.
	struct FixedSigner(Address);

	impl SignatureVerifier for FixedSigner {
		fn recover(
			&self,
			_digest: &B256,
			_signature: &relay_types::SignatureParts,
		) -> Result<Address, AuthorizationError> {
			Ok(self.0)
		}
	}

	#[tokio::test]
	async fn test_custom_verifier_decides_signer() {
		let alice = Address::repeat_byte(0xa1);
		let (forwarder, counter) = counter_forwarder(FailurePolicy::Consume);
		let forwarder = forwarder.with_verifier(Arc::new(FixedSigner(alice)));

		let mut request = AuthorizationRequest {
			data: increment().into(),
			user: alice,
			replay: ReplayToken::Nonce { nonce: U256::ZERO },
			signature: Bytes::from(vec![0u8; 65]),
		};
		let response = forwarder.submit_at(&request, NOW).await.unwrap();
		assert_eq!(response.sender, alice);
		assert_eq!(counter.count_of(alice).await, U256::from(1));

		// Anyone else is a mismatch, whatever the signature
		let bob = Address::repeat_byte(0xb0);
		request.user = bob;
		let err = forwarder.submit_at(&request, NOW).await.unwrap_err();
		assert!(matches!(
			err,
			EngineError::Authorization(AuthorizationError::SignerMismatch { .. })
		));
		assert_eq!(counter.count_of(bob).await, U256::ZERO);
	}

	#[test]
	fn test_domain_must_bind_target() {
		let counter = Arc::new(Counter::new(COUNTER, RELAY));
		let result = Forwarder::new(
			domain(Address::repeat_byte(0x01)),
			counter,
			RELAY,
			storage(),
			FailurePolicy::Consume,
		);
		assert!(matches!(result, Err(EngineError::Service(_))));
	}
}
