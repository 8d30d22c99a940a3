//! Replay ledger.
//!
//! The ledger owns the replay state of every signer of one verifying
//! contract. State is cached in memory and written through to storage.
//!
//! All access goes through a [`LedgerTransaction`], which holds the ledger
//! lock for its whole lifetime. Consumptions are staged inside the
//! transaction and only become visible on [`LedgerTransaction::commit`];
//! dropping an uncommitted transaction discards them.

use crate::replay::{ConcurrentSalts, ReplayGuard, SequentialNonces, SignerReplayState};
use crate::AuthorizationError;
use alloy_primitives::{Address, B256, U256};
use relay_storage::StorageService;
use relay_types::{ReplayToken, StorageKey};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

/// Keyed store of per-signer replay state for one verifying contract.
pub struct ReplayLedger {
	scope: Address,
	storage: Arc<StorageService>,
	states: Mutex<HashMap<Address, SignerReplayState>>,
}

impl ReplayLedger {
	/// Creates a ledger for the contract `scope`. Signers of different
	/// scopes never share replay state.
	pub fn new(scope: Address, storage: Arc<StorageService>) -> Self {
		Self {
			scope,
			storage,
			states: Mutex::new(HashMap::new()),
		}
	}

	pub fn scope(&self) -> Address {
		self.scope
	}

	/// Opens a transaction, waiting for any other open transaction to finish.
	pub async fn begin(&self) -> LedgerTransaction<'_> {
		LedgerTransaction {
			ledger: self,
			states: self.states.lock().await,
			staged: HashMap::new(),
		}
	}

	/// Current sequential nonce of `signer`.
	pub async fn nonce(&self, signer: Address) -> Result<U256, AuthorizationError> {
		self.begin().await.nonce(signer).await
	}

	/// Whether `salt` has been consumed by `signer`.
	pub async fn is_consumed(&self, signer: Address, salt: B256) -> Result<bool, AuthorizationError> {
		self.begin().await.is_consumed(signer, salt).await
	}

	fn storage_id(&self, signer: Address) -> String {
		format!("{}:{}", self.scope, signer)
	}
}

/// Exclusive unit of work over a [`ReplayLedger`].
pub struct LedgerTransaction<'a> {
	ledger: &'a ReplayLedger,
	states: MutexGuard<'a, HashMap<Address, SignerReplayState>>,
	staged: HashMap<Address, SignerReplayState>,
}

impl LedgerTransaction<'_> {
	/// Current view of a signer's state, including staged changes.
	async fn state(&mut self, signer: Address) -> Result<SignerReplayState, AuthorizationError> {
		if let Some(state) = self.staged.get(&signer) {
			return Ok(state.clone());
		}
		if let Some(state) = self.states.get(&signer) {
			return Ok(state.clone());
		}

		let state = self
			.ledger
			.storage
			.retrieve_optional::<SignerReplayState>(
				StorageKey::ReplayState,
				&self.ledger.storage_id(signer),
			)
			.await?
			.unwrap_or_default();
		self.states.insert(signer, state.clone());
		Ok(state)
	}

	pub async fn nonce(&mut self, signer: Address) -> Result<U256, AuthorizationError> {
		Ok(self.state(signer).await?.nonce)
	}

	pub async fn is_consumed(
		&mut self,
		signer: Address,
		salt: B256,
	) -> Result<bool, AuthorizationError> {
		Ok(self.state(signer).await?.consumed_salts.contains(&salt))
	}

	/// Checks `token` without consuming it.
	pub async fn check(
		&mut self,
		signer: Address,
		token: &ReplayToken,
	) -> Result<(), AuthorizationError> {
		let state = self.state(signer).await?;
		match token {
			ReplayToken::Nonce { nonce } => SequentialNonces.check(&state, nonce),
			ReplayToken::Salt { salt, .. } => ConcurrentSalts.check(&state, salt),
		}
	}

	/// Checks `token` and stages its consumption.
	pub async fn consume(
		&mut self,
		signer: Address,
		token: &ReplayToken,
	) -> Result<(), AuthorizationError> {
		let mut state = self.state(signer).await?;
		match token {
			ReplayToken::Nonce { nonce } => SequentialNonces.consume(&mut state, nonce)?,
			ReplayToken::Salt { salt, .. } => ConcurrentSalts.consume(&mut state, salt)?,
		}
		self.staged.insert(signer, state);
		Ok(())
	}

	pub fn has_staged(&self) -> bool {
		!self.staged.is_empty()
	}

	/// Publishes staged consumptions to the cache and persists them.
	///
	/// Consumptions are published before they are written, so a failed
	/// write still leaves them consumed for the life of this ledger. The
	/// first storage error is returned after every signer has been tried.
	///
	/// The transaction stays open afterwards, so the lock is still held
	/// until it is dropped.
	pub async fn commit(&mut self) -> Result<(), AuthorizationError> {
		let staged: Vec<_> = self.staged.drain().collect();
		for (signer, state) in &staged {
			self.states.insert(*signer, state.clone());
		}

		let mut first_error = None;
		for (signer, state) in staged {
			let stored = self
				.ledger
				.storage
				.store(
					StorageKey::ReplayState,
					&self.ledger.storage_id(signer),
					&state,
				)
				.await;
			match stored {
				Ok(()) => tracing::debug!(
					scope = %self.ledger.scope,
					signer = %signer,
					nonce = %state.nonce,
					salts = state.consumed_salts.len(),
					"Committed replay state"
				),
				Err(e) => {
					tracing::error!(
						scope = %self.ledger.scope,
						signer = %signer,
						error = %e,
						"Failed to persist replay state"
					);
					first_error.get_or_insert(e);
				}
			}
		}

		match first_error {
			Some(e) => Err(e.into()),
			None => Ok(()),
		}
	}

	/// Discards staged consumptions.
	pub fn rollback(&mut self) {
		if !self.staged.is_empty() {
			tracing::debug!(
				scope = %self.ledger.scope,
				signers = self.staged.len(),
				"Rolled back replay state"
			);
		}
		self.staged.clear();
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use relay_storage::implementations::memory::MemoryStorage;

	fn ledger_with(storage: Arc<StorageService>) -> ReplayLedger {
		ReplayLedger::new(Address::repeat_byte(0xcc), storage)
	}

	fn memory() -> Arc<StorageService> {
		Arc::new(StorageService::new(Box::new(MemoryStorage::new())))
	}

	fn nonce(n: u64) -> ReplayToken {
		ReplayToken::Nonce {
			nonce: U256::from(n),
		}
	}

	#[tokio::test]
	async fn test_uncommitted_consumption_is_discarded() {
		let ledger = ledger_with(memory());
		let alice = Address::repeat_byte(0x01);

		{
			let mut tx = ledger.begin().await;
			tx.consume(alice, &nonce(0)).await.unwrap();
			// Visible inside the transaction
			assert_eq!(tx.nonce(alice).await.unwrap(), U256::from(1));
		}
		assert_eq!(ledger.nonce(alice).await.unwrap(), U256::ZERO);

		let mut tx = ledger.begin().await;
		tx.consume(alice, &nonce(0)).await.unwrap();
		tx.rollback();
		assert!(!tx.has_staged());
		drop(tx);
		assert_eq!(ledger.nonce(alice).await.unwrap(), U256::ZERO);
	}

	#[tokio::test]
	async fn test_commit_persists_across_ledgers() {
		let storage = memory();
		let alice = Address::repeat_byte(0x01);
		let salt = B256::repeat_byte(0x5a);

		let ledger = ledger_with(storage.clone());
		let mut tx = ledger.begin().await;
		tx.consume(alice, &nonce(0)).await.unwrap();
		tx.consume(
			alice,
			&ReplayToken::Salt {
				salt,
				deadline: u64::MAX,
			},
		)
		.await
		.unwrap();
		tx.commit().await.unwrap();
		drop(tx);

		// A fresh ledger over the same storage reloads the state lazily
		let reloaded = ledger_with(storage.clone());
		assert_eq!(reloaded.nonce(alice).await.unwrap(), U256::from(1));
		assert!(reloaded.is_consumed(alice, salt).await.unwrap());

		// A ledger for another contract sees nothing
		let other = ReplayLedger::new(Address::repeat_byte(0xdd), storage);
		assert_eq!(other.nonce(alice).await.unwrap(), U256::ZERO);
	}

	#[tokio::test]
	async fn test_signers_are_independent() {
		let ledger = ledger_with(memory());
		let alice = Address::repeat_byte(0x01);
		let bob = Address::repeat_byte(0x02);

		let mut tx = ledger.begin().await;
		tx.consume(bob, &nonce(0)).await.unwrap();
		tx.consume(bob, &nonce(1)).await.unwrap();
		tx.consume(alice, &nonce(0)).await.unwrap();
		assert!(matches!(
			tx.check(alice, &nonce(0)).await,
			Err(AuthorizationError::ReplayRejected(_))
		));
		tx.commit().await.unwrap();
		drop(tx);

		assert_eq!(ledger.nonce(alice).await.unwrap(), U256::from(1));
		assert_eq!(ledger.nonce(bob).await.unwrap(), U256::from(2));
	}

	#[tokio::test]
	async fn test_transactions_are_exclusive() {
		let ledger = Arc::new(ledger_with(memory()));
		let alice = Address::repeat_byte(0x01);

		let mut handles = Vec::new();
		for _ in 0..8 {
			let ledger = ledger.clone();
			handles.push(tokio::spawn(async move {
				let mut tx = ledger.begin().await;
				let result = tx.consume(alice, &nonce(0)).await;
				if result.is_ok() {
					tx.commit().await.unwrap();
				}
				result.is_ok()
			}));
		}

		let mut successes = 0;
		for handle in handles {
			if handle.await.unwrap() {
				successes += 1;
			}
		}
		assert_eq!(successes, 1);
		assert_eq!(ledger.nonce(alice).await.unwrap(), U256::from(1));
	}
}
