//! Relay engine that routes signed requests and fee payments.
//!
//! The [`RelayEngine`] owns one [`Forwarder`] per configured target together
//! with the fee oracle and the settlement helper, and runs background
//! maintenance of the storage backend.

pub mod forwarder;

pub use forwarder::Forwarder;

use crate::targets::TargetError;
use relay_account::AccountService;
use relay_auth::AuthorizationError;
use relay_config::Config;
use relay_fee::{FeeError, FeeOracleService, FeeSettlement};
use relay_storage::StorageService;
use relay_types::{
	parse_address, Address, AuthorizationRequest, FeePayment, FeeQuote, FeeReceipt, RelayResponse,
	B256, U256,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
	/// The request was refused or its replay state could not be read.
	#[error(transparent)]
	Authorization(#[from] AuthorizationError),
	/// The wrapped operation failed after authorization.
	#[error("Execution failed: {0}")]
	ExecutionFailed(TargetError),
	#[error(transparent)]
	Fee(#[from] FeeError),
	/// No target matches the given name or address.
	#[error("Unknown target: {0}")]
	UnknownTarget(String),
	#[error("Service error: {0}")]
	Service(String),
}

impl EngineError {
	/// Stable name of the failure, as reported to callers.
	pub fn name(&self) -> &'static str {
		match self {
			EngineError::Authorization(e) => e.name(),
			EngineError::ExecutionFailed(_) => "ExecutionFailed",
			EngineError::Fee(e) => e.name(),
			EngineError::UnknownTarget(_) => "UnknownTarget",
			EngineError::Service(_) => "ServiceError",
		}
	}

	/// Whether the request itself was refused, as opposed to an
	/// infrastructure fault or a lookup miss.
	pub fn is_rejection(&self) -> bool {
		match self {
			EngineError::Authorization(e) => e.is_rejection(),
			EngineError::ExecutionFailed(_) => true,
			EngineError::Fee(e) => e.is_rejection(),
			EngineError::UnknownTarget(_) | EngineError::Service(_) => false,
		}
	}
}

/// Main relay engine.
pub struct RelayEngine {
	/// Relay configuration.
	config: Config,
	/// Storage service shared by replay ledgers and fee receipts.
	storage: Arc<StorageService>,
	/// Relay account, the trusted forwarder and fee spender.
	account: Arc<AccountService>,
	relay_address: Address,
	/// Forwarders keyed by target address.
	forwarders: HashMap<Address, Arc<Forwarder>>,
	/// Configured target names.
	target_names: HashMap<String, Address>,
	fees: Arc<FeeOracleService>,
	settlement: Arc<FeeSettlement>,
}

impl RelayEngine {
	/// Creates a new relay engine with the given services.
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		config: Config,
		storage: Arc<StorageService>,
		account: Arc<AccountService>,
		relay_address: Address,
		forwarders: HashMap<String, Forwarder>,
		fees: Arc<FeeOracleService>,
		settlement: Arc<FeeSettlement>,
	) -> Self {
		let mut target_names = HashMap::new();
		let mut by_address = HashMap::new();
		for (name, forwarder) in forwarders {
			let address = forwarder.target().address();
			target_names.insert(name, address);
			by_address.insert(address, Arc::new(forwarder));
		}

		Self {
			config,
			storage,
			account,
			relay_address,
			forwarders: by_address,
			target_names,
			fees,
			settlement,
		}
	}

	/// Returns a reference to the configuration.
	pub fn config(&self) -> &Config {
		&self.config
	}

	/// Returns a reference to the storage service.
	pub fn storage(&self) -> &Arc<StorageService> {
		&self.storage
	}

	pub fn account(&self) -> &Arc<AccountService> {
		&self.account
	}

	pub fn settlement(&self) -> &Arc<FeeSettlement> {
		&self.settlement
	}

	/// Address calls are forwarded from.
	pub fn relay_address(&self) -> Address {
		self.relay_address
	}

	/// Configured targets as `(name, address)` pairs, sorted by name.
	pub fn targets(&self) -> Vec<(String, Address)> {
		let mut targets: Vec<_> = self
			.target_names
			.iter()
			.map(|(name, address)| (name.clone(), *address))
			.collect();
		targets.sort();
		targets
	}

	/// Looks up a forwarder by target name or address.
	pub fn resolve_target(&self, target: &str) -> Result<&Arc<Forwarder>, EngineError> {
		let address = match self.target_names.get(target) {
			Some(address) => *address,
			None => parse_address(target)
				.map_err(|_| EngineError::UnknownTarget(target.to_string()))?,
		};
		self.forwarders
			.get(&address)
			.ok_or_else(|| EngineError::UnknownTarget(target.to_string()))
	}

	/// Authorizes `request` and forwards it to `target`.
	pub async fn submit(
		&self,
		target: &str,
		request: &AuthorizationRequest,
	) -> Result<RelayResponse, EngineError> {
		self.resolve_target(target)?.submit(request).await
	}

	pub async fn nonce(&self, target: &str, user: Address) -> Result<U256, EngineError> {
		self.resolve_target(target)?.nonce(user).await
	}

	pub async fn is_salt_consumed(
		&self,
		target: &str,
		user: Address,
		salt: B256,
	) -> Result<bool, EngineError> {
		self.resolve_target(target)?.is_consumed(user, salt).await
	}

	/// Quotes a fee in `token` for a call using `gas_limit` gas.
	pub async fn quote_fee(&self, token: Address, gas_limit: u64) -> Result<FeeQuote, EngineError> {
		Ok(self.fees.quote(token, gas_limit).await?)
	}

	/// Settles a fee payment with the relay account as spender.
	pub async fn settle_fee(&self, payment: &FeePayment) -> Result<FeeReceipt, EngineError> {
		Ok(self.settlement.settle(payment).await?)
	}

	/// Runs background maintenance until interrupted.
	pub async fn run(&self) -> Result<(), EngineError> {
		let storage = self.storage.clone();
		let cleanup_interval = tokio::time::interval(Duration::from_secs(
			self.config.storage.cleanup_interval_seconds,
		));
		let cleanup_handle = tokio::spawn(async move {
			let mut interval = cleanup_interval;
			loop {
				interval.tick().await;
				match storage.cleanup_expired().await {
					Ok(count) if count > 0 => {
						tracing::debug!("Storage cleanup: removed {} expired entries", count);
					}
					Err(e) => {
						tracing::warn!("Storage cleanup failed: {}", e);
					}
					_ => {}
				}
			}
		});

		tracing::info!(
			relay = %self.config.relay.id,
			forwarder = %self.relay_address,
			targets = self.forwarders.len(),
			"Relay engine running"
		);

		let result = tokio::signal::ctrl_c()
			.await
			.map_err(|e| EngineError::Service(format!("Failed to listen for shutdown: {}", e)));

		cleanup_handle.abort();
		tracing::info!("Shutting down relay engine");
		result
	}
}
