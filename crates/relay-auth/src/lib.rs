//! Authorization module for the sponsored-call relay.
//!
//! A relayed request is accepted only if its EIP-712 signature recovers to
//! the user it claims to come from and its replay token has not been used.
//! This crate provides the pieces of that decision:
//!
//! - [`binder`]: domain-separated digests of signed requests
//! - [`verifier`]: ECDSA recovery with canonical-signature checks
//! - [`replay`]: sequential nonce and concurrent salt guards
//! - [`ledger`]: the per-signer replay store and its unit of work
//!
//! [`authorize`] composes them.

use alloy_primitives::Address;
use relay_storage::StorageError;
use relay_types::{AuthorizationRequest, ReplayToken, SignatureParts};
use thiserror::Error;

pub mod binder;
pub mod ledger;
pub mod replay;
pub mod verifier;

pub use binder::DomainBinder;
pub use ledger::{LedgerTransaction, ReplayLedger};
pub use replay::{ConcurrentSalts, ReplayGuard, SequentialNonces, SignerReplayState};
pub use verifier::{EcdsaVerifier, SignatureVerifier};

/// Reasons a request is refused, plus storage faults hit while deciding.
#[derive(Debug, Error)]
pub enum AuthorizationError {
	/// The signature is malformed, non-canonical, or recovers to nobody.
	#[error("Invalid signature: {0}")]
	InvalidSignature(String),
	/// The signature is valid but was made by someone other than the claimed user.
	#[error("Signer mismatch: request claims {claimed}, signature recovers {recovered}")]
	SignerMismatch { claimed: Address, recovered: Address },
	/// The nonce or salt cannot be used.
	#[error("Replay rejected: {0}")]
	ReplayRejected(String),
	/// The concurrent-mode deadline has passed.
	#[error("Authorization expired: deadline {deadline}, now {now}")]
	AuthorizationExpired { deadline: u64, now: u64 },
	/// Replay state could not be read or written.
	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),
}

impl AuthorizationError {
	/// Stable name of the failure, as reported to callers.
	pub fn name(&self) -> &'static str {
		match self {
			AuthorizationError::InvalidSignature(_) => "InvalidSignature",
			AuthorizationError::SignerMismatch { .. } => "SignerMismatch",
			AuthorizationError::ReplayRejected(_) => "ReplayRejected",
			AuthorizationError::AuthorizationExpired { .. } => "AuthorizationExpired",
			AuthorizationError::Storage(_) => "StorageError",
		}
	}

	/// Whether the request itself was refused, as opposed to an
	/// infrastructure fault.
	pub fn is_rejection(&self) -> bool {
		!matches!(self, AuthorizationError::Storage(_))
	}
}

/// Authorizes `request` and stages its replay token in `tx`.
///
/// Checks run in this order: deadline, signature, claimed signer, replay
/// token. The first failure is returned and nothing is staged. On success
/// the verified signer is returned; the caller decides when to commit.
pub async fn authorize<V>(
	binder: &DomainBinder,
	verifier: &V,
	tx: &mut LedgerTransaction<'_>,
	request: &AuthorizationRequest,
	now: u64,
) -> Result<Address, AuthorizationError>
where
	V: SignatureVerifier + ?Sized,
{
	if let ReplayToken::Salt { deadline, .. } = request.replay {
		if now > deadline {
			return Err(AuthorizationError::AuthorizationExpired { deadline, now });
		}
	}

	let signature = SignatureParts::try_from(&request.signature)
		.map_err(|e| AuthorizationError::InvalidSignature(e.to_string()))?;
	let digest = binder.digest(request.user, &request.data, &request.replay);
	let recovered = verifier.recover(&digest, &signature)?;
	if recovered != request.user {
		return Err(AuthorizationError::SignerMismatch {
			claimed: request.user,
			recovered,
		});
	}

	tx.consume(request.user, &request.replay).await?;

	tracing::debug!(
		user = %request.user,
		replay = %request.replay,
		"Authorized request"
	);
	Ok(recovered)
}
