//! Replay guards.
//!
//! Each signer has one [`SignerReplayState`] holding both a sequential nonce
//! and a set of consumed concurrent salts. A guard checks a token against
//! that state and, on consumption, advances it. A failed check never
//! modifies the state.

use crate::AuthorizationError;
use alloy_primitives::{B256, U256};
use relay_types::u256_serde;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Replay state of a single signer. Created on first use, never evicted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerReplayState {
	/// Next nonce the signer must present in sequential mode.
	#[serde(with = "u256_serde")]
	pub nonce: U256,
	/// Salts already used in concurrent mode.
	pub consumed_salts: BTreeSet<B256>,
}

/// A replay protection strategy over a signer's state.
pub trait ReplayGuard {
	/// The value a request presents to this guard.
	type Token;

	/// Fails with `ReplayRejected` if the token cannot be used now.
	fn check(&self, state: &SignerReplayState, token: &Self::Token)
		-> Result<(), AuthorizationError>;

	/// Checks the token and marks it used.
	fn consume(
		&self,
		state: &mut SignerReplayState,
		token: &Self::Token,
	) -> Result<(), AuthorizationError> {
		self.check(state, token)?;
		self.advance(state, token);
		Ok(())
	}

	/// Marks an already-checked token used.
	fn advance(&self, state: &mut SignerReplayState, token: &Self::Token);
}

/// Sequential mode: the token must equal the current nonce.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialNonces;

impl ReplayGuard for SequentialNonces {
	type Token = U256;

	fn check(&self, state: &SignerReplayState, nonce: &U256) -> Result<(), AuthorizationError> {
		if *nonce != state.nonce {
			return Err(AuthorizationError::ReplayRejected(format!(
				"nonce {} does not match expected nonce {}",
				nonce, state.nonce
			)));
		}
		Ok(())
	}

	fn advance(&self, state: &mut SignerReplayState, _nonce: &U256) {
		state.nonce += U256::from(1);
	}
}

/// Concurrent mode: the token must be a salt not seen before.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConcurrentSalts;

impl ReplayGuard for ConcurrentSalts {
	type Token = B256;

	fn check(&self, state: &SignerReplayState, salt: &B256) -> Result<(), AuthorizationError> {
		if state.consumed_salts.contains(salt) {
			return Err(AuthorizationError::ReplayRejected(format!(
				"salt {} already consumed",
				salt
			)));
		}
		Ok(())
	}

	fn advance(&self, state: &mut SignerReplayState, salt: &B256) {
		state.consumed_salts.insert(*salt);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_sequential_accepts_only_current_nonce() {
		let mut state = SignerReplayState::default();
		let guard = SequentialNonces;

		assert!(guard.consume(&mut state, &U256::from(1)).is_err());
		assert_eq!(state.nonce, U256::ZERO);

		guard.consume(&mut state, &U256::ZERO).unwrap();
		assert_eq!(state.nonce, U256::from(1));

		let err = guard.consume(&mut state, &U256::ZERO).unwrap_err();
		assert!(matches!(err, AuthorizationError::ReplayRejected(_)));
		assert_eq!(state.nonce, U256::from(1));
	}

	#[test]
	fn test_salts_are_single_use_in_any_order() {
		let mut state = SignerReplayState::default();
		let guard = ConcurrentSalts;
		let a = B256::repeat_byte(0xaa);
		let b = B256::repeat_byte(0xbb);

		guard.consume(&mut state, &b).unwrap();
		guard.consume(&mut state, &a).unwrap();
		assert!(guard.check(&state, &a).is_err());
		assert!(guard.consume(&mut state, &b).is_err());
		assert_eq!(state.consumed_salts.len(), 2);
		// Salts never touch the sequential nonce
		assert_eq!(state.nonce, U256::ZERO);
	}

	#[test]
	fn test_state_json_shape() {
		let mut state = SignerReplayState::default();
		SequentialNonces.consume(&mut state, &U256::ZERO).unwrap();
		let json = serde_json::to_value(&state).unwrap();
		assert_eq!(json["nonce"], "1");
		let back: SignerReplayState = serde_json::from_value(json).unwrap();
		assert_eq!(back, state);
	}
}
