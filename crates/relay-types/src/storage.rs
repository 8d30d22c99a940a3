//! Storage namespaces for persisted relay state.

use std::str::FromStr;

/// Storage keys for the collections the relay persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// Per-signer replay state (nonce and consumed salts)
	ReplayState,
	/// Receipts of settled fee payments
	FeeReceipts,
}

impl StorageKey {
	/// Returns the string representation of the storage key.
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::ReplayState => "replay_state",
			StorageKey::FeeReceipts => "fee_receipts",
		}
	}

	/// Returns an iterator over all StorageKey variants.
	pub fn all() -> impl Iterator<Item = Self> {
		[Self::ReplayState, Self::FeeReceipts].into_iter()
	}
}

impl FromStr for StorageKey {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"replay_state" => Ok(Self::ReplayState),
			"fee_receipts" => Ok(Self::FeeReceipts),
			_ => Err(()),
		}
	}
}

impl From<StorageKey> for &'static str {
	fn from(key: StorageKey) -> Self {
		key.as_str()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_storage_key_round_trip_names() {
		for key in StorageKey::all() {
			assert_eq!(key.as_str().parse::<StorageKey>(), Ok(key));
		}
		assert!("orders".parse::<StorageKey>().is_err());
	}
}
