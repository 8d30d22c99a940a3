//! EIP-712 domain descriptor.

use crate::utils::eip712::{Eip712AbiEncoder, DOMAIN_TYPE, SALTED_DOMAIN_TYPE};
use alloy_primitives::{keccak256, Address, B256, U256};
use serde::{Deserialize, Serialize};

/// Identity a signature is bound to: contract, chain and signing schema version.
///
/// Fixed at construction. Two encodings are supported: the standard
/// `chainId` field, or a `salt` carrying the chain id for verifiers that
/// predate the `chainId` member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainDescriptor {
	pub name: String,
	pub version: String,
	pub chain_id: u64,
	pub verifying_contract: Address,
	/// Encode the chain id as `bytes32 salt` instead of `uint256 chainId`.
	#[serde(default)]
	pub use_chain_salt: bool,
}

impl DomainDescriptor {
	pub fn new(
		name: impl Into<String>,
		version: impl Into<String>,
		chain_id: u64,
		verifying_contract: Address,
	) -> Self {
		Self {
			name: name.into(),
			version: version.into(),
			chain_id,
			verifying_contract,
			use_chain_salt: false,
		}
	}

	/// Switches the descriptor to the salted encoding.
	pub fn with_chain_salt(mut self) -> Self {
		self.use_chain_salt = true;
		self
	}

	/// Returns the same domain bound to a different verifying contract.
	pub fn for_contract(&self, verifying_contract: Address) -> Self {
		Self {
			verifying_contract,
			..self.clone()
		}
	}

	/// The chain id left-padded into a 32-byte salt.
	pub fn chain_salt(&self) -> B256 {
		B256::from(U256::from(self.chain_id))
	}

	/// Computes the domain separator hash.
	pub fn separator(&self) -> B256 {
		let mut enc = Eip712AbiEncoder::new();
		if self.use_chain_salt {
			enc.push_b256(&keccak256(SALTED_DOMAIN_TYPE.as_bytes()));
			enc.push_string(&self.name);
			enc.push_string(&self.version);
			enc.push_address(&self.verifying_contract);
			enc.push_b256(&self.chain_salt());
		} else {
			enc.push_b256(&keccak256(DOMAIN_TYPE.as_bytes()));
			enc.push_string(&self.name);
			enc.push_string(&self.version);
			enc.push_u256(U256::from(self.chain_id));
			enc.push_address(&self.verifying_contract);
		}
		keccak256(enc.finish())
	}
}
