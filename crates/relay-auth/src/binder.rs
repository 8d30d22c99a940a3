//! Domain binder.
//!
//! Turns a domain descriptor plus the signed fields of a request into the
//! EIP-712 digest a signer commits to. The digest binds the payload to one
//! contract on one chain under one schema version, so a signature produced
//! for any other domain recovers to a different address.

use alloy_primitives::{Address, B256, U256};
use relay_types::utils::{
	compute_final_digest, Eip712AbiEncoder, CONCURRENT_META_CALL_TYPE, META_CALL_TYPE,
};
use relay_types::{DomainDescriptor, ReplayToken};

/// A domain descriptor with its separator computed once.
#[derive(Debug, Clone)]
pub struct DomainBinder {
	domain: DomainDescriptor,
	separator: B256,
}

impl DomainBinder {
	pub fn new(domain: DomainDescriptor) -> Self {
		let separator = domain.separator();
		Self { domain, separator }
	}

	pub fn domain(&self) -> &DomainDescriptor {
		&self.domain
	}

	pub fn separator(&self) -> B256 {
		self.separator
	}

	/// Digest of an arbitrary struct hash under this domain.
	pub fn typed_digest(&self, struct_hash: &B256) -> B256 {
		compute_final_digest(&self.separator, struct_hash)
	}

	/// `MetaCall(uint256 nonce,address user,bytes data)`
	pub fn sequential_digest(&self, nonce: U256, user: Address, data: &[u8]) -> B256 {
		let mut enc = Eip712AbiEncoder::for_type(META_CALL_TYPE);
		enc.push_u256(nonce);
		enc.push_address(&user);
		enc.push_bytes(data);
		self.typed_digest(&enc.hash())
	}

	/// `ConcurrentMetaCall(bytes32 salt,address user,bytes data,uint256 deadline)`
	pub fn concurrent_digest(&self, salt: B256, user: Address, data: &[u8], deadline: u64) -> B256 {
		let mut enc = Eip712AbiEncoder::for_type(CONCURRENT_META_CALL_TYPE);
		enc.push_b256(&salt);
		enc.push_address(&user);
		enc.push_bytes(data);
		enc.push_u64(deadline);
		self.typed_digest(&enc.hash())
	}

	/// Digest for a request, picking the schema from its replay token.
	pub fn digest(&self, user: Address, data: &[u8], replay: &ReplayToken) -> B256 {
		match replay {
			ReplayToken::Nonce { nonce } => self.sequential_digest(*nonce, user, data),
			ReplayToken::Salt { salt, deadline } => {
				self.concurrent_digest(*salt, user, data, *deadline)
			},
		}
	}
}
