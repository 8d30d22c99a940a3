//! Generic EIP-712 utilities shared across the relay.
//!
//! These helpers provide:
//! - The type strings of every struct the relay signs or verifies
//! - Final digest computation (0x1901 || domainHash || structHash)
//! - A minimal ABI encoder for the static and hashed field types in use

use alloy_primitives::{keccak256, Address, B256, U256};

pub const DOMAIN_TYPE: &str =
	"EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";
pub const SALTED_DOMAIN_TYPE: &str =
	"EIP712Domain(string name,string version,address verifyingContract,bytes32 salt)";
pub const META_CALL_TYPE: &str = "MetaCall(uint256 nonce,address user,bytes data)";
pub const CONCURRENT_META_CALL_TYPE: &str =
	"ConcurrentMetaCall(bytes32 salt,address user,bytes data,uint256 deadline)";
pub const PERMIT_TYPE: &str =
	"Permit(address owner,address spender,uint256 value,uint256 nonce,uint256 deadline)";

/// Compute the final EIP-712 digest: keccak256(0x1901 || domainHash || structHash).
pub fn compute_final_digest(domain_hash: &B256, struct_hash: &B256) -> B256 {
	let mut out = Vec::with_capacity(2 + 32 + 32);
	out.push(0x19);
	out.push(0x01);
	out.extend_from_slice(domain_hash.as_slice());
	out.extend_from_slice(struct_hash.as_slice());
	keccak256(out)
}

/// Minimal ABI encoder for EIP-712 struct hashing.
///
/// Dynamic `bytes` and `string` members are encoded as the keccak256 of
/// their contents, as EIP-712 `encodeData` requires.
pub struct Eip712AbiEncoder {
	buf: Vec<u8>,
}

impl Default for Eip712AbiEncoder {
	fn default() -> Self {
		Self::new()
	}
}

impl Eip712AbiEncoder {
	pub fn new() -> Self {
		Self { buf: Vec::new() }
	}

	/// Starts an encoding with the type hash of `type_string`.
	pub fn for_type(type_string: &str) -> Self {
		let mut enc = Self::new();
		enc.push_b256(&keccak256(type_string.as_bytes()));
		enc
	}

	pub fn push_b256(&mut self, v: &B256) {
		self.buf.extend_from_slice(v.as_slice());
	}

	pub fn push_address(&mut self, addr: &Address) {
		let mut word = [0u8; 32];
		word[12..].copy_from_slice(addr.as_slice());
		self.buf.extend_from_slice(&word);
	}

	pub fn push_u256(&mut self, v: U256) {
		let word: [u8; 32] = v.to_be_bytes::<32>();
		self.buf.extend_from_slice(&word);
	}

	pub fn push_u64(&mut self, v: u64) {
		self.push_u256(U256::from(v));
	}

	pub fn push_bytes(&mut self, data: &[u8]) {
		self.push_b256(&keccak256(data));
	}

	pub fn push_string(&mut self, s: &str) {
		self.push_bytes(s.as_bytes());
	}

	pub fn finish(self) -> Vec<u8> {
		self.buf
	}

	/// Hashes the encoded words.
	pub fn hash(self) -> B256 {
		keccak256(self.buf)
	}
}
