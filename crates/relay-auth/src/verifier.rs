//! Signature verification over secp256k1.
//!
//! Recovery is strict: only canonical `(v, r, s)` triples are accepted. A
//! high-s signature is the malleable twin of a valid one and is rejected
//! rather than normalized.

use crate::AuthorizationError;
use alloy_primitives::{b256, Address, PrimitiveSignature, B256, U256};
use relay_types::SignatureParts;

/// secp256k1 curve order n.
const SECP256K1_ORDER: B256 =
	b256!("fffffffffffffffffffffffffffffffebaaedce6af48a03bbfd25e8cd0364141");

/// floor(n / 2). Canonical signatures have `s <= SECP256K1_HALF_ORDER`.
const SECP256K1_HALF_ORDER: B256 =
	b256!("7fffffffffffffffffffffffffffffff5d576e7357a4501ddfe92f46681b20a0");

/// Recovers the address that produced a signature over a digest.
pub trait SignatureVerifier: Send + Sync {
	/// Returns the signer, or `InvalidSignature` if no canonical signer
	/// can be recovered.
	fn recover(
		&self,
		digest: &B256,
		signature: &SignatureParts,
	) -> Result<Address, AuthorizationError>;
}

/// ECDSA verifier for `r || s || v` signatures with `v` in {27, 28}.
#[derive(Debug, Clone, Copy, Default)]
pub struct EcdsaVerifier;

impl EcdsaVerifier {
	pub fn new() -> Self {
		Self
	}
}

fn invalid(reason: &str) -> AuthorizationError {
	AuthorizationError::InvalidSignature(reason.to_string())
}

impl SignatureVerifier for EcdsaVerifier {
	fn recover(
		&self,
		digest: &B256,
		signature: &SignatureParts,
	) -> Result<Address, AuthorizationError> {
		let y_parity = match signature.v {
			27 => false,
			28 => true,
			_ => return Err(invalid("v must be 27 or 28")),
		};
		if signature.r.is_zero() || signature.r >= SECP256K1_ORDER {
			return Err(invalid("r out of range"));
		}
		if signature.s.is_zero() {
			return Err(invalid("s out of range"));
		}
		if signature.s > SECP256K1_HALF_ORDER {
			return Err(invalid("s in upper half of curve order"));
		}

		let sig = PrimitiveSignature::new(
			U256::from_be_bytes(signature.r.0),
			U256::from_be_bytes(signature.s.0),
			y_parity,
		);
		let recovered = sig
			.recover_address_from_prehash(digest)
			.map_err(|e| invalid(&format!("recovery failed: {}", e)))?;

		if recovered.is_zero() {
			return Err(invalid("recovered the zero address"));
		}
		Ok(recovered)
	}
}
