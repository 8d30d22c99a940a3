//! Utility functions shared across the relay.
//!
//! This module provides EIP-712 encoding helpers, address parsing and
//! timestamp retrieval used by the relay components.

pub mod conversion;
pub mod eip712;
pub mod helpers;

pub use conversion::{parse_address, parse_nonzero_address};
pub use eip712::{
	compute_final_digest, Eip712AbiEncoder, CONCURRENT_META_CALL_TYPE, DOMAIN_TYPE,
	META_CALL_TYPE, PERMIT_TYPE, SALTED_DOMAIN_TYPE,
};
pub use helpers::current_timestamp;
