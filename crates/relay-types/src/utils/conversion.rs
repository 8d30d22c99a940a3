//! Conversion utilities for addresses read from configuration and requests.

use alloy_primitives::Address;

/// Parses a hex address, accepting it with or without the "0x" prefix.
pub fn parse_address(value: &str) -> Result<Address, String> {
	let trimmed = value.trim();
	let hex_part = trimmed
		.strip_prefix("0x")
		.or_else(|| trimmed.strip_prefix("0X"))
		.unwrap_or(trimmed);
	if hex_part.len() != 40 {
		return Err(format!(
			"Invalid address '{}': expected 40 hex characters, got {}",
			value,
			hex_part.len()
		));
	}
	hex_part
		.parse::<Address>()
		.map_err(|e| format!("Invalid address '{}': {}", value, e))
}

/// Parses a hex address and rejects the zero address.
pub fn parse_nonzero_address(value: &str) -> Result<Address, String> {
	let address = parse_address(value)?;
	if address == Address::ZERO {
		return Err(format!("Address '{}' must not be the zero address", value));
	}
	Ok(address)
}
