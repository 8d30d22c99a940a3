//! ERC-2771 calldata context.
//!
//! A forwarder appends the 20-byte address of the original sender to the
//! calldata it passes on. A recipient that trusts the forwarder reads the
//! sender back from that suffix; any other caller is taken at face value.

use alloy_primitives::{Address, Bytes};

/// Length of the sender suffix.
pub const SENDER_SUFFIX_LEN: usize = 20;

/// Appends `sender` to `data`.
pub fn encode_forwarded_calldata(data: &[u8], sender: Address) -> Bytes {
	let mut calldata = Vec::with_capacity(data.len() + SENDER_SUFFIX_LEN);
	calldata.extend_from_slice(data);
	calldata.extend_from_slice(sender.as_slice());
	calldata.into()
}

/// Recipient-side view of forwarded calls.
#[derive(Debug, Clone, Copy)]
pub struct Erc2771Context {
	trusted_forwarder: Address,
}

impl Erc2771Context {
	pub fn new(trusted_forwarder: Address) -> Self {
		Self { trusted_forwarder }
	}

	pub fn trusted_forwarder(&self) -> Address {
		self.trusted_forwarder
	}

	pub fn is_trusted_forwarder(&self, caller: Address) -> bool {
		!caller.is_zero() && caller == self.trusted_forwarder
	}

	/// Effective sender of a call.
	///
	/// The suffix is honored only when `caller` is the trusted forwarder and
	/// the calldata is long enough to carry one.
	pub fn msg_sender(&self, caller: Address, calldata: &[u8]) -> Address {
		if self.is_trusted_forwarder(caller) && calldata.len() >= SENDER_SUFFIX_LEN {
			Address::from_slice(&calldata[calldata.len() - SENDER_SUFFIX_LEN..])
		} else {
			caller
		}
	}

	/// Calldata with the sender suffix stripped, under the same rule as
	/// [`Self::msg_sender`].
	pub fn msg_data<'a>(&self, caller: Address, calldata: &'a [u8]) -> &'a [u8] {
		if self.is_trusted_forwarder(caller) && calldata.len() >= SENDER_SUFFIX_LEN {
			&calldata[..calldata.len() - SENDER_SUFFIX_LEN]
		} else {
			calldata
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_trusted_forwarder_suffix_is_sender() {
		let forwarder = Address::repeat_byte(0xf0);
		let user = Address::repeat_byte(0x11);
		let ctx = Erc2771Context::new(forwarder);

		let calldata = encode_forwarded_calldata(&[0xde, 0xad], user);
		assert_eq!(calldata.len(), 22);
		assert_eq!(ctx.msg_sender(forwarder, &calldata), user);
		assert_eq!(ctx.msg_data(forwarder, &calldata), &[0xde, 0xad]);
	}

	#[test]
	fn test_untrusted_caller_is_sender() {
		let ctx = Erc2771Context::new(Address::repeat_byte(0xf0));
		let stranger = Address::repeat_byte(0x22);
		let calldata = encode_forwarded_calldata(&[1, 2, 3], Address::repeat_byte(0x11));

		assert_eq!(ctx.msg_sender(stranger, &calldata), stranger);
		assert_eq!(ctx.msg_data(stranger, &calldata), &calldata[..]);
	}

	#[test]
	fn test_short_calldata_from_forwarder() {
		let forwarder = Address::repeat_byte(0xf0);
		let ctx = Erc2771Context::new(forwarder);
		assert_eq!(ctx.msg_sender(forwarder, &[1, 2]), forwarder);
		assert_eq!(ctx.msg_data(forwarder, &[1, 2]), &[1, 2]);
	}

	#[test]
	fn test_zero_forwarder_trusts_nobody() {
		let ctx = Erc2771Context::new(Address::ZERO);
		assert!(!ctx.is_trusted_forwarder(Address::ZERO));
	}
}
