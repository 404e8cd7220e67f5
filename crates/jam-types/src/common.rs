//! Common types and protocol constants used throughout the settlement engine.

use alloy_primitives::{Address, U256};

/// Unix timestamp in seconds.
pub type Timestamp = u64;

/// Fill percentages are expressed in basis points.
pub type FillBps = u16;

/// A full fill: 100% in basis points.
pub const FULL_FILL_BPS: FillBps = 10_000;

/// Scales a sell-side amount by a fill percentage, rounding up so the
/// counterparty is never shorted by integer division dust.
pub fn scale_sell_amount(amount: U256, fill_bps: FillBps) -> U256 {
	if fill_bps == FULL_FILL_BPS {
		return amount;
	}
	let denom = U256::from(FULL_FILL_BPS);
	(amount * U256::from(fill_bps) + denom - U256::from(1)) / denom
}

/// Scales a buy-side amount by a fill percentage, rounding down.
pub fn scale_buy_amount(amount: U256, fill_bps: FillBps) -> U256 {
	if fill_bps == FULL_FILL_BPS {
		return amount;
	}
	amount * U256::from(fill_bps) / U256::from(FULL_FILL_BPS)
}

/// Unpacked view of an order's `partner_info` field.
///
/// Bit layout (pinned protocol constant):
/// - bits 0..160: partner fee recipient address
/// - bits 160..176: partner fee in basis points
/// - bits 176..192: protocol fee in basis points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PartnerInfo {
	pub partner: Address,
	pub partner_fee_bps: u16,
	pub protocol_fee_bps: u16,
}

impl PartnerInfo {
	pub fn pack(&self) -> U256 {
		U256::from_be_slice(self.partner.as_slice())
			| (U256::from(self.partner_fee_bps) << 160usize)
			| (U256::from(self.protocol_fee_bps) << 176usize)
	}

	pub fn unpack(raw: U256) -> Self {
		let addr_bytes: [u8; 32] = raw.to_be_bytes();
		Self {
			partner: Address::from_slice(&addr_bytes[12..]),
			partner_fee_bps: ((raw >> 160usize) & U256::from(u16::MAX)).to::<u16>(),
			protocol_fee_bps: ((raw >> 176usize) & U256::from(u16::MAX)).to::<u16>(),
		}
	}

	/// Total fee charged on buy legs, in basis points.
	pub fn total_fee_bps(&self) -> u16 {
		self.partner_fee_bps.saturating_add(self.protocol_fee_bps)
	}
}

/// Unpacked view of a Blend order's `flags` field.
///
/// Bit layout (pinned protocol constant):
/// - bits 0..64: partner id
/// - bits 64..128: event id, echoed in fill events for indexers
/// - bits 128..130: maker signature scheme (0 = EIP-712, 1 = EIP-191, 2 = EIP-1271)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlendFlags {
	pub partner_id: u64,
	pub event_id: u64,
	pub signature_scheme: u8,
}

impl BlendFlags {
	pub fn pack(&self) -> U256 {
		U256::from(self.partner_id)
			| (U256::from(self.event_id) << 64usize)
			| (U256::from(self.signature_scheme & 0b11) << 128usize)
	}

	pub fn unpack(raw: U256) -> Self {
		Self {
			partner_id: (raw & U256::from(u64::MAX)).to::<u64>(),
			event_id: ((raw >> 64usize) & U256::from(u64::MAX)).to::<u64>(),
			signature_scheme: ((raw >> 128usize) & U256::from(0b11u8)).to::<u8>(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_primitives::address;

	#[test]
	fn partner_info_round_trips() {
		let info = PartnerInfo {
			partner: address!("00000000000000000000000000000000000000aa"),
			partner_fee_bps: 30,
			protocol_fee_bps: 5,
		};
		assert_eq!(PartnerInfo::unpack(info.pack()), info);
	}

	#[test]
	fn empty_partner_info_packs_to_zero() {
		assert_eq!(PartnerInfo::default().pack(), U256::ZERO);
	}

	#[test]
	fn blend_flags_round_trip() {
		let flags = BlendFlags {
			partner_id: 7,
			event_id: 0xdead_beef,
			signature_scheme: 2,
		};
		assert_eq!(BlendFlags::unpack(flags.pack()), flags);
	}

	#[test]
	fn sell_scaling_rounds_up() {
		// 1 wei at 1 bps still pulls 1 wei from the taker.
		assert_eq!(scale_sell_amount(U256::from(1), 1), U256::from(1));
		assert_eq!(scale_sell_amount(U256::from(1000), 9000), U256::from(900));
	}

	#[test]
	fn buy_scaling_rounds_down() {
		assert_eq!(scale_buy_amount(U256::from(1), 1), U256::ZERO);
		assert_eq!(scale_buy_amount(U256::from(123), 9000), U256::from(110));
	}

	#[test]
	fn full_fill_is_identity() {
		let amount = U256::from(123_456_789u64);
		assert_eq!(scale_sell_amount(amount, FULL_FILL_BPS), amount);
		assert_eq!(scale_buy_amount(amount, FULL_FILL_BPS), amount);
	}
}
