//! The taker-signed order model.
//!
//! `JamOrder` is defined as a Solidity struct so the same definition drives
//! both the Rust domain type and the EIP-712 typed-data encoding. Any change
//! to the field layout changes the typehash and therefore requires a bump of
//! the signing-domain version.

use crate::{
	common::FULL_FILL_BPS,
	errors::{Result, SettlementError},
};
use alloy_primitives::U256;
use alloy_sol_types::sol;
use serde::{Deserialize, Serialize};

sol! {
	/// A taker's signed trade intent.
	///
	/// `executor` set to the zero address leaves execution open to any
	/// solver; otherwise only `executor` may settle until
	/// `exclusivity_deadline` passes. `hooks_hash` commits the signature to
	/// the exact before/after interaction lists supplied at settlement time.
	#[derive(Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
	struct JamOrder {
		address taker;
		address receiver;
		address executor;
		uint256 expiry;
		uint256 exclusivity_deadline;
		uint256 nonce;
		uint256 partner_info;
		address[] sell_tokens;
		uint256[] sell_amounts;
		uint256[] sell_nft_ids;
		address[] buy_tokens;
		uint256[] buy_amounts;
		uint256[] buy_nft_ids;
		uint16 min_fill_percent;
		bytes32 hooks_hash;
		bytes sell_token_transfers;
		bytes buy_token_transfers;
	}
}

/// Per-token transfer method, one command byte per leg.
///
/// The byte values are wire constants; an unrecognized byte is a decoding
/// error, never a silently skipped leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum TransferCommand {
	/// Spend a pre-existing ERC-20 allowance via `transferFrom`.
	SimpleApproval = 0x00,
	/// An EIP-2612 (or DAI-style) permit is applied first, then `transferFrom`.
	Permit = 0x01,
	/// Spend a Permit2 allowance, standing or granted by a witness permit.
	Permit2 = 0x02,
	/// Native value attached to the enclosing call, forwarded to the destination.
	Native = 0x03,
	/// ERC-721 safe transfer by id; requires prior operator approval.
	NftErc721 = 0x04,
	/// ERC-1155 safe transfer by id and amount; requires prior operator approval.
	NftErc1155 = 0x05,
}

impl TransferCommand {
	pub fn from_byte(byte: u8) -> Result<Self> {
		Ok(match byte {
			0x00 => Self::SimpleApproval,
			0x01 => Self::Permit,
			0x02 => Self::Permit2,
			0x03 => Self::Native,
			0x04 => Self::NftErc721,
			0x05 => Self::NftErc1155,
			other => {
				return Err(SettlementError::InvalidOrder(format!(
					"unknown transfer command byte 0x{other:02x}"
				)))
			}
		})
	}

	pub fn to_byte(self) -> u8 {
		self as u8
	}

	pub fn is_nft(self) -> bool {
		matches!(self, Self::NftErc721 | Self::NftErc1155)
	}
}

/// Decodes a command byte string into one command per token.
pub fn parse_transfer_commands(bytes: &[u8]) -> Result<Vec<TransferCommand>> {
	bytes.iter().map(|b| TransferCommand::from_byte(*b)).collect()
}

impl JamOrder {
	/// Checks the structural invariants of one side of the order: tokens,
	/// amounts and command bytes must line up, and NFT ids must be present
	/// exactly when an NFT command is used.
	fn validate_side(
		side: &str,
		tokens: usize,
		amounts: usize,
		nft_ids: usize,
		commands: &[TransferCommand],
	) -> Result<()> {
		if tokens != amounts || tokens != commands.len() {
			return Err(SettlementError::InvalidOrder(format!(
				"{side} legs mismatched: {tokens} tokens, {amounts} amounts, {} commands",
				commands.len()
			)));
		}
		let has_nft = commands.iter().any(|c| c.is_nft());
		if has_nft && nft_ids != tokens {
			return Err(SettlementError::InvalidOrder(format!(
				"{side} NFT ids missing: {nft_ids} ids for {tokens} tokens"
			)));
		}
		Ok(())
	}

	/// Decoded sell-side commands.
	pub fn sell_commands(&self) -> Result<Vec<TransferCommand>> {
		parse_transfer_commands(&self.sell_token_transfers)
	}

	/// Decoded buy-side commands.
	pub fn buy_commands(&self) -> Result<Vec<TransferCommand>> {
		parse_transfer_commands(&self.buy_token_transfers)
	}

	/// Validates structural invariants: leg array shapes, command bytes and
	/// the fill-percent bound. Signature, expiry and nonce checks live in
	/// the engine, not here.
	pub fn validate_shape(&self) -> Result<()> {
		let sell = self.sell_commands()?;
		let buy = self.buy_commands()?;
		Self::validate_side(
			"sell",
			self.sell_tokens.len(),
			self.sell_amounts.len(),
			self.sell_nft_ids.len(),
			&sell,
		)?;
		Self::validate_side(
			"buy",
			self.buy_tokens.len(),
			self.buy_amounts.len(),
			self.buy_nft_ids.len(),
			&buy,
		)?;
		if self.min_fill_percent > FULL_FILL_BPS {
			return Err(SettlementError::InvalidOrder(format!(
				"min_fill_percent {} above 10000",
				self.min_fill_percent
			)));
		}
		Ok(())
	}

	/// True once `now` is strictly past the order expiry.
	pub fn is_expired(&self, now: u64) -> bool {
		self.expiry < U256::from(now)
	}

	/// True while a set executor still has exclusive execution rights.
	pub fn executor_is_exclusive(&self, now: u64) -> bool {
		U256::from(now) <= self.exclusivity_deadline
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_primitives::{address, Bytes};

	fn two_leg_order() -> JamOrder {
		JamOrder {
			taker: address!("0000000000000000000000000000000000000001"),
			receiver: address!("0000000000000000000000000000000000000001"),
			expiry: U256::from(100u64),
			sell_tokens: vec![
				address!("00000000000000000000000000000000000000a1"),
				address!("00000000000000000000000000000000000000a2"),
			],
			sell_amounts: vec![U256::from(1), U256::from(2)],
			buy_tokens: vec![address!("00000000000000000000000000000000000000b1")],
			buy_amounts: vec![U256::from(3)],
			min_fill_percent: FULL_FILL_BPS,
			sell_token_transfers: Bytes::from(vec![0x00, 0x00]),
			buy_token_transfers: Bytes::from(vec![0x00]),
			..Default::default()
		}
	}

	#[test]
	fn well_formed_order_passes() {
		two_leg_order().validate_shape().unwrap();
	}

	#[test]
	fn mismatched_legs_rejected() {
		let mut order = two_leg_order();
		order.sell_amounts.pop();
		assert!(matches!(
			order.validate_shape(),
			Err(SettlementError::InvalidOrder(_))
		));
	}

	#[test]
	fn unknown_command_byte_rejected() {
		let mut order = two_leg_order();
		order.buy_token_transfers = Bytes::from(vec![0x77]);
		assert!(matches!(
			order.validate_shape(),
			Err(SettlementError::InvalidOrder(_))
		));
	}

	#[test]
	fn nft_command_requires_ids() {
		let mut order = two_leg_order();
		order.sell_token_transfers = Bytes::from(vec![0x04, 0x00]);
		assert!(order.validate_shape().is_err());
		order.sell_nft_ids = vec![U256::from(11), U256::ZERO];
		order.validate_shape().unwrap();
	}

	#[test]
	fn command_bytes_round_trip() {
		for byte in 0x00..=0x05u8 {
			assert_eq!(TransferCommand::from_byte(byte).unwrap().to_byte(), byte);
		}
		assert!(TransferCommand::from_byte(0x06).is_err());
	}

	#[test]
	fn expiry_is_inclusive() {
		let order = two_leg_order();
		assert!(!order.is_expired(100));
		assert!(order.is_expired(101));
	}
}
