//! In-memory token ledger with snapshot/rollback.
//!
//! Models the balances the settlement engine moves: ERC-20 balances and
//! allowances, a separate Permit2 allowance table, native value, ERC-721
//! ownership with operator approvals, and ERC-1155 balances. Every transfer
//! is checked; a failed leg surfaces as `TransferFailed` and the engine rolls
//! the whole attempt back by restoring a snapshot.

use alloy_primitives::{Address, U256};
use jam_types::{Result, SettlementError};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Default)]
pub struct Ledger {
	erc20: HashMap<(Address, Address), U256>,
	allowances: HashMap<(Address, Address, Address), U256>,
	permit2_allowances: HashMap<(Address, Address, Address), U256>,
	native: HashMap<Address, U256>,
	erc721: HashMap<(Address, U256), Address>,
	erc1155: HashMap<(Address, U256, Address), U256>,
	operators: HashSet<(Address, Address, Address)>,
}

fn transfer_failed(msg: impl Into<String>) -> SettlementError {
	SettlementError::TransferFailed(msg.into())
}

impl Ledger {
	pub fn new() -> Self {
		Self::default()
	}

	/// Full copy of the ledger, restored on abort.
	pub fn snapshot(&self) -> Ledger {
		self.clone()
	}

	pub fn restore(&mut self, snapshot: Ledger) {
		*self = snapshot;
	}

	// --- ERC-20 ---

	pub fn balance_of(&self, token: Address, holder: Address) -> U256 {
		self.erc20.get(&(token, holder)).copied().unwrap_or_default()
	}

	pub fn mint(&mut self, token: Address, to: Address, amount: U256) {
		let entry = self.erc20.entry((token, to)).or_default();
		*entry += amount;
	}

	pub fn allowance(&self, token: Address, owner: Address, spender: Address) -> U256 {
		self.allowances
			.get(&(token, owner, spender))
			.copied()
			.unwrap_or_default()
	}

	pub fn approve(&mut self, token: Address, owner: Address, spender: Address, amount: U256) {
		self.allowances.insert((token, owner, spender), amount);
	}

	pub fn erc20_transfer(
		&mut self,
		token: Address,
		from: Address,
		to: Address,
		amount: U256,
	) -> Result<()> {
		if amount.is_zero() {
			return Ok(());
		}
		let balance = self.balance_of(token, from);
		if balance < amount {
			return Err(transfer_failed(format!(
				"insufficient balance of {token} for {from}: have {balance}, need {amount}"
			)));
		}
		self.erc20.insert((token, from), balance - amount);
		let dest = self.erc20.entry((token, to)).or_default();
		*dest += amount;
		Ok(())
	}

	/// Spends `spender`'s ERC-20 allowance over `from`'s balance. An
	/// unlimited (U256::MAX) allowance is never decremented.
	pub fn erc20_transfer_from(
		&mut self,
		token: Address,
		spender: Address,
		from: Address,
		to: Address,
		amount: U256,
	) -> Result<()> {
		if amount.is_zero() {
			return Ok(());
		}
		if spender != from {
			let allowed = self.allowance(token, from, spender);
			if allowed < amount {
				return Err(transfer_failed(format!(
					"insufficient allowance of {token} from {from} to {spender}: have {allowed}, need {amount}"
				)));
			}
			if allowed != U256::MAX {
				self.allowances.insert((token, from, spender), allowed - amount);
			}
		}
		self.erc20_transfer(token, from, to, amount)
	}

	// --- Permit2 ---

	pub fn permit2_allowance(&self, token: Address, owner: Address, spender: Address) -> U256 {
		self.permit2_allowances
			.get(&(token, owner, spender))
			.copied()
			.unwrap_or_default()
	}

	pub fn approve_permit2(
		&mut self,
		token: Address,
		owner: Address,
		spender: Address,
		amount: U256,
	) {
		self.permit2_allowances.insert((token, owner, spender), amount);
	}

	/// Spends a Permit2 allowance (standing, or granted by a verified
	/// witness permit) and moves the tokens.
	pub fn permit2_transfer_from(
		&mut self,
		token: Address,
		spender: Address,
		from: Address,
		to: Address,
		amount: U256,
	) -> Result<()> {
		if amount.is_zero() {
			return Ok(());
		}
		let allowed = self.permit2_allowance(token, from, spender);
		if allowed < amount {
			return Err(transfer_failed(format!(
				"insufficient permit2 allowance of {token} from {from}: have {allowed}, need {amount}"
			)));
		}
		if allowed != U256::MAX {
			self.permit2_allowances
				.insert((token, from, spender), allowed - amount);
		}
		self.erc20_transfer(token, from, to, amount)
	}

	// --- Native value ---

	pub fn native_balance_of(&self, holder: Address) -> U256 {
		self.native.get(&holder).copied().unwrap_or_default()
	}

	pub fn mint_native(&mut self, to: Address, amount: U256) {
		let entry = self.native.entry(to).or_default();
		*entry += amount;
	}

	pub fn native_transfer(&mut self, from: Address, to: Address, amount: U256) -> Result<()> {
		if amount.is_zero() {
			return Ok(());
		}
		let balance = self.native_balance_of(from);
		if balance < amount {
			return Err(transfer_failed(format!(
				"insufficient native balance for {from}: have {balance}, need {amount}"
			)));
		}
		self.native.insert(from, balance - amount);
		let dest = self.native.entry(to).or_default();
		*dest += amount;
		Ok(())
	}

	// --- NFTs ---

	pub fn mint_erc721(&mut self, token: Address, id: U256, owner: Address) {
		self.erc721.insert((token, id), owner);
	}

	pub fn erc721_owner(&self, token: Address, id: U256) -> Option<Address> {
		self.erc721.get(&(token, id)).copied()
	}

	pub fn mint_erc1155(&mut self, token: Address, id: U256, to: Address, amount: U256) {
		let entry = self.erc1155.entry((token, id, to)).or_default();
		*entry += amount;
	}

	pub fn erc1155_balance_of(&self, token: Address, id: U256, holder: Address) -> U256 {
		self.erc1155.get(&(token, id, holder)).copied().unwrap_or_default()
	}

	/// Grants or revokes operator rights over all of `owner`'s ids in
	/// `token` (both 721 and 1155 semantics).
	pub fn set_approval_for_all(
		&mut self,
		token: Address,
		owner: Address,
		operator: Address,
		approved: bool,
	) {
		if approved {
			self.operators.insert((token, owner, operator));
		} else {
			self.operators.remove(&(token, owner, operator));
		}
	}

	pub fn is_approved_for_all(&self, token: Address, owner: Address, operator: Address) -> bool {
		self.operators.contains(&(token, owner, operator))
	}

	pub fn erc721_transfer_from(
		&mut self,
		token: Address,
		operator: Address,
		from: Address,
		to: Address,
		id: U256,
	) -> Result<()> {
		let owner = self
			.erc721_owner(token, id)
			.ok_or_else(|| transfer_failed(format!("ERC-721 {token} id {id} does not exist")))?;
		if owner != from {
			return Err(transfer_failed(format!(
				"ERC-721 {token} id {id} not owned by {from}"
			)));
		}
		if operator != from && !self.is_approved_for_all(token, from, operator) {
			return Err(transfer_failed(format!(
				"operator {operator} not approved for ERC-721 {token} by {from}"
			)));
		}
		self.erc721.insert((token, id), to);
		Ok(())
	}

	pub fn erc1155_transfer_from(
		&mut self,
		token: Address,
		operator: Address,
		from: Address,
		to: Address,
		id: U256,
		amount: U256,
	) -> Result<()> {
		if operator != from && !self.is_approved_for_all(token, from, operator) {
			return Err(transfer_failed(format!(
				"operator {operator} not approved for ERC-1155 {token} by {from}"
			)));
		}
		let balance = self.erc1155_balance_of(token, id, from);
		if balance < amount {
			return Err(transfer_failed(format!(
				"insufficient ERC-1155 balance of {token} id {id} for {from}"
			)));
		}
		self.erc1155.insert((token, id, from), balance - amount);
		let dest = self.erc1155.entry((token, id, to)).or_default();
		*dest += amount;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	fn addr(byte: u8) -> Address {
		Address::repeat_byte(byte)
	}

	fn token() -> Address {
		addr(0xee)
	}

	#[test]
	fn transfer_from_spends_allowance() {
		let mut ledger = Ledger::new();
		let (owner, spender, dest) = (addr(1), addr(2), addr(3));
		ledger.mint(token(), owner, U256::from(100));
		ledger.approve(token(), owner, spender, U256::from(60));

		ledger
			.erc20_transfer_from(token(), spender, owner, dest, U256::from(40))
			.unwrap();
		assert_eq!(ledger.balance_of(token(), dest), U256::from(40));
		assert_eq!(ledger.allowance(token(), owner, spender), U256::from(20));

		let err = ledger.erc20_transfer_from(token(), spender, owner, dest, U256::from(30));
		assert!(matches!(err, Err(SettlementError::TransferFailed(_))));
	}

	#[test]
	fn unlimited_allowance_is_not_decremented() {
		let mut ledger = Ledger::new();
		let (owner, spender, dest) = (addr(1), addr(2), addr(3));
		ledger.mint(token(), owner, U256::from(100));
		ledger.approve(token(), owner, spender, U256::MAX);
		ledger
			.erc20_transfer_from(token(), spender, owner, dest, U256::from(40))
			.unwrap();
		assert_eq!(ledger.allowance(token(), owner, spender), U256::MAX);
	}

	#[test]
	fn erc721_transfer_requires_operator_approval() {
		let mut ledger = Ledger::new();
		let (owner, operator, dest) = (addr(1), addr(2), addr(3));
		let id = U256::from(7);
		ledger.mint_erc721(token(), id, owner);

		assert!(ledger
			.erc721_transfer_from(token(), operator, owner, dest, id)
			.is_err());

		ledger.set_approval_for_all(token(), owner, operator, true);
		ledger
			.erc721_transfer_from(token(), operator, owner, dest, id)
			.unwrap();
		assert_eq!(ledger.erc721_owner(token(), id), Some(dest));
	}

	#[test]
	fn snapshot_restores_all_tables() {
		let mut ledger = Ledger::new();
		let (owner, spender) = (addr(1), addr(2));
		ledger.mint(token(), owner, U256::from(100));
		ledger.mint_native(owner, U256::from(5));
		let snapshot = ledger.snapshot();

		ledger.erc20_transfer(token(), owner, spender, U256::from(99)).unwrap();
		ledger.native_transfer(owner, spender, U256::from(5)).unwrap();
		ledger.approve_permit2(token(), owner, spender, U256::from(1));

		ledger.restore(snapshot);
		assert_eq!(ledger.balance_of(token(), owner), U256::from(100));
		assert_eq!(ledger.native_balance_of(owner), U256::from(5));
		assert_eq!(ledger.permit2_allowance(token(), owner, spender), U256::ZERO);
	}
}
