//! The execution environment a settlement call runs inside.
//!
//! Wraps the [`Ledger`] with the external collaborators the engine calls out
//! to (interaction targets, EIP-1271 contract wallets), the environment
//! clock, the per-token EIP-2612 permit nonces and the Permit2 unordered
//! nonce space. A settlement attempt snapshots the whole environment on
//! entry; aborting restores it, so no partial effect is ever observable.

use crate::ledger::Ledger;
use alloy_primitives::{Address, FixedBytes, B256, U256};
use jam_types::Result;
use std::{
	collections::{HashMap, HashSet},
	sync::Arc,
};

/// Mutable state handed to a contract handler for the duration of one call.
pub struct CallContext<'a> {
	pub ledger: &'a mut Ledger,
	/// The account making the call (the settlement contract for hooks and
	/// solver interactions).
	pub caller: Address,
	/// The handler's own address.
	pub this: Address,
	/// Native value already credited to `this` before the handler runs.
	pub value: U256,
	pub timestamp: u64,
}

/// An external contract reachable by hooks and solver interactions.
///
/// Returning `false` models a revert or falsy return; the engine decides
/// whether that aborts the settlement based on the interaction's
/// `result_required` flag.
pub trait ContractHandler: Send + Sync {
	fn call(&self, ctx: CallContext<'_>, data: &[u8]) -> bool;
}

/// An EIP-1271 contract wallet. Must return the magic value to accept.
pub trait SmartWallet: Send + Sync {
	fn is_valid_signature(&self, hash: B256, signature: &[u8]) -> FixedBytes<4>;
}

/// Everything restored when a settlement attempt aborts.
pub struct EnvironmentSnapshot {
	ledger: Ledger,
	permit_nonces: HashMap<(Address, Address), U256>,
	permit2_used: HashSet<(Address, U256)>,
}

#[derive(Default)]
pub struct Environment {
	pub ledger: Ledger,
	/// Current time in Unix seconds; expiry checks read this, never the
	/// wall clock.
	pub timestamp: u64,
	contracts: HashMap<Address, Arc<dyn ContractHandler>>,
	wallets: HashMap<Address, Arc<dyn SmartWallet>>,
	permit_nonces: HashMap<(Address, Address), U256>,
	permit2_used: HashSet<(Address, U256)>,
}

impl Environment {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn snapshot(&self) -> EnvironmentSnapshot {
		EnvironmentSnapshot {
			ledger: self.ledger.snapshot(),
			permit_nonces: self.permit_nonces.clone(),
			permit2_used: self.permit2_used.clone(),
		}
	}

	pub fn restore(&mut self, snapshot: EnvironmentSnapshot) {
		self.ledger.restore(snapshot.ledger);
		self.permit_nonces = snapshot.permit_nonces;
		self.permit2_used = snapshot.permit2_used;
	}

	pub fn register_contract(&mut self, address: Address, handler: Arc<dyn ContractHandler>) {
		self.contracts.insert(address, handler);
	}

	pub fn register_wallet(&mut self, address: Address, wallet: Arc<dyn SmartWallet>) {
		self.wallets.insert(address, wallet);
	}

	pub fn wallet(&self, address: Address) -> Option<Arc<dyn SmartWallet>> {
		self.wallets.get(&address).cloned()
	}

	/// Makes an external call: forwards `value` from `caller` first, then
	/// invokes the handler registered at `to`. A call with data to an
	/// address with no handler fails like a call to a non-contract; a bare
	/// value transfer succeeds.
	pub fn call(&mut self, caller: Address, to: Address, value: U256, data: &[u8]) -> Result<bool> {
		self.ledger.native_transfer(caller, to, value)?;
		match self.contracts.get(&to).cloned() {
			Some(handler) => {
				let ctx = CallContext {
					ledger: &mut self.ledger,
					caller,
					this: to,
					value,
					timestamp: self.timestamp,
				};
				Ok(handler.call(ctx, data))
			}
			None => Ok(data.is_empty()),
		}
	}

	// --- permit nonce spaces ---

	/// Next expected EIP-2612 nonce of `owner` on `token`.
	pub fn permit_nonce(&self, token: Address, owner: Address) -> U256 {
		self.permit_nonces.get(&(token, owner)).copied().unwrap_or_default()
	}

	pub fn advance_permit_nonce(&mut self, token: Address, owner: Address) {
		let entry = self.permit_nonces.entry((token, owner)).or_default();
		*entry += U256::from(1);
	}

	/// Permit2 nonces are unordered: each (owner, nonce) pair is usable once.
	pub fn permit2_nonce_used(&self, owner: Address, nonce: U256) -> bool {
		self.permit2_used.contains(&(owner, nonce))
	}

	pub fn mark_permit2_nonce(&mut self, owner: Address, nonce: U256) {
		self.permit2_used.insert((owner, nonce));
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	struct Flag;

	impl ContractHandler for Flag {
		fn call(&self, ctx: CallContext<'_>, data: &[u8]) -> bool {
			// Credit one token unit to the caller so tests can observe the call.
			ctx.ledger.mint(ctx.this, ctx.caller, U256::from(1));
			!data.is_empty()
		}
	}

	#[test]
	fn call_forwards_value_and_invokes_handler() {
		let mut env = Environment::new();
		let caller = Address::repeat_byte(1);
		let target = Address::repeat_byte(2);
		env.ledger.mint_native(caller, U256::from(10));
		env.register_contract(target, Arc::new(Flag));

		assert!(env.call(caller, target, U256::from(3), &[1]).unwrap());
		assert_eq!(env.ledger.native_balance_of(target), U256::from(3));
		assert_eq!(env.ledger.balance_of(target, caller), U256::from(1));
	}

	#[test]
	fn call_with_data_to_non_contract_fails() {
		let mut env = Environment::new();
		let caller = Address::repeat_byte(1);
		assert!(!env.call(caller, Address::repeat_byte(9), U256::ZERO, &[1]).unwrap());
		assert!(env.call(caller, Address::repeat_byte(9), U256::ZERO, &[]).unwrap());
	}

	#[test]
	fn snapshot_covers_permit_nonce_spaces() {
		let mut env = Environment::new();
		let owner = Address::repeat_byte(1);
		let token = Address::repeat_byte(2);
		let snapshot = env.snapshot();

		env.advance_permit_nonce(token, owner);
		env.mark_permit2_nonce(owner, U256::from(42));
		assert!(env.permit2_nonce_used(owner, U256::from(42)));

		env.restore(snapshot);
		assert_eq!(env.permit_nonce(token, owner), U256::ZERO);
		assert!(!env.permit2_nonce_used(owner, U256::from(42)));
	}
}
