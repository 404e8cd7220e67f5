//! Hook interactions and the hash commitment binding them to an order.
//!
//! A taker signs `hooks_hash` without knowing which solver will execute the
//! order; the engine recomputes the hash over the hook lists actually
//! supplied and refuses to run anything that does not match.

use alloy_primitives::{keccak256, B256};
use alloy_sol_types::{sol, SolValue};
use serde::{Deserialize, Serialize};

sol! {
	/// An arbitrary external call made on the taker's or maker's behalf.
	#[derive(Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
	struct Interaction {
		address to;
		uint256 value;
		bytes data;
		bool result_required;
	}

	/// Ordered interaction lists run around the core settlement.
	#[derive(Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
	struct JamHooks {
		Interaction[] before_settle;
		Interaction[] after_settle;
	}
}

impl JamHooks {
	/// The commitment an order's `hooks_hash` field must equal: the keccak
	/// of the canonical ABI encoding of both lists. Empty hooks hash the
	/// encoding of two empty lists; there is no zero-hash special case.
	pub fn commitment(&self) -> B256 {
		keccak256(self.abi_encode())
	}

	pub fn is_empty(&self) -> bool {
		self.before_settle.is_empty() && self.after_settle.is_empty()
	}
}
