//! Per-settlement-call parameters not covered by the taker's signature.

use crate::common::{FillBps, FULL_FILL_BPS};
use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

/// Parameters supplied by the solver alongside a single-order settlement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverParams {
	/// Where the pulled sell-side funds land for the solver's execution.
	pub balance_recipient: Address,
	/// Fill actually achieved, in basis points. Must lie within
	/// `[order.min_fill_percent, 10000]`.
	pub cur_fill_percent: FillBps,
	/// Native value attached to the settlement call, credited to the
	/// settlement account before any leg moves.
	pub attached_value: U256,
}

impl Default for SolverParams {
	fn default() -> Self {
		Self {
			balance_recipient: Address::ZERO,
			cur_fill_percent: FULL_FILL_BPS,
			attached_value: U256::ZERO,
		}
	}
}

/// Parameters for maker-direct settlement (`settle_internal`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MakerParams {
	/// Per-leg overrides of the taker's buy amounts. Empty means the signed
	/// amounts; a non-empty list must match the buy legs and may only raise
	/// each amount, never lower it.
	pub increased_buy_amounts: Vec<U256>,
	/// Fill actually achieved, in basis points. Must lie within
	/// `[order.min_fill_percent, 10000]`; there is no zero sentinel.
	pub cur_fill_percent: FillBps,
	/// Native value attached to the call.
	pub attached_value: U256,
}

impl Default for MakerParams {
	fn default() -> Self {
		Self {
			increased_buy_amounts: Vec::new(),
			cur_fill_percent: FULL_FILL_BPS,
			attached_value: U256::ZERO,
		}
	}
}

/// Parameters for batch settlement.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchParams {
	/// Where every order's sell-side funds are aggregated.
	pub balance_recipient: Address,
	/// One fill percent per order; empty means full fill for all.
	pub fill_percents: Vec<FillBps>,
	/// Native value attached to the call.
	pub attached_value: U256,
}

impl BatchParams {
	/// Fill percent for the order at `index`.
	pub fn fill_percent(&self, index: usize) -> FillBps {
		if self.fill_percents.is_empty() {
			FULL_FILL_BPS
		} else {
			self.fill_percents.get(index).copied().unwrap_or(FULL_FILL_BPS)
		}
	}
}
