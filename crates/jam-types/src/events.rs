//! Settlement events published for off-chain indexers.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

/// One event per completed settlement or maker-liquidity fill, carrying
/// enough data to reconstruct the fill without replaying the call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettlementEvent {
	/// A taker order settled (single, with-permits, maker-direct, or as one
	/// member of a batch).
	Settled {
		taker: Address,
		receiver: Address,
		nonce: U256,
		sell_tokens: Vec<Address>,
		sell_amounts: Vec<U256>,
		buy_tokens: Vec<Address>,
		/// Realized amounts after fill scaling, fees and maker improvements.
		buy_amounts: Vec<U256>,
		fill_percent: u16,
	},
	/// A single-pair Blend maker fill.
	BlendSingleFill {
		event_id: u64,
		taker: Address,
		maker: Address,
		taker_token: Address,
		maker_token: Address,
		taker_amount: U256,
		maker_amount: U256,
	},
	/// A one-maker, many-token Blend fill.
	BlendMultiFill {
		event_id: u64,
		taker: Address,
		maker: Address,
		taker_tokens: Vec<Address>,
		maker_tokens: Vec<Address>,
		taker_amounts: Vec<U256>,
		maker_amounts: Vec<U256>,
	},
	/// A many-maker aggregate Blend fill.
	BlendAggregateFill {
		event_id: u64,
		taker: Address,
		taker_tokens: Vec<Address>,
		maker_tokens: Vec<Address>,
		taker_amounts: Vec<U256>,
		maker_amounts: Vec<U256>,
	},
	/// A taker cancelled an unexecuted nonce.
	NonceCancelled { taker: Address, nonce: U256 },
}
