//! Fund movement: pulling sell legs in and pushing buy legs out.
//!
//! Each leg carries one transfer command byte selecting how the tokens move.
//! Dispatch is a total match over the command enum, so adding a transfer
//! method is a compiler-checked change. Any failed leg aborts the settlement;
//! the manager never holds balances past the enclosing call.

use alloy_primitives::{Address, U256};
use jam_state::Environment;
use jam_types::{
	scale_buy_amount, scale_sell_amount, FillBps, JamOrder, Result, TransferCommand,
};
use tracing::trace;

/// One token movement, fully resolved: scaling and command decoding already
/// applied.
#[derive(Debug, Clone)]
pub struct TransferLeg {
	pub token: Address,
	pub amount: U256,
	pub nft_id: U256,
	pub command: TransferCommand,
}

fn build_legs(
	tokens: &[Address],
	amounts: &[U256],
	nft_ids: &[U256],
	commands: Vec<TransferCommand>,
	scale: impl Fn(U256) -> U256,
) -> Vec<TransferLeg> {
	commands
		.into_iter()
		.enumerate()
		.map(|(i, command)| TransferLeg {
			token: tokens[i],
			// NFT legs move by id; amounts only scale for fungibles.
			amount: if command.is_nft() { amounts[i] } else { scale(amounts[i]) },
			nft_id: nft_ids.get(i).copied().unwrap_or_default(),
			command,
		})
		.collect()
}

/// Sell-side legs scaled by the fill percent, rounding up.
pub fn sell_legs(order: &JamOrder, fill_bps: FillBps) -> Result<Vec<TransferLeg>> {
	Ok(build_legs(
		&order.sell_tokens,
		&order.sell_amounts,
		&order.sell_nft_ids,
		order.sell_commands()?,
		|amount| scale_sell_amount(amount, fill_bps),
	))
}

/// Buy-side legs scaled by the fill percent, rounding down.
pub fn buy_legs(order: &JamOrder, fill_bps: FillBps) -> Result<Vec<TransferLeg>> {
	Ok(build_legs(
		&order.buy_tokens,
		&order.buy_amounts,
		&order.buy_nft_ids,
		order.buy_commands()?,
		|amount| scale_buy_amount(amount, fill_bps),
	))
}

/// Moves legs through the settlement contract's custody account.
pub struct BalanceManager {
	/// The settlement contract: spender of allowances, NFT operator, and
	/// pass-through custody account.
	settlement: Address,
}

impl BalanceManager {
	pub fn new(settlement: Address) -> Self {
		Self { settlement }
	}

	/// Pulls legs from `owner` to `destination`, dispatching per command.
	/// Native legs spend value already credited to the settlement account by
	/// the enclosing call.
	pub fn pull(
		&self,
		env: &mut Environment,
		owner: Address,
		legs: &[TransferLeg],
		destination: Address,
	) -> Result<()> {
		for leg in legs {
			trace!(token = %leg.token, amount = %leg.amount, command = ?leg.command, "pull leg");
			match leg.command {
				TransferCommand::SimpleApproval | TransferCommand::Permit => {
					env.ledger.erc20_transfer_from(
						leg.token,
						self.settlement,
						owner,
						destination,
						leg.amount,
					)?;
				}
				TransferCommand::Permit2 => {
					env.ledger.permit2_transfer_from(
						leg.token,
						self.settlement,
						owner,
						destination,
						leg.amount,
					)?;
				}
				TransferCommand::Native => {
					env.ledger.native_transfer(self.settlement, destination, leg.amount)?;
				}
				TransferCommand::NftErc721 => {
					env.ledger.erc721_transfer_from(
						leg.token,
						self.settlement,
						owner,
						destination,
						leg.nft_id,
					)?;
				}
				TransferCommand::NftErc1155 => {
					env.ledger.erc1155_transfer_from(
						leg.token,
						self.settlement,
						owner,
						destination,
						leg.nft_id,
						leg.amount,
					)?;
				}
			}
		}
		Ok(())
	}

	/// Pushes legs out of the settlement custody account to `destination`.
	pub fn push(
		&self,
		env: &mut Environment,
		legs: &[TransferLeg],
		destination: Address,
	) -> Result<()> {
		for leg in legs {
			trace!(token = %leg.token, amount = %leg.amount, command = ?leg.command, "push leg");
			match leg.command {
				TransferCommand::SimpleApproval
				| TransferCommand::Permit
				| TransferCommand::Permit2 => {
					env.ledger
						.erc20_transfer(leg.token, self.settlement, destination, leg.amount)?;
				}
				TransferCommand::Native => {
					env.ledger.native_transfer(self.settlement, destination, leg.amount)?;
				}
				TransferCommand::NftErc721 => {
					env.ledger.erc721_transfer_from(
						leg.token,
						self.settlement,
						self.settlement,
						destination,
						leg.nft_id,
					)?;
				}
				TransferCommand::NftErc1155 => {
					env.ledger.erc1155_transfer_from(
						leg.token,
						self.settlement,
						self.settlement,
						destination,
						leg.nft_id,
						leg.amount,
					)?;
				}
			}
		}
		Ok(())
	}

	/// Sweeps any fungible surplus left on the custody account after the
	/// push to `recipient`, the solver-excess distribution. Surplus is
	/// never retained by the protocol.
	pub fn sweep_surplus(
		&self,
		env: &mut Environment,
		legs: &[TransferLeg],
		recipient: Address,
	) -> Result<()> {
		for leg in legs {
			match leg.command {
				TransferCommand::SimpleApproval
				| TransferCommand::Permit
				| TransferCommand::Permit2 => {
					let leftover = env.ledger.balance_of(leg.token, self.settlement);
					if !leftover.is_zero() {
						env.ledger
							.erc20_transfer(leg.token, self.settlement, recipient, leftover)?;
					}
				}
				TransferCommand::Native => {
					let leftover = env.ledger.native_balance_of(self.settlement);
					if !leftover.is_zero() {
						env.ledger.native_transfer(self.settlement, recipient, leftover)?;
					}
				}
				TransferCommand::NftErc721 | TransferCommand::NftErc1155 => {}
			}
		}
		Ok(())
	}
}
