//! Adapter for the external Blend maker-liquidity protocol.
//!
//! Blend orders are maker-signed structs settled by an external contract the
//! engine only calls; this module decodes the ABI-encoded order variants,
//! verifies the maker signature under the Blend domain, translates the pull
//! legs, forwards to the external settlement entry point and then asserts by
//! balance delta that the taker received at least the more favorable of the
//! live and old-quote amounts.

use crate::{balance::TransferLeg, engine::SettlementEngine};
use alloy_primitives::{Address, U256};
use alloy_sol_types::{sol, SolValue};
use async_trait::async_trait;
use jam_signing::{OrderSignature, SigningScheme};
use jam_state::Environment;
use jam_types::{
	blend_domain, parse_transfer_commands, signing_hash, BlendFlags, JamHooks, Result,
	SettlementError, SettlementEvent,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};

sol! {
	/// One maker, one token pair.
	#[derive(Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
	struct BlendSingleOrder {
		uint256 expiry;
		address taker_address;
		address maker_address;
		uint256 maker_nonce;
		address taker_token;
		address maker_token;
		uint256 taker_amount;
		uint256 maker_amount;
		address receiver;
		uint256 packed_commands;
		uint256 flags;
	}

	/// One maker, many tokens on either side.
	#[derive(Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
	struct BlendMultiOrder {
		uint256 expiry;
		address taker_address;
		address maker_address;
		uint256 maker_nonce;
		address[] taker_tokens;
		address[] maker_tokens;
		uint256[] taker_amounts;
		uint256[] maker_amounts;
		address receiver;
		bytes commands;
		uint256 flags;
	}

	/// Many makers, each with their own token lists and nonce.
	#[derive(Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
	struct BlendAggregateOrder {
		uint256 expiry;
		address taker_address;
		address[] maker_addresses;
		uint256[] maker_nonces;
		address[][] taker_tokens;
		address[][] maker_tokens;
		uint256[][] taker_amounts;
		uint256[][] maker_amounts;
		address receiver;
		bytes commands;
		uint256 flags;
	}

	/// A previously signed, possibly more favorable quote. When
	/// `use_old_amount` is set the taker is guaranteed the better of the
	/// old and live maker amounts, leg by leg.
	#[derive(Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
	struct BlendOldQuote {
		bool use_old_amount;
		uint256[] maker_amounts;
	}
}

/// Which Blend order variant an encoded payload carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlendOrderKind {
	Single,
	Multi,
	Aggregate,
}

/// The external Blend settlement contract, injected as a collaborator. The
/// engine pulls the taker's funds to the contract first; the implementation
/// is expected to deliver the maker amounts to the receiver.
#[async_trait]
pub trait BlendProtocol: Send + Sync {
	async fn settle_single(
		&self,
		env: &mut Environment,
		taker: Address,
		order: &BlendSingleOrder,
	) -> Result<()>;

	async fn settle_multi(
		&self,
		env: &mut Environment,
		taker: Address,
		order: &BlendMultiOrder,
	) -> Result<()>;

	async fn settle_aggregate(
		&self,
		env: &mut Environment,
		taker: Address,
		order: &BlendAggregateOrder,
	) -> Result<()>;
}

fn decode_err(e: alloy_sol_types::Error) -> SettlementError {
	SettlementError::InvalidOrder(format!("blend payload: {e}"))
}

/// Decodes the optional hook lists attached to a Blend settlement. The
/// taker supplies these in their own call, so no hash commitment applies.
fn decode_hooks(encoded: &[u8]) -> Result<JamHooks> {
	if encoded.is_empty() {
		return Ok(JamHooks::default());
	}
	JamHooks::abi_decode(encoded).map_err(decode_err)
}

/// Taker-side transfer legs of a decoded Blend order, command byte per leg.
fn taker_legs(tokens: &[Address], amounts: &[U256], commands: &[u8]) -> Result<Vec<TransferLeg>> {
	if tokens.len() != amounts.len() || tokens.len() != commands.len() {
		return Err(SettlementError::InvalidOrder(
			"blend taker legs mismatched".to_string(),
		));
	}
	let commands = parse_transfer_commands(commands)?;
	Ok(tokens
		.iter()
		.zip(amounts)
		.zip(commands)
		.map(|((token, amount), command)| TransferLeg {
			token: *token,
			amount: *amount,
			nft_id: U256::ZERO,
			command,
		})
		.collect())
}

/// Expected receiver deltas per maker token, taking the better of live and
/// old-quote amounts when an override is present.
fn expected_totals(
	tokens: &[Address],
	live: &[U256],
	quote: &BlendOldQuote,
) -> Result<HashMap<Address, U256>> {
	if quote.use_old_amount && quote.maker_amounts.len() != live.len() {
		return Err(SettlementError::InvalidOrder(
			"old quote amounts do not match maker legs".to_string(),
		));
	}
	let mut totals = HashMap::new();
	for (i, token) in tokens.iter().enumerate() {
		let amount = if quote.use_old_amount {
			live[i].max(quote.maker_amounts[i])
		} else {
			live[i]
		};
		*totals.entry(*token).or_insert(U256::ZERO) += amount;
	}
	Ok(totals)
}

struct BlendCommon {
	flags: BlendFlags,
	scheme: SigningScheme,
	receiver: Address,
}

impl SettlementEngine {
	/// Settles a Blend order on the taker's behalf. The caller must be the
	/// taker named in the order; the maker's signature and nonce are
	/// checked here, with the same atomic rollback as every other mode.
	pub async fn settle_bebop_blend(
		&self,
		env: &mut Environment,
		caller: Address,
		taker: Address,
		kind: BlendOrderKind,
		encoded_order: &[u8],
		encoded_hooks: &[u8],
	) -> Result<()> {
		let snapshot = env.snapshot();
		let mut consumed = Vec::new();
		let result = self
			.settle_blend_inner(env, caller, taker, kind, encoded_order, encoded_hooks, &mut consumed)
			.await;
		match result {
			Ok(()) => Ok(()),
			Err(err) => {
				warn!(%taker, ?kind, %err, "blend settlement aborted");
				self.rollback(env, snapshot, consumed).await;
				Err(err)
			}
		}
	}

	fn blend_protocol(&self) -> Result<std::sync::Arc<dyn BlendProtocol>> {
		self.blend
			.clone()
			.ok_or_else(|| SettlementError::Config("no blend protocol attached".to_string()))
	}

	fn blend_common(
		&self,
		env: &Environment,
		caller: Address,
		taker: Address,
		order_taker: Address,
		expiry: U256,
		receiver: Address,
		flags: U256,
	) -> Result<BlendCommon> {
		if caller != taker || order_taker != taker {
			return Err(SettlementError::UnauthorizedExecutor);
		}
		if expiry < U256::from(env.timestamp) {
			return Err(SettlementError::Expired {
				expired_at: expiry.saturating_to::<u64>(),
				now: env.timestamp,
			});
		}
		let flags = BlendFlags::unpack(flags);
		Ok(BlendCommon {
			scheme: SigningScheme::from_bits(flags.signature_scheme)?,
			flags,
			receiver: if receiver == Address::ZERO { taker } else { receiver },
		})
	}

	/// Asserts each expected maker token reached the receiver, comparing
	/// balances before and after the external call.
	fn check_deltas(
		env: &Environment,
		receiver: Address,
		before: &HashMap<Address, U256>,
		expected: &HashMap<Address, U256>,
	) -> Result<()> {
		for (token, minimum) in expected {
			let delta = env
				.ledger
				.balance_of(*token, receiver)
				.saturating_sub(before.get(token).copied().unwrap_or_default());
			if delta < *minimum {
				return Err(SettlementError::AmountRegression);
			}
		}
		Ok(())
	}

	#[allow(clippy::too_many_arguments)]
	async fn settle_blend_inner(
		&self,
		env: &mut Environment,
		caller: Address,
		taker: Address,
		kind: BlendOrderKind,
		encoded_order: &[u8],
		encoded_hooks: &[u8],
		consumed: &mut Vec<(Address, U256)>,
	) -> Result<()> {
		let protocol = self.blend_protocol()?;
		let hooks = decode_hooks(encoded_hooks)?;
		let domain = blend_domain(self.config.chain_id, self.config.blend);

		match kind {
			BlendOrderKind::Single => {
				let (order, maker_sig, quote) =
					<(BlendSingleOrder, alloy_primitives::Bytes, BlendOldQuote)>::abi_decode(
						encoded_order,
					)
					.map_err(decode_err)?;
				let common = self.blend_common(
					env,
					caller,
					taker,
					order.taker_address,
					order.expiry,
					order.receiver,
					order.flags,
				)?;
				self.verifier.verify_hash(
					env,
					order.maker_address,
					signing_hash(&order, &domain),
					&OrderSignature::new(common.scheme, maker_sig.clone()),
				)?;
				self.nonces.consume(order.maker_address, order.maker_nonce).await?;
				consumed.push((order.maker_address, order.maker_nonce));

				self.hooks.execute(env, &hooks.before_settle)?;
				// Low byte of packed_commands selects the taker transfer method.
				let command = [(order.packed_commands & U256::from(0xffu8)).to::<u8>()];
				let legs = taker_legs(
					&[order.taker_token],
					&[order.taker_amount],
					&command,
				)?;
				self.balances.pull(env, taker, &legs, self.config.blend)?;

				let expected = expected_totals(
					&[order.maker_token],
					&[order.maker_amount],
					&quote,
				)?;
				let before = balances_before(env, common.receiver, &expected);
				protocol.settle_single(env, taker, &order).await?;
				Self::check_deltas(env, common.receiver, &before, &expected)?;

				self.hooks.execute(env, &hooks.after_settle)?;
				self.events.publish(SettlementEvent::BlendSingleFill {
					event_id: common.flags.event_id,
					taker,
					maker: order.maker_address,
					taker_token: order.taker_token,
					maker_token: order.maker_token,
					taker_amount: order.taker_amount,
					maker_amount: order.maker_amount,
				});
				info!(%taker, maker = %order.maker_address, "blend single fill");
			}
			BlendOrderKind::Multi => {
				let (order, maker_sig, quote) =
					<(BlendMultiOrder, alloy_primitives::Bytes, BlendOldQuote)>::abi_decode(
						encoded_order,
					)
					.map_err(decode_err)?;
				let common = self.blend_common(
					env,
					caller,
					taker,
					order.taker_address,
					order.expiry,
					order.receiver,
					order.flags,
				)?;
				self.verifier.verify_hash(
					env,
					order.maker_address,
					signing_hash(&order, &domain),
					&OrderSignature::new(common.scheme, maker_sig.clone()),
				)?;
				self.nonces.consume(order.maker_address, order.maker_nonce).await?;
				consumed.push((order.maker_address, order.maker_nonce));

				self.hooks.execute(env, &hooks.before_settle)?;
				let legs = taker_legs(&order.taker_tokens, &order.taker_amounts, &order.commands)?;
				self.balances.pull(env, taker, &legs, self.config.blend)?;

				let expected = expected_totals(&order.maker_tokens, &order.maker_amounts, &quote)?;
				let before = balances_before(env, common.receiver, &expected);
				protocol.settle_multi(env, taker, &order).await?;
				Self::check_deltas(env, common.receiver, &before, &expected)?;

				self.hooks.execute(env, &hooks.after_settle)?;
				self.events.publish(SettlementEvent::BlendMultiFill {
					event_id: common.flags.event_id,
					taker,
					maker: order.maker_address,
					taker_tokens: order.taker_tokens.clone(),
					maker_tokens: order.maker_tokens.clone(),
					taker_amounts: order.taker_amounts.clone(),
					maker_amounts: order.maker_amounts.clone(),
				});
				info!(%taker, maker = %order.maker_address, "blend multi fill");
			}
			BlendOrderKind::Aggregate => {
				let (order, maker_sigs, quote) =
					<(BlendAggregateOrder, Vec<alloy_primitives::Bytes>, BlendOldQuote)>::abi_decode(
						encoded_order,
					)
					.map_err(decode_err)?;
				let common = self.blend_common(
					env,
					caller,
					taker,
					order.taker_address,
					order.expiry,
					order.receiver,
					order.flags,
				)?;
				if maker_sigs.len() != order.maker_addresses.len()
					|| order.maker_nonces.len() != order.maker_addresses.len()
				{
					return Err(SettlementError::InvalidOrder(
						"aggregate maker arrays mismatched".to_string(),
					));
				}
				// Every maker signs the full aggregate order.
				let hash = signing_hash(&order, &domain);
				for (maker, sig) in order.maker_addresses.iter().zip(&maker_sigs) {
					self.verifier.verify_hash(
						env,
						*maker,
						hash,
						&OrderSignature::new(common.scheme, sig.clone()),
					)?;
				}
				for (maker, nonce) in order.maker_addresses.iter().zip(&order.maker_nonces) {
					self.nonces.consume(*maker, *nonce).await?;
					consumed.push((*maker, *nonce));
				}

				self.hooks.execute(env, &hooks.before_settle)?;
				let flat_tokens: Vec<Address> =
					order.taker_tokens.iter().flatten().copied().collect();
				let flat_amounts: Vec<U256> =
					order.taker_amounts.iter().flatten().copied().collect();
				let legs = taker_legs(&flat_tokens, &flat_amounts, &order.commands)?;
				self.balances.pull(env, taker, &legs, self.config.blend)?;

				let maker_tokens: Vec<Address> =
					order.maker_tokens.iter().flatten().copied().collect();
				let live: Vec<U256> = order.maker_amounts.iter().flatten().copied().collect();
				let expected = expected_totals(&maker_tokens, &live, &quote)?;
				let before = balances_before(env, common.receiver, &expected);
				protocol.settle_aggregate(env, taker, &order).await?;
				Self::check_deltas(env, common.receiver, &before, &expected)?;

				self.hooks.execute(env, &hooks.after_settle)?;
				self.events.publish(SettlementEvent::BlendAggregateFill {
					event_id: common.flags.event_id,
					taker,
					taker_tokens: flat_tokens,
					maker_tokens,
					taker_amounts: flat_amounts,
					maker_amounts: live,
				});
				info!(%taker, makers = order.maker_addresses.len(), "blend aggregate fill");
			}
		}
		Ok(())
	}
}

fn balances_before(
	env: &Environment,
	receiver: Address,
	expected: &HashMap<Address, U256>,
) -> HashMap<Address, U256> {
	expected
		.keys()
		.map(|token| (*token, env.ledger.balance_of(*token, receiver)))
		.collect()
}
