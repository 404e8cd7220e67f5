//! The settlement state machine.
//!
//! A settlement attempt moves `Pending → Verified → Pulled → Executed →
//! Pushed → Finalized`; the first failing check aborts the whole attempt and
//! rolls the environment back to its entry snapshot, so no partially-applied
//! state is ever observable. The nonce is consumed before any external call
//! runs and balance movements are checked only after all external calls
//! return; ordering discipline, not locking, is the reentrancy protection.

use crate::{
	balance::{buy_legs, sell_legs, BalanceManager, TransferLeg},
	event_bus::EventBus,
	hooks::HooksExecutor,
};
use alloy_primitives::{Address, U256};
use jam_signing::{OrderSignature, PermitsInfo, SignatureVerifier};
use jam_state::{Environment, EnvironmentSnapshot, NonceStore};
use jam_types::{
	BatchParams, FillBps, Interaction, JamHooks, JamOrder, MakerParams, PartnerInfo, Result,
	SettlementConfig, SettlementError, SettlementEvent, SolverParams, FULL_FILL_BPS,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Orchestrates verification, fund movement and event emission for one
/// engine deployment.
pub struct SettlementEngine {
	pub(crate) config: SettlementConfig,
	pub(crate) verifier: SignatureVerifier,
	pub(crate) balances: BalanceManager,
	pub(crate) hooks: HooksExecutor,
	pub(crate) nonces: Arc<dyn NonceStore>,
	pub(crate) events: EventBus,
	pub(crate) blend: Option<Arc<dyn crate::blend::BlendProtocol>>,
}

impl SettlementEngine {
	pub fn new(config: SettlementConfig, nonces: Arc<dyn NonceStore>) -> Self {
		let settlement = config.verifying_contract;
		Self {
			verifier: SignatureVerifier::new(&config),
			balances: BalanceManager::new(settlement),
			hooks: HooksExecutor::new(settlement),
			nonces,
			events: EventBus::new(64),
			blend: None,
			config,
		}
	}

	/// Attaches the external Blend maker-liquidity collaborator.
	pub fn with_blend(mut self, protocol: Arc<dyn crate::blend::BlendProtocol>) -> Self {
		self.blend = Some(protocol);
		self
	}

	pub fn subscribe(&self) -> broadcast::Receiver<SettlementEvent> {
		self.events.subscribe()
	}

	/// Domain-separated hash a taker signs for this deployment.
	pub fn order_hash(&self, order: &JamOrder) -> alloy_primitives::B256 {
		self.verifier.order_hash(order)
	}

	// --- entry points ---

	/// Settles one order with solver-supplied execution.
	pub async fn settle(
		&self,
		env: &mut Environment,
		caller: Address,
		order: &JamOrder,
		signature: &OrderSignature,
		interactions: &[Interaction],
		hooks: &JamHooks,
		params: &SolverParams,
	) -> Result<()> {
		self.settle_order(env, caller, order, signature, None, interactions, hooks, params)
			.await
	}

	/// Settles one order, applying signed token permits before the pull.
	pub async fn settle_with_permits(
		&self,
		env: &mut Environment,
		caller: Address,
		order: &JamOrder,
		signature: &OrderSignature,
		permits: &PermitsInfo,
		interactions: &[Interaction],
		hooks: &JamHooks,
		params: &SolverParams,
	) -> Result<()> {
		self.settle_order(env, caller, order, signature, Some(permits), interactions, hooks, params)
			.await
	}

	/// Maker-direct settlement: the caller is the maker, no solver
	/// interactions run, and the maker's own funds pay the buy side,
	/// possibly improved by `increased_buy_amounts` but never worsened.
	pub async fn settle_internal(
		&self,
		env: &mut Environment,
		caller: Address,
		order: &JamOrder,
		signature: &OrderSignature,
		hooks: &JamHooks,
		params: &MakerParams,
	) -> Result<()> {
		let snapshot = env.snapshot();
		let mut consumed = Vec::new();
		match self
			.settle_internal_inner(env, caller, order, signature, hooks, params, &mut consumed)
			.await
		{
			Ok(()) => Ok(()),
			Err(err) => {
				warn!(taker = %order.taker, %err, "maker-direct settlement aborted");
				self.rollback(env, snapshot, consumed).await;
				Err(err)
			}
		}
	}

	/// Settles a list of orders against one combined solver interaction.
	/// Any failing order aborts the entire batch.
	pub async fn settle_batch(
		&self,
		env: &mut Environment,
		caller: Address,
		orders: &[JamOrder],
		signatures: &[OrderSignature],
		interactions: &[Interaction],
		hooks_list: &[JamHooks],
		params: &BatchParams,
	) -> Result<()> {
		let snapshot = env.snapshot();
		let mut consumed = Vec::new();
		match self
			.settle_batch_inner(env, caller, orders, signatures, interactions, hooks_list, params, &mut consumed)
			.await
		{
			Ok(()) => Ok(()),
			Err(err) => {
				warn!(orders = orders.len(), %err, "batch settlement aborted");
				self.rollback(env, snapshot, consumed).await;
				Err(err)
			}
		}
	}

	/// Marks one of the caller's nonces unusable without settling.
	pub async fn cancel_order(&self, caller: Address, nonce: U256) -> Result<()> {
		self.nonces.cancel(caller, nonce).await?;
		info!(taker = %caller, %nonce, "order cancelled");
		self.events.publish(SettlementEvent::NonceCancelled { taker: caller, nonce });
		Ok(())
	}

	/// Pure read: true while the nonce is still unused.
	pub async fn is_nonce_valid(&self, taker: Address, nonce: U256) -> bool {
		self.nonces.is_valid(taker, nonce).await
	}

	// --- shared machinery ---

	pub(crate) async fn rollback(
		&self,
		env: &mut Environment,
		snapshot: EnvironmentSnapshot,
		consumed: Vec<(Address, U256)>,
	) {
		env.restore(snapshot);
		for (taker, nonce) in consumed {
			self.nonces.reinstate(taker, nonce).await;
		}
	}

	/// `Pending → Verified`: structural checks, hooks commitment, expiry,
	/// executor authorization, fill window and the order signature.
	fn verify_order(
		&self,
		env: &Environment,
		caller: Address,
		order: &JamOrder,
		signature: &OrderSignature,
		hooks: &JamHooks,
		fill_bps: FillBps,
	) -> Result<()> {
		order.validate_shape()?;
		HooksExecutor::check_commitment(hooks, order.hooks_hash)?;
		if order.is_expired(env.timestamp) {
			return Err(SettlementError::Expired {
				expired_at: order.expiry.saturating_to::<u64>(),
				now: env.timestamp,
			});
		}
		if order.executor != Address::ZERO
			&& order.executor != caller
			&& order.executor_is_exclusive(env.timestamp)
		{
			return Err(SettlementError::UnauthorizedExecutor);
		}
		if fill_bps < order.min_fill_percent || fill_bps > FULL_FILL_BPS {
			return Err(SettlementError::FillBelowMinimum {
				actual: fill_bps,
				min: order.min_fill_percent,
			});
		}
		self.verifier.verify_order(env, order, signature)?;
		debug!(taker = %order.taker, nonce = %order.nonce, fill_bps, "order verified");
		Ok(())
	}

	async fn consume_nonce(
		&self,
		order: &JamOrder,
		consumed: &mut Vec<(Address, U256)>,
	) -> Result<()> {
		self.nonces.consume(order.taker, order.nonce).await?;
		consumed.push((order.taker, order.nonce));
		Ok(())
	}

	/// Splits scaled buy legs into the taker's net legs and the partner's
	/// fee legs. NFT legs never carry fees.
	fn apply_partner_fee(
		&self,
		order: &JamOrder,
		legs: Vec<TransferLeg>,
	) -> (Vec<TransferLeg>, Vec<TransferLeg>, Address) {
		let info = PartnerInfo::unpack(order.partner_info);
		let fee_bps = info.total_fee_bps();
		if fee_bps == 0 || order.partner_info.is_zero() {
			return (legs, Vec::new(), Address::ZERO);
		}
		let mut net = Vec::with_capacity(legs.len());
		let mut fees = Vec::new();
		for mut leg in legs {
			if !leg.command.is_nft() {
				let fee = leg.amount * U256::from(fee_bps) / U256::from(FULL_FILL_BPS);
				if !fee.is_zero() {
					let mut fee_leg = leg.clone();
					fee_leg.amount = fee;
					fees.push(fee_leg);
					leg.amount -= fee;
				}
			}
			net.push(leg);
		}
		(net, fees, info.partner)
	}

	fn credit_attached_value(
		&self,
		env: &mut Environment,
		caller: Address,
		value: U256,
	) -> Result<()> {
		env.ledger
			.native_transfer(caller, self.config.verifying_contract, value)
	}

	fn publish_settled(&self, order: &JamOrder, sell: &[TransferLeg], buy: &[TransferLeg], fill_bps: FillBps) {
		self.events.publish(SettlementEvent::Settled {
			taker: order.taker,
			receiver: order.receiver,
			nonce: order.nonce,
			sell_tokens: sell.iter().map(|l| l.token).collect(),
			sell_amounts: sell.iter().map(|l| l.amount).collect(),
			buy_tokens: buy.iter().map(|l| l.token).collect(),
			buy_amounts: buy.iter().map(|l| l.amount).collect(),
			fill_percent: fill_bps,
		});
	}

	#[allow(clippy::too_many_arguments)]
	async fn settle_order(
		&self,
		env: &mut Environment,
		caller: Address,
		order: &JamOrder,
		signature: &OrderSignature,
		permits: Option<&PermitsInfo>,
		interactions: &[Interaction],
		hooks: &JamHooks,
		params: &SolverParams,
	) -> Result<()> {
		let snapshot = env.snapshot();
		let mut consumed = Vec::new();
		match self
			.settle_order_inner(env, caller, order, signature, permits, interactions, hooks, params, &mut consumed)
			.await
		{
			Ok(()) => Ok(()),
			Err(err) => {
				warn!(taker = %order.taker, nonce = %order.nonce, %err, "settlement aborted");
				self.rollback(env, snapshot, consumed).await;
				Err(err)
			}
		}
	}

	#[allow(clippy::too_many_arguments)]
	async fn settle_order_inner(
		&self,
		env: &mut Environment,
		caller: Address,
		order: &JamOrder,
		signature: &OrderSignature,
		permits: Option<&PermitsInfo>,
		interactions: &[Interaction],
		hooks: &JamHooks,
		params: &SolverParams,
		consumed: &mut Vec<(Address, U256)>,
	) -> Result<()> {
		let fill_bps = params.cur_fill_percent;
		self.verify_order(env, caller, order, signature, hooks, fill_bps)?;
		self.consume_nonce(order, consumed).await?;
		self.credit_attached_value(env, caller, params.attached_value)?;
		if let Some(permits) = permits {
			self.verifier.apply_permits(env, order, permits)?;
		}

		// Verified → Pulled
		self.hooks.execute(env, &hooks.before_settle)?;
		let sells = sell_legs(order, fill_bps)?;
		self.balances.pull(env, order.taker, &sells, params.balance_recipient)?;

		// Pulled → Executed
		self.hooks.execute(env, interactions)?;

		// Executed → Pushed
		let buys = buy_legs(order, fill_bps)?;
		let (net, fees, partner) = self.apply_partner_fee(order, buys);
		self.balances.push(env, &net, order.receiver)?;
		if !fees.is_empty() {
			self.balances.push(env, &fees, partner)?;
		}
		self.balances.sweep_surplus(env, &net, caller)?;

		// Pushed → Finalized
		self.hooks.execute(env, &hooks.after_settle)?;
		self.publish_settled(order, &sells, &net, fill_bps);
		info!(taker = %order.taker, nonce = %order.nonce, fill_bps, "settlement finalized");
		Ok(())
	}

	#[allow(clippy::too_many_arguments)]
	async fn settle_internal_inner(
		&self,
		env: &mut Environment,
		caller: Address,
		order: &JamOrder,
		signature: &OrderSignature,
		hooks: &JamHooks,
		params: &MakerParams,
		consumed: &mut Vec<(Address, U256)>,
	) -> Result<()> {
		let fill_bps = params.cur_fill_percent;
		self.verify_order(env, caller, order, signature, hooks, fill_bps)?;
		self.consume_nonce(order, consumed).await?;
		self.credit_attached_value(env, caller, params.attached_value)?;

		self.hooks.execute(env, &hooks.before_settle)?;
		// The maker is its own balance recipient: the sold funds go straight
		// to the caller.
		let sells = sell_legs(order, fill_bps)?;
		self.balances.pull(env, order.taker, &sells, caller)?;

		// No solver interactions in direct settlement: the maker's own call
		// is the execution. The maker may only improve the taker's amounts.
		let mut buys = buy_legs(order, fill_bps)?;
		if !params.increased_buy_amounts.is_empty() {
			if params.increased_buy_amounts.len() != buys.len() {
				return Err(SettlementError::InvalidOrder(
					"increased_buy_amounts length does not match buy legs".to_string(),
				));
			}
			for (leg, increased) in buys.iter_mut().zip(&params.increased_buy_amounts) {
				if *increased < leg.amount {
					return Err(SettlementError::AmountRegression);
				}
				leg.amount = *increased;
			}
		}
		let (net, fees, partner) = self.apply_partner_fee(order, buys);
		// Buy legs come out of the maker's own balance, pulled against the
		// maker's allowance rather than passing through custody.
		self.balances.pull(env, caller, &net, order.receiver)?;
		if !fees.is_empty() {
			self.balances.pull(env, caller, &fees, partner)?;
		}

		self.hooks.execute(env, &hooks.after_settle)?;
		self.publish_settled(order, &sells, &net, fill_bps);
		info!(taker = %order.taker, maker = %caller, "maker-direct settlement finalized");
		Ok(())
	}

	#[allow(clippy::too_many_arguments)]
	async fn settle_batch_inner(
		&self,
		env: &mut Environment,
		caller: Address,
		orders: &[JamOrder],
		signatures: &[OrderSignature],
		interactions: &[Interaction],
		hooks_list: &[JamHooks],
		params: &BatchParams,
		consumed: &mut Vec<(Address, U256)>,
	) -> Result<()> {
		if orders.len() != signatures.len() || orders.len() != hooks_list.len() {
			return Err(SettlementError::InvalidOrder(
				"batch orders, signatures and hooks lists must line up".to_string(),
			));
		}
		if !params.fill_percents.is_empty() && params.fill_percents.len() != orders.len() {
			return Err(SettlementError::InvalidOrder(
				"batch fill percents must be empty or one per order".to_string(),
			));
		}
		self.credit_attached_value(env, caller, params.attached_value)?;

		// Verify and pull every order before the combined execution; the
		// first failure aborts the whole batch.
		let mut all_sells = Vec::with_capacity(orders.len());
		for (i, (order, signature)) in orders.iter().zip(signatures).enumerate() {
			let fill_bps = params.fill_percent(i);
			self.verify_order(env, caller, order, signature, &hooks_list[i], fill_bps)?;
			self.consume_nonce(order, consumed).await?;
			self.hooks.execute(env, &hooks_list[i].before_settle)?;
			let sells = sell_legs(order, fill_bps)?;
			self.balances.pull(env, order.taker, &sells, params.balance_recipient)?;
			all_sells.push(sells);
		}

		// One combined solver interaction for the whole batch.
		self.hooks.execute(env, interactions)?;

		// Fan the output back out per order. Every push must land before any
		// surplus is swept, or one order's sweep could strip a later order's
		// buy tokens from custody.
		let mut all_nets: Vec<Vec<TransferLeg>> = Vec::with_capacity(orders.len());
		for (i, order) in orders.iter().enumerate() {
			let buys = buy_legs(order, params.fill_percent(i))?;
			let (net, fees, partner) = self.apply_partner_fee(order, buys);
			self.balances.push(env, &net, order.receiver)?;
			if !fees.is_empty() {
				self.balances.push(env, &fees, partner)?;
			}
			all_nets.push(net);
		}
		for net in &all_nets {
			self.balances.sweep_surplus(env, net, caller)?;
		}
		for (i, order) in orders.iter().enumerate() {
			self.hooks.execute(env, &hooks_list[i].after_settle)?;
			self.publish_settled(order, &all_sells[i], &all_nets[i], params.fill_percent(i));
		}
		info!(orders = orders.len(), "batch settlement finalized");
		Ok(())
	}
}
