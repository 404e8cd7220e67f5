//! Ordered execution of hook interactions and solver interactions.
//!
//! The hash of the exact hook lists actually run must equal the order's
//! signed `hooks_hash`; that check is the linchpin letting a taker authorize
//! arbitrary side-effecting calls without knowing which solver will execute
//! them. The check itself lives in the engine; this module only runs lists
//! that have already been bound.

use alloy_primitives::Address;
use jam_state::Environment;
use jam_types::{Interaction, JamHooks, Result, SettlementError};
use tracing::debug;

pub struct HooksExecutor {
	/// All interaction calls originate from the settlement contract.
	settlement: Address,
}

impl HooksExecutor {
	pub fn new(settlement: Address) -> Self {
		Self { settlement }
	}

	/// Runs one ordered interaction list. A failing call aborts only when
	/// the interaction declares `result_required`; attached value is
	/// forwarded either way.
	pub fn execute(&self, env: &mut Environment, interactions: &[Interaction]) -> Result<()> {
		for interaction in interactions {
			let ok = env.call(
				self.settlement,
				interaction.to,
				interaction.value,
				&interaction.data,
			)?;
			if !ok && interaction.result_required {
				debug!(target = %interaction.to, "required interaction failed");
				return Err(SettlementError::HookCallFailed { target: interaction.to });
			}
		}
		Ok(())
	}

	/// Asserts the supplied hooks reproduce the signed commitment.
	pub fn check_commitment(hooks: &JamHooks, signed_hash: alloy_primitives::B256) -> Result<()> {
		if hooks.commitment() != signed_hash {
			return Err(SettlementError::HookMismatch);
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_primitives::{Bytes, U256};
	use jam_state::{CallContext, ContractHandler};
	use std::sync::{
		atomic::{AtomicUsize, Ordering},
		Arc,
	};

	struct Counter(AtomicUsize);

	impl ContractHandler for Counter {
		fn call(&self, _ctx: CallContext<'_>, data: &[u8]) -> bool {
			self.0.fetch_add(1, Ordering::SeqCst);
			data != [0xff]
		}
	}

	fn interaction(to: Address, data: Vec<u8>, required: bool) -> Interaction {
		Interaction {
			to,
			value: U256::ZERO,
			data: Bytes::from(data),
			result_required: required,
		}
	}

	#[test]
	fn optional_failure_does_not_abort() {
		let settlement = Address::repeat_byte(0x99);
		let target = Address::repeat_byte(1);
		let counter = Arc::new(Counter(AtomicUsize::new(0)));
		let mut env = Environment::new();
		env.register_contract(target, counter.clone());

		let executor = HooksExecutor::new(settlement);
		executor
			.execute(
				&mut env,
				&[
					interaction(target, vec![0xff], false),
					interaction(target, vec![0x01], true),
				],
			)
			.unwrap();
		assert_eq!(counter.0.load(Ordering::SeqCst), 2);
	}

	#[test]
	fn required_failure_aborts_with_target() {
		let settlement = Address::repeat_byte(0x99);
		let target = Address::repeat_byte(1);
		let mut env = Environment::new();
		env.register_contract(target, Arc::new(Counter(AtomicUsize::new(0))));

		let executor = HooksExecutor::new(settlement);
		let err = executor
			.execute(&mut env, &[interaction(target, vec![0xff], true)])
			.unwrap_err();
		assert!(matches!(err, SettlementError::HookCallFailed { target: t } if t == target));
	}

	#[test]
	fn commitment_mismatch_is_rejected() {
		let hooks = JamHooks::default();
		assert!(HooksExecutor::check_commitment(&hooks, hooks.commitment()).is_ok());
		assert!(matches!(
			HooksExecutor::check_commitment(&hooks, alloy_primitives::B256::ZERO),
			Err(SettlementError::HookMismatch)
		));
	}
}
