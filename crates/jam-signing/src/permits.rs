//! Token-transfer permit verification.
//!
//! Two families are supported: single-token legacy permits (EIP-2612 and the
//! DAI `allowed` variant) validated against the token's permit domain, and a
//! Permit2 batch permit whose witness is the EIP-712 struct hash of the order
//! being settled: the allowance grant cannot be replayed against any other
//! order, because a modified order produces a different witness and the
//! recovery no longer yields the taker.

use crate::{recover, SignatureVerifier};
use alloy_primitives::{Bytes, U256};
use jam_state::Environment;
use jam_types::{
	permit2_domain, signing_hash, struct_hash, token_permit_domain, DaiPermit, JamOrder, Permit,
	PermitBatchWitnessTransferFrom, Result, SettlementError, TokenPermissions, TransferCommand,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A single-token permit for one sell leg.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPermit {
	pub token: alloy_primitives::Address,
	pub kind: TokenPermitKind,
	pub deadline: U256,
	/// 65-byte r‖s‖v signature by the token owner.
	pub signature: Bytes,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TokenPermitKind {
	/// EIP-2612: grants exactly `value` to the settlement contract.
	Eip2612 { value: U256 },
	/// DAI-style `allowed` permit: grants an unlimited allowance.
	DaiAllowed,
}

/// A Permit2 batch permit covering every Permit2-command sell leg at once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Permit2Batch {
	/// Unordered Permit2 nonce, usable once per owner.
	pub nonce: U256,
	pub deadline: U256,
	pub signature: Bytes,
}

/// The permit payload accepted by `settle_with_permits`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PermitsInfo {
	TokenPermits(Vec<TokenPermit>),
	Permit2(Permit2Batch),
}

impl SignatureVerifier {
	/// Verifies the supplied permits against the order's taker and applies
	/// the resulting allowances to the environment. Runs before the
	/// sell-side pull; any rejection aborts the settlement.
	pub fn apply_permits(
		&self,
		env: &mut Environment,
		order: &JamOrder,
		permits: &PermitsInfo,
	) -> Result<()> {
		match permits {
			PermitsInfo::TokenPermits(list) => {
				for permit in list {
					self.apply_token_permit(env, order, permit)?;
				}
				Ok(())
			}
			PermitsInfo::Permit2(batch) => self.apply_permit2_batch(env, order, batch),
		}
	}

	fn check_deadline(&self, env: &Environment, deadline: U256) -> Result<()> {
		if deadline < U256::from(env.timestamp) {
			return Err(SettlementError::Expired {
				expired_at: deadline.saturating_to::<u64>(),
				now: env.timestamp,
			});
		}
		Ok(())
	}

	fn apply_token_permit(
		&self,
		env: &mut Environment,
		order: &JamOrder,
		permit: &TokenPermit,
	) -> Result<()> {
		self.check_deadline(env, permit.deadline)?;
		let owner = order.taker;
		let domain = token_permit_domain(self.chain_id, permit.token);
		let nonce = env.permit_nonce(permit.token, owner);

		let (hash, granted) = match permit.kind {
			TokenPermitKind::Eip2612 { value } => {
				let message = Permit {
					owner,
					spender: self.settlement,
					value,
					nonce,
					deadline: permit.deadline,
				};
				(signing_hash(&message, &domain), value)
			}
			TokenPermitKind::DaiAllowed => {
				let message = DaiPermit {
					holder: owner,
					spender: self.settlement,
					nonce,
					expiry: permit.deadline,
					allowed: true,
				};
				(signing_hash(&message, &domain), U256::MAX)
			}
		};

		let recovered = recover(&permit.signature, hash)?;
		if recovered != owner {
			return Err(SettlementError::SignatureInvalid(format!(
				"permit for {} recovered {recovered}, expected {owner}",
				permit.token
			)));
		}

		env.advance_permit_nonce(permit.token, owner);
		env.ledger.approve(permit.token, owner, self.settlement, granted);
		debug!(token = %permit.token, %owner, %granted, "applied token permit");
		Ok(())
	}

	/// The permitted list is derived from the order itself: every sell leg
	/// with the Permit2 command, at its full signed amount. The witness is
	/// the order's struct hash, so the signature reproduces the order
	/// bit-for-bit or fails recovery.
	fn apply_permit2_batch(
		&self,
		env: &mut Environment,
		order: &JamOrder,
		batch: &Permit2Batch,
	) -> Result<()> {
		self.check_deadline(env, batch.deadline)?;
		let owner = order.taker;
		if env.permit2_nonce_used(owner, batch.nonce) {
			return Err(SettlementError::NonceInvalid);
		}

		let permitted = permit2_legs(order)?;
		if permitted.is_empty() {
			return Err(SettlementError::InvalidOrder(
				"permit2 batch supplied but no sell leg uses the Permit2 command".to_string(),
			));
		}
		let message = PermitBatchWitnessTransferFrom {
			permitted: permitted.clone(),
			spender: self.settlement,
			nonce: batch.nonce,
			deadline: batch.deadline,
			witness: struct_hash(order),
		};
		let hash = signing_hash(&message, &permit2_domain(self.chain_id, self.permit2));
		let recovered = recover(&batch.signature, hash)?;
		if recovered != owner {
			return Err(SettlementError::SignatureInvalid(format!(
				"permit2 batch recovered {recovered}, expected {owner}"
			)));
		}

		env.mark_permit2_nonce(owner, batch.nonce);
		for leg in &permitted {
			env.ledger.approve_permit2(leg.token, owner, self.settlement, leg.amount);
		}
		debug!(%owner, legs = permitted.len(), "applied permit2 batch");
		Ok(())
	}
}

/// Sell legs transferred through Permit2, in order-leg order.
pub fn permit2_legs(order: &JamOrder) -> Result<Vec<TokenPermissions>> {
	let commands = order.sell_commands()?;
	Ok(commands
		.iter()
		.zip(order.sell_tokens.iter().zip(order.sell_amounts.iter()))
		.filter(|(command, _)| **command == TransferCommand::Permit2)
		.map(|(_, (token, amount))| TokenPermissions { token: *token, amount: *amount })
		.collect())
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_primitives::{Address, Bytes as AlloyBytes};
	use alloy_signer::SignerSync;
	use alloy_signer_local::PrivateKeySigner;
	use jam_types::SettlementConfig;

	fn config() -> SettlementConfig {
		SettlementConfig {
			chain_id: 1,
			verifying_contract: Address::repeat_byte(0x99),
			permit2: Address::repeat_byte(0x22),
			blend: Address::ZERO,
		}
	}

	fn permit2_order(taker: Address) -> JamOrder {
		JamOrder {
			taker,
			receiver: taker,
			expiry: U256::from(1_000u64),
			sell_tokens: vec![Address::repeat_byte(0x0a)],
			sell_amounts: vec![U256::from(500)],
			buy_tokens: vec![Address::repeat_byte(0x0b)],
			buy_amounts: vec![U256::from(100)],
			min_fill_percent: 10_000,
			sell_token_transfers: AlloyBytes::from(vec![TransferCommand::Permit2.to_byte()]),
			buy_token_transfers: AlloyBytes::from(vec![TransferCommand::SimpleApproval.to_byte()]),
			..Default::default()
		}
	}

	fn sign_permit2(
		signer: &PrivateKeySigner,
		verifier: &SignatureVerifier,
		order: &JamOrder,
		nonce: U256,
		deadline: U256,
	) -> Permit2Batch {
		let message = PermitBatchWitnessTransferFrom {
			permitted: permit2_legs(order).unwrap(),
			spender: verifier.settlement,
			nonce,
			deadline,
			witness: struct_hash(order),
		};
		let hash = signing_hash(&message, &permit2_domain(verifier.chain_id, verifier.permit2));
		let sig = signer.sign_hash_sync(&hash).unwrap();
		Permit2Batch { nonce, deadline, signature: sig.as_bytes().to_vec().into() }
	}

	#[test]
	fn eip2612_permit_grants_allowance() {
		let signer = PrivateKeySigner::random();
		let verifier = SignatureVerifier::new(&config());
		let mut env = Environment::new();
		let order = permit2_order(signer.address());
		let token = order.sell_tokens[0];

		let deadline = U256::from(100u64);
		let message = Permit {
			owner: signer.address(),
			spender: verifier.settlement,
			value: U256::from(500),
			nonce: U256::ZERO,
			deadline,
		};
		let hash = signing_hash(&message, &token_permit_domain(1, token));
		let sig = signer.sign_hash_sync(&hash).unwrap();
		let permits = PermitsInfo::TokenPermits(vec![TokenPermit {
			token,
			kind: TokenPermitKind::Eip2612 { value: U256::from(500) },
			deadline,
			signature: sig.as_bytes().to_vec().into(),
		}]);

		verifier.apply_permits(&mut env, &order, &permits).unwrap();
		assert_eq!(
			env.ledger.allowance(token, signer.address(), verifier.settlement),
			U256::from(500)
		);
		// The permit nonce advanced, so the same permit cannot be replayed.
		assert!(verifier.apply_permits(&mut env, &order, &permits).is_err());
	}

	#[test]
	fn dai_permit_grants_unlimited_allowance() {
		let signer = PrivateKeySigner::random();
		let verifier = SignatureVerifier::new(&config());
		let mut env = Environment::new();
		let order = permit2_order(signer.address());
		let token = order.sell_tokens[0];

		let deadline = U256::from(100u64);
		let message = DaiPermit {
			holder: signer.address(),
			spender: verifier.settlement,
			nonce: U256::ZERO,
			expiry: deadline,
			allowed: true,
		};
		let hash = signing_hash(&message, &token_permit_domain(1, token));
		let sig = signer.sign_hash_sync(&hash).unwrap();
		let permits = PermitsInfo::TokenPermits(vec![TokenPermit {
			token,
			kind: TokenPermitKind::DaiAllowed,
			deadline,
			signature: sig.as_bytes().to_vec().into(),
		}]);

		verifier.apply_permits(&mut env, &order, &permits).unwrap();
		assert_eq!(
			env.ledger.allowance(token, signer.address(), verifier.settlement),
			U256::MAX
		);
	}

	#[test]
	fn expired_permit_rejected() {
		let signer = PrivateKeySigner::random();
		let verifier = SignatureVerifier::new(&config());
		let mut env = Environment::new();
		env.timestamp = 200;
		let order = permit2_order(signer.address());
		let batch = sign_permit2(&signer, &verifier, &order, U256::from(1), U256::from(100));
		assert!(matches!(
			verifier.apply_permits(&mut env, &order, &PermitsInfo::Permit2(batch)),
			Err(SettlementError::Expired { .. })
		));
	}

	#[test]
	fn permit2_batch_grants_and_burns_nonce() {
		let signer = PrivateKeySigner::random();
		let verifier = SignatureVerifier::new(&config());
		let mut env = Environment::new();
		let order = permit2_order(signer.address());
		let token = order.sell_tokens[0];

		let batch = sign_permit2(&signer, &verifier, &order, U256::from(1), U256::from(100));
		let permits = PermitsInfo::Permit2(batch);
		verifier.apply_permits(&mut env, &order, &permits).unwrap();
		assert_eq!(
			env.ledger.permit2_allowance(token, signer.address(), verifier.settlement),
			U256::from(500)
		);
		assert!(matches!(
			verifier.apply_permits(&mut env, &order, &permits),
			Err(SettlementError::NonceInvalid)
		));
	}

	#[test]
	fn permit2_witness_binds_to_the_exact_order() {
		let signer = PrivateKeySigner::random();
		let verifier = SignatureVerifier::new(&config());
		let mut env = Environment::new();
		let order = permit2_order(signer.address());
		let batch = sign_permit2(&signer, &verifier, &order, U256::from(1), U256::from(100));

		// Same legs, different buy amount: the witness no longer matches.
		let mut modified = order.clone();
		modified.buy_amounts[0] = U256::from(99);
		assert!(matches!(
			verifier.apply_permits(&mut env, &modified, &PermitsInfo::Permit2(batch)),
			Err(SettlementError::SignatureInvalid(_))
		));
	}
}
