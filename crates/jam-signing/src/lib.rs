//! Structured-data signature verification for orders and permits.
//!
//! All order signatures commit to the EIP-712 hash of the order under the
//! `JamSettlement` domain. Externally-owned signers are checked by ECDSA
//! recovery (either over the typed-data hash directly or over its EIP-191
//! `personal_sign` digest); smart-contract signers are checked by forwarding
//! the hash and signature bytes to the wallet's EIP-1271 entry point and
//! comparing the returned magic value. Every failure mode rejects; there are
//! no ambiguous partial results.

pub mod permits;

pub use permits::*;

use alloy_primitives::{Address, Bytes, Signature, B256};
use alloy_sol_types::Eip712Domain;
use jam_state::Environment;
use jam_types::{
	eth_sign_digest, settlement_domain, signing_hash, JamOrder, Result, SettlementConfig,
	SettlementError, ERC1271_MAGIC_VALUE,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How a signature blob is to be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SigningScheme {
	/// ECDSA over the EIP-712 typed-data hash.
	Eip712,
	/// ECDSA over the EIP-191 `personal_sign` digest of the typed-data hash.
	EthSign,
	/// EIP-1271 contract-wallet validation of the typed-data hash.
	Eip1271,
}

impl SigningScheme {
	/// Maps the two signature-scheme bits of a Blend `flags` field.
	pub fn from_bits(bits: u8) -> Result<Self> {
		Ok(match bits {
			0 => Self::Eip712,
			1 => Self::EthSign,
			2 => Self::Eip1271,
			other => {
				return Err(SettlementError::SignatureInvalid(format!(
					"unknown signature scheme bits {other}"
				)))
			}
		})
	}
}

/// A signature blob tagged with its signer kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSignature {
	pub scheme: SigningScheme,
	pub data: Bytes,
}

impl OrderSignature {
	pub fn new(scheme: SigningScheme, data: impl Into<Bytes>) -> Self {
		Self { scheme, data: data.into() }
	}
}

/// Validates order and permit signatures for one engine deployment.
pub struct SignatureVerifier {
	domain: Eip712Domain,
	pub(crate) chain_id: u64,
	/// The settlement contract: spender in every permit this engine applies.
	pub(crate) settlement: Address,
	pub(crate) permit2: Address,
}

impl SignatureVerifier {
	pub fn new(config: &SettlementConfig) -> Self {
		Self {
			domain: settlement_domain(config.chain_id, config.verifying_contract),
			chain_id: config.chain_id,
			settlement: config.verifying_contract,
			permit2: config.permit2,
		}
	}

	/// Domain-separated signing hash of a taker order.
	pub fn order_hash(&self, order: &JamOrder) -> B256 {
		signing_hash(order, &self.domain)
	}

	/// Checks that `signature` is `expected`'s signature over the order.
	pub fn verify_order(
		&self,
		env: &Environment,
		order: &JamOrder,
		signature: &OrderSignature,
	) -> Result<()> {
		self.verify_hash(env, order.taker, self.order_hash(order), signature)
	}

	/// Scheme dispatch over a precomputed typed-data hash. Also used for
	/// Blend maker signatures, which share the same schemes under a
	/// different domain.
	pub fn verify_hash(
		&self,
		env: &Environment,
		expected: Address,
		hash: B256,
		signature: &OrderSignature,
	) -> Result<()> {
		match signature.scheme {
			SigningScheme::Eip712 => {
				let recovered = recover(&signature.data, hash)?;
				if recovered != expected {
					debug!(%recovered, %expected, "order signature recovered wrong signer");
					return Err(SettlementError::SignatureInvalid(format!(
						"recovered {recovered}, expected {expected}"
					)));
				}
				Ok(())
			}
			SigningScheme::EthSign => {
				let recovered = recover(&signature.data, eth_sign_digest(hash))?;
				if recovered != expected {
					return Err(SettlementError::SignatureInvalid(format!(
						"recovered {recovered}, expected {expected}"
					)));
				}
				Ok(())
			}
			SigningScheme::Eip1271 => {
				let wallet = env.wallet(expected).ok_or_else(|| {
					SettlementError::SignatureInvalid(format!(
						"no contract wallet deployed at {expected}"
					))
				})?;
				if wallet.is_valid_signature(hash, &signature.data) != ERC1271_MAGIC_VALUE {
					return Err(SettlementError::SignatureInvalid(
						"EIP-1271 wallet rejected the signature".to_string(),
					));
				}
				Ok(())
			}
		}
	}
}

/// 65-byte r‖s‖v ECDSA recovery over a prehash. Malformed lengths and
/// unrecoverable signatures both reject.
pub(crate) fn recover(data: &[u8], hash: B256) -> Result<Address> {
	let signature = Signature::try_from(data)
		.map_err(|e| SettlementError::SignatureInvalid(format!("malformed signature: {e}")))?;
	signature
		.recover_address_from_prehash(&hash)
		.map_err(|e| SettlementError::SignatureInvalid(format!("recovery failed: {e}")))
}
