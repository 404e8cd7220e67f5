//! EIP-712 typed-data surface: signing domains, permit structs and hashes.
//!
//! Any change to a signed field layout changes its typehash, so cross-version
//! replay is prevented by construction; the domain version below must be
//! bumped whenever the `JamOrder` schema changes.

use alloy_primitives::{keccak256, Address, FixedBytes, B256, U256};
use alloy_sol_types::{sol, Eip712Domain, SolStruct};
use serde::{Deserialize, Serialize};

/// Signing-domain name for taker orders.
pub const JAM_DOMAIN_NAME: &str = "JamSettlement";
/// Signing-domain version, bumped on any signed-schema change.
pub const JAM_DOMAIN_VERSION: &str = "2";

/// Magic value a contract wallet must return to accept a signature
/// (EIP-1271 `isValidSignature` selector).
pub const ERC1271_MAGIC_VALUE: FixedBytes<4> = FixedBytes([0x16, 0x26, 0xba, 0x7e]);

sol! {
	/// EIP-2612 permit message.
	#[derive(Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
	struct Permit {
		address owner;
		address spender;
		uint256 value;
		uint256 nonce;
		uint256 deadline;
	}

	/// DAI-style permit message: grants an unlimited allowance while
	/// `allowed` is true instead of carrying a value.
	#[derive(Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
	struct DaiPermit {
		address holder;
		address spender;
		uint256 nonce;
		uint256 expiry;
		bool allowed;
	}

	/// A single token allowance inside a Permit2 batch permit.
	#[derive(Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
	struct TokenPermissions {
		address token;
		uint256 amount;
	}

	/// Permit2 batch permit with a witness binding the allowance grant to
	/// the EIP-712 struct hash of the exact order being settled. A permit
	/// signed for one order cannot authorize a modified order.
	#[derive(Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
	struct PermitBatchWitnessTransferFrom {
		TokenPermissions[] permitted;
		address spender;
		uint256 nonce;
		uint256 deadline;
		bytes32 witness;
	}
}

/// The settlement engine's own signing domain.
pub fn settlement_domain(chain_id: u64, verifying_contract: Address) -> Eip712Domain {
	Eip712Domain::new(
		Some(JAM_DOMAIN_NAME.into()),
		Some(JAM_DOMAIN_VERSION.into()),
		Some(U256::from(chain_id)),
		Some(verifying_contract),
		None,
	)
}

/// Permit domain of an in-model ERC-20 token.
pub fn token_permit_domain(chain_id: u64, token: Address) -> Eip712Domain {
	Eip712Domain::new(
		Some("Permit".into()),
		Some("1".into()),
		Some(U256::from(chain_id)),
		Some(token),
		None,
	)
}

/// The canonical Permit2 domain (name only, no version).
pub fn permit2_domain(chain_id: u64, permit2: Address) -> Eip712Domain {
	Eip712Domain::new(
		Some("Permit2".into()),
		None,
		Some(U256::from(chain_id)),
		Some(permit2),
		None,
	)
}

/// Domain of the external Blend maker-liquidity contract.
pub fn blend_domain(chain_id: u64, blend: Address) -> Eip712Domain {
	Eip712Domain::new(
		Some("BebopBlend".into()),
		Some("1".into()),
		Some(U256::from(chain_id)),
		Some(blend),
		None,
	)
}

/// Domain-separated signing hash of any typed struct.
pub fn signing_hash<S: SolStruct>(value: &S, domain: &Eip712Domain) -> B256 {
	value.eip712_signing_hash(domain)
}

/// Bare struct hash (no domain separator), used as the Permit2 witness.
pub fn struct_hash<S: SolStruct>(value: &S) -> B256 {
	value.eip712_hash_struct()
}

/// EIP-191 `personal_sign` digest over a 32-byte hash.
pub fn eth_sign_digest(hash: B256) -> B256 {
	let mut buf = Vec::with_capacity(60);
	buf.extend_from_slice(b"\x19Ethereum Signed Message:\n32");
	buf.extend_from_slice(hash.as_slice());
	keccak256(buf)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::order::JamOrder;
	use alloy_primitives::address;

	#[test]
	fn order_hash_changes_with_domain_version() {
		let order = JamOrder::default();
		let contract = address!("0000000000000000000000000000000000000999");
		let v2 = settlement_domain(1, contract);
		let other = Eip712Domain::new(
			Some(JAM_DOMAIN_NAME.into()),
			Some("3".into()),
			Some(U256::from(1u64)),
			Some(contract),
			None,
		);
		assert_ne!(signing_hash(&order, &v2), signing_hash(&order, &other));
	}

	#[test]
	fn order_hash_changes_with_chain_id() {
		let order = JamOrder::default();
		let contract = address!("0000000000000000000000000000000000000999");
		assert_ne!(
			signing_hash(&order, &settlement_domain(1, contract)),
			signing_hash(&order, &settlement_domain(137, contract)),
		);
	}

	#[test]
	fn struct_hash_ignores_domain() {
		let order = JamOrder::default();
		assert_eq!(struct_hash(&order), struct_hash(&order));
		assert_ne!(
			struct_hash(&order),
			signing_hash(&order, &settlement_domain(1, Address::ZERO))
		);
	}

	#[test]
	fn eth_sign_digest_is_prefixed() {
		let hash = B256::repeat_byte(0x11);
		assert_ne!(eth_sign_digest(hash), hash);
	}
}
