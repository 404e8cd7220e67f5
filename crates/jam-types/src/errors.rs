//! The settlement error taxonomy.
//!
//! Every abort path in the engine surfaces one of these variants; nothing is
//! retried internally and no failure is swallowed. A settlement attempt that
//! returns an error has had all of its state effects rolled back.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SettlementError>;

#[derive(Debug, Error)]
pub enum SettlementError {
	/// Bad ECDSA recovery, malformed signature bytes, wrong EIP-1271 magic
	/// value, or a permit witness that does not reproduce the order.
	#[error("invalid signature: {0}")]
	SignatureInvalid(String),

	/// The nonce was already consumed by a settlement or cancelled.
	#[error("nonce already consumed or cancelled")]
	NonceInvalid,

	/// The order or permit deadline has passed.
	#[error("expired at {expired_at}, now {now}")]
	Expired { expired_at: u64, now: u64 },

	/// A designated executor is set and the caller is not it.
	#[error("caller is not the designated executor")]
	UnauthorizedExecutor,

	/// `cur_fill_percent` outside `[min_fill_percent, 10000]`.
	#[error("fill percent {actual} outside [{min}, 10000]")]
	FillBelowMinimum { actual: u16, min: u16 },

	/// A pull or push leg failed: insufficient balance, allowance or
	/// operator approval, or a missing counterparty.
	#[error("transfer failed: {0}")]
	TransferFailed(String),

	/// The supplied hook lists do not hash to the signed commitment.
	#[error("hooks do not match the signed hooks hash")]
	HookMismatch,

	/// A `result_required` interaction reverted or returned false.
	#[error("required interaction against {target} failed")]
	HookCallFailed { target: alloy_primitives::Address },

	/// Direct settlement declared buy amounts below what the taker signed.
	#[error("maker amounts regress below the signed amounts")]
	AmountRegression,

	/// Structurally malformed order: mismatched leg arrays or an unknown
	/// transfer command byte.
	#[error("malformed order: {0}")]
	InvalidOrder(String),

	/// Engine construction or configuration failure.
	#[error("configuration error: {0}")]
	Config(String),
}
