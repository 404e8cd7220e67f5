//! Transactional execution state for the settlement engine.
//!
//! The engine's atomicity guarantee ("revert discards everything") is
//! reproduced here explicitly: all balance state lives in a [`Ledger`] whose
//! snapshot is taken when a settlement attempt starts and restored on any
//! abort. The [`Environment`] wraps the ledger together with the registered
//! external collaborators (interaction targets, contract wallets) and the
//! permit nonce spaces; the [`nonces`] module holds the durable per-taker
//! order-nonce registry.

pub mod environment;
pub mod ledger;
pub mod nonces;

pub use environment::*;
pub use ledger::*;
pub use nonces::*;
