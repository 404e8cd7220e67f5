//! The JAM settlement engine.
//!
//! Orchestrates the full settlement protocol: order validation, taker fund
//! pull, solver-interaction execution, buy-side fund push, partial-fill
//! accounting, solver-excess distribution and event emission, with
//! single-order, batch and maker-direct modes plus an adapter for the
//! external Blend maker-liquidity protocol. Every entry point is atomic: the
//! first violated invariant rolls back all state effects of the attempt.

pub mod balance;
pub mod blend;
pub mod engine;
pub mod event_bus;
pub mod hooks;

pub use balance::*;
pub use blend::*;
pub use engine::*;
pub use event_bus::*;
pub use hooks::*;
