//! Shared domain types for the JAM settlement engine.
//!
//! This crate defines the order model, hook interactions, transfer commands,
//! execution parameters, settlement events, the EIP-712 typed-data surface
//! and the error taxonomy used by every other crate in the workspace.

pub mod common;
pub mod config;
pub mod eip712;
pub mod errors;
pub mod events;
pub mod execution;
pub mod interaction;
pub mod order;
pub mod validation;

pub use common::*;
pub use config::*;
pub use eip712::*;
pub use errors::*;
pub use events::*;
pub use execution::*;
pub use interaction::*;
pub use order::*;
pub use validation::*;
