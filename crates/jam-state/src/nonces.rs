//! The per-taker order-nonce registry.
//!
//! A nonce is unused until a settlement consumes it or the taker cancels it;
//! once spent it never becomes usable again. Consumption happens before any
//! external call during a settlement, so a failed attempt reinstates the
//! nonce as part of the engine's rollback; outside that window nothing ever
//! moves a nonce back to unused.

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use dashmap::DashMap;
use jam_types::{Result, SettlementError};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::PathBuf};
use tokio::{fs, sync::Mutex};
use tracing::error;

/// Terminal state of a spent nonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NonceState {
	Consumed,
	Cancelled,
}

#[async_trait]
pub trait NonceStore: Send + Sync {
	/// Marks a nonce consumed by a settlement. Fails with `NonceInvalid` if
	/// it was already consumed or cancelled.
	async fn consume(&self, taker: Address, nonce: U256) -> Result<()>;

	/// Marks a nonce unusable without it ever settling. Idempotent toward
	/// denial: cancelling an already-spent nonce fails, it never re-enables.
	async fn cancel(&self, taker: Address, nonce: U256) -> Result<()>;

	/// Pure read: true while the nonce is still unused.
	async fn is_valid(&self, taker: Address, nonce: U256) -> bool;

	/// Rollback hook for the journal: undoes a `consume` performed by the
	/// settlement attempt that is currently aborting. Never reinstates a
	/// cancelled nonce.
	async fn reinstate(&self, taker: Address, nonce: U256);
}

/// Dashmap-backed store for a single-process engine.
#[derive(Default)]
pub struct MemoryNonceStore {
	spent: DashMap<(Address, U256), NonceState>,
}

impl MemoryNonceStore {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl NonceStore for MemoryNonceStore {
	async fn consume(&self, taker: Address, nonce: U256) -> Result<()> {
		match self.spent.entry((taker, nonce)) {
			dashmap::mapref::entry::Entry::Occupied(_) => Err(SettlementError::NonceInvalid),
			dashmap::mapref::entry::Entry::Vacant(entry) => {
				entry.insert(NonceState::Consumed);
				Ok(())
			}
		}
	}

	async fn cancel(&self, taker: Address, nonce: U256) -> Result<()> {
		match self.spent.entry((taker, nonce)) {
			dashmap::mapref::entry::Entry::Occupied(_) => Err(SettlementError::NonceInvalid),
			dashmap::mapref::entry::Entry::Vacant(entry) => {
				entry.insert(NonceState::Cancelled);
				Ok(())
			}
		}
	}

	async fn is_valid(&self, taker: Address, nonce: U256) -> bool {
		!self.spent.contains_key(&(taker, nonce))
	}

	async fn reinstate(&self, taker: Address, nonce: U256) {
		if let Some(state) = self.spent.get(&(taker, nonce)).map(|e| *e.value()) {
			if state == NonceState::Consumed {
				self.spent.remove(&(taker, nonce));
			}
		}
	}
}

/// File-backed store: one JSON document per taker, written atomically via a
/// temp file so a crash never leaves a half-written nonce table.
pub struct FileNonceStore {
	base_path: PathBuf,
	// Serializes read-modify-write cycles across concurrent settlements.
	write_lock: Mutex<()>,
}

type NonceTable = HashMap<String, NonceState>;

impl FileNonceStore {
	pub fn new(base_path: PathBuf) -> Self {
		Self {
			base_path,
			write_lock: Mutex::new(()),
		}
	}

	fn taker_path(&self, taker: Address) -> PathBuf {
		self.base_path.join(format!("{taker}.json"))
	}

	async fn load(&self, taker: Address) -> NonceTable {
		match fs::read(self.taker_path(taker)).await {
			Ok(raw) => serde_json::from_slice(&raw).unwrap_or_default(),
			Err(_) => NonceTable::new(),
		}
	}

	async fn persist(&self, taker: Address, table: &NonceTable) -> Result<()> {
		let io_err = |e: std::io::Error| SettlementError::Config(format!("nonce store: {e}"));
		let path = self.taker_path(taker);
		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent).await.map_err(io_err)?;
		}
		let raw = serde_json::to_vec(table)
			.map_err(|e| SettlementError::Config(format!("nonce store: {e}")))?;
		let tmp = path.with_extension("tmp");
		fs::write(&tmp, raw).await.map_err(io_err)?;
		fs::rename(&tmp, &path).await.map_err(io_err)?;
		Ok(())
	}

	async fn mark(&self, taker: Address, nonce: U256, state: NonceState) -> Result<()> {
		let _guard = self.write_lock.lock().await;
		let mut table = self.load(taker).await;
		let key = nonce.to_string();
		if table.contains_key(&key) {
			return Err(SettlementError::NonceInvalid);
		}
		table.insert(key, state);
		self.persist(taker, &table).await
	}
}

#[async_trait]
impl NonceStore for FileNonceStore {
	async fn consume(&self, taker: Address, nonce: U256) -> Result<()> {
		self.mark(taker, nonce, NonceState::Consumed).await
	}

	async fn cancel(&self, taker: Address, nonce: U256) -> Result<()> {
		self.mark(taker, nonce, NonceState::Cancelled).await
	}

	async fn is_valid(&self, taker: Address, nonce: U256) -> bool {
		!self.load(taker).await.contains_key(&nonce.to_string())
	}

	async fn reinstate(&self, taker: Address, nonce: U256) {
		let _guard = self.write_lock.lock().await;
		let mut table = self.load(taker).await;
		if table.get(&nonce.to_string()) == Some(&NonceState::Consumed) {
			table.remove(&nonce.to_string());
			// Rollback has no error channel; a failed write leaves the nonce
			// spent on disk and must at least be observable.
			if let Err(err) = self.persist(taker, &table).await {
				error!(%taker, %nonce, %err, "failed to persist nonce reinstatement");
			}
		}
	}
}
