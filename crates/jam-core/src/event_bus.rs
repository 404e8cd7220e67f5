//! Broadcast bus for settlement events.
//!
//! Off-chain indexers subscribe to reconstruct fills; publishing with no
//! subscribers is not an error.

use jam_types::SettlementEvent;
use tokio::sync::broadcast;

pub struct EventBus {
	sender: broadcast::Sender<SettlementEvent>,
}

impl EventBus {
	/// Capacity bounds how many events a slow subscriber may lag behind
	/// before it starts missing events.
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	pub fn subscribe(&self) -> broadcast::Receiver<SettlementEvent> {
		self.sender.subscribe()
	}

	pub fn publish(&self, event: SettlementEvent) {
		// A send error only means nobody is listening right now.
		let _ = self.sender.send(event);
	}
}

impl Clone for EventBus {
	fn clone(&self) -> Self {
		Self { sender: self.sender.clone() }
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_primitives::{Address, U256};

	#[tokio::test]
	async fn subscribers_receive_published_events() {
		let bus = EventBus::new(16);
		let mut rx = bus.subscribe();
		let event = SettlementEvent::NonceCancelled {
			taker: Address::repeat_byte(1),
			nonce: U256::from(5),
		};
		bus.publish(event.clone());
		assert_eq!(rx.recv().await.unwrap(), event);
	}

	#[tokio::test]
	async fn publishing_without_subscribers_is_fine() {
		let bus = EventBus::new(4);
		bus.publish(SettlementEvent::NonceCancelled {
			taker: Address::ZERO,
			nonce: U256::ZERO,
		});
	}
}
