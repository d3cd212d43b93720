//! In-memory order store.
//!
//! Keeps every order in a map guarded by one read-write lock, so a save and a
//! rank query never interleave. Nothing survives a restart.

use crate::{rank_within_queue, sort_by_sequence, OrderStoreInterface, StorageError};
use async_trait::async_trait;
use queue_types::{
	ConfigSchema, ImplementationRegistry, Order, OrderId, OrderStatus, Schema, ShopId,
	ValidationError,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct MemoryState {
	orders: HashMap<OrderId, Order>,
	last_sequence: u64,
}

impl MemoryState {
	fn by_shop_and_status(&self, shop_id: ShopId, status: OrderStatus) -> Vec<Order> {
		let mut orders: Vec<Order> = self
			.orders
			.values()
			.filter(|o| o.shop_id() == shop_id && o.status() == status)
			.cloned()
			.collect();
		sort_by_sequence(&mut orders);
		orders
	}
}

/// In-memory order store.
pub struct MemoryOrderStore {
	state: Arc<RwLock<MemoryState>>,
}

impl MemoryOrderStore {
	/// Creates a new, empty MemoryOrderStore.
	pub fn new() -> Self {
		Self {
			state: Arc::new(RwLock::new(MemoryState::default())),
		}
	}
}

impl Default for MemoryOrderStore {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl OrderStoreInterface for MemoryOrderStore {
	async fn save(&self, order: &Order) -> Result<Order, StorageError> {
		let mut state = self.state.write().await;

		let mut stored = order.clone();
		match state.orders.get(&order.id()).and_then(Order::sequence) {
			Some(existing) => stored.record_sequence(existing),
			None if stored.sequence().is_none() => {
				state.last_sequence += 1;
				stored.record_sequence(state.last_sequence);
			},
			None => {},
		}
		if let Some(sequence) = stored.sequence() {
			state.last_sequence = state.last_sequence.max(sequence);
		}

		state.orders.insert(stored.id(), stored.clone());
		Ok(stored)
	}

	async fn find_by_id(&self, order_id: OrderId) -> Result<Option<Order>, StorageError> {
		let state = self.state.read().await;
		Ok(state.orders.get(&order_id).cloned())
	}

	async fn find_by_shop_and_status(
		&self,
		shop_id: ShopId,
		status: OrderStatus,
	) -> Result<Vec<Order>, StorageError> {
		let state = self.state.read().await;
		Ok(state.by_shop_and_status(shop_id, status))
	}

	async fn find_rank_in_queue(&self, order_id: OrderId) -> Result<Option<usize>, StorageError> {
		let state = self.state.read().await;
		let Some(order) = state.orders.get(&order_id) else {
			return Ok(None);
		};
		let Some(queue_number) = order.queue_number().filter(|_| order.is_waiting()) else {
			return Ok(None);
		};

		let waiting = state.by_shop_and_status(order.shop_id(), OrderStatus::Waiting);
		Ok(rank_within_queue(&waiting, queue_number, order_id))
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryOrderStoreSchema)
	}
}

/// Configuration schema for MemoryOrderStore.
pub struct MemoryOrderStoreSchema;

impl ConfigSchema for MemoryOrderStoreSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).validate(config)
	}
}

/// Factory function to create a memory order store from configuration.
///
/// Configuration parameters:
/// - None required for memory storage
pub fn create_storage(_config: &toml::Value) -> Result<Box<dyn OrderStoreInterface>, StorageError> {
	Ok(Box::new(MemoryOrderStore::new()))
}

/// Registry for the memory storage implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = crate::StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl crate::StorageRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use queue_types::{MenuItemId, OrderItem};
	use rust_decimal::Decimal;
	use uuid::Uuid;

	fn new_order(shop_id: ShopId, queue_number: u32) -> Order {
		let item = OrderItem::new(MenuItemId(Uuid::new_v4()), 1, Decimal::from(3)).unwrap();
		let mut order = Order::create_new(shop_id, vec![item]).unwrap();
		order.assign_queue(queue_number).unwrap();
		order
	}

	#[tokio::test]
	async fn test_save_assigns_increasing_sequence() {
		let store = MemoryOrderStore::new();
		let shop = ShopId(Uuid::new_v4());

		let first = store.save(&new_order(shop, 1)).await.unwrap();
		let second = store.save(&new_order(shop, 1)).await.unwrap();
		assert!(first.sequence().unwrap() < second.sequence().unwrap());

		// Re-saving keeps the original sequence.
		let mut updated = first.clone();
		updated.mark_as_served().unwrap();
		let resaved = store.save(&updated).await.unwrap();
		assert_eq!(resaved.sequence(), first.sequence());
		assert_eq!(
			store.find_by_id(first.id()).await.unwrap().unwrap().status(),
			OrderStatus::Served
		);
	}

	#[tokio::test]
	async fn test_find_by_shop_and_status_filters_and_orders() {
		let store = MemoryOrderStore::new();
		let shop = ShopId(Uuid::new_v4());
		let other_shop = ShopId(Uuid::new_v4());

		let a = store.save(&new_order(shop, 2)).await.unwrap();
		let b = store.save(&new_order(shop, 1)).await.unwrap();
		store.save(&new_order(other_shop, 1)).await.unwrap();
		let mut c = store.save(&new_order(shop, 1)).await.unwrap();
		c.mark_as_canceled().unwrap();
		store.save(&c).await.unwrap();

		let waiting = store
			.find_by_shop_and_status(shop, OrderStatus::Waiting)
			.await
			.unwrap();
		let ids: Vec<_> = waiting.iter().map(Order::id).collect();
		assert_eq!(ids, vec![a.id(), b.id()]);

		let canceled = store
			.find_by_shop_and_status(shop, OrderStatus::Canceled)
			.await
			.unwrap();
		assert_eq!(canceled.len(), 1);
	}

	#[tokio::test]
	async fn test_rank_in_queue() {
		let store = MemoryOrderStore::new();
		let shop = ShopId(Uuid::new_v4());

		let first = store.save(&new_order(shop, 1)).await.unwrap();
		let other_queue = store.save(&new_order(shop, 2)).await.unwrap();
		let second = store.save(&new_order(shop, 1)).await.unwrap();

		assert_eq!(store.find_rank_in_queue(first.id()).await.unwrap(), Some(1));
		assert_eq!(store.find_rank_in_queue(second.id()).await.unwrap(), Some(2));
		assert_eq!(
			store.find_rank_in_queue(other_queue.id()).await.unwrap(),
			Some(1)
		);

		let mut served = first.clone();
		served.mark_as_served().unwrap();
		store.save(&served).await.unwrap();

		assert_eq!(store.find_rank_in_queue(first.id()).await.unwrap(), None);
		assert_eq!(store.find_rank_in_queue(second.id()).await.unwrap(), Some(1));
		assert_eq!(
			store.find_rank_in_queue(OrderId::generate()).await.unwrap(),
			None
		);
	}
}
