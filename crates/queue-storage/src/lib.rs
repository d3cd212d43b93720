//! Order storage for the queue system.
//!
//! This module provides the persistence abstraction for orders, with
//! in-memory and file-based backends. Storage owns the order sequence: the
//! first save of an order stamps it with a strictly increasing number, and
//! every ranking inside a queue follows that number.

use async_trait::async_trait;
use queue_types::{ConfigSchema, ImplementationRegistry, Order, OrderId, OrderStatus, ShopId};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod file;
	pub mod memory;
}

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	/// Error that occurs during serialization/deserialization.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// Error that occurs in the storage backend.
	#[error("Backend error: {0}")]
	Backend(String),
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Trait defining the interface for order storage backends.
///
/// Implementations must make a single `save` atomic with respect to
/// concurrent readers: a reader sees either the old or the new version of an
/// order, never a mix.
#[async_trait]
pub trait OrderStoreInterface: Send + Sync {
	/// Inserts or replaces an order and returns the stored version.
	///
	/// An order saved for the first time is assigned the next sequence
	/// number; later saves keep the recorded one.
	async fn save(&self, order: &Order) -> Result<Order, StorageError>;

	/// Looks up an order by id.
	async fn find_by_id(&self, order_id: OrderId) -> Result<Option<Order>, StorageError>;

	/// Returns the orders of a shop in the given status, in sequence order.
	async fn find_by_shop_and_status(
		&self,
		shop_id: ShopId,
		status: OrderStatus,
	) -> Result<Vec<Order>, StorageError>;

	/// Returns the 1-based rank of a waiting order within its queue.
	///
	/// `None` when the order does not exist, is not waiting, or has no
	/// queue. Backends that can answer from one consistent read should
	/// override this.
	async fn find_rank_in_queue(&self, order_id: OrderId) -> Result<Option<usize>, StorageError> {
		let Some(order) = self.find_by_id(order_id).await? else {
			return Ok(None);
		};
		let Some(queue_number) = order.queue_number().filter(|_| order.is_waiting()) else {
			return Ok(None);
		};

		let waiting = self
			.find_by_shop_and_status(order.shop_id(), OrderStatus::Waiting)
			.await?;
		Ok(rank_within_queue(&waiting, queue_number, order_id))
	}

	/// Returns the configuration schema for validation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;
}

/// Ranks `order_id` among the orders of `queue_number`, which must already be
/// in sequence order.
pub fn rank_within_queue(orders: &[Order], queue_number: u32, order_id: OrderId) -> Option<usize> {
	orders
		.iter()
		.filter(|o| o.queue_number() == Some(queue_number))
		.position(|o| o.id() == order_id)
		.map(|index| index + 1)
}

/// Sorts orders by storage sequence. Orders without a sequence sort last.
pub(crate) fn sort_by_sequence(orders: &mut [Order]) {
	orders.sort_by_key(|o| (o.sequence().unwrap_or(u64::MAX), o.created_at()));
}

/// Type alias for storage factory functions.
pub type StorageFactory = fn(&toml::Value) -> Result<Box<dyn OrderStoreInterface>, StorageError>;

/// Registry trait for storage implementations.
pub trait StorageRegistry: ImplementationRegistry<Factory = StorageFactory> {}

/// Get all registered storage implementations.
///
/// Returns a vector of (name, factory) tuples for all available storage implementations.
pub fn get_all_implementations() -> Vec<(&'static str, StorageFactory)> {
	use implementations::{file, memory};

	vec![
		(file::Registry::NAME, file::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

/// High-level order store used by the lifecycle and snapshot services.
pub struct OrderStore {
	/// The underlying storage backend implementation.
	backend: Box<dyn OrderStoreInterface>,
}

impl OrderStore {
	/// Creates a new OrderStore with the specified backend.
	pub fn new(backend: Box<dyn OrderStoreInterface>) -> Self {
		Self { backend }
	}

	/// Persists an order, returning the stored version with its sequence.
	pub async fn save(&self, order: &Order) -> Result<Order, StorageError> {
		let stored = self.backend.save(order).await?;
		tracing::debug!(
			order_id = %stored.id(),
			status = %stored.status(),
			sequence = ?stored.sequence(),
			"Order saved"
		);
		Ok(stored)
	}

	/// Looks up an order by id.
	pub async fn find(&self, order_id: OrderId) -> Result<Option<Order>, StorageError> {
		self.backend.find_by_id(order_id).await
	}

	/// Waiting orders of a shop across all queues, in sequence order.
	pub async fn waiting_orders(&self, shop_id: ShopId) -> Result<Vec<Order>, StorageError> {
		self.backend
			.find_by_shop_and_status(shop_id, OrderStatus::Waiting)
			.await
	}

	/// 1-based rank of a waiting order in its queue.
	pub async fn rank_in_queue(&self, order_id: OrderId) -> Result<Option<usize>, StorageError> {
		self.backend.find_rank_in_queue(order_id).await
	}
}
