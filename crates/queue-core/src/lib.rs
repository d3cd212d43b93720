//! Core of the order queue system.
//!
//! This module ties the backends together: the lifecycle service creates,
//! serves and cancels orders under a per-shop lock, and the snapshot service
//! answers lock-free queue and position queries from persisted state. A
//! [`QueueSystem`] is assembled from configuration by [`QueueBuilder`].

use queue_catalog::ShopService;
use queue_config::Config;
use queue_types::{
	OrderCreated, OrderId, OrderItemRequest, OrderStatusView, ShopId, ShopQueueSnapshot,
};
use std::sync::Arc;

pub mod builder;
pub mod error;
pub mod lifecycle;
pub mod snapshot;

pub use builder::{BuilderError, QueueBuilder, QueueFactories};
pub use error::{ErrorKind, QueueError};
pub use lifecycle::OrderLifecycleService;
pub use snapshot::QueueSnapshotService;

/// Entry point to the queue operations.
pub struct QueueSystem {
	config: Config,
	lifecycle: Arc<OrderLifecycleService>,
	snapshots: Arc<QueueSnapshotService>,
	shops: Arc<ShopService>,
}

impl QueueSystem {
	pub(crate) fn new(
		config: Config,
		lifecycle: Arc<OrderLifecycleService>,
		snapshots: Arc<QueueSnapshotService>,
		shops: Arc<ShopService>,
	) -> Self {
		Self {
			config,
			lifecycle,
			snapshots,
			shops,
		}
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn lifecycle(&self) -> &Arc<OrderLifecycleService> {
		&self.lifecycle
	}

	pub fn snapshots(&self) -> &Arc<QueueSnapshotService> {
		&self.snapshots
	}

	pub async fn create_order(
		&self,
		shop_id: ShopId,
		items: &[OrderItemRequest],
	) -> Result<OrderCreated, QueueError> {
		self.lifecycle.create_order(shop_id, items).await
	}

	pub async fn serve_order(&self, order_id: OrderId) -> Result<ShopId, QueueError> {
		self.lifecycle.serve_order(order_id).await
	}

	pub async fn cancel_order(&self, order_id: OrderId) -> Result<(), QueueError> {
		self.lifecycle.cancel_order(order_id).await
	}

	pub async fn get_order(&self, order_id: OrderId) -> Result<OrderStatusView, QueueError> {
		self.lifecycle.get_order(order_id).await
	}

	pub async fn get_shop_queue_snapshot(
		&self,
		shop_id: ShopId,
	) -> Result<ShopQueueSnapshot, QueueError> {
		self.snapshots.get_shop_queue_snapshot(shop_id).await
	}

	/// Drops every cached answer about a shop: existence, configuration and
	/// queue snapshot.
	pub fn invalidate_shop(&self, shop_id: ShopId) {
		self.shops.invalidate(shop_id);
		self.snapshots.invalidate(shop_id);
		tracing::debug!(shop_id = %shop_id, "Shop caches invalidated");
	}
}
