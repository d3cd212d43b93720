//! Queue snapshots and live positions.
//!
//! Reads never take the shop lock. A snapshot is built from one read of the
//! shop's waiting orders, and a live position from one rank query, so both
//! reflect a single consistent storage read even while writers are active.

use crate::QueueError;
use queue_cache::TtlCache;
use queue_catalog::ShopService;
use queue_storage::OrderStore;
use queue_types::{
	Order, QueueInfo, QueueOrderSummary, ShopConfiguration, ShopId, ShopQueueSnapshot,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Computes queue snapshots and live positions from persisted orders.
pub struct QueueSnapshotService {
	store: Arc<OrderStore>,
	shops: Arc<ShopService>,
	cache: TtlCache<ShopId, ShopQueueSnapshot>,
}

impl QueueSnapshotService {
	pub fn new(store: Arc<OrderStore>, shops: Arc<ShopService>, snapshot_ttl: Duration) -> Self {
		Self {
			store,
			shops,
			cache: TtlCache::new("queue-snapshot", snapshot_ttl),
		}
	}

	/// Current queues of a shop, served from cache while fresh.
	#[instrument(skip(self), fields(shop_id = %shop_id))]
	pub async fn get_shop_queue_snapshot(
		&self,
		shop_id: ShopId,
	) -> Result<ShopQueueSnapshot, QueueError> {
		self.cache
			.get_or_try_insert_with(&shop_id, || self.compute_snapshot(shop_id))
			.await
	}

	async fn compute_snapshot(&self, shop_id: ShopId) -> Result<ShopQueueSnapshot, QueueError> {
		if !self.shops.exists(shop_id).await? {
			return Err(QueueError::ShopNotFound(shop_id));
		}
		let config = self.shops.get_config(shop_id).await?;
		let waiting = self.store.waiting_orders(shop_id).await?;

		let snapshot = build_snapshot(&config, &waiting)?;
		tracing::debug!(
			queues = snapshot.queues.len(),
			waiting = snapshot.waiting_count(),
			"Computed queue snapshot"
		);
		Ok(snapshot)
	}

	/// 1-based rank of a waiting order in its queue, 0 for finished orders.
	///
	/// A waiting order without a queue breaks the persistence invariant and
	/// is reported as [`QueueError::Inconsistent`].
	pub async fn get_live_position(&self, order: &Order) -> Result<usize, QueueError> {
		if !order.is_waiting() {
			return Ok(0);
		}
		if order.queue_number().is_none() {
			tracing::error!(order_id = %order.id(), "Waiting order has no queue number");
			return Err(QueueError::Inconsistent(format!(
				"waiting order {} has no queue number",
				order.id()
			)));
		}

		// The order may have been served or canceled since it was read.
		Ok(self.store.rank_in_queue(order.id()).await?.unwrap_or(0))
	}

	/// Drops the cached snapshot of a shop. Called after every mutation.
	pub fn invalidate(&self, shop_id: ShopId) {
		self.cache.invalidate(&shop_id);
	}
}

/// Groups waiting orders by queue and ranks them in the given order.
///
/// Every configured queue is reported, empty ones included. A queue that
/// still holds orders but is missing from the configuration is reported
/// with no capacity.
pub fn build_snapshot(
	config: &ShopConfiguration,
	waiting: &[Order],
) -> Result<ShopQueueSnapshot, QueueError> {
	let mut queues: BTreeMap<u32, Vec<&Order>> = config
		.queue_capacities
		.keys()
		.map(|&queue_number| (queue_number, Vec::new()))
		.collect();

	for order in waiting.iter().filter(|o| o.is_waiting()) {
		let queue_number = order.queue_number().ok_or_else(|| {
			tracing::error!(order_id = %order.id(), "Waiting order has no queue number");
			QueueError::Inconsistent(format!("waiting order {} has no queue number", order.id()))
		})?;
		queues.entry(queue_number).or_default().push(order);
	}

	let queues = queues
		.into_iter()
		.map(|(queue_number, orders)| QueueInfo {
			queue_number,
			size: orders.len(),
			max_size: config.capacity_of(queue_number),
			orders: orders
				.iter()
				.enumerate()
				.map(|(index, order)| QueueOrderSummary {
					order_id: order.id(),
					position: index + 1,
				})
				.collect(),
		})
		.collect();

	Ok(ShopQueueSnapshot {
		shop_id: config.shop_id,
		queues,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use queue_types::{MenuItemId, OrderItem, Uuid};
	use rust_decimal::Decimal;

	fn config(capacities: &[(u32, u32)]) -> ShopConfiguration {
		ShopConfiguration {
			shop_id: ShopId(Uuid::new_v4()),
			queue_strategy: "MOST_AVAILABLE".to_string(),
			queue_capacities: capacities.iter().copied().collect(),
		}
	}

	fn waiting(shop_id: ShopId, queue_number: Option<u32>) -> Order {
		let item = OrderItem::new(MenuItemId(Uuid::new_v4()), 1, Decimal::ONE).unwrap();
		let mut order = Order::create_new(shop_id, vec![item]).unwrap();
		if let Some(queue_number) = queue_number {
			order.assign_queue(queue_number).unwrap();
		}
		order
	}

	#[test]
	fn test_snapshot_ranks_in_given_order() {
		let config = config(&[(1, 3), (2, 3)]);
		let orders = vec![
			waiting(config.shop_id, Some(2)),
			waiting(config.shop_id, Some(1)),
			waiting(config.shop_id, Some(2)),
		];

		let snapshot = build_snapshot(&config, &orders).unwrap();
		let queue_two = snapshot.queue(2).unwrap();

		assert_eq!(queue_two.size, 2);
		assert_eq!(queue_two.max_size, Some(3));
		assert_eq!(queue_two.orders[0].order_id, orders[0].id());
		assert_eq!(queue_two.orders[1].order_id, orders[2].id());
		assert_eq!(queue_two.orders[1].position, 2);
		assert_eq!(snapshot.queue(1).unwrap().orders[0].position, 1);
	}

	#[test]
	fn test_empty_and_unconfigured_queues_are_reported() {
		let config = config(&[(3, 2), (1, 2)]);
		let orders = vec![waiting(config.shop_id, Some(9))];

		let snapshot = build_snapshot(&config, &orders).unwrap();
		let numbers: Vec<u32> = snapshot.queues.iter().map(|q| q.queue_number).collect();

		assert_eq!(numbers, vec![1, 3, 9]);
		assert_eq!(snapshot.queue(1).unwrap().size, 0);
		assert_eq!(snapshot.queue(9).unwrap().max_size, None);
		assert_eq!(snapshot.waiting_count(), 1);
	}

	#[test]
	fn test_waiting_order_without_queue_fails_loudly() {
		let config = config(&[(1, 2)]);
		let orders = vec![waiting(config.shop_id, None)];

		assert!(matches!(
			build_snapshot(&config, &orders),
			Err(QueueError::Inconsistent(_))
		));
	}
}
