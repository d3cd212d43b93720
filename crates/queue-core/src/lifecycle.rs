//! Order lifecycle: creation with queue assignment, serving and canceling.
//!
//! Every mutation of a shop's queues runs under that shop's lock. Creation
//! reads the waiting orders, picks a queue and persists inside one hold, so
//! two concurrent creations can never both take the last free place.

use crate::snapshot::QueueSnapshotService;
use crate::QueueError;
use queue_assignment::QueueAssignmentEngine;
use queue_catalog::{MenuService, ShopService};
use queue_lock::LockService;
use queue_storage::OrderStore;
use queue_types::{
	Order, OrderCreated, OrderId, OrderItem, OrderItemRequest, OrderStatus, OrderStatusView, ShopId,
};
use std::sync::{Arc, OnceLock};
use tracing::instrument;

/// Terminal transitions of a waiting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Completion {
	Serve,
	Cancel,
}

impl Completion {
	fn apply(self, order: &mut Order) -> Result<(), QueueError> {
		match self {
			Completion::Serve => order.mark_as_served()?,
			Completion::Cancel => order.mark_as_canceled()?,
		}
		Ok(())
	}

	fn target(self) -> OrderStatus {
		match self {
			Completion::Serve => OrderStatus::Served,
			Completion::Cancel => OrderStatus::Canceled,
		}
	}
}

/// Creates, serves and cancels orders.
pub struct OrderLifecycleService {
	store: Arc<OrderStore>,
	shops: Arc<ShopService>,
	menu: Arc<MenuService>,
	locks: Arc<LockService>,
	engine: QueueAssignmentEngine,
	snapshots: Arc<QueueSnapshotService>,
}

impl OrderLifecycleService {
	pub fn new(
		store: Arc<OrderStore>,
		shops: Arc<ShopService>,
		menu: Arc<MenuService>,
		locks: Arc<LockService>,
		engine: QueueAssignmentEngine,
		snapshots: Arc<QueueSnapshotService>,
	) -> Self {
		Self {
			store,
			shops,
			menu,
			locks,
			engine,
			snapshots,
		}
	}

	/// Places an order and assigns it to a queue.
	///
	/// Prices come from the shop's menu, never from the request. Menu and
	/// item validation happen before the lock is taken.
	#[instrument(skip(self, requests), fields(shop_id = %shop_id, items = requests.len()))]
	pub async fn create_order(
		&self,
		shop_id: ShopId,
		requests: &[OrderItemRequest],
	) -> Result<OrderCreated, QueueError> {
		if !self.shops.exists(shop_id).await? {
			return Err(QueueError::ShopNotFound(shop_id));
		}

		let menu = self.menu.available_items(shop_id).await?;
		let items = requests
			.iter()
			.map(|request| -> Result<OrderItem, QueueError> {
				let menu_item = menu
					.get(&request.menu_item_id)
					.ok_or(QueueError::MenuItemNotFound(request.menu_item_id))?;
				Ok(OrderItem::new(
					request.menu_item_id,
					request.quantity,
					menu_item.price,
				)?)
			})
			.collect::<Result<Vec<_>, QueueError>>()?;

		let mut order = Order::create_new(shop_id, items)?;
		let config = self.shops.get_config(shop_id).await?;

		let store = &self.store;
		let engine = &self.engine;
		let persisted = OnceLock::new();
		let written = &persisted;
		let outcome = self
			.locks
			.with_shop_lock(shop_id, |guard| async move {
				let waiting = store.waiting_orders(shop_id).await?;
				let assignment = engine.assign(&order, &config, &waiting)?;
				order.assign_queue(assignment.queue_number)?;

				guard.ensure_held().await?;
				let stored = store.save(&order).await?;
				let _ = written.set(stored.id());
				Ok::<_, QueueError>(stored)
			})
			.await;
		self.snapshots.invalidate(shop_id);
		report_unconfirmed_write(&outcome, &persisted);
		let stored = outcome?;

		let queue_number = stored.queue_number().ok_or_else(|| {
			QueueError::Inconsistent(format!("order {} was saved without a queue", stored.id()))
		})?;
		let live_position = self.snapshots.get_live_position(&stored).await?;

		tracing::info!(
			order_id = %stored.id(),
			queue_number,
			live_position,
			total = %stored.total_price(),
			"Order created"
		);

		Ok(OrderCreated {
			order_id: stored.id(),
			shop_id,
			queue_number,
			live_position,
			status: stored.status(),
		})
	}

	/// Marks a waiting order as served and returns its shop.
	#[instrument(skip(self), fields(order_id = %order_id))]
	pub async fn serve_order(&self, order_id: OrderId) -> Result<ShopId, QueueError> {
		self.complete(order_id, Completion::Serve).await
	}

	/// Cancels a waiting order.
	#[instrument(skip(self), fields(order_id = %order_id))]
	pub async fn cancel_order(&self, order_id: OrderId) -> Result<(), QueueError> {
		self.complete(order_id, Completion::Cancel).await?;
		Ok(())
	}

	/// Current status of an order with its live position.
	#[instrument(skip(self), fields(order_id = %order_id))]
	pub async fn get_order(&self, order_id: OrderId) -> Result<OrderStatusView, QueueError> {
		let order = self
			.store
			.find(order_id)
			.await?
			.ok_or(QueueError::OrderNotFound(order_id))?;
		let live_position = self.snapshots.get_live_position(&order).await?;
		Ok(OrderStatusView::from_order(&order, live_position))
	}

	/// Moves a waiting order to a terminal status.
	///
	/// The status is checked once without the lock, so a finished order is
	/// rejected without locking or writing, and again on a fresh read under
	/// the lock, so only one of two racing completions can win.
	async fn complete(&self, order_id: OrderId, completion: Completion) -> Result<ShopId, QueueError> {
		let order = self
			.store
			.find(order_id)
			.await?
			.ok_or(QueueError::OrderNotFound(order_id))?;
		if !order.is_waiting() {
			tracing::warn!(
				current = %order.status(),
				target = %completion.target(),
				"Rejected transition of finished order"
			);
			return Err(QueueError::InvalidState {
				order_id,
				current: order.status(),
				expected: OrderStatus::Waiting,
			});
		}

		let shop_id = order.shop_id();
		let store = &self.store;
		let persisted = OnceLock::new();
		let written = &persisted;
		let outcome = self
			.locks
			.with_shop_lock(shop_id, |guard| async move {
				let mut current = store
					.find(order_id)
					.await?
					.ok_or(QueueError::OrderNotFound(order_id))?;
				if let Err(e) = completion.apply(&mut current) {
					tracing::warn!(error = %e, "Order changed before the lock was acquired");
					return Err(e);
				}

				guard.ensure_held().await?;
				store.save(&current).await?;
				let _ = written.set(order_id);
				Ok::<_, QueueError>(current)
			})
			.await;
		self.snapshots.invalidate(shop_id);
		report_unconfirmed_write(&outcome, &persisted);
		let finished = outcome?;

		tracing::info!(
			shop_id = %shop_id,
			queue_number = ?finished.queue_number(),
			status = %finished.status(),
			"Order finished"
		);
		Ok(shop_id)
	}
}

/// Logs an order that reached the store although its lease lapsed before
/// the lock was released. The write stays in place and the caller still
/// gets the lease error.
fn report_unconfirmed_write<T>(outcome: &Result<T, QueueError>, persisted: &OnceLock<OrderId>) {
	if let (Err(QueueError::LeaseExpired { key }), Some(order_id)) = (outcome, persisted.get()) {
		tracing::error!(
			order_id = %order_id,
			lock = %key,
			"Order was persisted but the lease expired before the lock was released"
		);
	}
}
