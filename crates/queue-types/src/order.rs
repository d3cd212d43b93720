//! Order types for the queue system.
//!
//! An order moves through a small lifecycle: it is created `Waiting`, gets a
//! queue number under the per-shop lock, and ends either `Served` or
//! `Canceled`. Both end states are terminal and retained for lookups.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::{MenuItemId, OrderId, ShopId};

/// Errors raised by the order entity itself.
///
/// These are contract violations detected at construction or transition
/// time, before anything is persisted.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum OrderError {
	/// An order must contain at least one item.
	#[error("Order must contain at least one item")]
	EmptyOrder,
	/// Item quantity must be strictly positive.
	#[error("Quantity for menu item {menu_item_id} must be greater than zero, got {quantity}")]
	InvalidQuantity {
		menu_item_id: MenuItemId,
		quantity: i32,
	},
	/// Item price cannot be negative.
	#[error("Price for menu item {menu_item_id} cannot be negative, got {price}")]
	NegativePrice {
		menu_item_id: MenuItemId,
		price: Decimal,
	},
	/// A queue number can only be assigned once.
	#[error("Order {order_id} already assigned to queue {queue_number}")]
	QueueAlreadyAssigned { order_id: OrderId, queue_number: u32 },
	/// The requested status change is not allowed from the current status.
	#[error("Order {order_id} cannot move from {from} to {to}")]
	InvalidTransition {
		order_id: OrderId,
		from: OrderStatus,
		to: OrderStatus,
	},
}

/// Status of an order in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
	/// Order is queued and counts against its queue's capacity.
	Waiting,
	/// Order was handed to the customer. Terminal.
	Served,
	/// Order was withdrawn before being served. Terminal.
	Canceled,
}

impl OrderStatus {
	/// Returns every status, in lifecycle order.
	pub fn all() -> impl Iterator<Item = Self> {
		[Self::Waiting, Self::Served, Self::Canceled].into_iter()
	}

	/// Checks whether moving from `self` to `next` is a legal transition.
	pub fn can_transition_to(&self, next: OrderStatus) -> bool {
		matches!(
			(self, next),
			(Self::Waiting, Self::Served) | (Self::Waiting, Self::Canceled)
		)
	}
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			OrderStatus::Waiting => write!(f, "WAITING"),
			OrderStatus::Served => write!(f, "SERVED"),
			OrderStatus::Canceled => write!(f, "CANCELED"),
		}
	}
}

/// A line of an order.
///
/// The unit price is captured from the menu at ordering time and never
/// re-fetched afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
	menu_item_id: MenuItemId,
	quantity: i32,
	price: Decimal,
}

impl OrderItem {
	/// Creates a validated order item.
	pub fn new(menu_item_id: MenuItemId, quantity: i32, price: Decimal) -> Result<Self, OrderError> {
		if quantity <= 0 {
			return Err(OrderError::InvalidQuantity {
				menu_item_id,
				quantity,
			});
		}
		if price.is_sign_negative() && !price.is_zero() {
			return Err(OrderError::NegativePrice {
				menu_item_id,
				price,
			});
		}

		Ok(Self {
			menu_item_id,
			quantity,
			price,
		})
	}

	pub fn menu_item_id(&self) -> MenuItemId {
		self.menu_item_id
	}

	pub fn quantity(&self) -> i32 {
		self.quantity
	}

	/// Unit price at the time of ordering.
	pub fn price(&self) -> Decimal {
		self.price
	}

	/// Quantity multiplied by unit price.
	pub fn total_price(&self) -> Decimal {
		self.price * Decimal::from(self.quantity)
	}
}

/// A customer order queued at a shop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
	id: OrderId,
	shop_id: ShopId,
	items: Vec<OrderItem>,
	queue_number: Option<u32>,
	status: OrderStatus,
	/// Append-only position assigned by storage on first save. Ranking within
	/// a queue uses this, never the id.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	sequence: Option<u64>,
	created_at: DateTime<Utc>,
	updated_at: DateTime<Utc>,
}

impl Order {
	/// Creates a new `Waiting` order with no queue assigned.
	pub fn create_new(shop_id: ShopId, items: Vec<OrderItem>) -> Result<Self, OrderError> {
		if items.is_empty() {
			return Err(OrderError::EmptyOrder);
		}

		let now = Utc::now();
		Ok(Self {
			id: OrderId::generate(),
			shop_id,
			items,
			queue_number: None,
			status: OrderStatus::Waiting,
			sequence: None,
			created_at: now,
			updated_at: now,
		})
	}

	/// Assigns the queue chosen for this order. Callable once.
	pub fn assign_queue(&mut self, queue_number: u32) -> Result<(), OrderError> {
		if let Some(existing) = self.queue_number {
			return Err(OrderError::QueueAlreadyAssigned {
				order_id: self.id,
				queue_number: existing,
			});
		}
		self.queue_number = Some(queue_number);
		self.touch();
		Ok(())
	}

	/// Moves a waiting order to `Served`.
	pub fn mark_as_served(&mut self) -> Result<(), OrderError> {
		self.transition(OrderStatus::Served)
	}

	/// Moves a waiting order to `Canceled`.
	pub fn mark_as_canceled(&mut self) -> Result<(), OrderError> {
		self.transition(OrderStatus::Canceled)
	}

	fn transition(&mut self, next: OrderStatus) -> Result<(), OrderError> {
		if !self.status.can_transition_to(next) {
			return Err(OrderError::InvalidTransition {
				order_id: self.id,
				from: self.status,
				to: next,
			});
		}
		self.status = next;
		self.touch();
		Ok(())
	}

	/// Records the storage sequence. Only the first call has an effect, so a
	/// re-save never moves an order within its queue.
	pub fn record_sequence(&mut self, sequence: u64) {
		if self.sequence.is_none() {
			self.sequence = Some(sequence);
		}
	}

	fn touch(&mut self) {
		self.updated_at = Utc::now();
	}

	pub fn id(&self) -> OrderId {
		self.id
	}

	pub fn shop_id(&self) -> ShopId {
		self.shop_id
	}

	pub fn items(&self) -> &[OrderItem] {
		&self.items
	}

	pub fn queue_number(&self) -> Option<u32> {
		self.queue_number
	}

	pub fn status(&self) -> OrderStatus {
		self.status
	}

	pub fn is_waiting(&self) -> bool {
		self.status == OrderStatus::Waiting
	}

	pub fn sequence(&self) -> Option<u64> {
		self.sequence
	}

	pub fn created_at(&self) -> DateTime<Utc> {
		self.created_at
	}

	pub fn updated_at(&self) -> DateTime<Utc> {
		self.updated_at
	}

	/// Sum of every item's total price.
	pub fn total_price(&self) -> Decimal {
		self.items.iter().map(OrderItem::total_price).sum()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn dec(value: &str) -> Decimal {
		value.parse().unwrap()
	}

	fn item(quantity: i32, price: &str) -> OrderItem {
		OrderItem::new(
			MenuItemId(uuid::Uuid::new_v4()),
			quantity,
			price.parse().unwrap(),
		)
		.unwrap()
	}

	fn order_in(status: OrderStatus) -> Order {
		let mut order = Order::create_new(ShopId(uuid::Uuid::new_v4()), vec![item(1, "2.50")]).unwrap();
		match status {
			OrderStatus::Waiting => {},
			OrderStatus::Served => order.mark_as_served().unwrap(),
			OrderStatus::Canceled => order.mark_as_canceled().unwrap(),
		}
		order
	}

	#[test]
	fn test_item_validation() {
		let id = MenuItemId(uuid::Uuid::new_v4());
		assert!(matches!(
			OrderItem::new(id, 0, dec("1.00")),
			Err(OrderError::InvalidQuantity { quantity: 0, .. })
		));
		assert!(matches!(
			OrderItem::new(id, -3, dec("1.00")),
			Err(OrderError::InvalidQuantity { quantity: -3, .. })
		));
		assert!(matches!(
			OrderItem::new(id, 1, dec("-0.01")),
			Err(OrderError::NegativePrice { .. })
		));
		assert!(OrderItem::new(id, 1, Decimal::ZERO).is_ok());
	}

	#[test]
	fn test_totals() {
		let order = Order::create_new(
			ShopId(uuid::Uuid::new_v4()),
			vec![item(2, "30.00"), item(1, "25.50")],
		)
		.unwrap();
		assert_eq!(order.items()[0].total_price(), dec("60.00"));
		assert_eq!(order.total_price(), dec("85.50"));
	}

	#[test]
	fn test_create_new_rejects_empty() {
		let result = Order::create_new(ShopId(uuid::Uuid::new_v4()), vec![]);
		assert_eq!(result.unwrap_err(), OrderError::EmptyOrder);
	}

	#[test]
	fn test_new_order_is_waiting_and_unassigned() {
		let order = order_in(OrderStatus::Waiting);
		assert_eq!(order.status(), OrderStatus::Waiting);
		assert_eq!(order.queue_number(), None);
		assert_eq!(order.sequence(), None);
	}

	#[test]
	fn test_assign_queue_only_once() {
		let mut order = order_in(OrderStatus::Waiting);
		order.assign_queue(2).unwrap();
		assert_eq!(order.queue_number(), Some(2));

		let err = order.assign_queue(3).unwrap_err();
		assert!(matches!(
			err,
			OrderError::QueueAlreadyAssigned { queue_number: 2, .. }
		));
		assert_eq!(order.queue_number(), Some(2));
	}

	#[test]
	fn test_transitions_only_leave_waiting() {
		for status in OrderStatus::all() {
			let mut served = order_in(status);
			let mut canceled = order_in(status);

			let serve_result = served.mark_as_served();
			let cancel_result = canceled.mark_as_canceled();

			if status == OrderStatus::Waiting {
				assert!(serve_result.is_ok());
				assert!(cancel_result.is_ok());
				assert_eq!(served.status(), OrderStatus::Served);
				assert_eq!(canceled.status(), OrderStatus::Canceled);
			} else {
				assert!(matches!(
					serve_result,
					Err(OrderError::InvalidTransition { from, to: OrderStatus::Served, .. }) if from == status
				));
				assert!(matches!(
					cancel_result,
					Err(OrderError::InvalidTransition { from, to: OrderStatus::Canceled, .. }) if from == status
				));
				assert_eq!(served.status(), status);
				assert_eq!(canceled.status(), status);
			}
		}
	}

	#[test]
	fn test_sequence_is_recorded_once() {
		let mut order = order_in(OrderStatus::Waiting);
		order.record_sequence(7);
		order.record_sequence(9);
		assert_eq!(order.sequence(), Some(7));
	}

	#[test]
	fn test_status_serializes_uppercase() {
		assert_eq!(
			serde_json::to_string(&OrderStatus::Canceled).unwrap(),
			"\"CANCELED\""
		);
		assert_eq!(OrderStatus::Served.to_string(), "SERVED");
	}
}
