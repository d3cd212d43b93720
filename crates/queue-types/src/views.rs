//! Request and response shapes of the order lifecycle operations.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{MenuItemId, Order, OrderId, OrderStatus, ShopId};

/// A requested order line, before prices are resolved from the menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemRequest {
	pub menu_item_id: MenuItemId,
	pub quantity: i32,
}

impl OrderItemRequest {
	pub fn new(menu_item_id: MenuItemId, quantity: i32) -> Self {
		Self {
			menu_item_id,
			quantity,
		}
	}
}

/// Result of placing an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreated {
	pub order_id: OrderId,
	pub shop_id: ShopId,
	pub queue_number: u32,
	/// 1-based position in the assigned queue right after creation.
	pub live_position: usize,
	pub status: OrderStatus,
}

/// An order line as shown to the customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemSummary {
	pub menu_item_id: MenuItemId,
	pub quantity: i32,
	/// Unit price taken from the menu.
	pub price: Decimal,
	/// Unit price times quantity.
	pub total_price: Decimal,
}

/// Current state of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusView {
	pub order_id: OrderId,
	pub shop_id: ShopId,
	pub queue_number: Option<u32>,
	pub status: OrderStatus,
	/// 1-based rank for waiting orders, 0 otherwise.
	pub live_position: usize,
	pub items: Vec<OrderItemSummary>,
	pub total_price: Decimal,
}

impl OrderStatusView {
	/// Builds the view of an order given its live position.
	pub fn from_order(order: &Order, live_position: usize) -> Self {
		Self {
			order_id: order.id(),
			shop_id: order.shop_id(),
			queue_number: order.queue_number(),
			status: order.status(),
			live_position,
			items: order
				.items()
				.iter()
				.map(|item| OrderItemSummary {
					menu_item_id: item.menu_item_id(),
					quantity: item.quantity(),
					price: item.price(),
					total_price: item.total_price(),
				})
				.collect(),
			total_price: order.total_price(),
		}
	}
}
