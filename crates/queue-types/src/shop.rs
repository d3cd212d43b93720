//! Shop and menu types supplied by the catalog services.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{MenuItemId, ShopId};

/// Queue configuration for a shop.
///
/// Capacities are keyed by queue number. The map is ordered, so iterating it
/// visits queues in ascending number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShopConfiguration {
	pub shop_id: ShopId,
	/// Name of the assignment strategy, for example `MOST_AVAILABLE`.
	pub queue_strategy: String,
	pub queue_capacities: BTreeMap<u32, u32>,
}

impl ShopConfiguration {
	/// Capacity of a queue, or `None` when the queue is not configured.
	pub fn capacity_of(&self, queue_number: u32) -> Option<u32> {
		self.queue_capacities.get(&queue_number).copied()
	}
}

/// An entry on a shop's menu.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuItem {
	#[serde(rename = "menuItemId")]
	pub id: MenuItemId,
	pub name: String,
	pub price: Decimal,
	pub available: bool,
}
