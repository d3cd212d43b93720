//! Queue placement and snapshot types.

use serde::{Deserialize, Serialize};

use crate::{OrderId, ShopId};

/// Outcome of a queue assignment strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueAssignmentResult {
	pub queue_number: u32,
	/// 1-based position the new order takes, when the strategy knows it.
	pub position: Option<usize>,
}

impl QueueAssignmentResult {
	pub fn new(queue_number: u32, position: Option<usize>) -> Self {
		Self {
			queue_number,
			position,
		}
	}
}

/// A waiting order as shown in a queue snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueOrderSummary {
	pub order_id: OrderId,
	/// 1-based rank within the queue.
	pub position: usize,
}

/// State of one queue within a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueInfo {
	pub queue_number: u32,
	/// Number of waiting orders.
	pub size: usize,
	/// Configured capacity. `None` for a queue that holds orders but is no
	/// longer configured.
	pub max_size: Option<u32>,
	pub orders: Vec<QueueOrderSummary>,
}

/// Point-in-time view of every queue of a shop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShopQueueSnapshot {
	pub shop_id: ShopId,
	/// Queues in ascending queue number.
	pub queues: Vec<QueueInfo>,
}

impl ShopQueueSnapshot {
	pub fn queue(&self, queue_number: u32) -> Option<&QueueInfo> {
		self.queues.iter().find(|q| q.queue_number == queue_number)
	}

	/// Total number of waiting orders across queues.
	pub fn waiting_count(&self) -> usize {
		self.queues.iter().map(|q| q.size).sum()
	}
}
