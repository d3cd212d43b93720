//! Most-available queue selection.
//!
//! Each configured queue has `available = capacity - waiting occupants`. The
//! queue with the strictly greatest positive `available` wins; among equal
//! values the lowest queue number wins, since queues are visited in ascending
//! order and only a strictly greater value replaces the current best.

use crate::AssignmentError;
use queue_types::{Order, QueueAssignmentResult, ShopConfiguration};
use std::collections::HashMap;

/// Assigns orders to the queue with the most free places.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MostAvailableStrategy;

impl MostAvailableStrategy {
	pub fn assign(
		&self,
		_order: &Order,
		config: &ShopConfiguration,
		waiting: &[Order],
	) -> Result<QueueAssignmentResult, AssignmentError> {
		let mut occupants: HashMap<u32, usize> = HashMap::new();
		for order in waiting.iter().filter(|o| o.is_waiting()) {
			if let Some(queue_number) = order.queue_number() {
				*occupants.entry(queue_number).or_default() += 1;
			}
		}

		let mut best: Option<(u32, i64, usize)> = None;
		for (&queue_number, &capacity) in &config.queue_capacities {
			let occupied = occupants.get(&queue_number).copied().unwrap_or(0);
			let available = i64::from(capacity) - occupied as i64;
			if available <= 0 {
				continue;
			}
			if best.is_none_or(|(_, best_available, _)| available > best_available) {
				best = Some((queue_number, available, occupied));
			}
		}

		match best {
			Some((queue_number, available, occupied)) => {
				tracing::trace!(
					shop_id = %config.shop_id,
					queue_number,
					available,
					"Most available queue selected"
				);
				Ok(QueueAssignmentResult::new(queue_number, Some(occupied + 1)))
			},
			None => Err(AssignmentError::AllQueuesFull {
				shop_id: config.shop_id,
			}),
		}
	}
}
