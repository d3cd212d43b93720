//! Queue assignment for new orders.
//!
//! A shop's configuration names the strategy that picks a queue for each new
//! order. Strategies form a closed set ([`AssignmentStrategy`]); the
//! [`QueueAssignmentEngine`] holds an explicit, ordered list of them and
//! delegates to the first one that supports the shop.

use queue_types::{Order, QueueAssignmentResult, ShopConfiguration, ShopId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub mod strategies {
	pub mod most_available;
}

pub use strategies::most_available::MostAvailableStrategy;

/// Errors that can occur while assigning a queue.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AssignmentError {
	/// Every configured queue is at or over capacity, or none is configured.
	#[error("All queues of shop {shop_id} are full")]
	AllQueuesFull { shop_id: ShopId },
	/// No registered strategy supports the shop's configured strategy name.
	#[error("No matching strategy '{strategy}' for shop {shop_id}")]
	NoMatchingStrategy { shop_id: ShopId, strategy: String },
	/// A strategy name that is not known at all.
	#[error("Unknown strategy: {0}")]
	UnknownStrategy(String),
	/// A known strategy without a defined policy, which cannot be registered.
	#[error("Strategy {0} has no assignment policy and cannot be registered")]
	StrategyNotImplemented(StrategyType),
}

/// Strategy names a shop can be configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StrategyType {
	/// Pick the queue with the most free places.
	MostAvailable,
	/// Priority placement for members. No policy is defined for it.
	VipMembership,
}

impl StrategyType {
	/// Name as it appears in shop configuration.
	pub fn as_str(&self) -> &'static str {
		match self {
			StrategyType::MostAvailable => "MOST_AVAILABLE",
			StrategyType::VipMembership => "VIP_MEMBERSHIP",
		}
	}
}

impl fmt::Display for StrategyType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for StrategyType {
	type Err = AssignmentError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_uppercase().as_str() {
			"MOST_AVAILABLE" => Ok(StrategyType::MostAvailable),
			"VIP_MEMBERSHIP" => Ok(StrategyType::VipMembership),
			_ => Err(AssignmentError::UnknownStrategy(s.to_string())),
		}
	}
}

/// The registrable assignment strategies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignmentStrategy {
	MostAvailable(MostAvailableStrategy),
}

impl AssignmentStrategy {
	/// Builds the strategy registered under `name`.
	///
	/// Known names without a policy are rejected rather than replaced by a
	/// fixed-queue placeholder.
	pub fn from_name(name: &str) -> Result<Self, AssignmentError> {
		match name.parse::<StrategyType>()? {
			StrategyType::MostAvailable => Ok(AssignmentStrategy::MostAvailable(MostAvailableStrategy)),
			other => Err(AssignmentError::StrategyNotImplemented(other)),
		}
	}

	pub fn strategy_type(&self) -> StrategyType {
		match self {
			AssignmentStrategy::MostAvailable(_) => StrategyType::MostAvailable,
		}
	}

	/// Whether this strategy applies to the shop, by case-insensitive name.
	pub fn supports(&self, config: &ShopConfiguration) -> bool {
		config
			.queue_strategy
			.trim()
			.eq_ignore_ascii_case(self.strategy_type().as_str())
	}

	/// Picks a queue for `order` given the shop's currently waiting orders.
	pub fn assign(
		&self,
		order: &Order,
		config: &ShopConfiguration,
		waiting: &[Order],
	) -> Result<QueueAssignmentResult, AssignmentError> {
		match self {
			AssignmentStrategy::MostAvailable(strategy) => strategy.assign(order, config, waiting),
		}
	}
}

/// Selects the strategy for a shop and delegates the assignment to it.
#[derive(Debug, Clone)]
pub struct QueueAssignmentEngine {
	strategies: Vec<AssignmentStrategy>,
}

impl QueueAssignmentEngine {
	/// Creates an engine over `strategies`, consulted in the given order.
	pub fn new(strategies: Vec<AssignmentStrategy>) -> Self {
		Self { strategies }
	}

	/// Creates an engine from configured strategy names.
	pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, AssignmentError> {
		let strategies = names
			.iter()
			.map(|name| AssignmentStrategy::from_name(name.as_ref()))
			.collect::<Result<Vec<_>, _>>()?;
		Ok(Self::new(strategies))
	}

	pub fn strategies(&self) -> &[AssignmentStrategy] {
		&self.strategies
	}

	/// Assigns a queue using the first strategy that supports the shop.
	pub fn assign(
		&self,
		order: &Order,
		config: &ShopConfiguration,
		waiting: &[Order],
	) -> Result<QueueAssignmentResult, AssignmentError> {
		let strategy = self
			.strategies
			.iter()
			.find(|s| s.supports(config))
			.ok_or_else(|| {
				tracing::error!(
					shop_id = %config.shop_id,
					strategy = %config.queue_strategy,
					"No assignment strategy matches shop configuration"
				);
				AssignmentError::NoMatchingStrategy {
					shop_id: config.shop_id,
					strategy: config.queue_strategy.clone(),
				}
			})?;

		let result = strategy.assign(order, config, waiting)?;
		tracing::debug!(
			order_id = %order.id(),
			strategy = %strategy.strategy_type(),
			queue_number = result.queue_number,
			"Queue assigned"
		);
		Ok(result)
	}
}
