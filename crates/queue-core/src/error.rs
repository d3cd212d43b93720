//! Error taxonomy of the queue operations.
//!
//! Backend crates have their own error types; everything that reaches a
//! caller of the lifecycle or snapshot services is a [`QueueError`], and each
//! variant belongs to exactly one [`ErrorKind`].

use queue_assignment::AssignmentError;
use queue_catalog::CatalogError;
use queue_lock::LockError;
use queue_storage::StorageError;
use queue_types::{MenuItemId, OrderError, OrderId, OrderStatus, ShopId};
use std::fmt;
use thiserror::Error;

/// Coarse classification of a [`QueueError`], for callers that map errors
/// to responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
	/// A shop, order or menu item does not exist.
	NotFound,
	/// The order is not in the status the operation requires.
	InvalidState,
	/// The request itself is malformed.
	Validation,
	/// Every queue of the shop is full.
	Conflict,
	/// The shop or the service is misconfigured.
	Configuration,
	/// A dependency is busy or unreachable; the request may be retried.
	Unavailable,
	/// An invariant was violated or a backend failed.
	Internal,
}

impl fmt::Display for ErrorKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			ErrorKind::NotFound => "not_found",
			ErrorKind::InvalidState => "invalid_state",
			ErrorKind::Validation => "validation",
			ErrorKind::Conflict => "conflict",
			ErrorKind::Configuration => "configuration",
			ErrorKind::Unavailable => "unavailable",
			ErrorKind::Internal => "internal",
		};
		f.write_str(name)
	}
}

/// Errors returned by the queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
	#[error("Shop not found: {0}")]
	ShopNotFound(ShopId),
	#[error("Order not found: {0}")]
	OrderNotFound(OrderId),
	#[error("Menu item not found: {0}")]
	MenuItemNotFound(MenuItemId),
	/// The order has left the status the operation needs.
	#[error("Order {order_id} is {current}, expected {expected}")]
	InvalidState {
		order_id: OrderId,
		current: OrderStatus,
		expected: OrderStatus,
	},
	/// Item or order construction rejected the request.
	#[error("Invalid order: {0}")]
	InvalidOrder(OrderError),
	#[error("All queues of shop {shop_id} are full")]
	AllQueuesFull { shop_id: ShopId },
	#[error("Configuration error: {0}")]
	Configuration(String),
	/// The per-shop lock could not be acquired in time.
	#[error("Lock '{key}' is temporarily unavailable")]
	LockUnavailable { key: String },
	/// The lease ran out before the operation finished.
	#[error("Lease on lock '{key}' expired during the operation")]
	LeaseExpired { key: String },
	/// A shop or menu service failed to answer.
	#[error("Upstream service error: {0}")]
	Upstream(String),
	#[error("Storage error: {0}")]
	Storage(String),
	#[error("Lock backend error: {0}")]
	Lock(String),
	/// Persisted state contradicts an invariant.
	#[error("Internal consistency violation: {0}")]
	Inconsistent(String),
}

impl QueueError {
	pub fn kind(&self) -> ErrorKind {
		match self {
			QueueError::ShopNotFound(_)
			| QueueError::OrderNotFound(_)
			| QueueError::MenuItemNotFound(_) => ErrorKind::NotFound,
			QueueError::InvalidState { .. } => ErrorKind::InvalidState,
			QueueError::InvalidOrder(_) => ErrorKind::Validation,
			QueueError::AllQueuesFull { .. } => ErrorKind::Conflict,
			QueueError::Configuration(_) => ErrorKind::Configuration,
			QueueError::LockUnavailable { .. } | QueueError::Upstream(_) => ErrorKind::Unavailable,
			QueueError::LeaseExpired { .. }
			| QueueError::Storage(_)
			| QueueError::Lock(_)
			| QueueError::Inconsistent(_) => ErrorKind::Internal,
		}
	}

	/// Whether the same request may succeed if retried later.
	pub fn is_retryable(&self) -> bool {
		self.kind() == ErrorKind::Unavailable
	}
}

impl From<StorageError> for QueueError {
	fn from(err: StorageError) -> Self {
		QueueError::Storage(err.to_string())
	}
}

impl From<LockError> for QueueError {
	fn from(err: LockError) -> Self {
		match err {
			LockError::Held { key, .. } | LockError::Timeout { key, .. } => {
				QueueError::LockUnavailable { key }
			},
			LockError::LeaseExpired { key } => QueueError::LeaseExpired { key },
			LockError::Configuration(msg) => QueueError::Configuration(msg),
			LockError::Backend(msg) => QueueError::Lock(msg),
		}
	}
}

impl From<CatalogError> for QueueError {
	fn from(err: CatalogError) -> Self {
		match err {
			CatalogError::ShopNotFound(shop_id) => QueueError::ShopNotFound(shop_id),
			CatalogError::Configuration(msg) => QueueError::Configuration(msg),
			other @ (CatalogError::Network(_) | CatalogError::InvalidResponse(_)) => {
				QueueError::Upstream(other.to_string())
			},
		}
	}
}

impl From<AssignmentError> for QueueError {
	fn from(err: AssignmentError) -> Self {
		match err {
			AssignmentError::AllQueuesFull { shop_id } => QueueError::AllQueuesFull { shop_id },
			other => QueueError::Configuration(other.to_string()),
		}
	}
}

impl From<OrderError> for QueueError {
	fn from(err: OrderError) -> Self {
		match err {
			OrderError::InvalidTransition { order_id, from, .. } => QueueError::InvalidState {
				order_id,
				current: from,
				expected: OrderStatus::Waiting,
			},
			OrderError::QueueAlreadyAssigned { .. } => QueueError::Inconsistent(err.to_string()),
			other => QueueError::InvalidOrder(other),
		}
	}
}
