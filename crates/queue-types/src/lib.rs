//! Common types module for the walk-up order queue.
//!
//! This module defines the domain types shared by every queue component:
//! identifiers, the order state machine, shop configuration as seen from the
//! queue, assignment results and the views handed back to callers.

/// Strongly typed identifiers for shops, orders and menu items.
pub mod ids;
/// Order entity, order items and the order lifecycle state machine.
pub mod order;
/// Queue assignment results and queue snapshot views.
pub mod queue;
/// Registry trait for configuration-selected implementations.
pub mod registry;
/// Shop configuration and menu items owned by external services.
pub mod shop;
/// Request and response views for lifecycle operations.
pub mod views;
/// Configuration validation types for backend-specific TOML tables.
pub mod validation;

pub use ids::*;
pub use order::*;
pub use queue::*;
pub use registry::*;
pub use shop::*;
pub use validation::*;
pub use views::*;

pub use uuid::Uuid;
