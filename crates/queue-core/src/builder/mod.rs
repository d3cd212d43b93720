//! Builder pattern for constructing the queue system.
//!
//! Composes a [`QueueSystem`] from configuration and factory functions for
//! each pluggable backend: order storage, lock, shop lookup and menu lookup.

use crate::lifecycle::OrderLifecycleService;
use crate::snapshot::QueueSnapshotService;
use crate::QueueSystem;
use queue_assignment::QueueAssignmentEngine;
use queue_catalog::{MenuFactory, MenuService, ShopCacheConfig, ShopFactory, ShopService};
use queue_config::Config;
use queue_lock::{LockConfig, LockFactory, LockService};
use queue_storage::{OrderStore, StorageFactory};
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during queue system construction.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Factory functions for every backend, keyed by implementation name.
pub struct QueueFactories {
	pub storage_factories: HashMap<String, StorageFactory>,
	pub lock_factories: HashMap<String, LockFactory>,
	pub shop_factories: HashMap<String, ShopFactory>,
	pub menu_factories: HashMap<String, MenuFactory>,
}

impl QueueFactories {
	/// Every implementation shipped with the backend crates.
	pub fn registered() -> Self {
		fn collect<F>(entries: Vec<(&'static str, F)>) -> HashMap<String, F> {
			entries
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect()
		}

		Self {
			storage_factories: collect(queue_storage::get_all_implementations()),
			lock_factories: collect(queue_lock::get_all_implementations()),
			shop_factories: collect(queue_catalog::get_all_shop_implementations()),
			menu_factories: collect(queue_catalog::get_all_menu_implementations()),
		}
	}
}

/// Creates every configured implementation of a component and returns the
/// primary one.
fn build_primary<T, E, F>(
	component: &str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
	factories: &HashMap<String, F>,
) -> Result<Box<T>, BuilderError>
where
	T: ?Sized,
	E: Display,
	F: Fn(&toml::Value) -> Result<Box<T>, E>,
{
	let mut loaded = HashMap::new();
	for (name, config) in implementations {
		let Some(factory) = factories.get(name) else {
			tracing::warn!(component, implementation = %name, "No factory registered, skipping");
			continue;
		};
		match factory(config) {
			Ok(implementation) => {
				let is_primary = primary == name;
				tracing::info!(component, implementation = %name, enabled = %is_primary, "Loaded");
				loaded.insert(name.clone(), implementation);
			},
			Err(e) => {
				tracing::error!(
					component,
					implementation = %name,
					error = %e,
					"Failed to create implementation"
				);
				return Err(BuilderError::Config(format!(
					"Failed to create {} implementation '{}': {}",
					component, name, e
				)));
			},
		}
	}

	loaded.remove(primary).ok_or_else(|| {
		BuilderError::MissingComponent(format!(
			"Primary {} '{}' failed to load or has no registered factory",
			component, primary
		))
	})
}

/// Builder for constructing a [`QueueSystem`] with pluggable implementations.
pub struct QueueBuilder {
	config: Config,
}

impl QueueBuilder {
	/// Creates a new QueueBuilder with the given configuration.
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	/// Builds the system using the given factories.
	pub fn build(self, factories: QueueFactories) -> Result<QueueSystem, BuilderError> {
		let config = self.config;

		let storage_backend = build_primary(
			"storage",
			&config.storage.primary,
			&config.storage.implementations,
			&factories.storage_factories,
		)?;
		let lock_backend = build_primary(
			"lock",
			&config.lock.primary,
			&config.lock.implementations,
			&factories.lock_factories,
		)?;
		let shop_backend = build_primary(
			"shop",
			&config.shop.primary,
			&config.shop.implementations,
			&factories.shop_factories,
		)?;
		let menu_backend = build_primary(
			"menu",
			&config.menu.primary,
			&config.menu.implementations,
			&factories.menu_factories,
		)?;

		let engine = QueueAssignmentEngine::from_names(&config.assignment.strategies).map_err(|e| {
			tracing::error!(component = "assignment", error = %e, "Invalid strategy registration");
			BuilderError::Config(e.to_string())
		})?;

		let store = Arc::new(OrderStore::new(storage_backend));
		let locks = Arc::new(LockService::new(
			lock_backend,
			LockConfig {
				key_prefix: config.lock.key_prefix.clone(),
				acquire_timeout: config.lock.acquire_timeout(),
				lease: config.lock.lease(),
				..LockConfig::default()
			},
		));
		let shops = Arc::new(ShopService::new(
			shop_backend,
			ShopCacheConfig {
				exists_ttl: config.cache.shop_exists_ttl(),
				config_ttl: config.cache.shop_config_ttl(),
			},
		));
		let menu = Arc::new(MenuService::new(menu_backend));

		let snapshots = Arc::new(QueueSnapshotService::new(
			store.clone(),
			shops.clone(),
			config.cache.snapshot_ttl(),
		));
		let lifecycle = Arc::new(OrderLifecycleService::new(
			store,
			shops.clone(),
			menu,
			locks,
			engine,
			snapshots.clone(),
		));

		tracing::info!(
			service_id = %config.service.id,
			strategies = ?config.assignment.strategies,
			"Queue system ready"
		);

		Ok(QueueSystem::new(config, lifecycle, snapshots, shops))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use queue_config::builders::config::ConfigBuilder;

	#[test]
	fn test_builds_with_registered_factories() {
		let system = QueueBuilder::new(ConfigBuilder::new().build())
			.build(QueueFactories::registered())
			.unwrap();
		assert_eq!(system.config().service.id, "test-queue");
	}

	#[test]
	fn test_vip_registration_is_rejected() {
		let config = ConfigBuilder::new()
			.strategies(&["most_available", "vip_membership"])
			.build();
		let err = QueueBuilder::new(config)
			.build(QueueFactories::registered())
			.err()
			.unwrap();
		assert!(matches!(err, BuilderError::Config(msg) if msg.contains("VIP_MEMBERSHIP")));
	}

	#[test]
	fn test_unknown_strategy_is_rejected() {
		let config = ConfigBuilder::new().strategies(&["round_robin"]).build();
		assert!(matches!(
			QueueBuilder::new(config).build(QueueFactories::registered()),
			Err(BuilderError::Config(_))
		));
	}

	#[test]
	fn test_primary_without_factory_is_missing() {
		let config = ConfigBuilder::new()
			.storage("redis", toml::Value::Table(toml::map::Map::new()))
			.build();
		assert!(matches!(
			QueueBuilder::new(config).build(QueueFactories::registered()),
			Err(BuilderError::MissingComponent(msg)) if msg.contains("redis")
		));
	}

	#[test]
	fn test_invalid_backend_table_is_rejected() {
		let mut table = toml::map::Map::new();
		table.insert("storage_path".to_string(), toml::Value::String(String::new()));
		let config = ConfigBuilder::new()
			.storage("file", toml::Value::Table(table))
			.build();
		assert!(matches!(
			QueueBuilder::new(config).build(QueueFactories::registered()),
			Err(BuilderError::Config(msg)) if msg.contains("file")
		));
	}
}
