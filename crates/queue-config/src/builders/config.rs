//! Configuration builder for creating test and development configurations.
//!
//! This module provides utilities for constructing Config instances with
//! sensible defaults, particularly useful for testing scenarios.

use crate::{
	AssignmentConfig, CacheConfig, CatalogConfig, Config, LockConfig, ServiceConfig,
	StorageConfig,
};
use std::collections::HashMap;

fn empty_table() -> toml::Value {
	toml::Value::Table(toml::map::Map::new())
}

/// Builder for creating `Config` instances with a fluent API.
///
/// Defaults to the in-memory store, the in-memory lock and the fixture
/// catalog with its demo shops.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
	service_id: String,
	storage_primary: String,
	storage_config: toml::Value,
	lock: LockConfig,
	shop_config: toml::Value,
	menu_config: toml::Value,
	cache: CacheConfig,
	strategies: Vec<String>,
}

impl Default for ConfigBuilder {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigBuilder {
	/// Creates a new `ConfigBuilder` with default values suitable for testing.
	pub fn new() -> Self {
		Self {
			service_id: "test-queue".to_string(),
			storage_primary: "memory".to_string(),
			storage_config: empty_table(),
			lock: LockConfig::default(),
			shop_config: empty_table(),
			menu_config: empty_table(),
			cache: CacheConfig::default(),
			strategies: vec!["most_available".to_string()],
		}
	}

	/// Sets the service ID.
	pub fn service_id(mut self, id: impl Into<String>) -> Self {
		self.service_id = id.into();
		self
	}

	/// Sets the primary storage implementation and its table.
	pub fn storage(mut self, primary: impl Into<String>, config: toml::Value) -> Self {
		self.storage_primary = primary.into();
		self.storage_config = config;
		self
	}

	/// Sets the primary lock implementation and its table.
	pub fn lock(mut self, primary: impl Into<String>, config: toml::Value) -> Self {
		let primary = primary.into();
		self.lock.implementations = HashMap::from([(primary.clone(), config)]);
		self.lock.primary = primary;
		self
	}

	/// Sets the lock acquire timeout and lease, in milliseconds.
	pub fn lock_timings(mut self, acquire_timeout_ms: u64, lease_ms: u64) -> Self {
		self.lock.acquire_timeout_ms = acquire_timeout_ms;
		self.lock.lease_ms = lease_ms;
		self
	}

	/// Sets the fixture shop table.
	pub fn shops(mut self, config: toml::Value) -> Self {
		self.shop_config = config;
		self
	}

	/// Sets the fixture menu table.
	pub fn menus(mut self, config: toml::Value) -> Self {
		self.menu_config = config;
		self
	}

	/// Sets the snapshot cache lifetime in seconds.
	pub fn snapshot_ttl_seconds(mut self, ttl: u64) -> Self {
		self.cache.snapshot_ttl_seconds = ttl;
		self
	}

	/// Sets the registered assignment strategies.
	pub fn strategies(mut self, strategies: &[&str]) -> Self {
		self.strategies = strategies.iter().map(|s| s.to_string()).collect();
		self
	}

	/// Builds the `Config` with the configured values.
	pub fn build(self) -> Config {
		Config {
			service: ServiceConfig {
				id: self.service_id,
			},
			storage: StorageConfig {
				implementations: HashMap::from([(
					self.storage_primary.clone(),
					self.storage_config,
				)]),
				primary: self.storage_primary,
			},
			lock: self.lock,
			shop: CatalogConfig {
				primary: "fixture".to_string(),
				implementations: HashMap::from([("fixture".to_string(), self.shop_config)]),
			},
			menu: CatalogConfig {
				primary: "fixture".to_string(),
				implementations: HashMap::from([("fixture".to_string(), self.menu_config)]),
			},
			cache: self.cache,
			assignment: AssignmentConfig {
				strategies: self.strategies,
			},
		}
	}
}
