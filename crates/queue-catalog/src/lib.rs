//! Shop and menu lookups for the queue system.
//!
//! Shops and menus are owned by external services. This module defines the
//! lookup interfaces the queue depends on, a configuration-backed fixture
//! backend and an HTTP backend, and the services that put caches in front of
//! shop existence and shop configuration reads.

use async_trait::async_trait;
use queue_cache::TtlCache;
use queue_types::{ConfigSchema, ImplementationRegistry, MenuItem, MenuItemId, ShopConfiguration, ShopId};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;

/// Re-export implementations
pub mod implementations {
	pub mod fixture;
	pub mod http;
}

/// Errors that can occur during catalog lookups.
#[derive(Debug, Clone, Error)]
pub enum CatalogError {
	/// The shop is unknown to the shop service.
	#[error("Shop not found: {0}")]
	ShopNotFound(ShopId),
	/// Error that occurs while talking to a remote service.
	#[error("Network error: {0}")]
	Network(String),
	/// A remote service answered with something that could not be decoded.
	#[error("Invalid response: {0}")]
	InvalidResponse(String),
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Trait defining the interface for shop lookups.
#[async_trait]
pub trait ShopInterface: Send + Sync {
	/// Whether the shop exists.
	async fn exists(&self, shop_id: ShopId) -> Result<bool, CatalogError>;

	/// Fetches the queue configuration of a shop, failing with
	/// [`CatalogError::ShopNotFound`] for an unknown shop.
	async fn get_config(&self, shop_id: ShopId) -> Result<ShopConfiguration, CatalogError>;

	/// Returns the configuration schema for validation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;
}

/// Trait defining the interface for menu lookups.
#[async_trait]
pub trait MenuInterface: Send + Sync {
	/// Fetches the menu of a shop. Items may include unavailable entries;
	/// [`MenuService`] filters them out.
	async fn get_menu(&self, shop_id: ShopId) -> Result<Vec<MenuItem>, CatalogError>;

	/// Returns the configuration schema for validation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;
}

/// Type alias for shop lookup factory functions.
pub type ShopFactory = fn(&toml::Value) -> Result<Box<dyn ShopInterface>, CatalogError>;

/// Type alias for menu lookup factory functions.
pub type MenuFactory = fn(&toml::Value) -> Result<Box<dyn MenuInterface>, CatalogError>;

/// Registry trait for shop lookup implementations.
pub trait ShopRegistry: ImplementationRegistry<Factory = ShopFactory> {}

/// Registry trait for menu lookup implementations.
pub trait MenuRegistry: ImplementationRegistry<Factory = MenuFactory> {}

/// Get all registered shop lookup implementations.
pub fn get_all_shop_implementations() -> Vec<(&'static str, ShopFactory)> {
	use implementations::{fixture, http};

	vec![
		(fixture::ShopRegistry::NAME, fixture::ShopRegistry::factory()),
		(http::ShopRegistry::NAME, http::ShopRegistry::factory()),
	]
}

/// Get all registered menu lookup implementations.
pub fn get_all_menu_implementations() -> Vec<(&'static str, MenuFactory)> {
	use implementations::{fixture, http};

	vec![
		(fixture::MenuRegistry::NAME, fixture::MenuRegistry::factory()),
		(http::MenuRegistry::NAME, http::MenuRegistry::factory()),
	]
}

/// Cache lifetimes for shop lookups.
#[derive(Debug, Clone, Copy)]
pub struct ShopCacheConfig {
	pub exists_ttl: Duration,
	pub config_ttl: Duration,
}

impl Default for ShopCacheConfig {
	fn default() -> Self {
		Self {
			exists_ttl: Duration::from_secs(600),
			config_ttl: Duration::from_secs(1800),
		}
	}
}

/// Shop lookups with per-shop caching of existence and configuration.
pub struct ShopService {
	backend: Box<dyn ShopInterface>,
	exists_cache: TtlCache<ShopId, bool>,
	config_cache: TtlCache<ShopId, ShopConfiguration>,
}

impl ShopService {
	/// Creates a new ShopService with the specified backend and cache lifetimes.
	pub fn new(backend: Box<dyn ShopInterface>, cache: ShopCacheConfig) -> Self {
		Self {
			backend,
			exists_cache: TtlCache::new("shop-exists", cache.exists_ttl),
			config_cache: TtlCache::new("shop-config", cache.config_ttl),
		}
	}

	/// Whether the shop exists.
	#[instrument(skip(self), fields(shop_id = %shop_id))]
	pub async fn exists(&self, shop_id: ShopId) -> Result<bool, CatalogError> {
		self.exists_cache
			.get_or_try_insert_with(&shop_id, || self.backend.exists(shop_id))
			.await
	}

	/// Fetches the shop's queue configuration.
	#[instrument(skip(self), fields(shop_id = %shop_id))]
	pub async fn get_config(&self, shop_id: ShopId) -> Result<ShopConfiguration, CatalogError> {
		self.config_cache
			.get_or_try_insert_with(&shop_id, || self.backend.get_config(shop_id))
			.await
	}

	/// Drops cached answers for a shop.
	pub fn invalidate(&self, shop_id: ShopId) {
		self.exists_cache.invalidate(&shop_id);
		self.config_cache.invalidate(&shop_id);
	}
}

/// Menu lookups. Menus are read fresh on every order.
pub struct MenuService {
	backend: Box<dyn MenuInterface>,
}

impl MenuService {
	/// Creates a new MenuService with the specified backend.
	pub fn new(backend: Box<dyn MenuInterface>) -> Self {
		Self { backend }
	}

	/// Items of the shop's menu that can currently be ordered, by id.
	#[instrument(skip(self), fields(shop_id = %shop_id))]
	pub async fn available_items(
		&self,
		shop_id: ShopId,
	) -> Result<HashMap<MenuItemId, MenuItem>, CatalogError> {
		let menu = self.backend.get_menu(shop_id).await?;
		let total = menu.len();
		let available: HashMap<_, _> = menu
			.into_iter()
			.filter(|item| item.available)
			.map(|item| (item.id, item))
			.collect();
		tracing::debug!(total, available = available.len(), "Fetched menu");
		Ok(available)
	}
}
