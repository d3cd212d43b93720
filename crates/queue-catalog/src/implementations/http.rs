//! REST lookups against the shop and menu services.
//!
//! Endpoints, relative to the configured `base_url`:
//! - `HEAD /api/shops/{id}/exists`: 2xx when the shop exists, 404 otherwise
//! - `GET /api/shops/{id}/config`: `{shopId, queueStrategy, queueCapacities}`
//! - `GET /api/shops/{id}/menu`: `[{menuItemId, name, price, available}]`

use crate::{CatalogError, MenuInterface, ShopInterface};
use async_trait::async_trait;
use queue_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, MenuItem, Schema, ShopConfiguration,
	ShopId, ValidationError,
};
use reqwest::StatusCode;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECONDS: u64 = 10;

/// Connection settings shared by both HTTP lookups.
#[derive(Debug, Clone)]
struct HttpSettings {
	base_url: String,
	timeout: Duration,
}

impl HttpSettings {
	fn from_config(config: &toml::Value) -> Result<Self, CatalogError> {
		HttpCatalogSchema
			.validate(config)
			.map_err(|e| CatalogError::Configuration(e.to_string()))?;

		let base_url = config
			.get("base_url")
			.and_then(|v| v.as_str())
			.ok_or_else(|| CatalogError::Configuration("base_url is required".to_string()))?
			.trim_end_matches('/')
			.to_string();
		let timeout_seconds = config
			.get("timeout_seconds")
			.and_then(|v| v.as_integer())
			.map(|v| v as u64)
			.unwrap_or(DEFAULT_TIMEOUT_SECONDS);

		Ok(Self {
			base_url,
			timeout: Duration::from_secs(timeout_seconds),
		})
	}

	fn client(&self) -> Result<reqwest::Client, CatalogError> {
		reqwest::Client::builder()
			.pool_idle_timeout(Duration::from_secs(90))
			.timeout(self.timeout)
			.build()
			.map_err(|e| CatalogError::Configuration(format!("Failed to build HTTP client: {}", e)))
	}

	fn shop_url(&self, shop_id: ShopId, resource: &str) -> String {
		format!("{}/api/shops/{}/{}", self.base_url, shop_id, resource)
	}
}

fn network_error(e: reqwest::Error) -> CatalogError {
	CatalogError::Network(e.to_string())
}

/// Shop lookup against the remote shop service.
pub struct HttpShops {
	settings: HttpSettings,
	client: reqwest::Client,
}

#[async_trait]
impl ShopInterface for HttpShops {
	async fn exists(&self, shop_id: ShopId) -> Result<bool, CatalogError> {
		let response = self
			.client
			.head(self.settings.shop_url(shop_id, "exists"))
			.send()
			.await
			.map_err(network_error)?;

		match response.status() {
			status if status.is_success() => Ok(true),
			StatusCode::NOT_FOUND => Ok(false),
			status => Err(CatalogError::Network(format!(
				"Shop existence check for {} returned {}",
				shop_id, status
			))),
		}
	}

	async fn get_config(&self, shop_id: ShopId) -> Result<ShopConfiguration, CatalogError> {
		let response = self
			.client
			.get(self.settings.shop_url(shop_id, "config"))
			.send()
			.await
			.map_err(network_error)?;

		if response.status() == StatusCode::NOT_FOUND {
			return Err(CatalogError::ShopNotFound(shop_id));
		}
		let response = response.error_for_status().map_err(network_error)?;
		response
			.json::<ShopConfiguration>()
			.await
			.map_err(|e| CatalogError::InvalidResponse(format!("shop config for {}: {}", shop_id, e)))
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(HttpCatalogSchema)
	}
}

/// Menu lookup against the remote menu service.
pub struct HttpMenu {
	settings: HttpSettings,
	client: reqwest::Client,
}

#[async_trait]
impl MenuInterface for HttpMenu {
	async fn get_menu(&self, shop_id: ShopId) -> Result<Vec<MenuItem>, CatalogError> {
		let response = self
			.client
			.get(self.settings.shop_url(shop_id, "menu"))
			.send()
			.await
			.map_err(network_error)?;

		if response.status() == StatusCode::NOT_FOUND {
			return Err(CatalogError::ShopNotFound(shop_id));
		}
		let response = response.error_for_status().map_err(network_error)?;
		response
			.json::<Vec<MenuItem>>()
			.await
			.map_err(|e| CatalogError::InvalidResponse(format!("menu for {}: {}", shop_id, e)))
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(HttpCatalogSchema)
	}
}

/// Configuration schema shared by the HTTP shop and menu lookups.
pub struct HttpCatalogSchema;

impl ConfigSchema for HttpCatalogSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![Field::new("base_url", FieldType::String).with_validator(|value| {
				match value.as_str() {
					Some(url) if url.starts_with("http://") || url.starts_with("https://") => Ok(()),
					_ => Err("base_url must start with http:// or https://".to_string()),
				}
			})],
			vec![Field::new(
				"timeout_seconds",
				FieldType::Integer {
					min: Some(1),
					max: Some(300),
				},
			)],
		);
		schema.validate(config)
	}
}

/// Factory function to create an HTTP shop lookup from configuration.
///
/// Configuration parameters:
/// - `base_url`: root URL of the shop service
/// - `timeout_seconds`: per-request timeout (default: 10)
pub fn create_shops(config: &toml::Value) -> Result<Box<dyn ShopInterface>, CatalogError> {
	let settings = HttpSettings::from_config(config)?;
	let client = settings.client()?;
	tracing::info!(base_url = %settings.base_url, "Using remote shop service");
	Ok(Box::new(HttpShops { settings, client }))
}

/// Factory function to create an HTTP menu lookup from configuration.
///
/// Configuration parameters:
/// - `base_url`: root URL of the menu service
/// - `timeout_seconds`: per-request timeout (default: 10)
pub fn create_menu(config: &toml::Value) -> Result<Box<dyn MenuInterface>, CatalogError> {
	let settings = HttpSettings::from_config(config)?;
	let client = settings.client()?;
	tracing::info!(base_url = %settings.base_url, "Using remote menu service");
	Ok(Box::new(HttpMenu { settings, client }))
}

/// Registry for the HTTP shop lookup.
pub struct ShopRegistry;

impl ImplementationRegistry for ShopRegistry {
	const NAME: &'static str = "http";
	type Factory = crate::ShopFactory;

	fn factory() -> Self::Factory {
		create_shops
	}
}

impl crate::ShopRegistry for ShopRegistry {}

/// Registry for the HTTP menu lookup.
pub struct MenuRegistry;

impl ImplementationRegistry for MenuRegistry {
	const NAME: &'static str = "http";
	type Factory = crate::MenuFactory;

	fn factory() -> Self::Factory {
		create_menu
	}
}

impl crate::MenuRegistry for MenuRegistry {}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_settings_from_config() {
		let config: toml::Value = toml::from_str(
			r#"
			base_url = "http://localhost:8081/"
			timeout_seconds = 3
			"#,
		)
		.unwrap();
		let settings = HttpSettings::from_config(&config).unwrap();
		let shop_id: ShopId = "11111111-1111-1111-1111-111111111111".parse().unwrap();

		assert_eq!(settings.timeout, Duration::from_secs(3));
		assert_eq!(
			settings.shop_url(shop_id, "config"),
			"http://localhost:8081/api/shops/11111111-1111-1111-1111-111111111111/config"
		);
	}

	#[test]
	fn test_invalid_base_url_is_rejected() {
		let config: toml::Value = toml::from_str(r#"base_url = "localhost""#).unwrap();
		assert!(matches!(
			HttpSettings::from_config(&config),
			Err(CatalogError::Configuration(_))
		));

		let missing = toml::Value::Table(toml::map::Map::new());
		assert!(create_menu(&missing).is_err());
	}
}
