//! Configuration-backed shop and menu lookups.
//!
//! Shops and menus are declared in the configuration file. When nothing is
//! declared, two demo shops with a small coffee menu are served, which is
//! enough to exercise the queue end to end without any remote service.

use crate::{CatalogError, MenuInterface, ShopInterface};
use async_trait::async_trait;
use queue_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, MenuItem, MenuItemId, Schema,
	ShopConfiguration, ShopId, Uuid, ValidationError,
};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

const DEMO_SHOP: u128 = 0x11111111_1111_1111_1111_111111111111;
const SECOND_DEMO_SHOP: u128 = 0x123e4567_e89b_12d3_a456_426614174000;
const DEFAULT_STRATEGY: &str = "MOST_AVAILABLE";

/// Id of the first demo shop.
pub fn demo_shop_id() -> ShopId {
	ShopId(Uuid::from_u128(DEMO_SHOP))
}

fn demo_capacities() -> BTreeMap<u32, u32> {
	BTreeMap::from([(1, 5), (2, 5), (3, 5)])
}

fn menu_item(id: u128, name: &str, price: i64) -> MenuItem {
	MenuItem {
		id: MenuItemId(Uuid::from_u128(id)),
		name: name.to_string(),
		price: Decimal::from(price),
		available: true,
	}
}

fn config_error(message: impl Into<String>) -> CatalogError {
	CatalogError::Configuration(message.into())
}

fn parse_id<T: FromStr>(table: &toml::Value, field: &str) -> Result<T, CatalogError> {
	let raw = table
		.get(field)
		.and_then(|v| v.as_str())
		.ok_or_else(|| config_error(format!("missing '{}'", field)))?;
	raw.parse()
		.map_err(|_| config_error(format!("'{}' is not a valid id: {}", field, raw)))
}

fn parse_price(value: &toml::Value) -> Result<Decimal, String> {
	match value {
		toml::Value::String(s) => Decimal::from_str(s).map_err(|e| e.to_string()),
		toml::Value::Integer(i) => Ok(Decimal::from(*i)),
		toml::Value::Float(f) => Decimal::try_from(*f).map_err(|e| e.to_string()),
		other => Err(format!("expected a price, got {}", other.type_str())),
	}
}

/// Shop lookup over a fixed set of shops.
pub struct FixtureShops {
	shops: HashMap<ShopId, ShopConfiguration>,
}

impl FixtureShops {
	pub fn new(shops: impl IntoIterator<Item = ShopConfiguration>) -> Self {
		Self {
			shops: shops.into_iter().map(|s| (s.shop_id, s)).collect(),
		}
	}

	/// The two demo shops, each with three queues of capacity 5.
	pub fn demo() -> Self {
		Self::new([DEMO_SHOP, SECOND_DEMO_SHOP].into_iter().map(|id| {
			ShopConfiguration {
				shop_id: ShopId(Uuid::from_u128(id)),
				queue_strategy: DEFAULT_STRATEGY.to_string(),
				queue_capacities: demo_capacities(),
			}
		}))
	}

	fn from_config(config: &toml::Value) -> Result<Self, CatalogError> {
		let Some(entries) = config.get("shops").and_then(|v| v.as_array()) else {
			return Ok(Self::demo());
		};

		let mut shops = Vec::with_capacity(entries.len());
		for entry in entries {
			let shop_id: ShopId = parse_id(entry, "id")?;
			let queue_strategy = entry
				.get("queue_strategy")
				.and_then(|v| v.as_str())
				.unwrap_or(DEFAULT_STRATEGY)
				.to_string();

			let mut queue_capacities = BTreeMap::new();
			if let Some(table) = entry.get("queue_capacities").and_then(|v| v.as_table()) {
				for (queue, capacity) in table {
					let queue_number: u32 = queue
						.parse()
						.map_err(|_| config_error(format!("queue number '{}' is not a number", queue)))?;
					let capacity = capacity
						.as_integer()
						.and_then(|c| u32::try_from(c).ok())
						.ok_or_else(|| {
							config_error(format!("capacity of queue {} must be a non-negative integer", queue))
						})?;
					queue_capacities.insert(queue_number, capacity);
				}
			}

			shops.push(ShopConfiguration {
				shop_id,
				queue_strategy,
				queue_capacities,
			});
		}
		Ok(Self::new(shops))
	}
}

#[async_trait]
impl ShopInterface for FixtureShops {
	async fn exists(&self, shop_id: ShopId) -> Result<bool, CatalogError> {
		Ok(self.shops.contains_key(&shop_id))
	}

	async fn get_config(&self, shop_id: ShopId) -> Result<ShopConfiguration, CatalogError> {
		self.shops
			.get(&shop_id)
			.cloned()
			.ok_or(CatalogError::ShopNotFound(shop_id))
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FixtureShopsSchema)
	}
}

/// Configuration schema for FixtureShops.
pub struct FixtureShopsSchema;

impl ConfigSchema for FixtureShopsSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let shop = Schema::new(
			vec![
				Field::new("id", FieldType::String),
				Field::new(
					"queue_capacities",
					FieldType::Map(Box::new(FieldType::Integer {
						min: Some(0),
						max: Some(u32::MAX as i64),
					})),
				),
			],
			vec![Field::new("queue_strategy", FieldType::String)],
		);
		Schema::new(
			vec![],
			vec![Field::new("shops", FieldType::Array(Box::new(FieldType::Table(shop))))],
		)
		.validate(config)
	}
}

/// Menu lookup over fixed menus.
pub struct FixtureMenu {
	menus: HashMap<ShopId, Vec<MenuItem>>,
}

impl FixtureMenu {
	pub fn new(menus: HashMap<ShopId, Vec<MenuItem>>) -> Self {
		Self { menus }
	}

	/// Menus of the two demo shops.
	pub fn demo() -> Self {
		Self::new(HashMap::from([
			(
				ShopId(Uuid::from_u128(DEMO_SHOP)),
				vec![
					menu_item(0xaaaa1111_aaaa_1111_aaaa_111111111111, "Latte", 30),
					menu_item(0xbbbb2222_bbbb_2222_bbbb_222222222222, "Espresso", 25),
					menu_item(0xcccc3333_cccc_3333_cccc_333333333333, "Cappuccino", 28),
				],
			),
			(
				ShopId(Uuid::from_u128(SECOND_DEMO_SHOP)),
				vec![
					menu_item(0x123e4567_e89b_12d3_a456_426614174002, "Black Coffee", 20),
					menu_item(0x123e4567_e89b_12d3_a456_426614174001, "Mocha", 35),
					menu_item(0xffff6666_ffff_6666_ffff_666666666666, "Americano", 22),
				],
			),
		]))
	}

	pub fn into_items(self) -> HashMap<ShopId, Vec<MenuItem>> {
		self.menus
	}

	fn from_config(config: &toml::Value) -> Result<Self, CatalogError> {
		let Some(entries) = config.get("items").and_then(|v| v.as_array()) else {
			return Ok(Self::demo());
		};

		let mut menus: HashMap<ShopId, Vec<MenuItem>> = HashMap::new();
		for entry in entries {
			let shop_id: ShopId = parse_id(entry, "shop_id")?;
			let price = entry
				.get("price")
				.ok_or_else(|| config_error("missing 'price'"))
				.and_then(|v| parse_price(v).map_err(config_error))?;
			let item = MenuItem {
				id: parse_id(entry, "id")?,
				name: entry
					.get("name")
					.and_then(|v| v.as_str())
					.unwrap_or_default()
					.to_string(),
				price,
				available: entry
					.get("available")
					.and_then(|v| v.as_bool())
					.unwrap_or(true),
			};
			menus.entry(shop_id).or_default().push(item);
		}
		Ok(Self::new(menus))
	}
}

#[async_trait]
impl MenuInterface for FixtureMenu {
	async fn get_menu(&self, shop_id: ShopId) -> Result<Vec<MenuItem>, CatalogError> {
		self.menus
			.get(&shop_id)
			.cloned()
			.ok_or(CatalogError::ShopNotFound(shop_id))
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FixtureMenuSchema)
	}
}

/// Configuration schema for FixtureMenu.
pub struct FixtureMenuSchema;

impl ConfigSchema for FixtureMenuSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let item = Schema::new(
			vec![
				Field::new("shop_id", FieldType::String),
				Field::new("id", FieldType::String),
				Field::new("name", FieldType::String),
			],
			vec![Field::new("available", FieldType::Boolean)],
		);
		Schema::new(
			vec![],
			vec![Field::new("items", FieldType::Array(Box::new(FieldType::Table(item))))],
		)
		.validate(config)?;

		// Prices may be written as strings or numbers, so they are checked here.
		if let Some(items) = config.get("items").and_then(|v| v.as_array()) {
			for (i, item) in items.iter().enumerate() {
				let field = format!("items[{}].price", i);
				let value = item
					.get("price")
					.ok_or_else(|| ValidationError::MissingField(field.clone()))?;
				let price = parse_price(value).map_err(|message| ValidationError::InvalidValue {
					field: field.clone(),
					message,
				})?;
				if price.is_sign_negative() && !price.is_zero() {
					return Err(ValidationError::InvalidValue {
						field,
						message: "price cannot be negative".to_string(),
					});
				}
			}
		}
		Ok(())
	}
}

/// Factory function to create a fixture shop lookup from configuration.
///
/// Configuration parameters:
/// - `shops`: array of `{ id, queue_strategy, queue_capacities }` (default: demo shops)
pub fn create_shops(config: &toml::Value) -> Result<Box<dyn ShopInterface>, CatalogError> {
	FixtureShopsSchema
		.validate(config)
		.map_err(|e| CatalogError::Configuration(e.to_string()))?;
	Ok(Box::new(FixtureShops::from_config(config)?))
}

/// Factory function to create a fixture menu lookup from configuration.
///
/// Configuration parameters:
/// - `items`: array of `{ shop_id, id, name, price, available }` (default: demo menus)
pub fn create_menu(config: &toml::Value) -> Result<Box<dyn MenuInterface>, CatalogError> {
	FixtureMenuSchema
		.validate(config)
		.map_err(|e| CatalogError::Configuration(e.to_string()))?;
	Ok(Box::new(FixtureMenu::from_config(config)?))
}

/// Registry for the fixture shop lookup.
pub struct ShopRegistry;

impl ImplementationRegistry for ShopRegistry {
	const NAME: &'static str = "fixture";
	type Factory = crate::ShopFactory;

	fn factory() -> Self::Factory {
		create_shops
	}
}

impl crate::ShopRegistry for ShopRegistry {}

/// Registry for the fixture menu lookup.
pub struct MenuRegistry;

impl ImplementationRegistry for MenuRegistry {
	const NAME: &'static str = "fixture";
	type Factory = crate::MenuFactory;

	fn factory() -> Self::Factory {
		create_menu
	}
}

impl crate::MenuRegistry for MenuRegistry {}
