//! Configuration for the order queue system.
//!
//! A configuration is a TOML document with one section per concern. Values
//! may reference the environment as `${VAR}` or `${VAR:-default}`. A root
//! file can split sections across other files with `include`; see
//! [`Config::from_file`].

mod loader;

#[cfg(feature = "testing")]
pub mod builders {
	pub mod config;
}

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Malformed TOML or a section of the wrong shape.
	#[error("Parse error: {0}")]
	Parse(String),
	/// Well-formed but unusable values.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// message() omits the echoed source document
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration structure for the queue system.
///
/// Backend sections (`storage`, `lock`, `shop`, `menu`) name a primary
/// implementation and carry each implementation's raw TOML table; those
/// tables are validated by the backend's own schema when the system is built.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Identity of this service instance.
	pub service: ServiceConfig,
	/// Configuration for order persistence.
	pub storage: StorageConfig,
	/// Configuration for the per-shop lock.
	#[serde(default)]
	pub lock: LockConfig,
	/// Configuration for shop lookups.
	pub shop: CatalogConfig,
	/// Configuration for menu lookups.
	pub menu: CatalogConfig,
	/// Cache lifetimes.
	#[serde(default)]
	pub cache: CacheConfig,
	/// Queue assignment strategies.
	#[serde(default)]
	pub assignment: AssignmentConfig,
}

/// Configuration specific to the service instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
	/// Unique identifier for this instance.
	pub id: String,
}

/// Configuration for the storage backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of storage implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration for the lock backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LockConfig {
	/// Which implementation to use as primary.
	#[serde(default = "default_lock_primary")]
	pub primary: String,
	/// How long to wait for a lock before giving up.
	#[serde(default = "default_acquire_timeout_ms")]
	pub acquire_timeout_ms: u64,
	/// How long a granted lock stays valid without being released.
	#[serde(default = "default_lease_ms")]
	pub lease_ms: u64,
	/// Prefix of every lock key.
	#[serde(default = "default_key_prefix")]
	pub key_prefix: String,
	/// Map of lock implementation names to their configurations.
	#[serde(default = "default_lock_implementations")]
	pub implementations: HashMap<String, toml::Value>,
}

impl LockConfig {
	pub fn acquire_timeout(&self) -> Duration {
		Duration::from_millis(self.acquire_timeout_ms)
	}

	pub fn lease(&self) -> Duration {
		Duration::from_millis(self.lease_ms)
	}
}

impl Default for LockConfig {
	fn default() -> Self {
		Self {
			primary: default_lock_primary(),
			acquire_timeout_ms: default_acquire_timeout_ms(),
			lease_ms: default_lease_ms(),
			key_prefix: default_key_prefix(),
			implementations: default_lock_implementations(),
		}
	}
}

fn default_lock_primary() -> String {
	"memory".to_string()
}

fn default_acquire_timeout_ms() -> u64 {
	5_000
}

fn default_lease_ms() -> u64 {
	10_000
}

fn default_key_prefix() -> String {
	"queue-lock".to_string()
}

fn default_lock_implementations() -> HashMap<String, toml::Value> {
	HashMap::from([(
		default_lock_primary(),
		toml::Value::Table(toml::map::Map::new()),
	)])
}

/// Configuration for a shop or menu lookup backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CatalogConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of lookup implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Cache lifetimes in seconds.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
	#[serde(default = "default_snapshot_ttl_seconds")]
	pub snapshot_ttl_seconds: u64,
	#[serde(default = "default_shop_exists_ttl_seconds")]
	pub shop_exists_ttl_seconds: u64,
	#[serde(default = "default_shop_config_ttl_seconds")]
	pub shop_config_ttl_seconds: u64,
}

impl CacheConfig {
	pub fn snapshot_ttl(&self) -> Duration {
		Duration::from_secs(self.snapshot_ttl_seconds)
	}

	pub fn shop_exists_ttl(&self) -> Duration {
		Duration::from_secs(self.shop_exists_ttl_seconds)
	}

	pub fn shop_config_ttl(&self) -> Duration {
		Duration::from_secs(self.shop_config_ttl_seconds)
	}
}

impl Default for CacheConfig {
	fn default() -> Self {
		Self {
			snapshot_ttl_seconds: default_snapshot_ttl_seconds(),
			shop_exists_ttl_seconds: default_shop_exists_ttl_seconds(),
			shop_config_ttl_seconds: default_shop_config_ttl_seconds(),
		}
	}
}

fn default_snapshot_ttl_seconds() -> u64 {
	300
}

fn default_shop_exists_ttl_seconds() -> u64 {
	600
}

fn default_shop_config_ttl_seconds() -> u64 {
	1800
}

/// Configuration for queue assignment.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssignmentConfig {
	/// Strategy names in registration order. The first strategy that
	/// supports a shop's configured strategy is used.
	#[serde(default = "default_strategies")]
	pub strategies: Vec<String>,
}

impl Default for AssignmentConfig {
	fn default() -> Self {
		Self {
			strategies: default_strategies(),
		}
	}
}

fn default_strategies() -> Vec<String> {
	vec!["most_available".to_string()]
}

/// Substitutes `${VAR}` and `${VAR:-default}` from the process environment.
///
/// An unset variable without a default is an error. Input is capped at 1 MiB
/// so the pattern never runs over unbounded text.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_BYTES: usize = 1 << 20;
	if input.len() > MAX_INPUT_BYTES {
		return Err(ConfigError::Validation(format!(
			"Configuration is {} bytes, the limit is {}",
			input.len(),
			MAX_INPUT_BYTES
		)));
	}

	let pattern = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Invalid substitution pattern: {}", e)))?;

	let mut missing: Option<String> = None;
	let resolved = pattern.replace_all(input, |caps: &regex::Captures<'_>| {
		let name = &caps[1];
		match (std::env::var(name), caps.get(2)) {
			(Ok(value), _) => value,
			(Err(_), Some(default)) => default.as_str().to_string(),
			(Err(_), None) => {
				missing.get_or_insert_with(|| name.to_string());
				String::new()
			},
		}
	});

	match missing {
		Some(name) => Err(ConfigError::Validation(format!(
			"Environment variable '{}' not found",
			name
		))),
		None => Ok(resolved.into_owned()),
	}
}

impl Config {
	/// Loads, merges and validates the configuration rooted at `path`.
	///
	/// The root file may contain `include = "other.toml"` or a list of paths,
	/// relative to its own directory. Every top-level section must come from
	/// exactly one file.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let root = Path::new(path);
		let file_name = root
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Not a configuration file: {}", path)))?;
		let dir = root.parent().unwrap_or_else(|| Path::new("."));

		loader::ConfigLoader::new(dir).load_config(file_name).await
	}

	/// Rejects values no backend could run with.
	///
	/// Backend-specific tables are left to the backends' own schemas, and
	/// strategy names are resolved when the assignment engine is built.
	fn validate(&self) -> Result<(), ConfigError> {
		if self.service.id.trim().is_empty() {
			return Err(ConfigError::Validation("Service ID cannot be empty".into()));
		}

		validate_primary("storage", &self.storage.primary, &self.storage.implementations)?;
		validate_primary("lock", &self.lock.primary, &self.lock.implementations)?;
		validate_primary("shop", &self.shop.primary, &self.shop.implementations)?;
		validate_primary("menu", &self.menu.primary, &self.menu.implementations)?;

		if self.lock.lease_ms == 0 {
			return Err(ConfigError::Validation(
				"Lock lease_ms must be greater than 0".into(),
			));
		}
		if self.lock.acquire_timeout_ms == 0 {
			return Err(ConfigError::Validation(
				"Lock acquire_timeout_ms must be greater than 0".into(),
			));
		}
		if self.lock.key_prefix.trim().is_empty() {
			return Err(ConfigError::Validation(
				"Lock key_prefix cannot be empty".into(),
			));
		}

		for (name, ttl) in [
			("snapshot_ttl_seconds", self.cache.snapshot_ttl_seconds),
			("shop_exists_ttl_seconds", self.cache.shop_exists_ttl_seconds),
			("shop_config_ttl_seconds", self.cache.shop_config_ttl_seconds),
		] {
			if ttl == 0 {
				return Err(ConfigError::Validation(format!(
					"Cache {} must be greater than 0",
					name
				)));
			}
		}

		if self.assignment.strategies.is_empty() {
			return Err(ConfigError::Validation(
				"At least one assignment strategy must be configured".into(),
			));
		}
		if self.assignment.strategies.iter().any(|s| s.trim().is_empty()) {
			return Err(ConfigError::Validation(
				"Assignment strategy names cannot be empty".into(),
			));
		}

		Ok(())
	}
}

fn validate_primary(
	section: &str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
) -> Result<(), ConfigError> {
	if implementations.is_empty() {
		return Err(ConfigError::Validation(format!(
			"At least one {} implementation must be configured",
			section
		)));
	}
	if primary.is_empty() {
		return Err(ConfigError::Validation(format!(
			"{} primary implementation cannot be empty",
			section
		)));
	}
	if !implementations.contains_key(primary) {
		return Err(ConfigError::Validation(format!(
			"Primary {} '{}' not found in implementations",
			section, primary
		)));
	}
	Ok(())
}

/// Parses a single document; `include` is not followed.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const MINIMAL: &str = r#"
[service]
id = "queue-1"

[storage]
primary = "memory"
[storage.implementations.memory]

[shop]
primary = "fixture"
[shop.implementations.fixture]

[menu]
primary = "fixture"
[menu.implementations.fixture]
"#;

	#[test]
	fn test_env_var_resolution() {
		std::env::set_var("QUEUE_TEST_HOST", "localhost");
		std::env::set_var("QUEUE_TEST_PORT", "8081");

		let input = "url = \"http://${QUEUE_TEST_HOST}:${QUEUE_TEST_PORT}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "url = \"http://localhost:8081\"");

		std::env::remove_var("QUEUE_TEST_HOST");
		std::env::remove_var("QUEUE_TEST_PORT");
	}

	#[test]
	fn test_env_var_with_default() {
		let input = "value = \"${QUEUE_MISSING_VAR:-default_value}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "value = \"default_value\"");
	}

	#[test]
	fn test_missing_env_var_error() {
		let input = "value = \"${QUEUE_MISSING_VAR}\"";
		let result = resolve_env_vars(input);
		assert!(result.is_err());
		assert!(result.unwrap_err().to_string().contains("QUEUE_MISSING_VAR"));
	}

	#[test]
	fn test_minimal_config_gets_defaults() {
		let config: Config = MINIMAL.parse().unwrap();

		assert_eq!(config.service.id, "queue-1");
		assert_eq!(config.lock.primary, "memory");
		assert_eq!(config.lock.acquire_timeout(), Duration::from_secs(5));
		assert_eq!(config.lock.lease(), Duration::from_secs(10));
		assert_eq!(config.lock.key_prefix, "queue-lock");
		assert_eq!(config.cache.snapshot_ttl(), Duration::from_secs(300));
		assert_eq!(config.cache.shop_exists_ttl(), Duration::from_secs(600));
		assert_eq!(config.cache.shop_config_ttl(), Duration::from_secs(1800));
		assert_eq!(config.assignment.strategies, vec!["most_available"]);
	}

	#[test]
	fn test_config_with_env_vars() {
		std::env::set_var("QUEUE_TEST_SERVICE_ID", "queue-from-env");

		let config_str = MINIMAL.replace("\"queue-1\"", "\"${QUEUE_TEST_SERVICE_ID}\"");
		let config: Config = config_str.parse().unwrap();
		assert_eq!(config.service.id, "queue-from-env");

		std::env::remove_var("QUEUE_TEST_SERVICE_ID");
	}

	#[test]
	fn test_empty_service_id_rejected() {
		let result = MINIMAL.replace("\"queue-1\"", "\"\"").parse::<Config>();
		assert!(matches!(result, Err(ConfigError::Validation(msg)) if msg.contains("Service ID")));
	}

	#[test]
	fn test_unknown_primary_rejected() {
		let config_str = MINIMAL.replacen("primary = \"memory\"", "primary = \"redis\"", 1);
		let err = config_str.parse::<Config>().unwrap_err();
		assert!(err.to_string().contains("Primary storage 'redis'"));
	}

	#[test]
	fn test_zero_lease_rejected() {
		let config_str = format!(
			"{}\n[lock]\nlease_ms = 0\n[lock.implementations.memory]\n",
			MINIMAL
		);
		let err = config_str.parse::<Config>().unwrap_err();
		assert!(err.to_string().contains("lease_ms"));

		let config_str = format!("{}\n[lock]\nacquire_timeout_ms = 0\n", MINIMAL);
		let err = config_str.parse::<Config>().unwrap_err();
		assert!(err.to_string().contains("acquire_timeout_ms"));
	}

	#[test]
	fn test_empty_strategy_list_rejected() {
		let config_str = format!("{}\n[assignment]\nstrategies = []\n", MINIMAL);
		let err = config_str.parse::<Config>().unwrap_err();
		assert!(err.to_string().contains("assignment strategy"));
	}

	#[test]
	fn test_zero_cache_ttl_rejected() {
		let config_str = format!("{}\n[cache]\nsnapshot_ttl_seconds = 0\n", MINIMAL);
		let err = config_str.parse::<Config>().unwrap_err();
		assert!(err.to_string().contains("snapshot_ttl_seconds"));
	}

	#[test]
	fn test_missing_section_is_parse_error() {
		let config_str = MINIMAL.replace("[menu]\nprimary = \"fixture\"\n[menu.implementations.fixture]\n", "");
		assert!(matches!(
			config_str.parse::<Config>(),
			Err(ConfigError::Parse(_))
		));
	}
}
