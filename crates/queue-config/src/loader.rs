//! Multi-file configuration loading.
//!
//! A root file may pull in other files with `include = "backends.toml"` or
//! `include = ["backends.toml", "cache.toml"]`, resolved against the root
//! file's directory. Each included file contributes whole top-level sections.
//! A section defined in two files is rejected, and so is a file reached twice.
//! Includes do not nest.

use crate::{resolve_env_vars, Config, ConfigError};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Loads a root configuration file together with its includes.
pub struct ConfigLoader {
	base_dir: PathBuf,
	/// Canonical paths already read.
	visited: HashSet<PathBuf>,
	/// File each top-level section was taken from.
	origins: HashMap<String, PathBuf>,
}

impl ConfigLoader {
	pub fn new(base_dir: impl AsRef<Path>) -> Self {
		Self {
			base_dir: base_dir.as_ref().to_path_buf(),
			visited: HashSet::new(),
			origins: HashMap::new(),
		}
	}

	/// Reads, merges and validates the configuration rooted at `path`.
	pub async fn load_config(&mut self, path: impl AsRef<Path>) -> Result<Config, ConfigError> {
		let root_path = self.locate(path.as_ref())?;
		let mut root = self.read_table(&root_path).await?;
		let includes = take_includes(&mut root)?;
		self.claim_sections(&root, &root_path)?;

		for include in includes {
			let fragment_path = self.locate(&include)?;
			let fragment = self.read_table(&fragment_path).await?;
			if fragment.contains_key("include") {
				return Err(ConfigError::Validation(format!(
					"Nested includes are not supported: {}",
					fragment_path.display()
				)));
			}
			self.claim_sections(&fragment, &fragment_path)?;
			root.extend(fragment);
		}

		let config: Config = toml::Value::Table(root).try_into()?;
		config.validate()?;
		Ok(config)
	}

	/// Reads one file, substituting environment variables before parsing.
	async fn read_table(&mut self, path: &Path) -> Result<toml::Table, ConfigError> {
		let canonical = tokio::fs::canonicalize(path).await?;
		if !self.visited.insert(canonical) {
			return Err(ConfigError::Validation(format!(
				"Circular include detected: {} was already loaded",
				path.display()
			)));
		}

		let raw = tokio::fs::read_to_string(path).await?;
		let resolved = resolve_env_vars(&raw)?;
		Ok(toml::from_str(&resolved)?)
	}

	fn claim_sections(&mut self, table: &toml::Table, source: &Path) -> Result<(), ConfigError> {
		for section in table.keys() {
			if let Some(previous) = self.origins.insert(section.clone(), source.to_path_buf()) {
				return Err(ConfigError::Validation(format!(
					"Duplicate section '{}' found in {} and {}",
					section,
					previous.display(),
					source.display()
				)));
			}
		}
		Ok(())
	}

	fn locate(&self, path: &Path) -> Result<PathBuf, ConfigError> {
		let resolved = self.base_dir.join(path);
		if !resolved.is_file() {
			return Err(ConfigError::Io(std::io::Error::new(
				std::io::ErrorKind::NotFound,
				format!("Configuration file not found: {}", resolved.display()),
			)));
		}
		Ok(resolved)
	}
}

/// Removes the `include` key from a root table and returns its paths.
fn take_includes(root: &mut toml::Table) -> Result<Vec<PathBuf>, ConfigError> {
	match root.remove("include") {
		None => Ok(Vec::new()),
		Some(toml::Value::String(path)) => Ok(vec![PathBuf::from(path)]),
		Some(toml::Value::Array(paths)) => paths
			.into_iter()
			.map(|entry| match entry {
				toml::Value::String(path) => Ok(PathBuf::from(path)),
				other => Err(ConfigError::Validation(format!(
					"include entries must be paths, found {}",
					other.type_str()
				))),
			})
			.collect(),
		Some(other) => Err(ConfigError::Validation(format!(
			"include must be a path or a list of paths, found {}",
			other.type_str()
		))),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::fs;
	use tempfile::TempDir;

	const SERVICE: &str = r#"
[service]
id = "queue-test"
"#;

	const BACKENDS: &str = r#"
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

	#[tokio::test]
	async fn test_single_file_config() {
		let temp_dir = TempDir::new().unwrap();
		let config_path = temp_dir.path().join("config.toml");
		fs::write(&config_path, format!("{}{}", SERVICE, BACKENDS)).unwrap();

		let mut loader = ConfigLoader::new(temp_dir.path());
		let config = loader.load_config(&config_path).await.unwrap();

		assert_eq!(config.service.id, "queue-test");
		assert_eq!(config.storage.primary, "memory");
	}

	#[tokio::test]
	async fn test_config_with_includes() {
		let temp_dir = TempDir::new().unwrap();

		let main_config = format!(
			"include = [\"backends.toml\", \"cache.toml\"]\n{}",
			SERVICE
		);
		let cache_config = r#"
[cache]
snapshot_ttl_seconds = 30
"#;

		fs::write(temp_dir.path().join("main.toml"), main_config).unwrap();
		fs::write(temp_dir.path().join("backends.toml"), BACKENDS).unwrap();
		fs::write(temp_dir.path().join("cache.toml"), cache_config).unwrap();

		let mut loader = ConfigLoader::new(temp_dir.path());
		let config = loader.load_config("main.toml").await.unwrap();

		assert_eq!(config.service.id, "queue-test");
		assert_eq!(config.shop.primary, "fixture");
		assert_eq!(config.cache.snapshot_ttl_seconds, 30);
		assert_eq!(config.cache.shop_config_ttl_seconds, 1800);
	}

	#[tokio::test]
	async fn test_single_string_include() {
		let temp_dir = TempDir::new().unwrap();
		let main_config = format!("include = \"backends.toml\"\n{}", SERVICE);

		fs::write(temp_dir.path().join("main.toml"), main_config).unwrap();
		fs::write(temp_dir.path().join("backends.toml"), BACKENDS).unwrap();

		let config = Config::from_file(
			temp_dir.path().join("main.toml").to_str().unwrap(),
		)
		.await
		.unwrap();
		assert_eq!(config.menu.primary, "fixture");
	}

	#[tokio::test]
	async fn test_duplicate_section_error() {
		let temp_dir = TempDir::new().unwrap();

		let main_config = format!("include = [\"duplicate.toml\"]\n{}{}", SERVICE, BACKENDS);
		let duplicate_config = r#"
[service]
id = "another-queue"
"#;

		fs::write(temp_dir.path().join("main.toml"), main_config).unwrap();
		fs::write(temp_dir.path().join("duplicate.toml"), duplicate_config).unwrap();

		let mut loader = ConfigLoader::new(temp_dir.path());
		let result = loader.load_config("main.toml").await;

		assert!(result.is_err());
		let error_msg = result.unwrap_err().to_string();
		assert!(error_msg.contains("Duplicate section 'service'"));
	}

	#[tokio::test]
	async fn test_self_include_detection() {
		let temp_dir = TempDir::new().unwrap();
		let config = format!("include = [\"self.toml\"]\n{}", SERVICE);
		fs::write(temp_dir.path().join("self.toml"), config).unwrap();

		let mut loader = ConfigLoader::new(temp_dir.path());
		let result = loader.load_config("self.toml").await;

		assert!(result.is_err());
		let error_msg = result.unwrap_err().to_string();
		assert!(error_msg.contains("already loaded"));
	}

	#[tokio::test]
	async fn test_missing_include_is_io_error() {
		let temp_dir = TempDir::new().unwrap();
		let config = format!("include = [\"missing.toml\"]\n{}", SERVICE);
		fs::write(temp_dir.path().join("main.toml"), config).unwrap();

		let mut loader = ConfigLoader::new(temp_dir.path());
		assert!(matches!(
			loader.load_config("main.toml").await,
			Err(ConfigError::Io(_))
		));
	}

	#[tokio::test]
	async fn test_include_entries_must_be_paths() {
		let temp_dir = TempDir::new().unwrap();
		let config = format!("include = [1]\n{}{}", SERVICE, BACKENDS);
		fs::write(temp_dir.path().join("main.toml"), config).unwrap();

		let mut loader = ConfigLoader::new(temp_dir.path());
		let err = loader.load_config("main.toml").await.unwrap_err();
		assert!(err.to_string().contains("include entries must be paths"));
	}
}
