//! File-based order store.
//!
//! Each order is a JSON document at `<storage_path>/orders/<order_id>.json`.
//! Writes go to a temporary file that is then renamed over the target, so a
//! reader never sees a partial document.
//!
//! Several processes may share one directory. Saves take an exclusive
//! advisory lock on `<storage_path>/sequence.lock`, and the last issued
//! sequence lives in `<storage_path>/sequence` next to it. When that file is
//! missing the counter is recovered from the highest stored sequence.

use crate::{rank_within_queue, sort_by_sequence, OrderStoreInterface, StorageError};
use async_trait::async_trait;
use fs2::FileExt;
use queue_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, Order, OrderId, OrderStatus, Schema,
	ShopId, ValidationError,
};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

const ORDERS_DIR: &str = "orders";
const SEQUENCE_FILE: &str = "sequence";
const SEQUENCE_LOCK_FILE: &str = "sequence.lock";

fn backend_error(e: impl std::fmt::Display) -> StorageError {
	StorageError::Backend(e.to_string())
}

/// Exclusive advisory lock on a file, released when dropped.
struct SequenceGuard {
	_file: std::fs::File,
}

impl SequenceGuard {
	async fn acquire(path: PathBuf) -> Result<Self, StorageError> {
		let file = tokio::task::spawn_blocking(move || -> std::io::Result<std::fs::File> {
			if let Some(dir) = path.parent() {
				std::fs::create_dir_all(dir)?;
			}
			let file = std::fs::OpenOptions::new()
				.write(true)
				.create(true)
				.truncate(false)
				.open(&path)?;
			file.lock_exclusive()?;
			Ok(file)
		})
		.await
		.map_err(backend_error)?
		.map_err(backend_error)?;
		Ok(Self { _file: file })
	}
}

/// File-based order store.
pub struct FileOrderStore {
	/// Base directory path for storing files.
	base_path: PathBuf,
	/// Serializes saves within this process before the file lock is taken.
	write_lock: Mutex<()>,
}

impl FileOrderStore {
	/// Creates a new FileOrderStore rooted at the given directory.
	pub fn new(base_path: PathBuf) -> Self {
		Self {
			base_path,
			write_lock: Mutex::new(()),
		}
	}

	/// Reads the last issued sequence, scanning the orders if no counter
	/// has been written yet. Callers hold the sequence guard.
	async fn last_sequence(&self) -> Result<u64, StorageError> {
		let path = self.base_path.join(SEQUENCE_FILE);
		match fs::read_to_string(&path).await {
			Ok(raw) => raw.trim().parse().map_err(|e| {
				StorageError::Serialization(format!("{}: {}", path.display(), e))
			}),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				let recovered = self
					.load_all()
					.await?
					.iter()
					.filter_map(Order::sequence)
					.max()
					.unwrap_or(0);
				tracing::debug!(recovered, "Recovered order sequence from disk");
				Ok(recovered)
			},
			Err(e) => Err(backend_error(e)),
		}
	}

	async fn store_last_sequence(&self, sequence: u64) -> Result<(), StorageError> {
		let path = self.base_path.join(SEQUENCE_FILE);
		let temp_path = path.with_extension("tmp");
		fs::write(&temp_path, sequence.to_string())
			.await
			.map_err(backend_error)?;
		fs::rename(&temp_path, &path).await.map_err(backend_error)
	}

	fn orders_dir(&self) -> PathBuf {
		self.base_path.join(ORDERS_DIR)
	}

	fn order_path(&self, order_id: OrderId) -> PathBuf {
		self.orders_dir().join(format!("{}.json", order_id))
	}

	async fn read_order(path: &Path) -> Result<Option<Order>, StorageError> {
		let data = match fs::read(path).await {
			Ok(data) => data,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};
		serde_json::from_slice(&data)
			.map(Some)
			.map_err(|e| StorageError::Serialization(format!("{}: {}", path.display(), e)))
	}

	/// Loads every stored order. Stray files are skipped.
	async fn load_all(&self) -> Result<Vec<Order>, StorageError> {
		let dir = self.orders_dir();
		let mut entries = match fs::read_dir(&dir).await {
			Ok(entries) => entries,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};

		let mut orders = Vec::new();
		while let Some(entry) = entries
			.next_entry()
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?
		{
			let path = entry.path();
			if path.extension() != Some(std::ffi::OsStr::new("json")) {
				tracing::debug!("Skipping non-order file {:?}", path);
				continue;
			}
			if let Some(order) = Self::read_order(&path).await? {
				orders.push(order);
			}
		}
		Ok(orders)
	}

	async fn write_order(&self, order: &Order) -> Result<(), StorageError> {
		let dir = self.orders_dir();
		fs::create_dir_all(&dir)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		let bytes =
			serde_json::to_vec_pretty(order).map_err(|e| StorageError::Serialization(e.to_string()))?;

		// Write atomically by writing to temp file then renaming
		let path = self.order_path(order.id());
		let temp_path = path.with_extension("tmp");
		fs::write(&temp_path, bytes)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		fs::rename(&temp_path, &path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		Ok(())
	}
}

#[async_trait]
impl OrderStoreInterface for FileOrderStore {
	async fn save(&self, order: &Order) -> Result<Order, StorageError> {
		let _local = self.write_lock.lock().await;
		let _guard = SequenceGuard::acquire(self.base_path.join(SEQUENCE_LOCK_FILE)).await?;

		let mut stored = order.clone();
		if let Some(existing) = Self::read_order(&self.order_path(order.id()))
			.await?
			.and_then(|o| o.sequence())
		{
			stored.record_sequence(existing);
		}
		if stored.sequence().is_none() {
			let next = self.last_sequence().await? + 1;
			self.store_last_sequence(next).await?;
			stored.record_sequence(next);
		}

		self.write_order(&stored).await?;
		Ok(stored)
	}

	async fn find_by_id(&self, order_id: OrderId) -> Result<Option<Order>, StorageError> {
		Self::read_order(&self.order_path(order_id)).await
	}

	async fn find_by_shop_and_status(
		&self,
		shop_id: ShopId,
		status: OrderStatus,
	) -> Result<Vec<Order>, StorageError> {
		let mut orders: Vec<Order> = self
			.load_all()
			.await?
			.into_iter()
			.filter(|o| o.shop_id() == shop_id && o.status() == status)
			.collect();
		sort_by_sequence(&mut orders);
		Ok(orders)
	}

	async fn find_rank_in_queue(&self, order_id: OrderId) -> Result<Option<usize>, StorageError> {
		let orders = self.load_all().await?;
		let Some(order) = orders.iter().find(|o| o.id() == order_id) else {
			return Ok(None);
		};
		let Some(queue_number) = order.queue_number().filter(|_| order.is_waiting()) else {
			return Ok(None);
		};

		let shop_id = order.shop_id();
		let mut waiting: Vec<Order> = orders
			.iter()
			.filter(|o| o.shop_id() == shop_id && o.is_waiting())
			.cloned()
			.collect();
		sort_by_sequence(&mut waiting);
		Ok(rank_within_queue(&waiting, queue_number, order_id))
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileOrderStoreSchema)
	}
}

/// Configuration schema for FileOrderStore.
pub struct FileOrderStoreSchema;

impl ConfigSchema for FileOrderStoreSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![
				Field::new("storage_path", FieldType::String).with_validator(|value| {
					match value.as_str() {
						Some(path) if path.trim().is_empty() => {
							Err("storage_path cannot be empty".to_string())
						},
						_ => Ok(()),
					}
				}),
			],
		);
		schema.validate(config)
	}
}

/// Factory function to create a file order store from configuration.
///
/// Configuration parameters:
/// - `storage_path`: Base directory for order files (default: "./data/storage")
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn OrderStoreInterface>, StorageError> {
	FileOrderStoreSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;

	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or("./data/storage")
		.to_string();

	Ok(Box::new(FileOrderStore::new(PathBuf::from(storage_path))))
}

/// Registry for the file storage implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = crate::StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl crate::StorageRegistry for Registry {}
