//! Lock backend shared between processes through a directory.
//!
//! Each key has a JSON record at `<lock_dir>/<key>.lock` naming the holder,
//! the fencing token and the wall-clock expiry. A record is only read and
//! rewritten while an exclusive advisory lock is held on its file, so every
//! process pointing at the same directory sees one holder per key. Released
//! records are kept so fencing tokens keep increasing across grants.
//!
//! Characters of the key outside `[A-Za-z0-9_-]` map to `_` in the file name.

use crate::{FencingToken, Lease, LockError, LockInterface};
use async_trait::async_trait;
use fs2::FileExt;
use queue_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, ValidationError,
};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

const DEFAULT_LOCK_DIR: &str = "./data/locks";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LockRecord {
	holder_id: String,
	fencing_token: u64,
	/// Milliseconds since the Unix epoch.
	expires_at_ms: u64,
	released: bool,
}

impl LockRecord {
	fn is_live(&self, now_ms: u64) -> bool {
		!self.released && self.expires_at_ms > now_ms
	}

	fn matches(&self, lease: &Lease) -> bool {
		self.fencing_token == lease.fencing_token.0 && self.holder_id == lease.holder_id
	}
}

fn now_ms() -> u64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|d| d.as_millis() as u64)
		.unwrap_or(0)
}

fn io_error(e: std::io::Error) -> LockError {
	LockError::Backend(e.to_string())
}

/// Lock over record files in a shared directory.
pub struct FileLock {
	lock_dir: PathBuf,
}

impl FileLock {
	pub fn new(lock_dir: PathBuf) -> Self {
		Self { lock_dir }
	}

	fn record_path(&self, key: &str) -> PathBuf {
		let file_name: String = key
			.chars()
			.map(|c| {
				if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
					c
				} else {
					'_'
				}
			})
			.collect();
		self.lock_dir.join(format!("{}.lock", file_name))
	}

	/// Runs `update` on the record of `key` under the file's advisory lock.
	///
	/// `update` returns the record to write back, or `None` to leave the
	/// file untouched, together with its result.
	async fn with_record<T, F>(&self, key: &str, update: F) -> Result<T, LockError>
	where
		T: Send + 'static,
		F: FnOnce(Option<LockRecord>) -> (Option<LockRecord>, T) + Send + 'static,
	{
		let path = self.record_path(key);
		tokio::task::spawn_blocking(move || locked_update(&path, update))
			.await
			.map_err(|e| LockError::Backend(format!("lock file task failed: {}", e)))?
	}
}

fn locked_update<T>(
	path: &Path,
	update: impl FnOnce(Option<LockRecord>) -> (Option<LockRecord>, T),
) -> Result<T, LockError> {
	if let Some(dir) = path.parent() {
		std::fs::create_dir_all(dir).map_err(io_error)?;
	}
	let mut file = OpenOptions::new()
		.read(true)
		.write(true)
		.create(true)
		.truncate(false)
		.open(path)
		.map_err(io_error)?;
	file.lock_exclusive().map_err(io_error)?;

	// Closing the file releases the advisory lock.
	read_modify_write(&mut file, update)
}

fn read_modify_write<T>(
	file: &mut File,
	update: impl FnOnce(Option<LockRecord>) -> (Option<LockRecord>, T),
) -> Result<T, LockError> {
	let mut raw = String::new();
	file.read_to_string(&mut raw).map_err(io_error)?;
	let current = if raw.trim().is_empty() {
		None
	} else {
		let record = serde_json::from_str::<LockRecord>(&raw)
			.map_err(|e| LockError::Backend(format!("corrupt lock record: {}", e)))?;
		Some(record)
	};

	let (next, value) = update(current);
	if let Some(record) = next {
		let bytes = serde_json::to_vec(&record).map_err(|e| LockError::Backend(e.to_string()))?;
		file.set_len(0).map_err(io_error)?;
		file.seek(SeekFrom::Start(0)).map_err(io_error)?;
		file.write_all(&bytes).map_err(io_error)?;
		file.sync_data().map_err(io_error)?;
	}
	Ok(value)
}

#[async_trait]
impl LockInterface for FileLock {
	async fn try_acquire(
		&self,
		key: &str,
		holder_id: &str,
		lease: Duration,
	) -> Result<Lease, LockError> {
		let started = Instant::now();
		let holder = holder_id.to_string();
		let lease_ms = lease.as_millis() as u64;

		let granted = self
			.with_record(key, move |current| {
				let now = now_ms();
				match current {
					Some(record) if record.is_live(now) => (None, Err(record.holder_id)),
					previous => {
						let token = previous.map_or(1, |r| r.fencing_token + 1);
						let record = LockRecord {
							holder_id: holder,
							fencing_token: token,
							expires_at_ms: now + lease_ms,
							released: false,
						};
						(Some(record), Ok(token))
					},
				}
			})
			.await?;

		match granted {
			Ok(token) => Ok(Lease {
				key: key.to_string(),
				holder_id: holder_id.to_string(),
				fencing_token: FencingToken(token),
				expires_at: started + lease,
			}),
			Err(holder) => Err(LockError::Held {
				key: key.to_string(),
				holder,
			}),
		}
	}

	async fn release(&self, lease: &Lease) -> Result<bool, LockError> {
		let key = lease.key.clone();
		let lease = lease.clone();
		self.with_record(&key, move |current| match current {
			Some(mut record) if record.matches(&lease) && record.is_live(now_ms()) => {
				record.released = true;
				(Some(record), true)
			},
			_ => (None, false),
		})
		.await
	}

	async fn is_held(&self, lease: &Lease) -> Result<bool, LockError> {
		let key = lease.key.clone();
		let lease = lease.clone();
		self.with_record(&key, move |current| {
			let held = current.is_some_and(|r| r.matches(&lease) && r.is_live(now_ms()));
			(None, held)
		})
		.await
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileLockSchema)
	}
}

/// Configuration schema for FileLock.
pub struct FileLockSchema;

impl ConfigSchema for FileLockSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(
			vec![],
			vec![Field::new("lock_dir", FieldType::String).with_validator(|value| {
				match value.as_str() {
					Some(dir) if dir.trim().is_empty() => Err("lock_dir cannot be empty".to_string()),
					_ => Ok(()),
				}
			})],
		)
		.validate(config)
	}
}

/// Factory function to create a directory-backed lock from configuration.
///
/// Configuration parameters:
/// - `lock_dir`: directory shared by every process (default: "./data/locks")
pub fn create_lock(config: &toml::Value) -> Result<Box<dyn LockInterface>, LockError> {
	FileLockSchema
		.validate(config)
		.map_err(|e| LockError::Configuration(e.to_string()))?;

	let lock_dir = config
		.get("lock_dir")
		.and_then(|v| v.as_str())
		.unwrap_or(DEFAULT_LOCK_DIR);
	tracing::info!(lock_dir, "Using directory lock");
	Ok(Box::new(FileLock::new(PathBuf::from(lock_dir))))
}

/// Registry for the file lock implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = crate::LockFactory;

	fn factory() -> Self::Factory {
		create_lock
	}
}

impl crate::LockRegistry for Registry {}
