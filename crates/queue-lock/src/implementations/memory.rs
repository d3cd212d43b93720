//! In-process lock backend.
//!
//! Suitable for a single process and for tests. Entries are kept after
//! release so the fencing token of a key keeps increasing across grants.

use crate::{FencingToken, Lease, LockError, LockInterface};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use queue_types::{ConfigSchema, ImplementationRegistry, Schema, ValidationError};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct LockEntry {
	holder_id: String,
	fencing_token: u64,
	expires_at: Instant,
	released: bool,
}

impl LockEntry {
	fn is_live(&self, now: Instant) -> bool {
		!self.released && self.expires_at > now
	}

	fn matches(&self, lease: &Lease) -> bool {
		self.fencing_token == lease.fencing_token.0 && self.holder_id == lease.holder_id
	}
}

/// In-memory lock keyed by string.
#[derive(Default)]
pub struct MemoryLock {
	entries: DashMap<String, LockEntry>,
}

impl MemoryLock {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl LockInterface for MemoryLock {
	async fn try_acquire(
		&self,
		key: &str,
		holder_id: &str,
		lease: Duration,
	) -> Result<Lease, LockError> {
		let now = Instant::now();

		let fencing_token = match self.entries.entry(key.to_string()) {
			Entry::Occupied(mut occupied) => {
				let current = occupied.get();
				if current.is_live(now) {
					return Err(LockError::Held {
						key: key.to_string(),
						holder: current.holder_id.clone(),
					});
				}
				if !current.released {
					tracing::debug!(
						key,
						previous_holder = %current.holder_id,
						"Taking over expired lock"
					);
				}
				let token = current.fencing_token + 1;
				occupied.insert(LockEntry {
					holder_id: holder_id.to_string(),
					fencing_token: token,
					expires_at: now + lease,
					released: false,
				});
				token
			},
			Entry::Vacant(vacant) => {
				vacant.insert(LockEntry {
					holder_id: holder_id.to_string(),
					fencing_token: 1,
					expires_at: now + lease,
					released: false,
				});
				1
			},
		};

		Ok(Lease {
			key: key.to_string(),
			holder_id: holder_id.to_string(),
			fencing_token: FencingToken(fencing_token),
			expires_at: now + lease,
		})
	}

	async fn release(&self, lease: &Lease) -> Result<bool, LockError> {
		let now = Instant::now();
		match self.entries.get_mut(&lease.key) {
			Some(mut entry) if entry.matches(lease) && entry.is_live(now) => {
				entry.released = true;
				Ok(true)
			},
			_ => Ok(false),
		}
	}

	async fn is_held(&self, lease: &Lease) -> Result<bool, LockError> {
		let now = Instant::now();
		Ok(self
			.entries
			.get(&lease.key)
			.map(|entry| entry.matches(lease) && entry.is_live(now))
			.unwrap_or(false))
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryLockSchema)
	}
}

/// Configuration schema for MemoryLock.
pub struct MemoryLockSchema;

impl ConfigSchema for MemoryLockSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).validate(config)
	}
}

/// Factory function to create an in-process lock from configuration.
///
/// Configuration parameters:
/// - None required for the memory lock
pub fn create_lock(_config: &toml::Value) -> Result<Box<dyn LockInterface>, LockError> {
	Ok(Box::new(MemoryLock::new()))
}

/// Registry for the memory lock implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = crate::LockFactory;

	fn factory() -> Self::Factory {
		create_lock
	}
}

impl crate::LockRegistry for Registry {}
