//! Read-through caches with time-to-live and explicit invalidation.
//!
//! Entries expire after a fixed TTL. Writers that change the cached source
//! call [`TtlCache::invalidate`]; each invalidation bumps a per-key
//! generation, and a value computed before the bump is never stored. A reader
//! racing an invalidation therefore cannot put stale data back.

use dashmap::DashMap;
use std::future::Future;
use std::hash::Hash;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Slot<V> {
	generation: u64,
	value: Option<(V, Instant)>,
}

impl<V> Default for Slot<V> {
	fn default() -> Self {
		Self {
			generation: 0,
			value: None,
		}
	}
}

/// A concurrent key-value cache whose entries expire after `ttl`.
#[derive(Debug)]
pub struct TtlCache<K, V>
where
	K: Eq + Hash,
{
	name: &'static str,
	ttl: Duration,
	slots: DashMap<K, Slot<V>>,
}

impl<K, V> TtlCache<K, V>
where
	K: Eq + Hash + Clone + std::fmt::Debug,
	V: Clone,
{
	/// Creates an empty cache. `name` only appears in logs.
	pub fn new(name: &'static str, ttl: Duration) -> Self {
		Self {
			name,
			ttl,
			slots: DashMap::new(),
		}
	}

	/// Returns the cached value if present and not expired.
	pub fn get(&self, key: &K) -> Option<V> {
		let now = Instant::now();
		self.slots.get(key).and_then(|slot| match &slot.value {
			Some((value, stored_at)) if now.duration_since(*stored_at) < self.ttl => {
				Some(value.clone())
			},
			_ => None,
		})
	}

	fn generation(&self, key: &K) -> u64 {
		self.slots.get(key).map(|slot| slot.generation).unwrap_or(0)
	}

	/// Stores `value` unless `key` was invalidated after `generation` was read.
	fn insert_if_current(&self, key: K, value: V, generation: u64) -> bool {
		let mut slot = self.slots.entry(key).or_default();
		if slot.generation != generation {
			return false;
		}
		slot.value = Some((value, Instant::now()));
		true
	}

	/// Stores a value unconditionally.
	pub fn insert(&self, key: K, value: V) {
		let mut slot = self.slots.entry(key).or_default();
		slot.value = Some((value, Instant::now()));
	}

	/// Returns the cached value, or loads it with `load` and caches the result.
	///
	/// Load errors are returned as-is and nothing is cached.
	pub async fn get_or_try_insert_with<E, F, Fut>(&self, key: &K, load: F) -> Result<V, E>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<V, E>>,
	{
		if let Some(value) = self.get(key) {
			tracing::trace!(cache = self.name, ?key, "Cache hit");
			return Ok(value);
		}

		let generation = self.generation(key);
		let value = load().await?;
		if !self.insert_if_current(key.clone(), value.clone(), generation) {
			tracing::debug!(
				cache = self.name,
				?key,
				"Discarding value loaded before invalidation"
			);
		}
		Ok(value)
	}

	/// Drops the entry for `key` and fences out loads already in flight.
	pub fn invalidate(&self, key: &K) {
		let mut slot = self.slots.entry(key.clone()).or_default();
		slot.generation += 1;
		slot.value = None;
		tracing::trace!(cache = self.name, ?key, "Cache entry invalidated");
	}

	/// Number of keys with a live value.
	pub fn len(&self) -> usize {
		let now = Instant::now();
		self.slots
			.iter()
			.filter(|slot| {
				matches!(&slot.value, Some((_, stored_at)) if now.duration_since(*stored_at) < self.ttl)
			})
			.count()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}
