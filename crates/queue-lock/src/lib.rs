//! Per-shop mutual exclusion for the queue system.
//!
//! Every mutation of a shop's queues runs inside [`LockService::with_lock`].
//! A lock is a lease: it expires on its own after the configured lease time,
//! so a crashed holder cannot block a shop forever. Each grant carries a
//! fencing token that increases per key; release and liveness checks compare
//! that token, so a holder whose lease lapsed can never release a lock that
//! was granted to someone else.

use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use queue_types::{ConfigSchema, ImplementationRegistry, ShopId};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::instrument;

/// Re-export implementations
pub mod implementations {
	pub mod file;
	pub mod memory;
}

/// Errors that can occur during lock operations.
#[derive(Debug, Clone, Error)]
pub enum LockError {
	/// The lock is currently held by another holder.
	#[error("Lock '{key}' is held by {holder}")]
	Held { key: String, holder: String },
	/// The lock could not be acquired within the acquire timeout.
	#[error("Timed out after {waited_ms}ms waiting for lock '{key}'")]
	Timeout { key: String, waited_ms: u64 },
	/// The lease ran out while the protected action was still running.
	#[error("Lease on lock '{key}' expired before the operation completed")]
	LeaseExpired { key: String },
	/// Error that occurs in the lock backend.
	#[error("Backend error: {0}")]
	Backend(String),
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

impl LockError {
	/// Whether the caller may retry the whole operation later.
	pub fn is_retryable(&self) -> bool {
		matches!(self, LockError::Held { .. } | LockError::Timeout { .. })
	}
}

/// Monotonically increasing token identifying one grant of a lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FencingToken(pub u64);

impl fmt::Display for FencingToken {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Record of a granted lease, as returned by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
	pub key: String,
	pub holder_id: String,
	pub fencing_token: FencingToken,
	pub expires_at: Instant,
}

/// Trait defining the interface for lock backends.
///
/// Backends only need non-blocking primitives; waiting and retrying is done
/// by [`LockService`].
#[async_trait]
pub trait LockInterface: Send + Sync {
	/// Grants the lock to `holder_id` for `lease`, or fails with
	/// [`LockError::Held`] when a live lease exists.
	async fn try_acquire(
		&self,
		key: &str,
		holder_id: &str,
		lease: Duration,
	) -> Result<Lease, LockError>;

	/// Releases the lock if it is still held under this lease's token.
	///
	/// Returns `false` when the lease had already expired or the lock was
	/// granted to another holder in the meantime.
	async fn release(&self, lease: &Lease) -> Result<bool, LockError>;

	/// Checks whether this lease is still the live holder of its key.
	async fn is_held(&self, lease: &Lease) -> Result<bool, LockError>;

	/// Returns the configuration schema for validation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;
}

/// Type alias for lock factory functions.
pub type LockFactory = fn(&toml::Value) -> Result<Box<dyn LockInterface>, LockError>;

/// Registry trait for lock implementations.
pub trait LockRegistry: ImplementationRegistry<Factory = LockFactory> {}

/// Get all registered lock implementations.
pub fn get_all_implementations() -> Vec<(&'static str, LockFactory)> {
	use implementations::{file, memory};

	vec![
		(file::Registry::NAME, file::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

/// Timing and naming settings for [`LockService`].
#[derive(Debug, Clone)]
pub struct LockConfig {
	/// Prefix of every lock key.
	pub key_prefix: String,
	/// Maximum time to wait for a lock.
	pub acquire_timeout: Duration,
	/// Time after which a granted lock expires on its own.
	pub lease: Duration,
	/// First wait between acquisition attempts.
	pub initial_backoff: Duration,
	/// Upper bound on the wait between acquisition attempts.
	pub max_backoff: Duration,
}

impl Default for LockConfig {
	fn default() -> Self {
		Self {
			key_prefix: "queue-lock".to_string(),
			acquire_timeout: Duration::from_secs(5),
			lease: Duration::from_secs(10),
			initial_backoff: Duration::from_millis(10),
			max_backoff: Duration::from_millis(250),
		}
	}
}

/// A held lock, handed to the action running under it.
///
/// Cloning is cheap; every clone refers to the same grant.
#[derive(Clone)]
pub struct LeaseGuard {
	lease: Lease,
	backend: Arc<dyn LockInterface>,
}

impl fmt::Debug for LeaseGuard {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("LeaseGuard")
			.field("lease", &self.lease)
			.finish_non_exhaustive()
	}
}

impl LeaseGuard {
	pub fn key(&self) -> &str {
		&self.lease.key
	}

	pub fn fencing_token(&self) -> FencingToken {
		self.lease.fencing_token
	}

	pub fn lease(&self) -> &Lease {
		&self.lease
	}

	/// Fails with [`LockError::LeaseExpired`] unless this grant is still live.
	///
	/// Call before persisting anything that relies on exclusivity.
	pub async fn ensure_held(&self) -> Result<(), LockError> {
		if self.backend.is_held(&self.lease).await? {
			Ok(())
		} else {
			Err(LockError::LeaseExpired {
				key: self.lease.key.clone(),
			})
		}
	}
}

/// Runs actions under per-key leases with bounded waiting.
pub struct LockService {
	backend: Arc<dyn LockInterface>,
	config: LockConfig,
}

impl LockService {
	/// Creates a new LockService with the specified backend and settings.
	pub fn new(backend: Box<dyn LockInterface>, config: LockConfig) -> Self {
		Self {
			backend: Arc::from(backend),
			config,
		}
	}

	pub fn config(&self) -> &LockConfig {
		&self.config
	}

	/// Lock key guarding every queue of a shop.
	pub fn shop_key(&self, shop_id: ShopId) -> String {
		format!("{}:shop:{}", self.config.key_prefix, shop_id)
	}

	/// Acquires `key`, waiting with exponential backoff and jitter for at
	/// most the configured acquire timeout.
	#[instrument(skip(self), fields(timeout_ms = self.config.acquire_timeout.as_millis() as u64))]
	pub async fn acquire(&self, key: &str) -> Result<LeaseGuard, LockError> {
		let holder_id = uuid::Uuid::new_v4().to_string();
		let started = Instant::now();

		let policy = ExponentialBackoffBuilder::new()
			.with_initial_interval(self.config.initial_backoff)
			.with_max_interval(self.config.max_backoff)
			.with_max_elapsed_time(Some(self.config.acquire_timeout))
			.build();

		let backend = &self.backend;
		let holder = holder_id.as_str();
		let lease_duration = self.config.lease;

		let result = backoff::future::retry(policy, || async move {
			match backend.try_acquire(key, holder, lease_duration).await {
				Ok(lease) => Ok(lease),
				Err(e @ LockError::Held { .. }) => {
					tracing::trace!(key, error = %e, "Lock busy, backing off");
					Err(backoff::Error::transient(e))
				},
				Err(e) => Err(backoff::Error::permanent(e)),
			}
		})
		.await;

		match result {
			Ok(lease) => {
				tracing::debug!(
					key,
					fencing_token = %lease.fencing_token,
					waited_ms = started.elapsed().as_millis() as u64,
					"Lock acquired"
				);
				Ok(LeaseGuard {
					lease,
					backend: self.backend.clone(),
				})
			},
			Err(LockError::Held { .. }) => {
				let waited_ms = started.elapsed().as_millis() as u64;
				tracing::warn!(key, waited_ms, "Timed out waiting for lock");
				Err(LockError::Timeout {
					key: key.to_string(),
					waited_ms,
				})
			},
			Err(e) => Err(e),
		}
	}

	/// Releases a grant. A lapsed or superseded grant is left alone.
	pub async fn release(&self, guard: &LeaseGuard) -> Result<(), LockError> {
		if self.backend.release(&guard.lease).await? {
			tracing::debug!(key = %guard.lease.key, fencing_token = %guard.lease.fencing_token, "Lock released");
		} else {
			tracing::warn!(
				key = %guard.lease.key,
				fencing_token = %guard.lease.fencing_token,
				"Lock was no longer held at release"
			);
		}
		Ok(())
	}

	/// Runs `action` while holding `key`.
	///
	/// The lock is released whatever the action returns. An action that
	/// succeeds after its lease lapsed is reported as
	/// [`LockError::LeaseExpired`], since its exclusivity can no longer be
	/// vouched for.
	pub async fn with_lock<T, E, F, Fut>(&self, key: &str, action: F) -> Result<T, E>
	where
		F: FnOnce(LeaseGuard) -> Fut,
		Fut: Future<Output = Result<T, E>>,
		E: From<LockError>,
	{
		let guard = self.acquire(key).await?;
		let outcome = action(guard.clone()).await;

		let still_held = match &outcome {
			Ok(_) => self.backend.is_held(&guard.lease).await,
			Err(_) => Ok(true),
		};

		if let Err(e) = self.release(&guard).await {
			tracing::warn!(key, error = %e, "Failed to release lock");
		}

		match (outcome, still_held) {
			(Ok(_), Err(e)) => {
				tracing::error!(key, error = %e, "Could not confirm the lease after the operation");
				Err(E::from(e))
			},
			(Ok(_), Ok(false)) => {
				tracing::error!(
					key,
					fencing_token = %guard.lease.fencing_token,
					"Lease expired while the operation was running"
				);
				Err(E::from(LockError::LeaseExpired {
					key: key.to_string(),
				}))
			},
			(outcome, _) => outcome,
		}
	}

	/// Convenience wrapper running `action` under the lock of a shop.
	pub async fn with_shop_lock<T, E, F, Fut>(&self, shop_id: ShopId, action: F) -> Result<T, E>
	where
		F: FnOnce(LeaseGuard) -> Fut,
		Fut: Future<Output = Result<T, E>>,
		E: From<LockError>,
	{
		let key = self.shop_key(shop_id);
		self.with_lock(&key, action).await
	}
}
