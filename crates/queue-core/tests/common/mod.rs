//! Shared fixtures for the queue integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use queue_assignment::QueueAssignmentEngine;
use queue_catalog::implementations::fixture::{FixtureMenu, FixtureShops};
use queue_catalog::{MenuService, ShopCacheConfig, ShopService};
use queue_core::{OrderLifecycleService, QueueSnapshotService};
use queue_lock::implementations::memory::MemoryLock;
use queue_lock::{Lease, LockConfig, LockError, LockInterface, LockService};
use queue_storage::implementations::memory::MemoryOrderStore;
use queue_storage::{OrderStore, OrderStoreInterface, StorageError};
use queue_types::{
	ConfigSchema, MenuItem, MenuItemId, Order, OrderId, OrderItemRequest, OrderStatus,
	ShopConfiguration, ShopId, Uuid,
};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Artificial latency of the store, in milliseconds.
#[derive(Default)]
pub struct StoreDelays {
	reads_ms: AtomicU64,
	saves_ms: AtomicU64,
}

impl StoreDelays {
	async fn read(&self) {
		Self::pause(&self.reads_ms).await;
	}

	async fn save(&self) {
		Self::pause(&self.saves_ms).await;
	}

	async fn pause(ms: &AtomicU64) {
		let ms = ms.load(Ordering::SeqCst);
		if ms > 0 {
			tokio::time::sleep(Duration::from_millis(ms)).await;
		}
	}
}

/// Memory store that counts writes and can be slowed down.
pub struct CountingStore {
	inner: MemoryOrderStore,
	saves: Arc<AtomicUsize>,
	delays: Arc<StoreDelays>,
}

#[async_trait]
impl OrderStoreInterface for CountingStore {
	async fn save(&self, order: &Order) -> Result<Order, StorageError> {
		self.delays.save().await;
		self.saves.fetch_add(1, Ordering::SeqCst);
		self.inner.save(order).await
	}

	async fn find_by_id(&self, order_id: OrderId) -> Result<Option<Order>, StorageError> {
		self.delays.read().await;
		self.inner.find_by_id(order_id).await
	}

	async fn find_by_shop_and_status(
		&self,
		shop_id: ShopId,
		status: OrderStatus,
	) -> Result<Vec<Order>, StorageError> {
		self.delays.read().await;
		self.inner.find_by_shop_and_status(shop_id, status).await
	}

	async fn find_rank_in_queue(&self, order_id: OrderId) -> Result<Option<usize>, StorageError> {
		self.inner.find_rank_in_queue(order_id).await
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		self.inner.config_schema()
	}
}

/// Memory lock that counts granted leases.
pub struct CountingLock {
	inner: MemoryLock,
	grants: Arc<AtomicUsize>,
}

#[async_trait]
impl LockInterface for CountingLock {
	async fn try_acquire(
		&self,
		key: &str,
		holder_id: &str,
		lease: Duration,
	) -> Result<Lease, LockError> {
		let lease = self.inner.try_acquire(key, holder_id, lease).await?;
		self.grants.fetch_add(1, Ordering::SeqCst);
		Ok(lease)
	}

	async fn release(&self, lease: &Lease) -> Result<bool, LockError> {
		self.inner.release(lease).await
	}

	async fn is_held(&self, lease: &Lease) -> Result<bool, LockError> {
		self.inner.is_held(lease).await
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		self.inner.config_schema()
	}
}

/// A shop with its menu, queues and instrumented backends.
pub struct Harness {
	pub lifecycle: OrderLifecycleService,
	pub snapshots: Arc<QueueSnapshotService>,
	pub store: Arc<OrderStore>,
	pub locks: Arc<LockService>,
	pub saves: Arc<AtomicUsize>,
	pub grants: Arc<AtomicUsize>,
	pub delays: Arc<StoreDelays>,
	pub shop_id: ShopId,
	pub latte: MenuItemId,
	pub sold_out: MenuItemId,
}

pub struct HarnessBuilder {
	shops: Vec<ShopConfiguration>,
	lock: LockConfig,
}

impl HarnessBuilder {
	pub fn new(capacities: &[(u32, u32)]) -> Self {
		Self {
			shops: vec![shop(fixed_shop_id(), "MOST_AVAILABLE", capacities)],
			lock: LockConfig {
				initial_backoff: Duration::from_millis(1),
				max_backoff: Duration::from_millis(10),
				..LockConfig::default()
			},
		}
	}

	pub fn strategy(mut self, strategy: &str) -> Self {
		self.shops[0].queue_strategy = strategy.to_string();
		self
	}

	pub fn with_shop(mut self, config: ShopConfiguration) -> Self {
		self.shops.push(config);
		self
	}

	pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
		self.lock.acquire_timeout = timeout;
		self
	}

	pub fn lease(mut self, lease: Duration) -> Self {
		self.lock.lease = lease;
		self
	}

	pub fn build(self) -> Harness {
		let saves = Arc::new(AtomicUsize::new(0));
		let delays = Arc::new(StoreDelays::default());
		let grants = Arc::new(AtomicUsize::new(0));
		let latte = MenuItemId(Uuid::from_u128(0x1a77e));
		let sold_out = MenuItemId(Uuid::from_u128(0x501d));

		let menus: HashMap<ShopId, Vec<MenuItem>> = self
			.shops
			.iter()
			.map(|s| {
				(
					s.shop_id,
					vec![
						MenuItem {
							id: latte,
							name: "Latte".to_string(),
							price: Decimal::new(350, 2),
							available: true,
						},
						MenuItem {
							id: sold_out,
							name: "Seasonal".to_string(),
							price: Decimal::new(500, 2),
							available: false,
						},
					],
				)
			})
			.collect();
		let shop_id = self.shops[0].shop_id;

		let store = Arc::new(OrderStore::new(Box::new(CountingStore {
			inner: MemoryOrderStore::new(),
			saves: saves.clone(),
			delays: delays.clone(),
		})));
		let locks = Arc::new(LockService::new(
			Box::new(CountingLock {
				inner: MemoryLock::new(),
				grants: grants.clone(),
			}),
			self.lock,
		));
		let shops = Arc::new(ShopService::new(
			Box::new(FixtureShops::new(self.shops)),
			ShopCacheConfig::default(),
		));
		let menu = Arc::new(MenuService::new(Box::new(FixtureMenu::new(menus))));
		let snapshots = Arc::new(QueueSnapshotService::new(
			store.clone(),
			shops.clone(),
			Duration::from_secs(300),
		));
		let engine = QueueAssignmentEngine::from_names(&["most_available"]).unwrap();
		let lifecycle = OrderLifecycleService::new(
			store.clone(),
			shops,
			menu,
			locks.clone(),
			engine,
			snapshots.clone(),
		);

		Harness {
			lifecycle,
			snapshots,
			store,
			locks,
			saves,
			grants,
			delays,
			shop_id,
			latte,
			sold_out,
		}
	}
}

impl Harness {
	pub fn saves(&self) -> usize {
		self.saves.load(Ordering::SeqCst)
	}

	pub fn grants(&self) -> usize {
		self.grants.load(Ordering::SeqCst)
	}

	/// Delays every read of the store from now on.
	pub fn slow_reads(&self, delay: Duration) {
		self.delays
			.reads_ms
			.store(delay.as_millis() as u64, Ordering::SeqCst);
	}

	/// Delays every write to the store from now on.
	pub fn slow_saves(&self, delay: Duration) {
		self.delays
			.saves_ms
			.store(delay.as_millis() as u64, Ordering::SeqCst);
	}

	pub fn one_latte(&self) -> Vec<OrderItemRequest> {
		vec![OrderItemRequest::new(self.latte, 1)]
	}
}

pub fn fixed_shop_id() -> ShopId {
	ShopId(Uuid::from_u128(0x5))
}

pub fn shop(shop_id: ShopId, strategy: &str, capacities: &[(u32, u32)]) -> ShopConfiguration {
	ShopConfiguration {
		shop_id,
		queue_strategy: strategy.to_string(),
		queue_capacities: capacities.iter().copied().collect::<BTreeMap<_, _>>(),
	}
}
