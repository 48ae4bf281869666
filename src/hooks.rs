use crate::compose::MapData;
use crate::config::DatasetsConfig;
use crate::data::{Boundaries, Coverage, Dataset, Stations, Totals};
use crate::error::DataError;
use crate::source::DataSource;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::any::Any;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Expiry and retry behaviour of the cache. The default never expires and
/// never retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePolicy {
    /// Age after which a resolved entry is refetched on the next read.
    pub ttl: Option<Duration>,
    /// Extra attempts after a transient failure.
    pub retry_attempts: u32,
    /// Delay before the first retry, multiplied by the attempt number.
    pub retry_backoff: Duration,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            ttl: None,
            retry_attempts: 0,
            retry_backoff: Duration::from_millis(250),
        }
    }
}

#[derive(Clone)]
struct Resolved {
    records: Arc<dyn Any + Send + Sync>,
    at: Instant,
}

type SharedFetch = Shared<BoxFuture<'static, Result<Resolved, DataError>>>;

struct Entry {
    epoch: u64,
    fetch: SharedFetch,
}

#[derive(Debug)]
pub enum DatasetState<R> {
    Idle,
    Pending,
    Ready(Arc<R>),
    Failed(DataError),
}

impl<R> DatasetState<R> {
    pub fn data(&self) -> Option<&Arc<R>> {
        match self {
            Self::Ready(records) => Some(records),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&DataError> {
        match self {
            Self::Failed(err) => Some(err),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub reads: u64,
    pub fetches: u64,
}

/// Per-identifier cache of dataset fetches.
///
/// Passed around by `Arc`; tests build a fresh one instead of resetting
/// global state.
pub struct DatasetCache {
    policy: CachePolicy,
    entries: Mutex<HashMap<String, Entry>>,
    next_epoch: AtomicU64,
    reads: AtomicU64,
    fetches: AtomicU64,
}

impl DatasetCache {
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            policy,
            entries: Mutex::new(HashMap::new()),
            next_epoch: AtomicU64::new(0),
            reads: AtomicU64::new(0),
            fetches: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            reads: self.reads.load(Ordering::Relaxed),
            fetches: self.fetches.load(Ordering::Relaxed),
        }
    }

    /// Drops the entry for `identifier`; the next read fetches again.
    pub fn invalidate(&self, identifier: &str) {
        if self.lock().remove(identifier).is_some() {
            info!(identifier, "Dataset cache entry invalidated");
        }
    }

    /// Drops every entry, including fetches still in flight.
    pub fn clear(&self) {
        let mut entries = self.lock();
        let dropped = entries.len();
        entries.clear();
        info!(dropped, "Dataset cache cleared");
    }

    /// Returns the records for `identifier`, suspending until they are
    /// available. Concurrent callers share one fetch.
    ///
    /// A failed fetch stays in the cache so [`DatasetCache::state`] can report
    /// it, but it is stale: the next load starts a new fetch.
    pub async fn load<D: Dataset>(
        &self,
        source: &DataSource,
        identifier: &str,
    ) -> Result<Arc<D::Records>, DataError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let resolved = self.entry::<D>(source, identifier).await?;
        resolved.records.downcast::<D::Records>().map_err(|_| {
            DataError::parse(
                identifier,
                format!("identifier is cached as a dataset other than {}", D::NAME),
            )
        })
    }

    pub fn state<D: Dataset>(&self, identifier: &str) -> DatasetState<D::Records> {
        let entries = self.lock();
        let Some(entry) = entries.get(identifier) else {
            return DatasetState::Idle;
        };
        match entry.fetch.peek() {
            None => DatasetState::Pending,
            Some(Err(err)) => DatasetState::Failed(err.clone()),
            Some(Ok(resolved)) => match resolved.records.clone().downcast::<D::Records>() {
                Ok(records) => DatasetState::Ready(records),
                Err(_) => DatasetState::Failed(DataError::parse(
                    identifier,
                    format!("identifier is cached as a dataset other than {}", D::NAME),
                )),
            },
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        // The map is never left half-updated, so a poisoned lock is still usable.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_stale(&self, entry: &Entry) -> bool {
        match entry.fetch.peek() {
            None => false,
            Some(Err(_)) => true,
            Some(Ok(resolved)) => self
                .policy
                .ttl
                .is_some_and(|ttl| resolved.at.elapsed() >= ttl),
        }
    }

    fn entry<D: Dataset>(&self, source: &DataSource, identifier: &str) -> SharedFetch {
        let mut entries = self.lock();

        if let Some(entry) = entries.get(identifier) {
            if !self.is_stale(entry) {
                debug!(identifier, epoch = entry.epoch, "Joining cached dataset fetch");
                return entry.fetch.clone();
            }
            debug!(identifier, "Cached dataset is stale, refetching");
        }

        let epoch = self.next_epoch.fetch_add(1, Ordering::Relaxed);
        let fetch = self.spawn_fetch::<D>(source, identifier);
        entries.insert(
            identifier.to_string(),
            Entry {
                epoch,
                fetch: fetch.clone(),
            },
        );
        self.fetches.fetch_add(1, Ordering::Relaxed);
        info!(identifier, dataset = D::NAME, epoch, "Started dataset fetch");
        fetch
    }

    fn spawn_fetch<D: Dataset>(&self, source: &DataSource, identifier: &str) -> SharedFetch {
        let source = source.clone();
        let policy = self.policy.clone();
        let id = identifier.to_string();

        // Spawned so a reader dropping out does not cancel the request.
        let task = tokio::spawn(async move {
            let records = fetch_with_retry::<D>(&source, &id, &policy).await?;
            Ok(Resolved {
                records: Arc::new(records),
                at: Instant::now(),
            })
        });

        let id = identifier.to_string();
        async move {
            match task.await {
                Ok(result) => result,
                Err(join_err) => Err(DataError::Transport {
                    identifier: id,
                    reason: format!("fetch task failed: {join_err}"),
                }),
            }
        }
        .boxed()
        .shared()
    }
}

impl Default for DatasetCache {
    fn default() -> Self {
        Self::new(CachePolicy::default())
    }
}

async fn fetch_with_retry<D: Dataset>(
    source: &DataSource,
    identifier: &str,
    policy: &CachePolicy,
) -> Result<D::Records, DataError> {
    let mut attempt = 0;
    loop {
        match source.fetch::<D>(identifier).await {
            Ok(records) => return Ok(records),
            Err(err) if err.is_transient() && attempt < policy.retry_attempts => {
                attempt += 1;
                let delay = policy.retry_backoff * attempt;
                warn!(identifier, attempt, ?delay, error = %err, "Retrying dataset fetch");
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

pub struct DatasetHook<D: Dataset> {
    identifier: String,
    source: DataSource,
    cache: Arc<DatasetCache>,
    _kind: PhantomData<fn() -> D>,
}

impl<D: Dataset> Clone for DatasetHook<D> {
    fn clone(&self) -> Self {
        Self {
            identifier: self.identifier.clone(),
            source: self.source.clone(),
            cache: self.cache.clone(),
            _kind: PhantomData,
        }
    }
}

impl<D: Dataset> DatasetHook<D> {
    pub fn new(identifier: impl Into<String>, source: DataSource, cache: Arc<DatasetCache>) -> Self {
        Self {
            identifier: identifier.into(),
            source,
            cache,
            _kind: PhantomData,
        }
    }

    /// Suspends until the dataset is loaded (or failed).
    pub async fn read(&self) -> Result<Arc<D::Records>, DataError> {
        self.cache.load::<D>(&self.source, &self.identifier).await
    }

    pub fn state(&self) -> DatasetState<D::Records> {
        self.cache.state::<D>(&self.identifier)
    }

    pub fn invalidate(&self) {
        self.cache.invalidate(&self.identifier);
    }
}

/// The four dataset hooks of the dashboard.
#[derive(Clone)]
pub struct Datasets {
    pub boundaries: DatasetHook<Boundaries>,
    pub stations: DatasetHook<Stations>,
    pub coverage: DatasetHook<Coverage>,
    pub totals: DatasetHook<Totals>,
    cache: Arc<DatasetCache>,
}

impl Datasets {
    pub fn new(source: DataSource, cache: Arc<DatasetCache>, ids: &DatasetsConfig) -> Self {
        Self {
            boundaries: DatasetHook::new(&ids.boundaries, source.clone(), cache.clone()),
            stations: DatasetHook::new(&ids.stations, source.clone(), cache.clone()),
            coverage: DatasetHook::new(&ids.coverage, source.clone(), cache.clone()),
            totals: DatasetHook::new(&ids.totals, source, cache.clone()),
            cache,
        }
    }

    /// Waits for every dataset the map view needs. Either all of them are
    /// returned or the first error is.
    pub async fn map_data(&self) -> Result<MapData, DataError> {
        let (boundaries, stations, coverage) = tokio::try_join!(
            self.boundaries.read(),
            self.stations.read(),
            self.coverage.read()
        )?;
        Ok(MapData {
            boundaries,
            stations,
            coverage,
        })
    }

    /// Drops all four datasets from the shared cache.
    pub fn reload(&self) {
        self.cache.clear();
    }

    /// Starts all four fetches and waits for them, reporting each failure.
    pub async fn preload(&self) -> Vec<DataError> {
        let (b, s, c, t) = tokio::join!(
            self.boundaries.read(),
            self.stations.read(),
            self.coverage.read(),
            self.totals.read()
        );
        [b.err(), s.err(), c.err(), t.err()]
            .into_iter()
            .flatten()
            .collect()
    }
}
