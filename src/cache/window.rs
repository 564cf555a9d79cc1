//! Chunked, address-keyed cache with on-demand loading.
//!
//! The cache never holds the whole dataset. It keeps a set of chunks in an
//! immutable [`Snapshot`], loads missing windows through a [`Source`], and
//! swaps in a new snapshot after each successful load. Every swap bumps the
//! cache version and notifies subscribers.
//!
//! Loads that were started before a [`WindowedCache::clear`] are discarded on
//! arrival, as are preloads for windows the latest preload call no longer
//! wants.
//!
//! # Example
//!
//! ```ignore
//! use enginepipe::cache::{AddressRange, CacheConfig, WindowedCache};
//!
//! let range = AddressRange::new(0, 0x10000)?;
//! let cache = WindowedCache::new(range, hex_repository, CacheConfig::default());
//!
//! cache.ensure_loaded(0x1000).await?;
//! let row = cache.read(0x1000, 16);
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::{watch, Semaphore};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, trace};

use super::chunk::{Chunk, ChunkItem, Snapshot};
use super::range::AddressRange;
use super::source::Source;
use crate::error::{EngineError, Result};

/// Default chunk size in items.
pub const DEFAULT_CHUNK_SIZE: usize = 256;

/// Default maximum resident chunks.
pub const DEFAULT_MAX_CHUNKS: usize = 64;

/// Default maximum concurrent fetches per cache.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 4;

/// Default number of items re-decoded before the first known one when loading
/// variable-width items backwards.
pub const DEFAULT_REWIND_ITEMS: usize = 20;

/// Configuration for a [`WindowedCache`].
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Items per chunk.
    pub chunk_size: usize,
    /// Resident chunks kept before the farthest ones are evicted.
    pub max_chunks: usize,
    /// Fetches that may wait on the source at once.
    pub max_in_flight: usize,
    /// Backward re-seek depth for variable-width items.
    pub rewind_items: usize,
}

impl CacheConfig {
    /// Default configuration with a different chunk size.
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunk_size,
            ..Self::default()
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_chunks: DEFAULT_MAX_CHUNKS,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            rewind_items: DEFAULT_REWIND_ITEMS,
        }
    }
}

/// What [`WindowedCache::ensure_loaded`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Already resident; nothing fetched.
    Cached,
    /// Fetched and inserted a chunk.
    Loaded {
        /// First address of the new chunk.
        start: u64,
        /// Items in the new chunk.
        items: usize,
    },
    /// The source had nothing there.
    Empty,
    /// A preload whose window was no longer wanted when it arrived.
    Superseded,
    /// Arrived after the cache was cleared.
    Discarded,
}

/// Summary of one [`WindowedCache::preload_around`] call.
#[derive(Debug, Default)]
pub struct PreloadReport {
    /// Windows fetched and inserted.
    pub loaded: usize,
    /// Windows already resident.
    pub cached: usize,
    /// Windows dropped because newer work superseded them or the cache was
    /// cleared.
    pub superseded: usize,
    /// Failed fetches. The cache is unchanged for these windows.
    pub errors: Vec<EngineError>,
}

impl PreloadReport {
    fn record(&mut self, outcome: Result<LoadOutcome>) {
        match outcome {
            Ok(LoadOutcome::Loaded { .. }) => self.loaded += 1,
            Ok(LoadOutcome::Cached) | Ok(LoadOutcome::Empty) => self.cached += 1,
            Ok(LoadOutcome::Superseded) | Ok(LoadOutcome::Discarded) => self.superseded += 1,
            Err(e) => self.errors.push(e),
        }
    }

    fn record_join(&mut self, joined: std::result::Result<Result<LoadOutcome>, tokio::task::JoinError>) {
        match joined {
            Ok(outcome) => self.record(outcome),
            Err(e) if e.is_cancelled() => self.superseded += 1,
            Err(e) => std::panic::resume_unwind(e.into_panic()),
        }
    }
}

/// A planned fetch: `count` items from `start`, keeping only items that lie
/// within `[lower, upper)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Window {
    start: u64,
    count: usize,
    lower: u64,
    upper: u64,
}

#[derive(Default)]
struct PreloadState {
    /// Window keys requested by the latest preload call.
    wanted: HashSet<u64>,
    /// Running preload tasks per window key.
    tasks: HashMap<u64, Vec<AbortHandle>>,
    /// Sequential preload task for variable-width items.
    chain: Option<AbortHandle>,
}

struct Inner<T> {
    range: AddressRange,
    config: CacheConfig,
    source: Arc<dyn Source<T>>,
    snapshot: RwLock<Arc<Snapshot<T>>>,
    /// One async gate per window start so overlapping loads share a fetch.
    gates: GateMap,
    permits: Semaphore,
    changes: watch::Sender<u64>,
    preloads: Mutex<PreloadState>,
}

/// Chunked cache over an [`AddressRange`]. Cheap to clone; clones share state.
pub struct WindowedCache<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for WindowedCache<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: ChunkItem> WindowedCache<T> {
    /// Create an empty cache over `range` fed by `source`.
    pub fn new<S>(range: AddressRange, source: S, config: CacheConfig) -> Self
    where
        S: Source<T>,
    {
        Self::with_source(range, Arc::new(source), config)
    }

    /// Create an empty cache sharing an existing source.
    pub fn with_source(range: AddressRange, source: Arc<dyn Source<T>>, mut config: CacheConfig) -> Self {
        config.chunk_size = config.chunk_size.max(1);
        config.max_chunks = config.max_chunks.max(1);
        config.max_in_flight = config.max_in_flight.max(1);
        config.rewind_items = config.rewind_items.max(1);

        let (changes, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                range,
                permits: Semaphore::new(config.max_in_flight),
                config,
                source,
                snapshot: RwLock::new(Arc::new(Snapshot::empty(0, 0))),
                gates: Mutex::new(HashMap::new()),
                changes,
                preloads: Mutex::new(PreloadState::default()),
            }),
        }
    }

    /// The address range this cache covers.
    pub fn range(&self) -> AddressRange {
        self.inner.range
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Current immutable snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot<T>> {
        let guard = self
            .inner
            .snapshot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&guard)
    }

    /// Current cache version.
    pub fn version(&self) -> u64 {
        self.snapshot().version
    }

    /// Watch the cache version. Changes on every insert and every clear.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.changes.subscribe()
    }

    /// Whether `addr` is resident.
    pub fn is_loaded(&self, addr: u64) -> bool {
        self.snapshot().is_loaded(addr)
    }

    /// Up to `count` resident items from `addr`. Never fetches.
    ///
    /// Short when the loaded run ends early; empty when `addr` is not loaded.
    pub fn read(&self, addr: u64, count: usize) -> Vec<T> {
        self.snapshot().read(addr, count)
    }

    /// Make sure the chunk containing `addr` is resident.
    ///
    /// On a miss, fetches one chunk-sized window: aligned to the chunk grid
    /// for fixed-width items, anchored at `addr` for variable-width ones,
    /// clamped to the range and clipped to the span not yet covered.
    ///
    /// # Errors
    ///
    /// [`EngineError::OutOfRange`] for an address outside the range, and
    /// [`EngineError::Fetch`] when the source fails. A failed fetch leaves
    /// the cache unchanged and is not retried.
    pub async fn ensure_loaded(&self, addr: u64) -> Result<LoadOutcome> {
        self.inner.range.check(addr)?;
        self.load_at(addr, None).await
    }

    /// Drop every chunk and bump the version. Returns the new version.
    ///
    /// Loads in flight when this is called are discarded on arrival.
    pub fn clear(&self) -> u64 {
        let version = {
            let mut guard = self
                .inner
                .snapshot
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let version = guard.version + 1;
            let generation = guard.generation + 1;
            *guard = Arc::new(Snapshot::empty(version, generation));
            version
        };
        debug!(version, "Cache cleared");
        self.publish(version);
        version
    }

    /// Extend the loaded data by one chunk at the trailing (`forward`) or
    /// leading edge. Returns the number of items added.
    ///
    /// Does nothing on an empty cache or when the edge is the range boundary.
    pub async fn load_more(&self, forward: bool) -> Result<usize> {
        let snapshot = self.snapshot();
        let outcome = if forward {
            let Some(end) = snapshot.last_end() else {
                return Ok(0);
            };
            if end >= self.inner.range.end() {
                return Ok(0);
            }
            self.load_at(end, None).await?
        } else {
            let Some(start) = snapshot.first_start() else {
                return Ok(0);
            };
            if start <= self.inner.range.start() {
                return Ok(0);
            }
            match T::FIXED_WIDTH {
                Some(_) => self.load_at(start - 1, None).await?,
                None => self.load_before(start).await?,
            }
        };

        Ok(match outcome {
            LoadOutcome::Loaded { items, .. } => items,
            _ => 0,
        })
    }

    /// Load the chunk containing `addr` and `radius` chunks on each side,
    /// skipping resident ones.
    ///
    /// `addr` is clamped into the range. Windows requested by an earlier call
    /// but not by this one are cancelled; if their fetch still completes it
    /// is discarded.
    pub async fn preload_around(&self, addr: u64, radius: usize) -> Result<PreloadReport> {
        let range = self.inner.range;
        if range.is_empty() {
            return Ok(PreloadReport::default());
        }
        let addr = range.clamp(addr);

        match T::FIXED_WIDTH {
            Some(width) => Ok(self.preload_fixed(addr, radius, width).await),
            None => self.preload_chain(addr, radius).await,
        }
    }

    /// Cancel every running preload.
    pub fn cancel_preloads(&self) {
        let mut state = self.preload_state();
        state.wanted.clear();
        for (_, handles) in state.tasks.drain() {
            for handle in handles {
                handle.abort();
            }
        }
        if let Some(chain) = state.chain.take() {
            chain.abort();
        }
    }

    // ========================================================================
    // Loading
    // ========================================================================

    /// Load the window around unloaded `addr`. `preload_key` marks a preload
    /// that must still be wanted when the fetch arrives.
    async fn load_at(&self, addr: u64, preload_key: Option<u64>) -> Result<LoadOutcome> {
        let snapshot = self.snapshot();
        if snapshot.is_loaded(addr) {
            return Ok(LoadOutcome::Cached);
        }
        let Some(window) = self.plan(&snapshot, addr) else {
            return Ok(LoadOutcome::Empty);
        };

        let gate = self.gate(window.start);
        let _held = gate.lock().await;

        // Someone sharing the gate may have loaded it meanwhile.
        let snapshot = self.snapshot();
        if snapshot.is_loaded(addr) {
            return Ok(LoadOutcome::Cached);
        }
        match self.plan(&snapshot, addr) {
            Some(window) => {
                self.fetch_and_insert(window, snapshot.generation, preload_key)
                    .await
            }
            None => Ok(LoadOutcome::Empty),
        }
    }

    /// Load items immediately before `edge` (variable width only).
    async fn load_before(&self, edge: u64) -> Result<LoadOutcome> {
        let gate = self.gate(edge);
        let _held = gate.lock().await;

        let snapshot = self.snapshot();
        if snapshot.first_start() != Some(edge) {
            // The leading edge moved while we waited.
            return Ok(LoadOutcome::Cached);
        }
        let generation = snapshot.generation;
        let rewind = self.inner.config.rewind_items;
        let floor = self.inner.range.start();

        let target = self
            .inner
            .source
            .rewind(edge, rewind)
            .await
            .map_err(|e| EngineError::fetch(edge, rewind, e))?;
        let target = if target >= edge {
            edge.saturating_sub(rewind as u64)
        } else {
            target
        }
        .max(floor);

        let window = Window {
            start: target,
            count: rewind * 2,
            lower: target,
            upper: edge,
        };
        self.fetch_and_insert(window, generation, None).await
    }

    /// Fetch `window`, clip the items to it, and insert unless the cache was
    /// cleared or the preload abandoned in the meantime.
    async fn fetch_and_insert(
        &self,
        window: Window,
        generation: u64,
        preload_key: Option<u64>,
    ) -> Result<LoadOutcome> {
        let items = {
            let _permit = self
                .inner
                .permits
                .acquire()
                .await
                .map_err(|_| EngineError::fetch(window.start, window.count, EngineError::Closed))?;

            trace!(start = window.start, count = window.count, "Fetching window");
            self.inner
                .source
                .fetch(window.start, window.count)
                .await
                .map_err(|e| EngineError::fetch(window.start, window.count, e))?
        };

        let (items, reached_upper) = clip_items(window, items);
        let Some(mut chunk) = Chunk::from_items(window.start, items) else {
            return Ok(LoadOutcome::Empty);
        };
        if reached_upper && T::FIXED_WIDTH.is_none() {
            // Close the sliver no item starts in, so the runs join up.
            chunk = chunk.extended_to(window.upper);
        }

        if let Some(key) = preload_key {
            if !self.preload_state().wanted.contains(&key) {
                debug!(start = chunk.start(), "Dropping superseded preload");
                return Ok(LoadOutcome::Superseded);
            }
        }

        Ok(self.insert(chunk, generation))
    }

    /// Swap in a snapshot containing `chunk`.
    fn insert(&self, chunk: Chunk<T>, generation: u64) -> LoadOutcome {
        let (version, start, items) = {
            let mut guard = self
                .inner
                .snapshot
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if guard.generation != generation {
                debug!(start = chunk.start(), "Dropping load that predates clear");
                return LoadOutcome::Discarded;
            }

            // Another load may have covered part of the span meanwhile.
            let chunk = match trim_to_gap(&guard, chunk) {
                Some(chunk) => chunk,
                None => return LoadOutcome::Cached,
            };

            let version = guard.version + 1;
            let start = chunk.start();
            let items = chunk.len();
            let mut chunks = guard.chunks.clone();
            chunks.insert(start, Arc::new(chunk.with_version(version)));
            evict_farthest(&mut chunks, start, self.inner.config.max_chunks);

            *guard = Arc::new(Snapshot {
                version,
                generation,
                chunks,
            });
            (version, start, items)
        };

        trace!(version, start, items, "Chunk inserted");
        self.publish(version);
        LoadOutcome::Loaded { start, items }
    }

    /// Window to fetch so that `addr` becomes resident.
    fn plan(&self, snapshot: &Snapshot<T>, addr: u64) -> Option<Window> {
        let range = self.inner.range;
        let chunk_size = self.inner.config.chunk_size;
        let (below, above) = snapshot.gap_around(addr);
        let lower = below.unwrap_or(range.start()).max(range.start());
        let upper = above.unwrap_or(range.end()).min(range.end());

        match T::FIXED_WIDTH {
            Some(width) => {
                let span = width.saturating_mul(chunk_size as u64);
                let aligned = range.start() + (addr - range.start()) / span * span;
                let start = aligned.max(lower);
                let end = aligned.saturating_add(span).min(upper);
                let count = (end.saturating_sub(start) / width) as usize;
                (count > 0).then_some(Window {
                    start,
                    count,
                    lower: start,
                    upper: end,
                })
            }
            None => (addr < upper).then_some(Window {
                start: addr,
                count: chunk_size,
                lower: addr.max(lower),
                upper,
            }),
        }
    }

    // ========================================================================
    // Preloading
    // ========================================================================

    async fn preload_fixed(&self, addr: u64, radius: usize, width: u64) -> PreloadReport {
        let range = self.inner.range;
        let span = width.saturating_mul(self.inner.config.chunk_size as u64);
        let center = range.start() + (addr - range.start()) / span * span;

        // Nearest windows first.
        let mut windows = vec![center];
        for step in 1..=radius as u64 {
            let offset = step.saturating_mul(span);
            let after = center.checked_add(offset).filter(|a| *a < range.end());
            let before = center.checked_sub(offset).filter(|b| *b >= range.start());
            if after.is_none() && before.is_none() {
                break;
            }
            windows.extend(after);
            windows.extend(before);
        }

        let snapshot = self.snapshot();
        let mut report = PreloadReport::default();
        let mut handles: Vec<JoinHandle<Result<LoadOutcome>>> = Vec::new();
        {
            let mut state = self.preload_state();
            state.wanted = windows.iter().copied().collect();

            let wanted = state.wanted.clone();
            state.tasks.retain(|key, tasks| {
                if wanted.contains(key) {
                    tasks.retain(|t| !t.is_finished());
                    !tasks.is_empty()
                } else {
                    for task in tasks.iter() {
                        task.abort();
                    }
                    false
                }
            });

            for &start in &windows {
                let end = start.saturating_add(span).min(range.end());
                let target = if !snapshot.is_loaded(start) {
                    start
                } else if !snapshot.is_loaded(end - 1) {
                    end - 1
                } else {
                    report.cached += 1;
                    continue;
                };

                let cache = self.clone();
                let handle = tokio::spawn(async move { cache.load_at(target, Some(start)).await });
                state
                    .tasks
                    .entry(start)
                    .or_default()
                    .push(handle.abort_handle());
                handles.push(handle);
            }
        }

        for handle in handles {
            report.record_join(handle.await);
        }
        report
    }

    async fn preload_chain(&self, addr: u64, radius: usize) -> Result<PreloadReport> {
        let cache = self.clone();
        let handle = tokio::spawn(async move {
            let mut report = PreloadReport::default();
            let generation = cache.snapshot().generation;

            let first = cache.load_at(addr, None).await;
            let failed = first.is_err();
            report.record(first);
            if failed {
                return report;
            }

            for _ in 0..radius {
                let snapshot = cache.snapshot();
                if snapshot.generation != generation {
                    report.superseded += 1;
                    return report;
                }
                let Some((_, end)) = snapshot.run_bounds(addr) else {
                    break;
                };
                if end >= cache.inner.range.end() {
                    break;
                }
                let outcome = cache.load_at(end, None).await;
                let stop = !matches!(outcome, Ok(LoadOutcome::Loaded { .. }));
                report.record(outcome);
                if stop {
                    break;
                }
            }

            for _ in 0..radius {
                let snapshot = cache.snapshot();
                if snapshot.generation != generation {
                    report.superseded += 1;
                    return report;
                }
                let Some((start, _)) = snapshot.run_bounds(addr) else {
                    break;
                };
                if start <= cache.inner.range.start() {
                    break;
                }
                let outcome = cache.load_before_run(start).await;
                let stop = !matches!(outcome, Ok(LoadOutcome::Loaded { .. }));
                report.record(outcome);
                if stop {
                    break;
                }
            }
            report
        });

        {
            let mut state = self.preload_state();
            if let Some(previous) = state.chain.replace(handle.abort_handle()) {
                previous.abort();
            }
        }

        match handle.await {
            Ok(report) => Ok(report),
            Err(e) if e.is_cancelled() => Ok(PreloadReport {
                superseded: 1,
                ..PreloadReport::default()
            }),
            Err(e) => std::panic::resume_unwind(e.into_panic()),
        }
    }

    /// Backward step for a run that may not be the first one.
    async fn load_before_run(&self, run_start: u64) -> Result<LoadOutcome> {
        let snapshot = self.snapshot();
        if snapshot.first_start() == Some(run_start) {
            return self.load_before(run_start).await;
        }
        // A chunk exists below this run: anchor after it when it is close,
        // otherwise rewind as at the leading edge.
        match snapshot.gap_around(run_start.saturating_sub(1)) {
            (Some(below_end), _) if below_end < run_start => self.load_at(below_end, None).await,
            _ => Ok(LoadOutcome::Cached),
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Join the gate for `key`. The entry leaves the map when the last
    /// holder drops its guard, including when the load is aborted.
    fn gate(&self, key: u64) -> GateGuard<'_> {
        let mut gates = self
            .inner
            .gates
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        GateGuard {
            gates: &self.inner.gates,
            key,
            gate: Arc::clone(gates.entry(key).or_default()),
        }
    }

    /// Publish `version` unless a later one is already out.
    fn publish(&self, version: u64) {
        self.inner.changes.send_if_modified(|current| {
            if version > *current {
                *current = version;
                true
            } else {
                false
            }
        });
    }

    #[cfg(test)]
    fn gate_count(&self) -> usize {
        self.inner
            .gates
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    fn preload_state(&self) -> std::sync::MutexGuard<'_, PreloadState> {
        self.inner
            .preloads
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

type GateMap = Mutex<HashMap<u64, Arc<tokio::sync::Mutex<()>>>>;

/// Membership in a window gate.
struct GateGuard<'a> {
    gates: &'a GateMap,
    key: u64,
    gate: Arc<tokio::sync::Mutex<()>>,
}

impl GateGuard<'_> {
    async fn lock(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.gate.lock().await
    }
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        let mut gates = self
            .gates
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // Map entry plus ours: nobody else is waiting.
        if Arc::strong_count(&self.gate) <= 2
            && gates
                .get(&self.key)
                .is_some_and(|current| Arc::ptr_eq(current, &self.gate))
        {
            gates.remove(&self.key);
        }
    }
}

impl<T> std::fmt::Debug for WindowedCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowedCache")
            .field("range", &self.inner.range)
            .field("config", &self.inner.config)
            .finish()
    }
}

/// Keep items inside `[window.lower, window.upper)` with strictly increasing,
/// non-overlapping spans.
///
/// Also reports whether decoding ran into `upper`, meaning nothing is missing
/// between the last kept item and `upper`.
fn clip_items<T: ChunkItem>(window: Window, items: Vec<T>) -> (Vec<T>, bool) {
    let mut cursor = window.lower;
    let mut reached_upper = false;
    let mut kept = Vec::with_capacity(items.len().min(window.count));
    for (index, item) in items.into_iter().enumerate() {
        if kept.len() == window.count {
            break;
        }
        let addr = item.address(window.start, index);
        let end = addr.saturating_add(item.width());
        if end >= window.upper {
            reached_upper = true;
        }
        if end > window.upper {
            break;
        }
        if addr < cursor {
            continue;
        }
        // Fixed-width chunks are addressed by position and cannot skip.
        if T::FIXED_WIDTH.is_some() && addr != cursor {
            break;
        }
        cursor = end;
        kept.push(item);
    }
    (kept, reached_upper)
}

/// Trim a freshly fetched chunk to the gap it was meant to fill.
fn trim_to_gap<T: ChunkItem>(snapshot: &Snapshot<T>, chunk: Chunk<T>) -> Option<Chunk<T>> {
    let (below, above) = snapshot.gap_around(chunk.start());
    let lower = below.unwrap_or(0);
    let upper = above.unwrap_or(u64::MAX);
    if snapshot.is_loaded(chunk.start()) {
        return None;
    }
    if chunk.start() >= lower && chunk.end() <= upper {
        return Some(chunk);
    }

    let start = chunk.start();
    let window = Window {
        start,
        count: chunk.len(),
        lower: lower.max(start),
        upper,
    };
    let (items, _) = clip_items(window, chunk.items().to_vec());
    Chunk::from_items(start, items)
}

/// Evict chunks farthest from `anchor` until at most `max` remain.
fn evict_farthest<T>(chunks: &mut std::collections::BTreeMap<u64, Arc<Chunk<T>>>, anchor: u64, max: usize) {
    while chunks.len() > max {
        let first = chunks.keys().next().copied();
        let last = chunks.keys().next_back().copied();
        let victim = match (first, last) {
            (Some(first), Some(last)) => {
                if anchor.abs_diff(first) >= anchor.abs_diff(last) {
                    first
                } else {
                    last
                }
            }
            _ => break,
        };
        if victim == anchor {
            break;
        }
        chunks.remove(&victim);
    }
}
