//! Two-tier frame cache.
//!
//! The raw tier maps (instance, frame) to decoded stored values, the display
//! tier maps (instance, frame, window) to rendered 8-bit buffers. Both tiers
//! are bounded LRU maps with independent capacities; evicting from one never
//! touches the other. A miss in the raw tier runs the injected
//! [`FrameDecoder`] exactly once per key, however many threads ask for it.
//!
//! Keys carry the epoch of their instance. Invalidation moves an instance to
//! a new epoch, so a decode that was already running for the old epoch can
//! finish and wake its waiters but never lands in the cache.

use crate::decode::{DecodeError, FrameDecoder, StandardDecoder};
use crate::frame::{DisplayBuffer, RawFrame};
use crate::image_pipeline::{render_frame, ModalityLut, TransformError, Window};
use crate::model::Instance;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

pub const DEFAULT_RAW_CAPACITY: usize = 8;
pub const DEFAULT_DISPLAY_CAPACITY: usize = 32;

/// Windows are keyed and rendered at this granularity of center and width.
pub const WINDOW_QUANTUM: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    pub raw_capacity: usize,
    pub display_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            raw_capacity: DEFAULT_RAW_CAPACITY,
            display_capacity: DEFAULT_DISPLAY_CAPACITY,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Transform(#[from] TransformError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub decodes: u64,
    pub raw_entries: usize,
    pub display_entries: usize,
}

/// Bounded map that evicts the least recently used key.
///
/// Every access stamps the entry with a fresh tick; `order` maps ticks back
/// to keys so the oldest entry is always the first one.
#[derive(Debug)]
struct Lru<K, V> {
    entries: HashMap<K, (u64, V)>,
    order: BTreeMap<u64, K>,
    capacity: usize,
    tick: u64,
}

impl<K: Hash + Eq + Clone, V: Clone> Lru<K, V> {
    fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
            order: BTreeMap::new(),
            capacity: capacity.max(1),
            tick: 0,
        }
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn get(&mut self, key: &K) -> Option<V> {
        let tick = self.next_tick();
        let (stamp, value) = self.entries.get_mut(key)?;
        self.order.remove(stamp);
        *stamp = tick;
        self.order.insert(tick, key.clone());
        Some(value.clone())
    }

    /// Inserts or refreshes `key`, returning the keys evicted to make room.
    fn insert(&mut self, key: K, value: V) -> Vec<K> {
        let tick = self.next_tick();
        if let Some((stamp, _)) = self.entries.insert(key.clone(), (tick, value)) {
            self.order.remove(&stamp);
        }
        self.order.insert(tick, key);

        let mut evicted = Vec::new();
        while self.entries.len() > self.capacity {
            let Some((_, oldest)) = self.order.pop_first() else {
                break;
            };
            self.entries.remove(&oldest);
            evicted.push(oldest);
        }
        evicted
    }

    fn retain(&mut self, mut keep: impl FnMut(&K) -> bool) {
        self.entries.retain(|key, _| keep(key));
        let entries = &self.entries;
        self.order.retain(|_, key| entries.contains_key(key));
    }

    fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FrameKey {
    sop_uid: String,
    epoch: u64,
    frame: u32,
}

/// Window center and width in units of [`WINDOW_QUANTUM`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DisplayKey {
    frame: FrameKey,
    center: i64,
    width: i64,
}

type DecodeResult = Result<Arc<RawFrame>, DecodeError>;

/// A decode in progress; waiters block on `ready` until `result` is set.
#[derive(Default)]
struct Pending {
    result: Mutex<Option<DecodeResult>>,
    ready: Condvar,
}

impl Pending {
    fn complete(&self, result: DecodeResult) {
        *lock(&self.result) = Some(result);
        self.ready.notify_all();
    }

    fn wait(&self) -> DecodeResult {
        let mut slot = lock(&self.result);
        loop {
            if let Some(result) = slot.as_ref() {
                return result.clone();
            }
            slot = self.ready.wait(slot).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Decodes in progress and the current epoch of every invalidated instance.
#[derive(Default)]
struct InFlight {
    pending: HashMap<FrameKey, Arc<Pending>>,
    epochs: HashMap<String, u64>,
    /// Epoch of instances missing from `epochs`.
    floor: u64,
    last_epoch: u64,
}

impl InFlight {
    fn key(&self, instance: &Instance, frame: u32) -> FrameKey {
        let sop_uid = instance.sop_instance_uid();
        FrameKey {
            sop_uid: sop_uid.to_string(),
            epoch: self.epoch(sop_uid),
            frame,
        }
    }

    fn epoch(&self, sop_uid: &str) -> u64 {
        self.epochs.get(sop_uid).copied().unwrap_or(self.floor)
    }

    fn is_current(&self, key: &FrameKey) -> bool {
        self.epoch(&key.sop_uid) == key.epoch
    }

    fn advance(&mut self, sop_uid: &str) {
        self.last_epoch += 1;
        self.epochs.insert(sop_uid.to_string(), self.last_epoch);
    }

    fn advance_all(&mut self) {
        self.last_epoch += 1;
        self.floor = self.last_epoch;
        self.epochs.clear();
    }
}

pub struct PixelCache {
    decoder: Box<dyn FrameDecoder>,
    raw: Mutex<Lru<FrameKey, Arc<RawFrame>>>,
    display: Mutex<Lru<DisplayKey, Arc<DisplayBuffer>>>,
    /// Lock order: `in_flight` before `raw` and `display`.
    in_flight: Mutex<InFlight>,
    hits: AtomicU64,
    misses: AtomicU64,
    decodes: AtomicU64,
}

impl Default for PixelCache {
    fn default() -> Self {
        Self::new(CacheConfig::default(), StandardDecoder)
    }
}

impl std::fmt::Debug for PixelCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelCache")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl PixelCache {
    pub fn new(config: CacheConfig, decoder: impl FrameDecoder + 'static) -> Self {
        Self {
            decoder: Box::new(decoder),
            raw: Mutex::new(Lru::new(config.raw_capacity)),
            display: Mutex::new(Lru::new(config.display_capacity)),
            in_flight: Mutex::new(InFlight::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            decodes: AtomicU64::new(0),
        }
    }

    /// Decoded stored values of one frame.
    ///
    /// A hit refreshes the entry and never decodes. On a miss the first
    /// caller decodes while later callers for the same key wait for its
    /// result; a failure reaches all of them and caches nothing.
    pub fn get_raw(&self, instance: &Instance, frame: u32) -> Result<Arc<RawFrame>, DecodeError> {
        let (key, pending, leader) = {
            let mut in_flight = lock(&self.in_flight);
            let key = in_flight.key(instance, frame);
            if let Some(cached) = lock(&self.raw).get(&key) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                log::trace!("Raw cache hit for {} frame {frame}", key.sop_uid);
                return Ok(cached);
            }
            match in_flight.pending.get(&key) {
                Some(pending) => (key, Arc::clone(pending), false),
                None => {
                    let pending = Arc::new(Pending::default());
                    in_flight.pending.insert(key.clone(), Arc::clone(&pending));
                    (key, pending, true)
                }
            }
        };

        if !leader {
            log::trace!("Waiting on in-flight decode of {} frame {frame}", key.sop_uid);
            return pending.wait();
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        log::debug!("Raw cache miss for {} frame {frame}, decoding", key.sop_uid);
        let mut guard = LeaderGuard {
            cache: self,
            key: &key,
            pending: &pending,
            done: false,
        };

        self.decodes.fetch_add(1, Ordering::Relaxed);
        let result = self.decoder.decode(instance, frame).map(Arc::new);
        if let Err(err) = &result {
            log::warn!("Failed to decode {} frame {frame}: {err}", key.sop_uid);
        }
        guard.finish(result.clone());
        result
    }

    /// Rendered frame for `window`, quantized to [`WINDOW_QUANTUM`] before
    /// keying and rendering.
    pub fn get_display(
        &self,
        instance: &Instance,
        frame: u32,
        window: Window,
    ) -> Result<Arc<DisplayBuffer>, RenderError> {
        let (window, center, width) = quantize(window)?;
        let key = DisplayKey {
            frame: lock(&self.in_flight).key(instance, frame),
            center,
            width,
        };

        if let Some(cached) = lock(&self.display).get(&key) {
            log::trace!("Display cache hit for {} frame {frame}", key.frame.sop_uid);
            return Ok(cached);
        }

        let raw = self.get_raw(instance, frame)?;
        let lut = ModalityLut::for_frame(instance, frame);
        let rendered = Arc::new(render_frame(&raw, &lut, window));

        let in_flight = lock(&self.in_flight);
        if in_flight.is_current(&key.frame) {
            let evicted = lock(&self.display).insert(key, Arc::clone(&rendered));
            if !evicted.is_empty() {
                log::debug!("Evicted {} display buffer(s)", evicted.len());
            }
        }
        Ok(rendered)
    }

    /// Whether a decoded frame is cached, without refreshing it.
    pub fn contains_raw(&self, instance: &Instance, frame: u32) -> bool {
        let key = lock(&self.in_flight).key(instance, frame);
        lock(&self.raw).contains(&key)
    }

    /// Drops every entry of one instance from both tiers. Decodes still
    /// running for it are not cached when they finish.
    pub fn invalidate_instance(&self, sop_uid: &str) {
        let mut in_flight = lock(&self.in_flight);
        in_flight.advance(sop_uid);
        lock(&self.raw).retain(|key| key.sop_uid != sop_uid);
        lock(&self.display).retain(|key| key.frame.sop_uid != sop_uid);
    }

    pub fn clear(&self) {
        let mut in_flight = lock(&self.in_flight);
        in_flight.advance_all();
        lock(&self.raw).clear();
        lock(&self.display).clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            decodes: self.decodes.load(Ordering::Relaxed),
            raw_entries: lock(&self.raw).len(),
            display_entries: lock(&self.display).len(),
        }
    }

    fn store(&self, key: &FrameKey, result: &DecodeResult) {
        let mut in_flight = lock(&self.in_flight);
        match result {
            Ok(frame) if in_flight.is_current(key) => {
                let evicted = lock(&self.raw).insert(key.clone(), Arc::clone(frame));
                for old in evicted {
                    log::debug!("Evicted raw frame {} of {}", old.frame, old.sop_uid);
                }
            }
            Ok(_) => log::debug!(
                "Discarding frame {} of {}, invalidated while decoding",
                key.frame,
                key.sop_uid
            ),
            Err(_) => {}
        }
        in_flight.pending.remove(key);
    }
}

/// Publishes the leader's result. If the decoder panics the guard still
/// clears the in-flight entry and wakes the waiters with an error.
struct LeaderGuard<'a> {
    cache: &'a PixelCache,
    key: &'a FrameKey,
    pending: &'a Pending,
    done: bool,
}

impl LeaderGuard<'_> {
    fn finish(&mut self, result: DecodeResult) {
        self.cache.store(self.key, &result);
        self.pending.complete(result);
        self.done = true;
    }
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.finish(Err(DecodeError::CorruptData(String::from(
                "decoder panicked",
            ))));
        }
    }
}

fn quantize(window: Window) -> Result<(Window, i64, i64), TransformError> {
    let center = (window.center() / WINDOW_QUANTUM).round();
    let width = (window.width() / WINDOW_QUANTUM).round().max(1.0);
    let quantized = Window::new(center * WINDOW_QUANTUM, width * WINDOW_QUANTUM)?;
    Ok((quantized, center as i64, width as i64))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
