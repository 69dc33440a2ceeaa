use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use serde::Serialize;

use crate::config::BusConfig;
use crate::core::error::{BusError, BusResult};
use crate::core::lock::{lock_mutex, lock_mutex_with_timeout};
use crate::core::logging::{ComponentLogger, LogContext};
use crate::core::lookup::TimestampLookup;
use crate::core::registry::{
    ConsumerOptions, ConsumerRegistry, ConsumerState, INVALID_CONSUMER_ID,
};
use crate::ring::FrameRing;
use crate::types::{AudioFrame, FrameFormat};

// Log interval constants for push diagnostics.
const LOG_EVERY_N_PUSH: u64 = 50;
const LOG_INITIAL_PUSH_COUNT: u64 = 5;
const LOG_EVERY_N_REJECT: u64 = 100;

/// Sent to write subscribers after every accepted push. `frame` shares
/// the payload of the stored frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteEvent {
    pub seq: u64,
    pub timestamp_ms: i64,
    pub frame: AudioFrame,
}

#[derive(Debug, Clone, Serialize)]
pub struct BusStats {
    pub capacity: usize,
    pub len: usize,
    pub head_seq: Option<u64>,
    pub pushed: u64,
    pub evicted: u64,
    pub rejected: u64,
    pub lock_timeouts: u64,
    pub skipped: u64,
    pub consumers: usize,
    pub exclusive_held: bool,
    pub active: bool,
    pub oldest_timestamp_ms: Option<i64>,
    pub latest_timestamp_ms: Option<i64>,
}

// Ring, registry and listeners share one lock so eviction and cursor
// clamping can never interleave.
#[derive(Debug)]
struct BusInner {
    ring: FrameRing,
    registry: ConsumerRegistry,
    closed: bool,
    has_pushed: bool,
    // format and byte length of the first accepted frame, used when no
    // block size is configured
    block_shape: Option<(FrameFormat, usize)>,
    listeners: Vec<Sender<WriteEvent>>,
}

/// One producer, many consumers, frames addressed by wall-clock timestamp.
#[derive(Debug)]
pub struct AudioTimestampBus {
    inner: Mutex<BusInner>,
    config: BusConfig,
    push_lock_timeout: Option<Duration>,
    pushed: AtomicU64,
    evicted: AtomicU64,
    rejected: AtomicU64,
    lock_timeouts: AtomicU64,
    skipped: AtomicU64,
}

impl AudioTimestampBus {
    pub fn new(capacity: usize) -> Self {
        Self::with_config(BusConfig::with_capacity(capacity))
    }

    pub fn with_config(config: BusConfig) -> Self {
        let inner = BusInner {
            ring: FrameRing::new(config.capacity),
            registry: ConsumerRegistry::new(),
            closed: false,
            has_pushed: false,
            block_shape: None,
            listeners: Vec::new(),
        };

        Self {
            inner: Mutex::new(inner),
            push_lock_timeout: config.push_lock_timeout_us.map(Duration::from_micros),
            config,
            pushed: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            lock_timeouts: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn capacity(&self) -> usize {
        self.lock("bus.capacity").ring.capacity()
    }

    // ------------------------------------------------------------
    // Producer side
    // ------------------------------------------------------------

    /// Validates and stores a frame, evicting the oldest one when full.
    /// Returns the sequence number assigned to the frame.
    ///
    /// Without a configured `block_frames`, the first accepted frame fixes
    /// the format and block length until the next [`clear`](Self::clear).
    pub fn try_push_frame(&self, frame: AudioFrame) -> BusResult<u64> {
        if let Err(err) = frame.validate(self.config.block_frames) {
            self.note_rejected(&err);
            return Err(err);
        }

        let timestamp_ms = frame.timestamp_ms;
        let mut inner = match self.lock_for_push() {
            Some(guard) => guard,
            None => {
                let n = self.lock_timeouts.fetch_add(1, Ordering::Relaxed) + 1;
                if n == 1 || n % LOG_EVERY_N_REJECT == 0 {
                    self.warn(&format!("Dropping frame: lock timeout (total {})", n));
                }
                return Err(BusError::LockTimeout);
            }
        };

        if inner.closed {
            drop(inner);
            self.note_rejected(&BusError::Closed);
            return Err(BusError::Closed);
        }

        if self.config.block_frames.is_none() {
            let shape = (frame.format(), frame.data.len());
            let recorded = inner.block_shape;
            match recorded {
                None => inner.block_shape = Some(shape),
                Some(expected) if expected != shape => {
                    drop(inner);
                    let err = BusError::malformed(format!(
                        "frame is {} bytes of {:?}, bus carries {} bytes of {:?}",
                        shape.1, shape.0, expected.1, expected.0
                    ));
                    self.note_rejected(&err);
                    return Err(err);
                }
                Some(_) => {}
            }
        }

        let outcome = inner.ring.push(frame);
        inner.has_pushed = true;

        if !inner.listeners.is_empty() {
            if let Some(frame) = inner.ring.get(outcome.seq).cloned() {
                let event = WriteEvent {
                    seq: outcome.seq,
                    timestamp_ms,
                    frame,
                };
                inner.listeners.retain(|tx| match tx.try_send(event.clone()) {
                    Ok(()) | Err(TrySendError::Full(_)) => true,
                    Err(TrySendError::Disconnected(_)) => false,
                });
            }
        }
        drop(inner);

        // payload of the evicted frame is released outside the lock
        if let Some(evicted) = outcome.evicted {
            self.evicted.fetch_add(1, Ordering::Relaxed);
            drop(evicted);
        }
        let pushed = self.pushed.fetch_add(1, Ordering::Relaxed) + 1;

        if (pushed % LOG_EVERY_N_PUSH == 0 || pushed <= LOG_INITIAL_PUSH_COUNT)
            && log::log_enabled!(log::Level::Debug)
        {
            self.debug(&format!(
                "push[seq={}] ts={} evicted={}",
                outcome.seq,
                timestamp_ms,
                self.evicted.load(Ordering::Relaxed)
            ));
        }

        Ok(outcome.seq)
    }

    /// Sentinel form of [`try_push_frame`](Self::try_push_frame).
    pub fn push_frame(&self, frame: AudioFrame) -> bool {
        self.try_push_frame(frame).is_ok()
    }

    // ------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------

    pub fn try_register(&self, options: ConsumerOptions) -> BusResult<i32> {
        let mut inner = self.lock("bus.register");
        let cursor = TimestampLookup::start_cursor(&inner.ring, options.start);
        let result = inner.registry.register_new(options.exclusive, cursor);
        drop(inner);

        match &result {
            Ok(id) => self.info(&format!(
                "Registered consumer {} (exclusive={}, start={:?}, cursor={:?})",
                id, options.exclusive, options.start, cursor
            )),
            Err(err) => self.warn(&format!("Registration refused: {}", err)),
        }
        result
    }

    /// Returns the new consumer id, or `-1` when the exclusive slot is
    /// already held (or no id is left).
    pub fn register_new_consumer(&self, exclusive: bool) -> i32 {
        let options = ConsumerOptions {
            exclusive,
            ..ConsumerOptions::default()
        };
        self.try_register(options).unwrap_or(INVALID_CONSUMER_ID)
    }

    /// Registers under a caller-chosen id.
    pub fn register_consumer(&self, id: i32, options: ConsumerOptions) -> BusResult<()> {
        let mut inner = self.lock("bus.register_consumer");
        let cursor = TimestampLookup::start_cursor(&inner.ring, options.start);
        let result = inner.registry.register_with_id(id, options.exclusive, cursor);
        drop(inner);

        match &result {
            Ok(()) => self.info(&format!("Registered consumer {} (explicit id)", id)),
            Err(err) => self.warn(&format!("Registration of {} refused: {}", id, err)),
        }
        result
    }

    /// Idempotent. Returns whether the id was registered.
    pub fn unregister_consumer(&self, id: i32) -> bool {
        let removed = self.lock("bus.unregister").registry.unregister(id);
        if removed {
            self.info(&format!("Unregistered consumer {}", id));
        }
        removed
    }

    pub fn is_registered(&self, id: i32) -> bool {
        self.lock("bus.is_registered").registry.contains(id)
    }

    pub fn consumer_count(&self) -> usize {
        self.lock("bus.consumer_count").registry.len()
    }

    pub fn exclusive_holder(&self) -> Option<i32> {
        self.lock("bus.exclusive_holder").registry.exclusive_holder()
    }

    pub fn consumer_state(&self, id: i32) -> Option<ConsumerState> {
        self.lock("bus.consumer_state").registry.get(id).cloned()
    }

    // ------------------------------------------------------------
    // Consumer side
    // ------------------------------------------------------------

    /// Returns the unread frame closest to `target_ms` within `±tolerance_ms`
    /// and advances the consumer past it. Unknown ids and a closed bus read
    /// as "no frame".
    pub fn frame_at(&self, id: i32, target_ms: i64, tolerance_ms: i64) -> Option<AudioFrame> {
        let policy = self.config.lookup;
        let mut inner = self.lock("bus.frame_at");
        if inner.closed {
            return None;
        }
        let BusInner {
            ring, registry, ..
        } = &mut *inner;
        let consumer = registry.get_mut(id)?;
        let result = TimestampLookup::read(ring, consumer, target_ms, tolerance_ms, policy);
        drop(inner);

        if result.skipped > 0 {
            let before = self.skipped.fetch_add(result.skipped, Ordering::Relaxed);
            let after = before + result.skipped;
            // first clamp, then once per LOG_EVERY_N_REJECT skipped frames
            let log_now = before == 0 || before / LOG_EVERY_N_REJECT != after / LOG_EVERY_N_REJECT;
            if log_now && log::log_enabled!(log::Level::Warn) {
                log::warn!(
                    "{}",
                    self.log_context().with_consumer(id).format(
                        "WARN",
                        &format!(
                            "cursor clamped, {} unread frames evicted (total skipped {})",
                            result.skipped, after
                        )
                    )
                );
            }
        }
        result.frame
    }

    /// Sentinel form of [`frame_at`](Self::frame_at). `out` is only written
    /// on success.
    pub fn get_frame_by_timestamp(
        &self,
        id: i32,
        target_ms: i64,
        tolerance_ms: i64,
        out: &mut AudioFrame,
    ) -> bool {
        match self.frame_at(id, target_ms, tolerance_ms) {
            Some(frame) => {
                *out = frame;
                true
            }
            None => false,
        }
    }

    /// Unread resident frames for `id`, `None` if it is not registered.
    pub fn available_frames(&self, id: i32) -> Option<usize> {
        let inner = self.lock("bus.available_frames");
        let consumer = inner.registry.get(id)?;
        Some(TimestampLookup::available(&inner.ring, consumer))
    }

    /// Fill level seen by the furthest-behind consumer, in `0.0..=1.0`.
    pub fn used_ratio(&self) -> Option<f64> {
        let inner = self.lock("bus.used_ratio");
        if inner.registry.is_empty() {
            return None;
        }
        let max_available = inner
            .registry
            .iter()
            .map(|c| TimestampLookup::available(&inner.ring, c))
            .max()
            .unwrap_or(0);
        Some(max_available as f64 / inner.ring.capacity() as f64)
    }

    /// Bounded channel of write events. Slow subscribers lose events
    /// instead of stalling the producer.
    pub fn subscribe_writes(&self) -> Receiver<WriteEvent> {
        let (tx, rx) = channel::bounded(self.config.notify_capacity.max(1));
        self.lock("bus.subscribe_writes").listeners.push(tx);
        rx
    }

    // ------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------

    /// True once a frame has been accepted and the bus is not closed.
    pub fn is_active(&self) -> bool {
        let inner = self.lock("bus.is_active");
        !inner.closed && inner.has_pushed
    }

    pub fn is_closed(&self) -> bool {
        self.lock("bus.is_closed").closed
    }

    pub fn set_active(&self, active: bool) {
        let mut inner = self.lock("bus.set_active");
        if inner.closed == !active {
            return;
        }
        inner.closed = !active;
        drop(inner);
        self.info(if active { "Bus reopened" } else { "Bus closed" });
    }

    pub fn close(&self) {
        self.set_active(false);
    }

    /// Drops all frames and resets every cursor. Consumers stay registered.
    pub fn clear(&self) {
        let mut inner = self.lock("bus.clear");
        inner.ring.clear();
        inner.registry.reset_cursors();
        inner.has_pushed = false;
        inner.block_shape = None;
        drop(inner);
        self.info("Cleared bus");
    }

    pub fn len(&self) -> usize {
        self.lock("bus.len").ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Timestamps of the resident frames, oldest first.
    pub fn resident_timestamps(&self) -> Vec<i64> {
        let inner = self.lock("bus.resident_timestamps");
        inner.ring.iter().map(|(_, f)| f.timestamp_ms).collect()
    }

    pub fn stats(&self) -> BusStats {
        let inner = self.lock("bus.stats");
        BusStats {
            capacity: inner.ring.capacity(),
            len: inner.ring.len(),
            head_seq: inner.ring.head_seq(),
            pushed: self.pushed.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            lock_timeouts: self.lock_timeouts.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            consumers: inner.registry.len(),
            exclusive_held: inner.registry.exclusive_holder().is_some(),
            active: !inner.closed && inner.has_pushed,
            oldest_timestamp_ms: inner.ring.oldest_timestamp(),
            latest_timestamp_ms: inner.ring.latest_timestamp(),
        }
    }

    fn lock(&self, context: &str) -> MutexGuard<'_, BusInner> {
        lock_mutex(&self.inner, context)
    }

    fn lock_for_push(&self) -> Option<MutexGuard<'_, BusInner>> {
        match self.push_lock_timeout {
            Some(timeout) => lock_mutex_with_timeout(&self.inner, "bus.push", timeout),
            None => Some(lock_mutex(&self.inner, "bus.push")),
        }
    }

    fn note_rejected(&self, err: &BusError) {
        let n = self.rejected.fetch_add(1, Ordering::Relaxed) + 1;
        if n == 1 || n % LOG_EVERY_N_REJECT == 0 {
            self.warn(&format!("Rejected frame: {} (total rejected {})", err, n));
        }
    }
}

impl Default for AudioTimestampBus {
    fn default() -> Self {
        Self::with_config(BusConfig::default())
    }
}

impl ComponentLogger for AudioTimestampBus {
    fn log_context(&self) -> LogContext {
        LogContext::new("TimestampBus", &self.config.name)
    }
}
