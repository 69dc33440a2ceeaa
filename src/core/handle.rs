// src/core/handle.rs
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Weak};

use crate::config::BusConfig;
use crate::core::bus::AudioTimestampBus;
use crate::core::error::BusResult;
use crate::core::registry::ConsumerOptions;
use crate::types::AudioFrame;

/// Reference-counted handle to a bus. The bus lives as long as the
/// longest-lived handle; no single holder owns it.
#[derive(Clone)]
pub struct SharedBufferHandle {
    bus: Arc<AudioTimestampBus>,
}

impl SharedBufferHandle {
    pub fn new(bus: AudioTimestampBus) -> Self {
        Self { bus: Arc::new(bus) }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(AudioTimestampBus::new(capacity))
    }

    pub fn with_config(config: BusConfig) -> Self {
        Self::new(AudioTimestampBus::with_config(config))
    }

    pub fn from_arc(bus: Arc<AudioTimestampBus>) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &AudioTimestampBus {
        &self.bus
    }

    pub fn downgrade(&self) -> WeakBufferHandle {
        WeakBufferHandle {
            bus: Arc::downgrade(&self.bus),
        }
    }

    /// Number of live strong handles.
    pub fn holders(&self) -> usize {
        Arc::strong_count(&self.bus)
    }

    pub fn ptr_eq(&self, other: &SharedBufferHandle) -> bool {
        Arc::ptr_eq(&self.bus, &other.bus)
    }

    /// Registers a consumer whose registration is released when the
    /// connection drops.
    pub fn connect(&self, options: ConsumerOptions) -> BusResult<ConsumerConnection> {
        let id = self.bus.try_register(options)?;
        Ok(ConsumerConnection {
            handle: self.clone(),
            id,
        })
    }
}

impl Deref for SharedBufferHandle {
    type Target = AudioTimestampBus;

    fn deref(&self) -> &Self::Target {
        &self.bus
    }
}

impl fmt::Debug for SharedBufferHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedBufferHandle")
            .field("bus", &self.bus.name())
            .field("holders", &self.holders())
            .finish()
    }
}

/// Non-owning handle; does not keep the bus alive.
#[derive(Clone, Debug, Default)]
pub struct WeakBufferHandle {
    bus: Weak<AudioTimestampBus>,
}

impl WeakBufferHandle {
    pub fn upgrade(&self) -> Option<SharedBufferHandle> {
        self.bus.upgrade().map(SharedBufferHandle::from_arc)
    }

    pub fn is_alive(&self) -> bool {
        self.bus.strong_count() > 0
    }
}

/// A registered consumer tied to its handle. Dropping it unregisters first
/// and releases the handle afterwards, so no dangling registry entry is left
/// behind a disconnected node.
#[derive(Debug)]
pub struct ConsumerConnection {
    handle: SharedBufferHandle,
    id: i32,
}

impl ConsumerConnection {
    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn handle(&self) -> &SharedBufferHandle {
        &self.handle
    }

    pub fn read(&self, target_ms: i64, tolerance_ms: i64) -> Option<AudioFrame> {
        self.handle.frame_at(self.id, target_ms, tolerance_ms)
    }

    pub fn read_into(&self, target_ms: i64, tolerance_ms: i64, out: &mut AudioFrame) -> bool {
        self.handle
            .get_frame_by_timestamp(self.id, target_ms, tolerance_ms, out)
    }

    pub fn available(&self) -> usize {
        self.handle.available_frames(self.id).unwrap_or(0)
    }
}

impl Drop for ConsumerConnection {
    fn drop(&mut self) {
        self.handle.unregister_consumer(self.id);
    }
}

/// Audio output of a node: nothing connected yet, or a live bus.
#[derive(Clone, Debug, Default)]
pub enum AudioPayload {
    #[default]
    Empty,
    Streaming(SharedBufferHandle),
}

impl AudioPayload {
    pub fn streaming(handle: SharedBufferHandle) -> Self {
        Self::Streaming(handle)
    }

    pub fn handle(&self) -> Option<&SharedBufferHandle> {
        match self {
            Self::Streaming(handle) => Some(handle),
            Self::Empty => None,
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming(_))
    }

    pub fn set(&mut self, handle: SharedBufferHandle) {
        *self = Self::Streaming(handle);
    }

    /// Releases this payload's reference and returns it.
    pub fn disconnect(&mut self) -> Option<SharedBufferHandle> {
        match std::mem::take(self) {
            Self::Streaming(handle) => Some(handle),
            Self::Empty => None,
        }
    }
}
