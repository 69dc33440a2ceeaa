// src/lib.rs
pub mod config;
pub mod core;
pub mod ring;
pub mod types;

// Re-export die wichtigsten Typen
pub use config::BusConfig;
pub use self::core::{
    AudioPayload, AudioTimestampBus, BusError, BusResult, BusStats, ComponentLogger,
    ConsumerConnection, ConsumerOptions, INVALID_CONSUMER_ID, LogContext, LookupPolicy,
    SharedBufferHandle, StartPosition, WeakBufferHandle, WriteEvent,
};
pub use self::core::timestamp::utc_ms_now;
pub use ring::FrameRing;
pub use types::{AudioFrame, FrameFormat};
