pub mod bus;
pub mod error;
pub mod handle;
pub mod lock;
pub mod logging;
pub mod lookup;
pub mod registry;
pub mod timestamp;

pub use bus::{AudioTimestampBus, BusStats, WriteEvent};
pub use error::{BusError, BusResult};
pub use handle::{AudioPayload, ConsumerConnection, SharedBufferHandle, WeakBufferHandle};
pub use logging::{ComponentLogger, LogContext};
pub use lookup::{FrameMatch, LookupPolicy, LookupResult, TimestampLookup};
pub use registry::{
    ConsumerOptions, ConsumerRegistry, ConsumerState, INVALID_CONSUMER_ID, StartPosition,
};
pub use timestamp::*;
