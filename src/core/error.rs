use thiserror::Error;

pub type BusResult<T> = Result<T, BusError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("malformed frame: {reason}")]
    MalformedFrame { reason: String },
    #[error("bus is closed")]
    Closed,
    #[error("exclusive slot already held by consumer {holder}")]
    ExclusiveSlotTaken { holder: i32 },
    #[error("consumer {id} already registered")]
    ConsumerExists { id: i32 },
    #[error("invalid consumer id: {id}")]
    InvalidConsumerId { id: i32 },
    #[error("consumer ids exhausted")]
    IdsExhausted,
    #[error("timed out waiting for the bus lock")]
    LockTimeout,
}

impl BusError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedFrame {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = BusError::ExclusiveSlotTaken { holder: 3 };
        assert_eq!(err.to_string(), "exclusive slot already held by consumer 3");

        let err = BusError::malformed("empty payload");
        assert_eq!(err.to_string(), "malformed frame: empty payload");
    }
}
