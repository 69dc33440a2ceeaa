// src/core/registry.rs
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::error::{BusError, BusResult};

/// Returned by the sentinel registration API when no id could be assigned.
pub const INVALID_CONSUMER_ID: i32 = -1;

/// Where a newly registered consumer starts reading.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartPosition {
    /// No prior read: the first lookup may match any resident frame.
    #[default]
    Beginning,
    /// Only frames pushed after registration are visible.
    Live,
    /// Start at the resident frame nearest this wall-clock time.
    Timestamp(i64),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConsumerOptions {
    pub exclusive: bool,
    pub start: StartPosition,
}

impl ConsumerOptions {
    pub fn shared() -> Self {
        Self::default()
    }

    pub fn exclusive() -> Self {
        Self {
            exclusive: true,
            ..Self::default()
        }
    }

    pub fn starting_at(mut self, start: StartPosition) -> Self {
        self.start = start;
        self
    }
}

/// Per-consumer bookkeeping. Presence in the registry is what makes a
/// consumer active; unregistering removes the entry outright.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConsumerState {
    pub id: i32,
    /// Next unread ring sequence, `None` until the first successful read.
    pub cursor: Option<u64>,
    pub exclusive: bool,
    pub last_timestamp_ms: Option<i64>,
    pub frames_read: u64,
    pub misses: u64,
    pub skipped: u64,
}

impl ConsumerState {
    fn new(id: i32, exclusive: bool, cursor: Option<u64>) -> Self {
        Self {
            id,
            cursor,
            exclusive,
            last_timestamp_ms: None,
            frames_read: 0,
            misses: 0,
            skipped: 0,
        }
    }
}

#[derive(Debug)]
pub struct ConsumerRegistry {
    consumers: BTreeMap<i32, ConsumerState>,
    /// `None` once every non-negative id has been handed out.
    next_id: Option<i32>,
    exclusive_holder: Option<i32>,
}

impl Default for ConsumerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsumerRegistry {
    pub fn new() -> Self {
        Self {
            consumers: BTreeMap::new(),
            next_id: Some(0),
            exclusive_holder: None,
        }
    }

    /// Assigns the next free id. Ids are never reused, so a stale id held by
    /// a late caller can never address someone else's cursor.
    pub fn register_new(&mut self, exclusive: bool, cursor: Option<u64>) -> BusResult<i32> {
        self.check_exclusive(exclusive)?;

        let mut id = self.next_id.ok_or(BusError::IdsExhausted)?;
        while self.consumers.contains_key(&id) {
            id = id.checked_add(1).ok_or(BusError::IdsExhausted)?;
        }
        self.next_id = id.checked_add(1);

        self.insert(id, exclusive, cursor);
        Ok(id)
    }

    pub fn register_with_id(
        &mut self,
        id: i32,
        exclusive: bool,
        cursor: Option<u64>,
    ) -> BusResult<()> {
        if id < 0 {
            return Err(BusError::InvalidConsumerId { id });
        }
        if self.consumers.contains_key(&id) {
            return Err(BusError::ConsumerExists { id });
        }
        self.check_exclusive(exclusive)?;
        self.insert(id, exclusive, cursor);
        Ok(())
    }

    /// Returns whether an entry was removed. Unknown ids are a no-op.
    pub fn unregister(&mut self, id: i32) -> bool {
        match self.consumers.remove(&id) {
            Some(state) => {
                if state.exclusive && self.exclusive_holder == Some(id) {
                    self.exclusive_holder = None;
                }
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: i32) -> Option<&ConsumerState> {
        self.consumers.get(&id)
    }

    pub fn get_mut(&mut self, id: i32) -> Option<&mut ConsumerState> {
        self.consumers.get_mut(&id)
    }

    pub fn contains(&self, id: i32) -> bool {
        self.consumers.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.consumers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consumers.is_empty()
    }

    pub fn exclusive_holder(&self) -> Option<i32> {
        self.exclusive_holder
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConsumerState> {
        self.consumers.values()
    }

    pub fn reset_cursors(&mut self) {
        for state in self.consumers.values_mut() {
            state.cursor = None;
        }
    }

    fn check_exclusive(&self, exclusive: bool) -> BusResult<()> {
        match (exclusive, self.exclusive_holder) {
            (true, Some(holder)) => Err(BusError::ExclusiveSlotTaken { holder }),
            _ => Ok(()),
        }
    }

    fn insert(&mut self, id: i32, exclusive: bool, cursor: Option<u64>) {
        if exclusive {
            self.exclusive_holder = Some(id);
        }
        self.consumers.insert(id, ConsumerState::new(id, exclusive, cursor));
    }
}
