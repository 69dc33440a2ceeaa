use crate::types::AudioFrame;

#[derive(Debug, Default)]
struct RingSlot {
    seq: u64,
    frame: Option<AudioFrame>,
}

/// Result of a push. The evicted frame is handed back so the caller can drop
/// its payload after releasing any lock around the ring.
#[derive(Debug)]
pub struct PushOutcome {
    pub seq: u64,
    pub evicted: Option<AudioFrame>,
}

/// Fixed-capacity frame ring addressed by logical sequence numbers.
///
/// Sequence numbers start at 1 and never repeat for the lifetime of the ring,
/// including across [`FrameRing::clear`], so a stored sequence keeps meaning
/// the same frame until that frame is evicted.
#[derive(Debug)]
pub struct FrameRing {
    slots: Vec<RingSlot>,
    capacity: usize,
    head_seq: u64,
    len: usize,
}

impl FrameRing {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, RingSlot::default);

        Self {
            slots,
            capacity,
            head_seq: 0,
            len: 0,
        }
    }

    /// O(1). Overwrites the oldest frame when full.
    pub fn push(&mut self, frame: AudioFrame) -> PushOutcome {
        let seq = self.head_seq + 1;
        let idx = self.slot_index(seq);
        let slot = &mut self.slots[idx];

        let previous = slot.frame.replace(frame);
        slot.seq = seq;
        self.head_seq = seq;

        let evicted = if self.len == self.capacity {
            previous
        } else {
            self.len += 1;
            None
        };

        PushOutcome { seq, evicted }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity
    }

    /// Sequence of the newest resident frame.
    pub fn head_seq(&self) -> Option<u64> {
        if self.len == 0 { None } else { Some(self.head_seq) }
    }

    /// Sequence of the oldest resident frame.
    pub fn oldest_seq(&self) -> Option<u64> {
        if self.len == 0 {
            None
        } else {
            Some(self.head_seq - self.len as u64 + 1)
        }
    }

    /// Sequence the next push will receive.
    pub fn next_seq(&self) -> u64 {
        self.head_seq + 1
    }

    pub fn is_resident(&self, seq: u64) -> bool {
        match self.oldest_seq() {
            Some(oldest) => seq >= oldest && seq <= self.head_seq,
            None => false,
        }
    }

    pub fn get(&self, seq: u64) -> Option<&AudioFrame> {
        if !self.is_resident(seq) {
            return None;
        }
        let slot = &self.slots[self.slot_index(seq)];
        if slot.seq == seq { slot.frame.as_ref() } else { None }
    }

    /// Resident frames with sequence `>= from`, oldest first.
    pub fn iter_from(&self, from: u64) -> impl Iterator<Item = (u64, &AudioFrame)> + '_ {
        let (start, end) = match self.oldest_seq() {
            Some(oldest) => (from.max(oldest), self.head_seq),
            None => (1, 0),
        };
        (start..=end).filter_map(move |seq| self.get(seq).map(|frame| (seq, frame)))
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, &AudioFrame)> + '_ {
        self.iter_from(0)
    }

    pub fn oldest_timestamp(&self) -> Option<i64> {
        self.oldest_seq()
            .and_then(|seq| self.get(seq))
            .map(|frame| frame.timestamp_ms)
    }

    pub fn latest_timestamp(&self) -> Option<i64> {
        self.head_seq()
            .and_then(|seq| self.get(seq))
            .map(|frame| frame.timestamp_ms)
    }

    /// Drops every resident frame. Sequence numbering continues.
    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            slot.frame = None;
        }
        self.len = 0;
    }

    fn slot_index(&self, seq: u64) -> usize {
        (seq % self.capacity as u64) as usize
    }
}
