// src/core/lookup.rs
use serde::{Deserialize, Serialize};

use crate::core::registry::{ConsumerState, StartPosition};
use crate::ring::FrameRing;
use crate::types::AudioFrame;

/// How a lookup picks among the unread frames inside the tolerance window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupPolicy {
    /// Closest timestamp within `±tolerance`; ties go to the older frame.
    #[default]
    Nearest,
    /// Closest frame at or before the target within `tolerance`. Only when
    /// there is none, the closest later frame within `tolerance / 2`.
    PreferPast,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameMatch {
    pub seq: u64,
    pub distance_ms: u64,
}

#[derive(Debug)]
pub struct LookupResult {
    pub frame: Option<AudioFrame>,
    /// Unread frames lost to eviction before this lookup ran.
    pub skipped: u64,
}

pub struct TimestampLookup;

impl TimestampLookup {
    /// Best match among resident frames with sequence `>= from`.
    pub fn find(
        ring: &FrameRing,
        from: u64,
        target_ms: i64,
        tolerance_ms: i64,
        policy: LookupPolicy,
    ) -> Option<FrameMatch> {
        if tolerance_ms < 0 {
            return None;
        }
        let tolerance = tolerance_ms as u64;

        match policy {
            LookupPolicy::Nearest => closest(
                ring.iter_from(from)
                    .map(|(seq, frame)| (seq, frame.timestamp_ms.abs_diff(target_ms))),
                tolerance,
            ),
            LookupPolicy::PreferPast => {
                let past = closest(
                    ring.iter_from(from)
                        .filter(|(_, frame)| frame.timestamp_ms <= target_ms)
                        .map(|(seq, frame)| (seq, frame.timestamp_ms.abs_diff(target_ms))),
                    tolerance,
                );
                past.or_else(|| {
                    closest(
                        ring.iter_from(from)
                            .filter(|(_, frame)| frame.timestamp_ms > target_ms)
                            .map(|(seq, frame)| (seq, frame.timestamp_ms.abs_diff(target_ms))),
                        tolerance / 2,
                    )
                })
            }
        }
    }

    /// Performs one consumer read: clamps an evicted cursor, searches the
    /// unread window and advances the cursor past the returned frame. The
    /// cursor is left untouched on a miss.
    pub fn read(
        ring: &FrameRing,
        consumer: &mut ConsumerState,
        target_ms: i64,
        tolerance_ms: i64,
        policy: LookupPolicy,
    ) -> LookupResult {
        let skipped = Self::clamp_cursor(ring, consumer);
        let from = consumer.cursor.unwrap_or(0);

        let found = Self::find(ring, from, target_ms, tolerance_ms, policy)
            .and_then(|m| ring.get(m.seq).map(|frame| (m.seq, frame.clone())));

        let frame = match found {
            Some((seq, frame)) => {
                consumer.cursor = Some(seq + 1);
                consumer.last_timestamp_ms = Some(frame.timestamp_ms);
                consumer.frames_read += 1;
                Some(frame)
            }
            None => {
                consumer.misses += 1;
                None
            }
        };

        LookupResult { frame, skipped }
    }

    /// Moves a cursor that points below the oldest resident frame up to it.
    /// Returns how many unread frames were lost.
    pub fn clamp_cursor(ring: &FrameRing, consumer: &mut ConsumerState) -> u64 {
        let (Some(cursor), Some(oldest)) = (consumer.cursor, ring.oldest_seq()) else {
            return 0;
        };
        if cursor >= oldest {
            return 0;
        }
        let lost = oldest - cursor;
        consumer.cursor = Some(oldest);
        consumer.skipped += lost;
        lost
    }

    /// Initial cursor for a new consumer.
    pub fn start_cursor(ring: &FrameRing, start: StartPosition) -> Option<u64> {
        match start {
            StartPosition::Beginning => None,
            StartPosition::Live => Some(ring.next_seq()),
            StartPosition::Timestamp(target_ms) => {
                Some(Self::best_start(ring, target_ms).unwrap_or_else(|| ring.next_seq()))
            }
        }
    }

    /// Resident frame nearest `target_ms`, preferring frames at or before it.
    pub fn best_start(ring: &FrameRing, target_ms: i64) -> Option<u64> {
        let past = ring
            .iter()
            .filter(|(_, frame)| frame.timestamp_ms <= target_ms)
            .map(|(seq, frame)| (seq, frame.timestamp_ms.abs_diff(target_ms)));
        closest(past, u64::MAX).map(|m| m.seq).or_else(|| {
            let future = ring
                .iter()
                .map(|(seq, frame)| (seq, frame.timestamp_ms.abs_diff(target_ms)));
            closest(future, u64::MAX).map(|m| m.seq)
        })
    }

    /// Unread resident frames for a consumer.
    pub fn available(ring: &FrameRing, consumer: &ConsumerState) -> usize {
        let (Some(oldest), Some(head)) = (ring.oldest_seq(), ring.head_seq()) else {
            return 0;
        };
        let from = consumer.cursor.unwrap_or(oldest).max(oldest);
        if from > head {
            0
        } else {
            (head - from + 1) as usize
        }
    }
}

fn closest(candidates: impl Iterator<Item = (u64, u64)>, tolerance: u64) -> Option<FrameMatch> {
    let mut best: Option<FrameMatch> = None;
    for (seq, distance_ms) in candidates {
        if distance_ms > tolerance {
            continue;
        }
        if best.is_none_or(|b| distance_ms < b.distance_ms) {
            best = Some(FrameMatch { seq, distance_ms });
        }
    }
    best
}
