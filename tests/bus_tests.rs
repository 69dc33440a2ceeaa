use timestamp_bus::{
    AudioFrame, AudioTimestampBus, BusConfig, BusError, ConsumerOptions, INVALID_CONSUMER_ID,
    LookupPolicy, StartPosition,
};

fn frame(ts: i64) -> AudioFrame {
    AudioFrame::from_i16(ts, 48_000, 2, &vec![ts as i16; 64])
}

fn bus_with(timestamps: &[i64]) -> AudioTimestampBus {
    let bus = AudioTimestampBus::new(8);
    for &ts in timestamps {
        assert!(bus.push_frame(frame(ts)));
    }
    bus
}

#[test]
fn test_bounded_retention() {
    let bus = AudioTimestampBus::new(8);
    let _idle = bus.register_new_consumer(false);

    for i in 0..13 {
        bus.push_frame(frame(i * 16));
    }

    assert_eq!(bus.len(), 8);
    let expected: Vec<i64> = (5..13).map(|i| i * 16).collect();
    assert_eq!(bus.resident_timestamps(), expected);

    let stats = bus.stats();
    assert_eq!(stats.pushed, 13);
    assert_eq!(stats.evicted, 5);
}

#[test]
fn test_tolerance_window() {
    let bus = bus_with(&[100, 116, 132, 148]);
    let wide = bus.register_new_consumer(false);
    let narrow = bus.register_new_consumer(false);

    let hit = bus.frame_at(wide, 120, 10);
    assert_eq!(hit.map(|f| f.timestamp_ms), Some(116));

    assert!(bus.frame_at(narrow, 120, 2).is_none());
}

#[test]
fn test_monotonic_reads_per_consumer() {
    let bus = bus_with(&[100, 116, 132, 148]);
    let id = bus.register_new_consumer(false);

    let mut last = i64::MIN;
    for target in [140, 100, 150, 90, 148] {
        if let Some(f) = bus.frame_at(id, target, 50) {
            assert!(f.timestamp_ms >= last, "{} after {}", f.timestamp_ms, last);
            last = f.timestamp_ms;
        }
    }
    assert_eq!(last, 148);
}

#[test]
fn test_consumed_frame_is_not_redelivered() {
    let bus = bus_with(&[100, 116]);
    let id = bus.register_new_consumer(false);

    assert_eq!(bus.frame_at(id, 116, 0).map(|f| f.timestamp_ms), Some(116));
    // 100 is older than what was already consumed
    assert!(bus.frame_at(id, 100, 0).is_none());
    assert!(bus.frame_at(id, 116, 0).is_none());
}

#[test]
fn test_miss_keeps_cursor() {
    let bus = bus_with(&[100]);
    let id = bus.register_new_consumer(false);

    assert!(bus.frame_at(id, 200, 10).is_none());
    assert_eq!(bus.consumer_state(id).and_then(|c| c.cursor), None);

    bus.push_frame(frame(116));
    assert_eq!(bus.frame_at(id, 100, 5).map(|f| f.timestamp_ms), Some(100));
}

#[test]
fn test_fan_out_independence() {
    let bus = bus_with(&[100, 116, 132, 148]);
    let a = bus.register_new_consumer(false);
    let b = bus.register_new_consumer(false);

    assert_eq!(bus.frame_at(a, 148, 0).map(|f| f.timestamp_ms), Some(148));
    // a has consumed everything, b still sees the whole ring
    assert_eq!(bus.available_frames(a), Some(0));
    assert_eq!(bus.available_frames(b), Some(4));

    assert_eq!(bus.frame_at(b, 100, 0).map(|f| f.timestamp_ms), Some(100));
    assert_eq!(bus.frame_at(b, 116, 0).map(|f| f.timestamp_ms), Some(116));
    assert!(bus.frame_at(a, 116, 0).is_none());

    // both got identical payloads for the shared frame
    let bus = bus_with(&[200]);
    let a = bus.register_new_consumer(false);
    let b = bus.register_new_consumer(false);
    let fa = bus.frame_at(a, 200, 0).unwrap();
    let fb = bus.frame_at(b, 200, 0).unwrap();
    assert_eq!(fa, fb);
}

#[test]
fn test_exclusive_slot() {
    let bus = AudioTimestampBus::new(8);
    let first = bus.register_new_consumer(true);
    let second = bus.register_new_consumer(true);

    assert!(first >= 0);
    assert_eq!(second, INVALID_CONSUMER_ID);
    assert_eq!(bus.exclusive_holder(), Some(first));

    assert_eq!(
        bus.try_register(ConsumerOptions::exclusive()),
        Err(BusError::ExclusiveSlotTaken { holder: first })
    );

    bus.unregister_consumer(first);
    assert!(bus.register_new_consumer(true) >= 0);
}

#[test]
fn test_idempotent_unregister() {
    let bus = AudioTimestampBus::new(8);
    let a = bus.register_new_consumer(false);
    let b = bus.register_new_consumer(false);

    assert!(bus.unregister_consumer(a));
    assert!(!bus.unregister_consumer(a));
    assert!(!bus.unregister_consumer(12345));
    assert!(!bus.unregister_consumer(INVALID_CONSUMER_ID));

    assert_eq!(bus.consumer_count(), 1);
    assert!(bus.is_registered(b));
}

#[test]
fn test_unknown_consumer_reads_nothing() {
    let bus = bus_with(&[100]);
    let id = bus.register_new_consumer(false);
    bus.unregister_consumer(id);

    let mut out = AudioFrame::default();
    assert!(!bus.get_frame_by_timestamp(id, 100, 10, &mut out));
    assert!(!bus.get_frame_by_timestamp(-1, 100, 10, &mut out));
    assert!(bus.frame_at(77, 100, 10).is_none());
}

#[test]
fn test_eviction_clamping() {
    let bus = AudioTimestampBus::new(4);
    let id = bus.register_new_consumer(false);

    bus.push_frame(frame(0));
    assert!(bus.frame_at(id, 0, 0).is_some());

    // consumer stalls while the ring wraps twice
    for i in 1..=8 {
        bus.push_frame(frame(i * 10));
    }
    assert_eq!(bus.resident_timestamps(), vec![50, 60, 70, 80]);

    // target inside the evicted history: ordinary miss, cursor clamped
    assert!(bus.frame_at(id, 20, 5).is_none());
    let state = bus.consumer_state(id).unwrap();
    assert_eq!(state.skipped, 4);
    assert_eq!(bus.stats().skipped, 4);

    // reading resumes as soon as the target meets resident data
    assert_eq!(bus.frame_at(id, 50, 5).map(|f| f.timestamp_ms), Some(50));
    bus.push_frame(frame(90));
    assert_eq!(bus.frame_at(id, 90, 5).map(|f| f.timestamp_ms), Some(90));
}

#[test]
fn test_idle_consumers_do_not_affect_push() {
    let bus = AudioTimestampBus::new(8);
    for _ in 0..1000 {
        bus.register_new_consumer(false);
    }
    for i in 0..100 {
        assert!(bus.push_frame(frame(i)));
    }
    assert_eq!(bus.len(), 8);
    assert_eq!(bus.stats().rejected, 0);
    assert_eq!(bus.used_ratio(), Some(1.0));
}

#[test]
fn test_malformed_frame_is_rejected() {
    let bus = AudioTimestampBus::with_config(BusConfig::with_capacity(4).block_frames(32));
    assert!(bus.push_frame(frame(0)));

    let short = AudioFrame::from_i16(10, 48_000, 2, &[0; 10]);
    assert!(matches!(
        bus.try_push_frame(short),
        Err(BusError::MalformedFrame { .. })
    ));

    let mut no_channels = frame(20);
    no_channels.channels = 0;
    assert!(!bus.push_frame(no_channels));

    assert_eq!(bus.resident_timestamps(), vec![0]);
    assert_eq!(bus.stats().rejected, 2);
}

#[test]
fn test_is_active_lifecycle() {
    let bus = AudioTimestampBus::new(4);
    assert!(!bus.is_active());

    bus.push_frame(frame(1));
    assert!(bus.is_active());

    bus.close();
    assert!(!bus.is_active());
    assert!(!bus.push_frame(frame(2)));

    bus.set_active(true);
    assert!(bus.is_active());
}

#[test]
fn test_prefer_past_policy() {
    let bus = AudioTimestampBus::with_config(BusConfig::default().lookup(LookupPolicy::PreferPast));
    for ts in [100, 118] {
        bus.push_frame(frame(ts));
    }
    let id = bus.register_new_consumer(false);
    // 118 is closer, the past frame wins
    assert_eq!(bus.frame_at(id, 115, 20).map(|f| f.timestamp_ms), Some(100));
}

#[test]
fn test_timestamp_start_position() {
    let bus = bus_with(&[100, 116, 132, 148]);
    let id = bus
        .try_register(ConsumerOptions::shared().starting_at(StartPosition::Timestamp(135)))
        .unwrap();

    // cursor starts at 132, older frames are not eligible
    assert!(bus.frame_at(id, 116, 0).is_none());
    assert_eq!(bus.frame_at(id, 132, 0).map(|f| f.timestamp_ms), Some(132));
}

#[test]
fn test_register_with_chosen_id() {
    let bus = AudioTimestampBus::new(4);
    assert!(bus.register_consumer(5, ConsumerOptions::shared()).is_ok());
    assert_eq!(
        bus.register_consumer(5, ConsumerOptions::shared()),
        Err(BusError::ConsumerExists { id: 5 })
    );
    assert!(bus.is_registered(5));
}

#[test]
fn test_block_shape_fixed_by_first_frame() {
    let bus = AudioTimestampBus::new(8);
    assert!(bus.push_frame(AudioFrame::from_i16(0, 48_000, 2, &[0; 960])));

    // shorter block, same format
    let short = AudioFrame::from_i16(10, 48_000, 2, &[0; 2]);
    assert!(matches!(
        bus.try_push_frame(short),
        Err(BusError::MalformedFrame { .. })
    ));
    // format switch mid-stream
    assert!(!bus.push_frame(AudioFrame::from_i16(20, 44_100, 1, &[0; 7])));

    assert_eq!(bus.len(), 1);
    assert_eq!(bus.stats().rejected, 2);

    // a cleared bus accepts a new shape
    bus.clear();
    assert!(bus.push_frame(AudioFrame::from_i16(30, 44_100, 1, &[0; 7])));
    assert!(!bus.push_frame(AudioFrame::from_i16(40, 48_000, 2, &[0; 960])));
}

#[test]
fn test_out_of_order_pushes_are_kept_in_push_order() {
    let bus = AudioTimestampBus::new(8);
    let id = bus.register_new_consumer(false);
    for ts in [100, 148, 116] {
        assert!(bus.push_frame(frame(ts)));
    }
    assert_eq!(bus.resident_timestamps(), vec![100, 148, 116]);

    // 116 is the newest push, so reading it leaves nothing unread
    assert_eq!(bus.frame_at(id, 116, 0).map(|f| f.timestamp_ms), Some(116));
    assert!(bus.frame_at(id, 148, 10).is_none());
    assert_eq!(bus.stats().rejected, 0);
}
