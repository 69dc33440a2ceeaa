use timestamp_bus::{
    AudioFrame, AudioPayload, BusConfig, BusError, ConsumerOptions, SharedBufferHandle,
};

fn frame(ts: i64) -> AudioFrame {
    AudioFrame::from_i16(ts, 44_100, 1, &[7i16; 16])
}

#[test]
fn test_producer_and_consumer_share_one_bus() {
    // producer node creates the bus and exposes it as its output
    let producer_side = SharedBufferHandle::with_config(BusConfig::with_capacity(8).named("decoder"));
    let output = AudioPayload::streaming(producer_side.clone());

    // consumer node receives the payload and registers
    let consumer_side = match &output {
        AudioPayload::Streaming(handle) => handle.clone(),
        AudioPayload::Empty => panic!("expected a streaming payload"),
    };
    assert!(consumer_side.ptr_eq(&producer_side));

    let conn = consumer_side.connect(ConsumerOptions::shared()).unwrap();
    producer_side.push_frame(frame(1_000));

    let got = conn.read(1_003, 5).expect("frame within tolerance");
    assert_eq!(got.timestamp_ms, 1_000);
    assert_eq!(got.samples_i16(), Some(vec![7i16; 16]));
    assert_eq!(conn.available(), 0);
}

#[test]
fn test_bus_outlives_any_single_holder() {
    let producer = SharedBufferHandle::with_capacity(4);
    let consumer = producer.clone();
    let weak = producer.downgrade();

    let id = consumer.register_new_consumer(false);
    producer.push_frame(frame(10));

    // producer node goes away first; the consumer keeps reading
    drop(producer);
    assert!(weak.is_alive());
    assert_eq!(consumer.frame_at(id, 10, 0).map(|f| f.timestamp_ms), Some(10));

    consumer.unregister_consumer(id);
    drop(consumer);
    assert!(!weak.is_alive());
}

#[test]
fn test_last_consumer_leaving_keeps_producer_working() {
    let producer = SharedBufferHandle::with_capacity(4);
    {
        let conn = producer.connect(ConsumerOptions::shared()).unwrap();
        assert_eq!(producer.consumer_count(), 1);
        drop(conn);
    }
    assert_eq!(producer.consumer_count(), 0);
    assert!(producer.push_frame(frame(1)));
    assert!(producer.is_active());
}

#[test]
fn test_exclusive_connection_released_on_drop() {
    let handle = SharedBufferHandle::with_capacity(4);
    let first = handle.connect(ConsumerOptions::exclusive()).unwrap();
    let refused = handle.connect(ConsumerOptions::exclusive());
    assert!(matches!(refused, Err(BusError::ExclusiveSlotTaken { .. })));

    drop(first);
    assert!(handle.connect(ConsumerOptions::exclusive()).is_ok());
}

#[test]
fn test_payload_disconnect_releases_reference() {
    let handle = SharedBufferHandle::with_capacity(4);
    let mut payload = AudioPayload::default();
    assert!(!payload.is_streaming());

    payload.set(handle.clone());
    assert_eq!(handle.holders(), 2);

    drop(payload.disconnect());
    assert_eq!(handle.holders(), 1);
    assert!(payload.handle().is_none());
}
