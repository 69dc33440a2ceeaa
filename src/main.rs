// src/main.rs

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::Context;
use log::{error, info};
use rand::Rng;

use timestamp_bus::config::{self, Config, DemoConfig};
use timestamp_bus::core::timestamp::format_utc_ms;
use timestamp_bus::{AudioFrame, ConsumerConnection, ConsumerOptions, SharedBufferHandle, utc_ms_now};

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Default)]
struct ReaderCounters {
    id: i32,
    hits: AtomicU64,
    misses: AtomicU64,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    // ------------------------------------------------------------
    // Config
    // ------------------------------------------------------------
    let cfg = load_config()?;

    // ------------------------------------------------------------
    // Graceful shutdown
    // ------------------------------------------------------------
    let running = Arc::new(AtomicBool::new(true));
    {
        let r = running.clone();
        ctrlc::set_handler(move || {
            info!("[tsbus] shutdown requested");
            r.store(false, Ordering::SeqCst);
        })?;
    }

    // ------------------------------------------------------------
    // Bus
    // ------------------------------------------------------------
    let block_frames = cfg
        .demo
        .block_frames()
        .context("demo block size overflows")?;
    let mut bus_cfg = cfg.bus.clone();
    if bus_cfg.block_frames.is_none() {
        bus_cfg.block_frames = Some(block_frames);
    }
    let handle = SharedBufferHandle::with_config(bus_cfg);
    info!(
        "[tsbus] bus '{}' capacity={} block={} frames",
        handle.name(),
        handle.capacity(),
        block_frames
    );

    // ------------------------------------------------------------
    // Producer + Consumers
    // ------------------------------------------------------------
    let producer = start_producer(&cfg.demo, block_frames, handle.clone(), running.clone());

    let mut readers = Vec::new();
    let mut counters = Vec::new();
    for n in 0..cfg.demo.consumers {
        let conn = handle.connect(ConsumerOptions::shared())?;
        let c = Arc::new(ReaderCounters {
            id: conn.id(),
            ..ReaderCounters::default()
        });
        counters.push(c.clone());
        readers.push(start_consumer(n, &cfg.demo, conn, c, running.clone()));
    }

    // ------------------------------------------------------------
    // Stats loop
    // ------------------------------------------------------------
    let started = Instant::now();
    let interval = Duration::from_millis(cfg.demo.stats_interval_ms.max(10));
    let mut last_stats = Instant::now();
    while running.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(10));

        if cfg.demo.run_secs > 0 && started.elapsed() >= Duration::from_secs(cfg.demo.run_secs) {
            info!("[tsbus] run time elapsed");
            running.store(false, Ordering::SeqCst);
        }

        if last_stats.elapsed() >= interval {
            last_stats = Instant::now();
            log_stats(&handle, &counters);
        }
    }

    // ------------------------------------------------------------
    // Teardown: readers unregister before the producer closes the bus
    // ------------------------------------------------------------
    for reader in readers {
        if reader.join().is_err() {
            error!("[tsbus] consumer thread panicked");
        }
    }
    if producer.join().is_err() {
        error!("[tsbus] producer thread panicked");
    }
    handle.close();
    log_stats(&handle, &counters);
    info!("[tsbus] stopped, {} handle(s) left", handle.holders());

    Ok(())
}

fn load_config() -> anyhow::Result<Config> {
    match std::env::args().nth(1) {
        Some(path) => {
            let cfg = config::load(&path)?;
            info!("[tsbus] loaded {}", path);
            Ok(cfg)
        }
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            let cfg = config::load(DEFAULT_CONFIG_PATH)?;
            info!("[tsbus] loaded {}", DEFAULT_CONFIG_PATH);
            Ok(cfg)
        }
        None => {
            info!("[tsbus] no config file, using defaults");
            Ok(Config::default())
        }
    }
}

fn start_producer(
    demo: &DemoConfig,
    frames: usize,
    handle: SharedBufferHandle,
    running: Arc<AtomicBool>,
) -> JoinHandle<()> {
    let rate = demo.sample_rate;
    let channels = demo.channels;
    let block = Duration::from_millis(demo.block_ms);
    let step = 2.0 * std::f32::consts::PI * demo.tone_hz / rate as f32;

    thread::spawn(move || {
        let mut phase: f32 = 0.0;
        let mut samples = vec![0i16; frames * channels as usize];
        let mut next_deadline = Instant::now();

        while running.load(Ordering::Relaxed) {
            for frame in samples.chunks_exact_mut(channels as usize) {
                let v = (phase.sin() * 0.2 * i16::MAX as f32) as i16;
                frame.fill(v);
                phase = (phase + step) % (2.0 * std::f32::consts::PI);
            }

            let frame = AudioFrame::from_i16(utc_ms_now(), rate, channels, &samples);
            if let Err(e) = handle.try_push_frame(frame) {
                error!("[tsbus] producer push failed: {}", e);
            }

            next_deadline += block;
            let now = Instant::now();
            if next_deadline > now {
                thread::sleep(next_deadline - now);
            } else {
                next_deadline = now;
            }
        }
        info!("[tsbus] producer stopped");
    })
}

fn start_consumer(
    n: usize,
    demo: &DemoConfig,
    conn: ConsumerConnection,
    counters: Arc<ReaderCounters>,
    running: Arc<AtomicBool>,
) -> JoinHandle<()> {
    let skew_ms = if demo.max_skew_ms > 0 {
        rand::thread_rng().gen_range(-demo.max_skew_ms..=demo.max_skew_ms)
    } else {
        0
    };
    let tolerance_ms = demo.tolerance_ms;
    let block = Duration::from_millis(demo.block_ms);
    info!(
        "[tsbus] consumer #{} id={} clock skew {}ms",
        n,
        conn.id(),
        skew_ms
    );

    thread::spawn(move || {
        let mut out = AudioFrame::default();
        while running.load(Ordering::Relaxed) {
            let now = utc_ms_now() + skew_ms;
            if conn.read_into(now, tolerance_ms, &mut out) {
                counters.hits.fetch_add(1, Ordering::Relaxed);
            } else {
                // a device callback would emit silence for this block
                counters.misses.fetch_add(1, Ordering::Relaxed);
            }
            thread::sleep(block);
        }
        info!(
            "[tsbus] consumer id={} stopped, last frame at {}",
            conn.id(),
            format_utc_ms(out.timestamp_ms)
        );
        // dropping the connection unregisters it
    })
}

fn log_stats(handle: &SharedBufferHandle, counters: &[Arc<ReaderCounters>]) {
    match serde_json::to_string(&handle.stats()) {
        Ok(json) => info!("[tsbus] stats {}", json),
        Err(e) => error!("[tsbus] stats serialization failed: {}", e),
    }
    for c in counters {
        info!(
            "[tsbus] consumer id={} hits={} misses={} used_ratio={:?}",
            c.id,
            c.hits.load(Ordering::Relaxed),
            c.misses.load(Ordering::Relaxed),
            handle.used_ratio()
        );
    }
}
