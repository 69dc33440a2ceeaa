use serde::{Deserialize, Serialize};

use crate::core::lookup::LookupPolicy;

// ---------- Bus ----------
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct BusConfig {
    /// Label used in log lines.
    pub name: String,
    /// Ring capacity in frames.
    pub capacity: usize,
    /// Exact sample frames per pushed block; `None` accepts any whole count.
    pub block_frames: Option<usize>,
    pub lookup: LookupPolicy,
    /// Producer gives up on the bus lock after this long and drops the frame.
    pub push_lock_timeout_us: Option<u64>,
    /// Bound of each write-event channel handed out by `subscribe_writes`.
    pub notify_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            name: "bus".to_string(),
            capacity: 8,
            block_frames: None,
            lookup: LookupPolicy::Nearest,
            push_lock_timeout_us: None,
            notify_capacity: 16,
        }
    }
}

impl BusConfig {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn block_frames(mut self, frames: usize) -> Self {
        self.block_frames = Some(frames);
        self
    }

    pub fn lookup(mut self, policy: LookupPolicy) -> Self {
        self.lookup = policy;
        self
    }
}

// ---------- Demo ----------
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct DemoConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub block_ms: u64,
    pub tone_hz: f32,
    pub consumers: usize,
    pub tolerance_ms: i64,
    /// Each consumer's clock is offset by a random amount within `±max_skew_ms`.
    pub max_skew_ms: i64,
    /// 0 runs until Ctrl-C.
    pub run_secs: u64,
    pub stats_interval_ms: u64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 2,
            block_ms: 10,
            tone_hz: 440.0,
            consumers: 2,
            tolerance_ms: 10,
            max_skew_ms: 3,
            run_secs: 0,
            stats_interval_ms: 1000,
        }
    }
}

impl DemoConfig {
    /// Sample frames per block, `None` if the product does not fit.
    pub fn block_frames(&self) -> Option<usize> {
        let samples = u64::from(self.sample_rate).checked_mul(self.block_ms)? / 1000;
        usize::try_from(samples).ok()
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub bus: BusConfig,
    pub demo: DemoConfig,
}

pub fn load(path: &str) -> anyhow::Result<Config> {
    let txt = std::fs::read_to_string(path)?;
    parse(&txt)
}

pub fn parse(txt: &str) -> anyhow::Result<Config> {
    let cfg: Config = toml::from_str(txt)?;
    if cfg.bus.capacity == 0 {
        anyhow::bail!("bus.capacity must be at least 1");
    }
    if cfg.demo.channels == 0 {
        anyhow::bail!("demo.channels must be at least 1");
    }
    match cfg.demo.block_frames() {
        None => anyhow::bail!(
            "demo block of {}ms at {}Hz is too large",
            cfg.demo.block_ms,
            cfg.demo.sample_rate
        ),
        Some(0) => anyhow::bail!(
            "demo block of {}ms at {}Hz holds no samples",
            cfg.demo.block_ms,
            cfg.demo.sample_rate
        ),
        Some(_) => {}
    }
    Ok(cfg)
}
