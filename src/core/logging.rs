// src/core/logging.rs
use std::sync::atomic::{AtomicU64, Ordering};

use crate::core::timestamp::utc_ms_now;

// Globale Sequenznummer für Korrelation
static LOG_SEQUENCE: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone)]
pub struct LogContext {
    pub component: String,
    pub instance_id: String,
    pub consumer_id: Option<i32>,
    pub sequence: u64,
    pub timestamp_ms: i64,
}

impl LogContext {
    pub fn new(component: &str, instance_id: &str) -> Self {
        Self {
            component: component.to_string(),
            instance_id: instance_id.to_string(),
            consumer_id: None,
            sequence: LOG_SEQUENCE.fetch_add(1, Ordering::Relaxed),
            timestamp_ms: utc_ms_now(),
        }
    }

    pub fn with_consumer(mut self, consumer_id: i32) -> Self {
        self.consumer_id = Some(consumer_id);
        self
    }

    pub fn format(&self, level: &str, message: &str) -> String {
        let consumer_info = match self.consumer_id {
            Some(id) => format!(" consumer={}", id),
            None => String::new(),
        };

        format!(
            "[{}][seq={:06}][{}:{}{}] {}",
            level, self.sequence, self.component, self.instance_id, consumer_info, message
        )
    }
}

// Helper Trait für einheitliches Logging
pub trait ComponentLogger {
    fn log_context(&self) -> LogContext;

    fn debug(&self, message: &str) {
        let ctx = self.log_context();
        log::debug!("{}", ctx.format("DEBUG", message));
    }

    fn info(&self, message: &str) {
        let ctx = self.log_context();
        log::info!("{}", ctx.format("INFO", message));
    }

    fn warn(&self, message: &str) {
        let ctx = self.log_context();
        log::warn!("{}", ctx.format("WARN", message));
    }

    fn error(&self, message: &str) {
        let ctx = self.log_context();
        log::error!("{}", ctx.format("ERROR", message));
    }

    fn trace_bus(&self, bus: &crate::core::bus::AudioTimestampBus) {
        if !log::log_enabled!(log::Level::Debug) {
            return;
        }
        let stats = bus.stats();
        let ctx = self.log_context();

        let bus_info = format!(
            "bus frames={}/{} consumers={} evicted={} rejected={} skipped={}",
            stats.len, stats.capacity, stats.consumers, stats.evicted, stats.rejected, stats.skipped
        );

        log::debug!("{}", ctx.format("TRACE", &bus_info));
    }
}
