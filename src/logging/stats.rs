// SPDX-License-Identifier: Apache-2.0 OR MIT
// Lock-free counters shared by the sampler, the buffer and the consumer

use metrics::gauge;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Adaptive multiplier below which the pipeline reports itself degraded
pub const DEGRADED_MULTIPLIER_THRESHOLD: f64 = 0.3;

/// Monotonic event counters
///
/// Sampling counters (`total`, `sampled`, `sampling_dropped`) are written only
/// by the sampling engine. Buffer counters (`buffered`, `dropped`,
/// `overflow`, `delivered`) are written only by the append path and the
/// consumer. A sampling drop never shows up in the buffer counters.
#[derive(Debug, Default)]
pub struct StatsRegistry {
    total_events: AtomicU64,
    sampled_events: AtomicU64,
    sampling_dropped_events: AtomicU64,
    buffered_events: AtomicU64,
    dropped_events: AtomicU64,
    overflow_events: AtomicU64,
    delivered_events: AtomicU64,
}

impl StatsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_sampled(&self) {
        self.total_events.fetch_add(1, Ordering::Relaxed);
        self.sampled_events.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_sampling_drop(&self) {
        self.total_events.fetch_add(1, Ordering::Relaxed);
        self.sampling_dropped_events.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_buffered(&self) {
        self.buffered_events.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the new dropped total
    pub(crate) fn record_dropped(&self) -> u64 {
        self.dropped_events.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn record_overflow(&self) {
        self.overflow_events.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivered(&self) {
        self.delivered_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_events(&self) -> u64 {
        self.total_events.load(Ordering::Relaxed)
    }

    pub fn sampled_events(&self) -> u64 {
        self.sampled_events.load(Ordering::Relaxed)
    }

    pub fn sampling_dropped_events(&self) -> u64 {
        self.sampling_dropped_events.load(Ordering::Relaxed)
    }

    pub fn buffered_events(&self) -> u64 {
        self.buffered_events.load(Ordering::Relaxed)
    }

    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    pub fn overflow_events(&self) -> u64 {
        self.overflow_events.load(Ordering::Relaxed)
    }

    pub fn delivered_events(&self) -> u64 {
        self.delivered_events.load(Ordering::Relaxed)
    }

    /// Percentage of sampled events that were kept (100 when nothing was seen)
    pub fn sampling_percentage(&self) -> f64 {
        let total = self.total_events();
        if total == 0 {
            return 100.0;
        }
        (self.sampled_events() as f64 * 100.0) / total as f64
    }

    /// Percentage of buffered events lost to backpressure
    pub fn drop_rate_percent(&self) -> f64 {
        let buffered = self.buffered_events();
        if buffered == 0 {
            return 0.0;
        }
        (self.dropped_events() as f64 * 100.0) / buffered as f64
    }

    /// Point-in-time view combining the counters with the live gauges
    pub fn snapshot(
        &self,
        buffer_len: usize,
        buffer_utilization_percent: u8,
        adaptive_multiplier: f64,
    ) -> StatsSnapshot {
        StatsSnapshot {
            total_events: self.total_events(),
            sampled_events: self.sampled_events(),
            sampling_dropped_events: self.sampling_dropped_events(),
            buffered_events: self.buffered_events(),
            dropped_events: self.dropped_events(),
            overflow_events: self.overflow_events(),
            delivered_events: self.delivered_events(),
            sampling_percentage: self.sampling_percentage(),
            drop_rate_percent: self.drop_rate_percent(),
            buffer_len,
            buffer_utilization_percent,
            adaptive_multiplier,
            health: Health::from_multiplier(adaptive_multiplier),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Health {
    Up,
    /// Adaptive sampling has cut the rate to shed load
    Degraded,
}

impl Health {
    pub fn from_multiplier(multiplier: f64) -> Self {
        if multiplier < DEGRADED_MULTIPLIER_THRESHOLD {
            Health::Degraded
        } else {
            Health::Up
        }
    }
}

/// Read-only view handed to the metrics / health facade
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub total_events: u64,
    pub sampled_events: u64,
    pub sampling_dropped_events: u64,
    pub buffered_events: u64,
    pub dropped_events: u64,
    pub overflow_events: u64,
    pub delivered_events: u64,
    pub sampling_percentage: f64,
    pub drop_rate_percent: f64,
    pub buffer_len: usize,
    pub buffer_utilization_percent: u8,
    pub adaptive_multiplier: f64,
    pub health: Health,
}

impl StatsSnapshot {
    /// Push the snapshot into whatever `metrics` recorder is installed
    pub fn publish(&self) {
        gauge!("logflow_events_total").set(self.total_events as f64);
        gauge!("logflow_events_sampled").set(self.sampled_events as f64);
        gauge!("logflow_events_sampling_dropped").set(self.sampling_dropped_events as f64);
        gauge!("logflow_events_buffered").set(self.buffered_events as f64);
        gauge!("logflow_events_dropped").set(self.dropped_events as f64);
        gauge!("logflow_events_overflow").set(self.overflow_events as f64);
        gauge!("logflow_events_delivered").set(self.delivered_events as f64);
        gauge!("logflow_drop_rate_percent").set(self.drop_rate_percent);
        gauge!("logflow_buffer_utilization_percent")
            .set(self.buffer_utilization_percent as f64);
        gauge!("logflow_sampling_adaptive_multiplier").set(self.adaptive_multiplier);
    }
}
