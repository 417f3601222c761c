// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Throughput measurement for adaptive sampling
//!
//! Every counted event bumps a window counter. Callers on the ADAPTIVE path
//! call [`LoadMonitor::tick`]; once a measurement interval (1s) has elapsed
//! the window rate is computed and mapped onto a multiplier:
//!
//! - **> critical**: 0.1
//! - **> high**: 0.5
//! - otherwise: 1.0
//!
//! The window then restarts, so the multiplier always reflects the last
//! interval rather than an all-time average. A window left open for a long
//! time (nobody on the ADAPTIVE path) is still measured over its full span,
//! so a quiet stretch after an overload restores the full rate.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

const MEASUREMENT_INTERVAL: Duration = Duration::from_secs(1);

/// Load classification derived from the last measured window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LoadLevel {
    Normal = 0,
    High = 1,
    Critical = 2,
}

impl LoadLevel {
    const fn from_u8(value: u8) -> Self {
        match value {
            1 => LoadLevel::High,
            2 => LoadLevel::Critical,
            _ => LoadLevel::Normal,
        }
    }

    /// Factor applied to the effective sampling rate
    pub const fn multiplier(self) -> f64 {
        match self {
            LoadLevel::Normal => 1.0,
            LoadLevel::High => 0.5,
            LoadLevel::Critical => 0.1,
        }
    }

    fn classify(events_per_second: f64, thresholds: LoadThresholds) -> Self {
        if events_per_second > thresholds.critical as f64 {
            LoadLevel::Critical
        } else if events_per_second > thresholds.high as f64 {
            LoadLevel::High
        } else {
            LoadLevel::Normal
        }
    }
}

/// Events/sec boundaries, read from the live sampling config on each tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadThresholds {
    pub high: u64,
    pub critical: u64,
}

pub struct LoadMonitor {
    /// Events recorded since `window_start`
    window_events: AtomicU64,

    level: AtomicU8,

    window_start: Mutex<Instant>,
}

impl LoadMonitor {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    /// Monitor whose first window opens at `start`
    pub fn starting_at(start: Instant) -> Self {
        Self {
            window_events: AtomicU64::new(0),
            level: AtomicU8::new(LoadLevel::Normal as u8),
            window_start: Mutex::new(start),
        }
    }

    #[inline]
    pub fn record_event(&self) {
        self.window_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_events(&self, count: u64) {
        self.window_events.fetch_add(count, Ordering::Relaxed);
    }

    pub fn current_level(&self) -> LoadLevel {
        LoadLevel::from_u8(self.level.load(Ordering::Relaxed))
    }

    /// Multiplier from the most recent measurement, always in [0.1, 1.0]
    pub fn current_multiplier(&self) -> f64 {
        self.current_level().multiplier()
    }

    pub fn tick(&self, thresholds: LoadThresholds) -> f64 {
        self.tick_at(Instant::now(), thresholds)
    }

    /// Measure the window if an interval has elapsed by `now`
    ///
    /// Returns the (possibly updated) multiplier. Never blocks: if another
    /// thread is measuring, the current multiplier is returned as is.
    pub fn tick_at(&self, now: Instant, thresholds: LoadThresholds) -> f64 {
        let mut start = match self.window_start.try_lock() {
            Ok(guard) => guard,
            Err(_) => return self.current_multiplier(), // Another thread is measuring, skip
        };

        let elapsed = now.saturating_duration_since(*start);
        if elapsed < MEASUREMENT_INTERVAL {
            return self.current_multiplier(); // Too soon
        }

        let events = self.window_events.swap(0, Ordering::Relaxed);
        *start = now;

        let events_per_second = events as f64 / elapsed.as_secs_f64();
        let target = LoadLevel::classify(events_per_second, thresholds);
        let previous = LoadLevel::from_u8(self.level.swap(target as u8, Ordering::Relaxed));

        if previous != target {
            tracing::debug!(
                events_per_second,
                from = ?previous,
                to = ?target,
                "adaptive sampling multiplier changed to {}",
                target.multiplier()
            );
        }

        target.multiplier()
    }
}

impl Default for LoadMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LoadMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadMonitor")
            .field("window_events", &self.window_events.load(Ordering::Relaxed))
            .field("level", &self.current_level())
            .finish()
    }
}
