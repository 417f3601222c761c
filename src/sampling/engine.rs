// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Per-event keep/drop decisions
//!
//! Evaluation order for every call:
//!
//! 1. sampling disabled: keep, nothing counted
//! 2. WARN and above with `alwaysSampleAboveWarn`: keep, counted as sampled
//! 3. explicit [`Marker`]: keep or drop as told, not counted
//! 4. strategy dispatch, counted as sampled or dropped

use super::context;
use super::load::{LoadMonitor, LoadThresholds};
use super::random::RandomSource;
use super::SamplingStrategy;
use crate::config::{ConfigError, SamplingConfig};
use crate::logging::{Level, StatsRegistry};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// PRIORITY scaling for DEBUG relative to the base rate
const DEBUG_RATE_FACTOR: f64 = 0.5;
/// PRIORITY scaling for TRACE relative to the base rate
const TRACE_RATE_FACTOR: f64 = 0.1;

/// Out-of-band override attached to a single log call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    ForceKeep,
    ForceDrop,
}

pub struct SamplingEngine {
    config: RwLock<Arc<SamplingConfig>>,
    load: LoadMonitor,
    random: Arc<dyn RandomSource>,
    stats: Arc<StatsRegistry>,
    count_counter: AtomicU64,
}

impl SamplingEngine {
    /// Create an engine; the configuration is validated first
    pub fn new(
        config: SamplingConfig,
        random: Arc<dyn RandomSource>,
        stats: Arc<StatsRegistry>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config: RwLock::new(Arc::new(config)),
            load: LoadMonitor::new(),
            random,
            stats,
            count_counter: AtomicU64::new(0),
        })
    }

    /// Current configuration
    pub fn config(&self) -> Arc<SamplingConfig> {
        let guard = self
            .config
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&guard)
    }

    /// Swap in a new configuration
    ///
    /// An invalid configuration is rejected and the old one stays active.
    /// Decisions already in flight finish with the configuration they read.
    pub fn update_config(&self, config: SamplingConfig) -> Result<(), ConfigError> {
        config.validate()?;
        tracing::debug!(strategy = ?config.strategy, rate = config.rate, "sampling config updated");
        let mut guard = self
            .config
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Arc::new(config);
        Ok(())
    }

    pub fn should_keep(&self, level: Level, logger: &str, path: Option<&str>) -> bool {
        self.should_keep_with(level, logger, path, None)
    }

    /// Decide whether an event is kept, honoring an optional marker
    pub fn should_keep_with(
        &self,
        level: Level,
        logger: &str,
        path: Option<&str>,
        marker: Option<Marker>,
    ) -> bool {
        let config = self.config();

        if !config.enabled {
            return true;
        }

        if config.always_sample_above_warn && level.is_warn_or_above() {
            self.load.record_event();
            self.stats.record_sampled();
            return true;
        }

        match marker {
            Some(Marker::ForceKeep) => return true,
            Some(Marker::ForceDrop) => return false,
            None => {}
        }

        self.load.record_event();
        let keep = self.dispatch(&config, level, logger, path);
        if keep {
            self.stats.record_sampled();
        } else {
            self.stats.record_sampling_drop();
        }
        keep
    }

    fn dispatch(&self, config: &SamplingConfig, level: Level, logger: &str, path: Option<&str>) -> bool {
        match config.strategy {
            SamplingStrategy::None => true,
            SamplingStrategy::Rate => self.draw(effective_rate(config, path, logger)),
            SamplingStrategy::Adaptive => {
                let multiplier = self.load.tick(LoadThresholds {
                    high: config.high_load_threshold,
                    critical: config.critical_load_threshold,
                });
                self.draw(effective_rate(config, path, logger) * multiplier)
            }
            SamplingStrategy::Priority => {
                let base = effective_rate(config, path, logger);
                let rate = match level {
                    Level::Debug => base * DEBUG_RATE_FACTOR,
                    Level::Trace => base * TRACE_RATE_FACTOR,
                    _ => base,
                };
                self.draw(rate)
            }
            SamplingStrategy::CountBased => {
                let count = self.count_counter.fetch_add(1, Ordering::Relaxed) + 1;
                count % config.count_interval.max(1) == 0
            }
            SamplingStrategy::HeadBased => {
                let rate = effective_rate(config, path, logger);
                context::with_current(|ctx| ctx.decide_head(|| self.draw(rate)))
            }
            // Filtering happens downstream, keyed on the tail mark
            SamplingStrategy::TailBased => true,
        }
    }

    #[inline]
    fn draw(&self, rate: f64) -> bool {
        self.random.next_f64() < rate
    }

    /// Flag the current request so a downstream tail sampler retains it
    pub fn mark_for_tail_sampling(&self) {
        context::with_current(|ctx| ctx.mark_tail());
    }

    pub fn is_marked_for_tail_sampling(&self) -> bool {
        context::with_current(|ctx| ctx.is_tail_marked())
    }

    /// Rate that RATE sampling would apply to this path and logger
    pub fn effective_rate(&self, path: Option<&str>, logger: &str) -> f64 {
        effective_rate(&self.config(), path, logger)
    }

    /// Adaptive multiplier from the last load measurement
    pub fn current_multiplier(&self) -> f64 {
        self.load.current_multiplier()
    }

    pub fn load_monitor(&self) -> &LoadMonitor {
        &self.load
    }

    /// Percentage of counted events that were kept
    pub fn sampling_percentage(&self) -> f64 {
        self.stats.sampling_percentage()
    }
}

impl std::fmt::Debug for SamplingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SamplingEngine")
            .field("config", &self.config())
            .field("load", &self.load)
            .finish()
    }
}

/// First matching path override, then logger override, then the global rate
fn effective_rate(config: &SamplingConfig, path: Option<&str>, logger: &str) -> f64 {
    if let Some(path) = path {
        if let Some(entry) = config
            .path_rates
            .iter()
            .find(|entry| matches_path(path, &entry.pattern))
        {
            return entry.rate;
        }
    }

    config
        .logger_rates
        .iter()
        .find(|entry| logger.starts_with(&entry.prefix))
        .map(|entry| entry.rate)
        .unwrap_or(config.rate)
}

/// Glob-style path match
///
/// - `/api/**` matches `/api` and anything below it
/// - `/api/*` matches exactly one segment below `/api/`
/// - `*.json` matches by suffix
/// - anything else must be equal
pub fn matches_path(path: &str, pattern: &str) -> bool {
    if let Some(prefix) = pattern.strip_suffix("/**") {
        return path.starts_with(prefix);
    }
    if let Some(prefix) = pattern.strip_suffix('*').filter(|p| p.ends_with('/')) {
        return match path.strip_prefix(prefix) {
            Some(rest) => !rest.is_empty() && !rest.contains('/'),
            None => false,
        };
    }
    if let Some(suffix) = pattern.strip_prefix('*') {
        return path.ends_with(suffix);
    }
    path == pattern
}
