// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Backpressure handling for a saturated event buffer
//!
//! The controller is only consulted after `try_enqueue` has failed. Each
//! policy decides whether the producer waits, whether something is evicted,
//! and whether the event is spilled to the overflow file instead of lost.
//!
//! | Policy            | On a full buffer                                          |
//! |-------------------|-----------------------------------------------------------|
//! | `Block`           | wait for room, never drop                                 |
//! | `DropOldest`      | evict the head, enqueue the new event                     |
//! | `DropNewest`      | discard the new event                                     |
//! | `Sample`          | keep every Nth event, discard the rest                    |
//! | `DropLowPriority` | WARN+: bounded wait then spill, INFO: try once, else drop |
//! | `OverflowToFile`  | try once more, then spill                                 |

use super::buffer::{BoundedEventBuffer, EnqueueError};
use super::overflow::OverflowWriter;
use super::stats::StatsRegistry;
use super::{Level, LogEvent};
use crate::config::BufferConfig;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A DROP_NEWEST warning is emitted every this many drops
const DROP_WARNING_INTERVAL: u64 = 1000;

/// Policy names as they appear in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BackpressureStrategy {
    Block,
    DropOldest,
    DropNewest,
    Sample,
    DropLowPriority,
    OverflowToFile,
}

/// Resolved policy carrying its own parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackpressurePolicy {
    Block,
    DropOldest,
    DropNewest,
    Sample { every: NonZeroU64 },
    DropLowPriority { wait: Duration },
    OverflowToFile,
}

impl BackpressurePolicy {
    /// Resolve the configured strategy and its parameters
    pub fn from_config(config: &BufferConfig) -> Self {
        match config.backpressure_policy {
            BackpressureStrategy::Block => BackpressurePolicy::Block,
            BackpressureStrategy::DropOldest => BackpressurePolicy::DropOldest,
            BackpressureStrategy::DropNewest => BackpressurePolicy::DropNewest,
            BackpressureStrategy::Sample => BackpressurePolicy::Sample {
                every: NonZeroU64::new(config.sample_rate_under_pressure)
                    .unwrap_or(NonZeroU64::MIN),
            },
            BackpressureStrategy::DropLowPriority => BackpressurePolicy::DropLowPriority {
                wait: Duration::from_millis(config.low_priority_wait_ms),
            },
            BackpressureStrategy::OverflowToFile => BackpressurePolicy::OverflowToFile,
        }
    }

    pub fn strategy(&self) -> BackpressureStrategy {
        match self {
            BackpressurePolicy::Block => BackpressureStrategy::Block,
            BackpressurePolicy::DropOldest => BackpressureStrategy::DropOldest,
            BackpressurePolicy::DropNewest => BackpressureStrategy::DropNewest,
            BackpressurePolicy::Sample { .. } => BackpressureStrategy::Sample,
            BackpressurePolicy::DropLowPriority { .. } => BackpressureStrategy::DropLowPriority,
            BackpressurePolicy::OverflowToFile => BackpressureStrategy::OverflowToFile,
        }
    }
}

/// What happened to an event that hit a full buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Accepted,
    Dropped,
    Spilled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AlarmState {
    Normal = 0,
    Warning = 1,
    Critical = 2,
}

impl AlarmState {
    const fn from_u8(value: u8) -> Self {
        match value {
            1 => AlarmState::Warning,
            2 => AlarmState::Critical,
            _ => AlarmState::Normal,
        }
    }

    fn max_with(self, other: AlarmState) -> AlarmState {
        if (self as u8) >= (other as u8) {
            self
        } else {
            other
        }
    }
}

/// One-shot utilization warnings with hysteresis
///
/// Escalates Normal -> Warning -> Critical as utilization rises and logs
/// once per escalation. Only falling below the warning threshold re-arms
/// it. Purely informational: admission never depends on the state.
#[derive(Debug)]
pub struct UtilizationAlarm {
    warning_threshold: u8,
    critical_threshold: u8,
    state: AtomicU8,
}

impl UtilizationAlarm {
    pub fn new(warning_threshold: u8, critical_threshold: u8) -> Self {
        Self {
            warning_threshold,
            critical_threshold,
            state: AtomicU8::new(AlarmState::Normal as u8),
        }
    }

    pub fn state(&self) -> AlarmState {
        AlarmState::from_u8(self.state.load(Ordering::Relaxed))
    }

    /// Feed the current utilization; returns the new state if it escalated
    pub fn observe(&self, utilization: u8, policy: BackpressureStrategy) -> Option<AlarmState> {
        let current = self.state();

        let target = if utilization >= self.critical_threshold {
            AlarmState::Critical
        } else if utilization >= self.warning_threshold {
            // Hysteresis: stay critical until we drop below the warning line
            current.max_with(AlarmState::Warning)
        } else {
            AlarmState::Normal
        };

        if target == current {
            return None;
        }

        // Only one thread wins the transition and logs it
        if self
            .state
            .compare_exchange(
                current as u8,
                target as u8,
                Ordering::AcqRel,
                Ordering::Relaxed,
            )
            .is_err()
        {
            return None;
        }

        match target {
            AlarmState::Critical => {
                tracing::warn!(
                    utilization,
                    policy = ?policy,
                    "log buffer critical: {}% full",
                    utilization
                );
                Some(target)
            }
            AlarmState::Warning => {
                tracing::warn!(utilization, "log buffer warning: {}% full", utilization);
                Some(target)
            }
            AlarmState::Normal => None,
        }
    }
}

/// Applies the configured policy to events that did not fit
pub struct BackpressureController {
    policy: BackpressurePolicy,
    buffer: Arc<BoundedEventBuffer>,
    overflow: Arc<OverflowWriter>,
    stats: Arc<StatsRegistry>,
    sample_counter: AtomicU64,
}

impl BackpressureController {
    pub fn new(
        policy: BackpressurePolicy,
        buffer: Arc<BoundedEventBuffer>,
        overflow: Arc<OverflowWriter>,
        stats: Arc<StatsRegistry>,
    ) -> Self {
        Self {
            policy,
            buffer,
            overflow,
            stats,
            sample_counter: AtomicU64::new(0),
        }
    }

    pub fn policy(&self) -> BackpressurePolicy {
        self.policy
    }

    /// Decide the fate of an event that `try_enqueue` rejected
    ///
    /// Never returns an error; every failure becomes a counted drop.
    pub fn handle(&self, event: LogEvent, utilization: u8) -> Outcome {
        tracing::trace!(utilization, policy = ?self.policy, "buffer saturated");

        match self.policy {
            BackpressurePolicy::Block => self.block(event),
            BackpressurePolicy::DropOldest => self.drop_oldest(event),
            BackpressurePolicy::DropNewest => self.drop_newest(),
            BackpressurePolicy::Sample { every } => self.sample(event, every),
            BackpressurePolicy::DropLowPriority { wait } => self.drop_low_priority(event, wait),
            BackpressurePolicy::OverflowToFile => self.overflow_to_file(event),
        }
    }

    fn block(&self, event: LogEvent) -> Outcome {
        match self.buffer.enqueue_blocking(event, None) {
            Ok(()) => Outcome::Accepted,
            // Only a closed buffer ends an unbounded wait
            Err(_) => self.drop_event(),
        }
    }

    fn drop_oldest(&self, event: LogEvent) -> Outcome {
        // The consumer may already be gone; nothing would ever drain it
        if self.buffer.is_closed() {
            return self.drop_event();
        }
        if self.buffer.force_enqueue(event).is_some() {
            self.stats.record_dropped();
        }
        Outcome::Accepted
    }

    fn drop_newest(&self) -> Outcome {
        let dropped = self.stats.record_dropped();
        if dropped % DROP_WARNING_INTERVAL == 0 {
            tracing::warn!(dropped, "dropped {} log events due to buffer overflow", dropped);
        }
        Outcome::Dropped
    }

    fn sample(&self, event: LogEvent, every: NonZeroU64) -> Outcome {
        let count = self.sample_counter.fetch_add(1, Ordering::Relaxed) + 1;
        if count % every.get() != 0 {
            return self.drop_event();
        }
        match self.buffer.try_enqueue(event) {
            Ok(()) => Outcome::Accepted,
            Err(_) => self.drop_event(),
        }
    }

    fn drop_low_priority(&self, event: LogEvent, wait: Duration) -> Outcome {
        match event.level() {
            level if level >= Level::Warn => match self.buffer.enqueue_blocking(event, Some(wait)) {
                Ok(()) => Outcome::Accepted,
                Err(EnqueueError::Full(event)) => self.spill(event),
                // Shutdown interrupted the wait
                Err(EnqueueError::Closed(_)) => self.drop_event(),
            },
            Level::Info => match self.buffer.try_enqueue(event) {
                Ok(()) => Outcome::Accepted,
                Err(_) => self.drop_event(),
            },
            _ => self.drop_event(),
        }
    }

    fn overflow_to_file(&self, event: LogEvent) -> Outcome {
        match self.buffer.try_enqueue(event) {
            Ok(()) => Outcome::Accepted,
            Err(err) => self.spill(err.into_event()),
        }
    }

    fn spill(&self, event: LogEvent) -> Outcome {
        match self.overflow.write(&event) {
            Ok(()) => {
                self.stats.record_overflow();
                Outcome::Spilled
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to spill log event to overflow file");
                self.drop_event()
            }
        }
    }

    fn drop_event(&self) -> Outcome {
        self.stats.record_dropped();
        Outcome::Dropped
    }
}

impl std::fmt::Debug for BackpressureController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackpressureController")
            .field("policy", &self.policy)
            .field("overflow", &self.overflow.path())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

    struct Harness {
        buffer: Arc<BoundedEventBuffer>,
        stats: Arc<StatsRegistry>,
        controller: BackpressureController,
    }

    fn harness(policy: BackpressurePolicy, capacity: usize, overflow_path: &Path) -> Harness {
        let buffer = Arc::new(BoundedEventBuffer::new(capacity));
        let stats = Arc::new(StatsRegistry::new());
        let controller = BackpressureController::new(
            policy,
            Arc::clone(&buffer),
            Arc::new(OverflowWriter::new(overflow_path)),
            Arc::clone(&stats),
        );
        Harness {
            buffer,
            stats,
            controller,
        }
    }

    fn event(level: Level, msg: &str) -> LogEvent {
        LogEvent::with_parts(level, "test", msg, "main", 0)
    }

    /// Enqueue through the same path the pipeline uses
    fn submit(h: &Harness, e: LogEvent) -> Outcome {
        match h.buffer.try_enqueue(e) {
            Ok(()) => Outcome::Accepted,
            Err(err) => h
                .controller
                .handle(err.into_event(), h.buffer.utilization_percent()),
        }
    }

    fn fill(h: &Harness) {
        while !h.buffer.is_full() {
            h.buffer.try_enqueue(event(Level::Info, "filler")).unwrap();
        }
    }

    #[test]
    fn test_drop_oldest_keeps_newest_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(BackpressurePolicy::DropOldest, 4, &dir.path().join("o.log"));

        for i in 1..=6 {
            assert_eq!(submit(&h, event(Level::Info, &format!("E{}", i))), Outcome::Accepted);
        }

        let contents: Vec<String> = std::iter::from_fn(|| h.buffer.try_dequeue())
            .map(|e| e.message().to_string())
            .collect();
        assert_eq!(contents, vec!["E3", "E4", "E5", "E6"]);
        assert_eq!(h.stats.dropped_events(), 2);
    }

    #[test]
    fn test_drop_oldest_after_close_is_counted() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(BackpressurePolicy::DropOldest, 2, &dir.path().join("o.log"));
        fill(&h);
        h.buffer.close();

        assert_eq!(h.controller.handle(event(Level::Info, "late"), 100), Outcome::Dropped);
        assert_eq!(h.stats.dropped_events(), 1);
        // Nothing was evicted and nothing new is stranded in the buffer
        let contents: Vec<String> = std::iter::from_fn(|| h.buffer.try_dequeue())
            .map(|e| e.message().to_string())
            .collect();
        assert_eq!(contents, vec!["filler", "filler"]);
    }

    /// Counts WARN events emitted while installed
    struct WarnCounter(Arc<AtomicU64>);

    impl<S: tracing::Subscriber> Layer<S> for WarnCounter {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() == tracing::Level::WARN {
                self.0.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    #[test]
    fn test_drop_newest_warns_every_thousand_drops() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(BackpressurePolicy::DropNewest, 1, &dir.path().join("o.log"));
        fill(&h);

        let warnings = Arc::new(AtomicU64::new(0));
        let subscriber = tracing_subscriber::registry().with(WarnCounter(Arc::clone(&warnings)));

        tracing::subscriber::with_default(subscriber, || {
            for _ in 0..999 {
                h.controller.handle(event(Level::Info, "x"), 100);
            }
            assert_eq!(warnings.load(Ordering::Relaxed), 0);

            h.controller.handle(event(Level::Info, "x"), 100);
            assert_eq!(warnings.load(Ordering::Relaxed), 1);

            for _ in 0..1500 {
                h.controller.handle(event(Level::Info, "x"), 100);
            }
        });

        assert_eq!(h.stats.dropped_events(), 2500);
        assert_eq!(warnings.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_drop_newest_discards_incoming() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(BackpressurePolicy::DropNewest, 2, &dir.path().join("o.log"));
        submit(&h, event(Level::Info, "a"));
        submit(&h, event(Level::Info, "b"));

        assert_eq!(submit(&h, event(Level::Error, "c")), Outcome::Dropped);
        assert_eq!(h.stats.dropped_events(), 1);
        assert_eq!(h.buffer.try_dequeue().unwrap().message(), "a");
    }

    #[test]
    fn test_sample_keeps_every_nth_when_room_appears() {
        let dir = tempfile::tempdir().unwrap();
        let every = NonZeroU64::new(3).unwrap();
        let h = harness(BackpressurePolicy::Sample { every }, 4, &dir.path().join("o.log"));
        fill(&h);

        // First two under pressure are dropped, third is kept if there is room
        assert_eq!(h.controller.handle(event(Level::Info, "1"), 100), Outcome::Dropped);
        assert_eq!(h.controller.handle(event(Level::Info, "2"), 100), Outcome::Dropped);
        h.buffer.try_dequeue();
        assert_eq!(h.controller.handle(event(Level::Info, "3"), 75), Outcome::Accepted);
        // Fourth counts toward the next window and is dropped
        assert_eq!(h.controller.handle(event(Level::Info, "4"), 100), Outcome::Dropped);
        assert_eq!(h.stats.dropped_events(), 3);
    }

    #[test]
    fn test_drop_low_priority_by_level() {
        let dir = tempfile::tempdir().unwrap();
        let overflow = dir.path().join("overflow.log");
        let policy = BackpressurePolicy::DropLowPriority {
            wait: Duration::from_millis(20),
        };
        let h = harness(policy, 2, &overflow);
        fill(&h);

        assert_eq!(submit(&h, event(Level::Debug, "debug")), Outcome::Dropped);
        assert_eq!(submit(&h, event(Level::Trace, "trace")), Outcome::Dropped);
        assert_eq!(submit(&h, event(Level::Info, "info")), Outcome::Dropped);
        assert_eq!(h.stats.dropped_events(), 3);

        assert_eq!(submit(&h, event(Level::Error, "boom")), Outcome::Spilled);
        assert_eq!(submit(&h, event(Level::Warn, "careful")), Outcome::Spilled);
        assert_eq!(h.stats.overflow_events(), 2);

        let content = std::fs::read_to_string(&overflow).unwrap();
        assert!(content.contains("[ERROR] main test - boom"));
        assert!(content.contains("[WARN] main test - careful"));
    }

    #[test]
    fn test_drop_low_priority_info_accepted_with_room() {
        let dir = tempfile::tempdir().unwrap();
        let policy = BackpressurePolicy::DropLowPriority {
            wait: Duration::from_millis(20),
        };
        let h = harness(policy, 2, &dir.path().join("o.log"));
        // Room exists by the time the controller retries
        let outcome = h.controller.handle(event(Level::Info, "info"), 100);
        assert_eq!(outcome, Outcome::Accepted);
        assert_eq!(h.stats.dropped_events(), 0);
    }

    #[test]
    fn test_drop_low_priority_error_accepted_when_consumer_drains() {
        let dir = tempfile::tempdir().unwrap();
        let policy = BackpressurePolicy::DropLowPriority {
            wait: Duration::from_millis(500),
        };
        let h = harness(policy, 1, &dir.path().join("o.log"));
        fill(&h);

        let drainer = {
            let buffer = Arc::clone(&h.buffer);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                buffer.try_dequeue()
            })
        };

        assert_eq!(submit(&h, event(Level::Error, "important")), Outcome::Accepted);
        drainer.join().unwrap();
        assert_eq!(h.buffer.try_dequeue().unwrap().message(), "important");
    }

    #[test]
    fn test_spill_failure_counts_as_drop() {
        let dir = tempfile::tempdir().unwrap();
        // Overflow path is a directory, so opening it fails
        let h = harness(BackpressurePolicy::OverflowToFile, 1, dir.path());
        fill(&h);

        assert_eq!(submit(&h, event(Level::Error, "lost")), Outcome::Dropped);
        assert_eq!(h.stats.dropped_events(), 1);
        assert_eq!(h.stats.overflow_events(), 0);
    }

    #[test]
    fn test_overflow_to_file_spills() {
        let dir = tempfile::tempdir().unwrap();
        let overflow = dir.path().join("spill").join("overflow.log");
        let h = harness(BackpressurePolicy::OverflowToFile, 1, &overflow);
        fill(&h);

        assert_eq!(submit(&h, event(Level::Debug, "spilled")), Outcome::Spilled);
        assert_eq!(h.stats.overflow_events(), 1);
        assert!(std::fs::read_to_string(&overflow)
            .unwrap()
            .ends_with("[DEBUG] main test - spilled\n"));
    }

    #[test]
    fn test_block_waits_for_room() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(BackpressurePolicy::Block, 1, &dir.path().join("o.log"));
        fill(&h);

        let drainer = {
            let buffer = Arc::clone(&h.buffer);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                buffer.try_dequeue()
            })
        };

        assert_eq!(submit(&h, event(Level::Debug, "patient")), Outcome::Accepted);
        drainer.join().unwrap();
        assert_eq!(h.stats.dropped_events(), 0);
    }

    #[test]
    fn test_block_released_by_close() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(BackpressurePolicy::Block, 1, &dir.path().join("o.log"));
        fill(&h);

        let closer = {
            let buffer = Arc::clone(&h.buffer);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                buffer.close();
            })
        };

        assert_eq!(submit(&h, event(Level::Info, "late")), Outcome::Dropped);
        closer.join().unwrap();
        assert_eq!(h.stats.dropped_events(), 1);
    }

    #[test]
    fn test_alarm_escalates_once() {
        let alarm = UtilizationAlarm::new(80, 95);
        let policy = BackpressureStrategy::DropNewest;

        assert_eq!(alarm.observe(50, policy), None);
        assert_eq!(alarm.observe(81, policy), Some(AlarmState::Warning));
        assert_eq!(alarm.observe(85, policy), None);
        assert_eq!(alarm.observe(96, policy), Some(AlarmState::Critical));
        assert_eq!(alarm.observe(99, policy), None);
    }

    #[test]
    fn test_alarm_hysteresis() {
        let alarm = UtilizationAlarm::new(80, 95);
        let policy = BackpressureStrategy::Block;

        alarm.observe(100, policy);
        assert_eq!(alarm.state(), AlarmState::Critical);

        // Between thresholds: stays critical, no new warning
        assert_eq!(alarm.observe(85, policy), None);
        assert_eq!(alarm.state(), AlarmState::Critical);

        // Below warning: re-armed
        assert_eq!(alarm.observe(10, policy), None);
        assert_eq!(alarm.state(), AlarmState::Normal);
        assert_eq!(alarm.observe(90, policy), Some(AlarmState::Warning));
    }

    #[test]
    fn test_policy_from_config() {
        let mut config = BufferConfig::default();
        assert_eq!(
            BackpressurePolicy::from_config(&config),
            BackpressurePolicy::DropLowPriority {
                wait: Duration::from_millis(100)
            }
        );

        config.backpressure_policy = BackpressureStrategy::Sample;
        config.sample_rate_under_pressure = 7;
        assert_eq!(
            BackpressurePolicy::from_config(&config),
            BackpressurePolicy::Sample {
                every: NonZeroU64::new(7).unwrap()
            }
        );
    }

    #[test]
    fn test_policy_strategy_roundtrip() {
        let policy = BackpressurePolicy::Sample {
            every: NonZeroU64::new(10).unwrap(),
        };
        assert_eq!(policy.strategy(), BackpressureStrategy::Sample);
        assert_eq!(
            BackpressurePolicy::OverflowToFile.strategy(),
            BackpressureStrategy::OverflowToFile
        );
    }
}
