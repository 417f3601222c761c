// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Sample -> buffer -> backpressure, wired together
//!
//! A [`Pipeline`] owns every stage. Producers call [`Pipeline::append`] from
//! any thread; one consumer thread (started with [`Pipeline::start`])
//! drains the buffer into the sink. `append` never fails and never panics:
//! every event is either kept, counted as a sampling drop, delivered,
//! counted as a backpressure drop, or spilled to the overflow file.

use super::backpressure::{BackpressureController, BackpressurePolicy, UtilizationAlarm};
use super::buffer::{BoundedEventBuffer, EnqueueError};
use super::consumer::{BlockingConsumer, LogSink, StdoutSink};
use super::overflow::OverflowWriter;
use super::stats::{StatsRegistry, StatsSnapshot};
use super::LogEvent;
use crate::config::{Config, ConfigError};
use crate::sampling::{Marker, RandomSource, SamplingEngine, ThreadRandom};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use thiserror::Error;

const CONSUMER_THREAD_NAME: &str = "logflow-consumer";

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("pipeline consumer already started")]
    AlreadyStarted,

    #[error("pipeline has been shut down")]
    ShutDown,

    #[error("failed to spawn consumer thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Optional per-call inputs to the sampling decision
#[derive(Debug, Clone, Copy, Default)]
pub struct Hints<'a> {
    /// Request path, matched against `pathRates`
    pub path: Option<&'a str>,
    pub marker: Option<Marker>,
}

impl<'a> Hints<'a> {
    pub fn path(path: &'a str) -> Self {
        Self {
            path: Some(path),
            marker: None,
        }
    }

    pub fn marker(marker: Marker) -> Self {
        Self {
            path: None,
            marker: Some(marker),
        }
    }
}

enum ConsumerState {
    Idle(Box<dyn LogSink>),
    Running(JoinHandle<()>),
    Stopped,
}

pub struct PipelineBuilder {
    config: Config,
    sink: Option<Box<dyn LogSink>>,
    random: Option<Arc<dyn RandomSource>>,
    stats: Option<Arc<StatsRegistry>>,
}

impl PipelineBuilder {
    /// Downstream sink (default: stdout)
    pub fn sink(mut self, sink: impl LogSink + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    /// Random source for probabilistic strategies (default: thread RNG)
    pub fn random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = Some(random);
        self
    }

    /// Share a counter registry with other components
    pub fn stats(mut self, stats: Arc<StatsRegistry>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Validate the configuration and assemble the pipeline
    ///
    /// The consumer is not running yet; call [`Pipeline::start`].
    pub fn build(self) -> Result<Pipeline, PipelineError> {
        self.config.validate()?;

        let stats = self.stats.unwrap_or_default();
        let random = self.random.unwrap_or_else(|| Arc::new(ThreadRandom));
        let sink = self.sink.unwrap_or_else(|| Box::new(StdoutSink::new()));

        let engine = SamplingEngine::new(self.config.sampling.clone(), random, Arc::clone(&stats))?;
        let buffer = Arc::new(BoundedEventBuffer::new(self.config.buffer.capacity));
        let overflow = Arc::new(OverflowWriter::new(self.config.buffer.overflow_path.clone()));
        let controller = BackpressureController::new(
            BackpressurePolicy::from_config(&self.config.buffer),
            Arc::clone(&buffer),
            Arc::clone(&overflow),
            Arc::clone(&stats),
        );
        let alarm = UtilizationAlarm::new(
            self.config.buffer.warning_threshold,
            self.config.buffer.critical_threshold,
        );

        Ok(Pipeline {
            engine,
            buffer,
            controller,
            alarm,
            overflow,
            stats,
            consumer: Mutex::new(ConsumerState::Idle(sink)),
        })
    }
}

/// The log-volume control pipeline
pub struct Pipeline {
    engine: SamplingEngine,
    buffer: Arc<BoundedEventBuffer>,
    controller: BackpressureController,
    alarm: UtilizationAlarm,
    overflow: Arc<OverflowWriter>,
    stats: Arc<StatsRegistry>,
    consumer: Mutex<ConsumerState>,
}

impl Pipeline {
    pub fn builder(config: Config) -> PipelineBuilder {
        PipelineBuilder {
            config,
            sink: None,
            random: None,
            stats: None,
        }
    }

    /// Spawn the consumer thread
    pub fn start(&self) -> Result<(), PipelineError> {
        let mut state = self.lock_consumer();
        let sink = match std::mem::replace(&mut *state, ConsumerState::Stopped) {
            ConsumerState::Idle(sink) => sink,
            running @ ConsumerState::Running(_) => {
                *state = running;
                return Err(PipelineError::AlreadyStarted);
            }
            ConsumerState::Stopped => return Err(PipelineError::ShutDown),
        };

        let consumer = BlockingConsumer::new(Arc::clone(&self.buffer), sink, Arc::clone(&self.stats));
        let handle = consumer
            .spawn(CONSUMER_THREAD_NAME)
            .map_err(PipelineError::Spawn)?;
        *state = ConsumerState::Running(handle);
        Ok(())
    }

    pub fn append(&self, event: LogEvent) {
        self.append_with(event, Hints::default());
    }

    /// Sample, then buffer, then apply backpressure if the buffer is full
    pub fn append_with(&self, event: LogEvent, hints: Hints<'_>) {
        let keep = self.engine.should_keep_with(
            event.level(),
            event.logger_name(),
            hints.path,
            hints.marker,
        );
        if !keep {
            return;
        }

        self.stats.record_buffered();
        match self.buffer.try_enqueue(event) {
            Ok(()) => {}
            Err(EnqueueError::Full(event)) => {
                self.controller
                    .handle(event, self.buffer.utilization_percent());
            }
            // Raced with shutdown
            Err(EnqueueError::Closed(_)) => {
                self.stats.record_dropped();
            }
        }

        self.alarm.observe(
            self.buffer.utilization_percent(),
            self.controller.policy().strategy(),
        );
    }

    /// Counters plus live buffer and load gauges
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot(
            self.buffer.len(),
            self.buffer.utilization_percent(),
            self.engine.current_multiplier(),
        )
    }

    /// Stop accepting events, deliver what is buffered, release the overflow file
    ///
    /// Producers blocked on a full buffer are woken and their events counted
    /// as dropped. Safe to call more than once.
    pub fn shutdown(&self) {
        self.buffer.close();

        let previous = std::mem::replace(&mut *self.lock_consumer(), ConsumerState::Stopped);
        if let ConsumerState::Running(handle) = previous {
            if handle.join().is_err() {
                tracing::error!("log consumer thread panicked");
            }
            // Pushes that raced the close after the consumer's last look
            let mut stranded = 0u64;
            while self.buffer.try_dequeue().is_some() {
                self.stats.record_dropped();
                stranded += 1;
            }
            if stranded > 0 {
                tracing::warn!(stranded, "dropped events enqueued after the consumer stopped");
            }
        }

        self.overflow.close();
    }

    pub fn engine(&self) -> &SamplingEngine {
        &self.engine
    }

    pub fn buffer(&self) -> &BoundedEventBuffer {
        &self.buffer
    }

    pub fn registry(&self) -> &Arc<StatsRegistry> {
        &self.stats
    }

    fn lock_consumer(&self) -> std::sync::MutexGuard<'_, ConsumerState> {
        self.consumer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("engine", &self.engine)
            .field("buffer", &self.buffer)
            .field("controller", &self.controller)
            .finish()
    }
}
