// SPDX-License-Identifier: Apache-2.0 OR MIT
// Event pipeline: bounded buffer, backpressure, overflow spill and consumer
//
// Producers -> Pipeline::append -> SamplingEngine -> BoundedEventBuffer
//                                                     |  full
//                                                     v
//                                            BackpressureController -> OverflowWriter
// BoundedEventBuffer -> BlockingConsumer (one thread) -> LogSink

mod backpressure;
mod buffer;
mod consumer;
mod event;
mod level;
mod overflow;
mod pipeline;
mod stats;

// Public exports
pub use backpressure::{
    AlarmState, BackpressureController, BackpressurePolicy, BackpressureStrategy, Outcome,
    UtilizationAlarm,
};
pub use buffer::{BoundedEventBuffer, EnqueueError};
pub use consumer::{BlockingConsumer, LogSink, MemorySink, NullSink, StderrSink, StdoutSink};
pub use event::LogEvent;
pub use level::{Level, ParseLevelError};
pub use overflow::{format_overflow_line, OverflowError, OverflowWriter};
pub use pipeline::{Hints, Pipeline, PipelineBuilder, PipelineError};
pub use stats::{Health, StatsRegistry, StatsSnapshot, DEGRADED_MULTIPLIER_THRESHOLD};
