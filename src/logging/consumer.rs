// SPDX-License-Identifier: Apache-2.0 OR MIT
// Consumer thread - drains the event buffer into the downstream sink

use super::buffer::BoundedEventBuffer;
use super::stats::StatsRegistry;
use super::LogEvent;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

/// Output sink for log events
///
/// Called only from the consumer thread, in FIFO order.
pub trait LogSink: Send {
    /// Write a log event to the sink
    fn write_event(&mut self, event: &LogEvent);

    /// Flush any buffered output
    fn flush(&mut self);
}

impl<S: LogSink + ?Sized> LogSink for Box<S> {
    fn write_event(&mut self, event: &LogEvent) {
        (**self).write_event(event);
    }

    fn flush(&mut self) {
        (**self).flush();
    }
}

fn write_line(out: &mut impl Write, event: &LogEvent) {
    // Format: [LEVEL] [thread] logger - message
    let _ = writeln!(
        out,
        "[{}] [{}] {} - {}",
        event.level(),
        event.thread_name(),
        event.logger_name(),
        event.message()
    );
}

/// Standard output sink (writes to stdout)
pub struct StdoutSink {
    stdout: std::io::Stdout,
}

impl StdoutSink {
    pub fn new() -> Self {
        Self {
            stdout: std::io::stdout(),
        }
    }
}

impl Default for StdoutSink {
    fn default() -> Self {
        Self::new()
    }
}

impl LogSink for StdoutSink {
    fn write_event(&mut self, event: &LogEvent) {
        write_line(&mut self.stdout.lock(), event);
    }

    fn flush(&mut self) {
        let _ = self.stdout.flush();
    }
}

/// Standard error sink (writes to stderr)
pub struct StderrSink {
    stderr: std::io::Stderr,
}

impl StderrSink {
    pub fn new() -> Self {
        Self {
            stderr: std::io::stderr(),
        }
    }
}

impl Default for StderrSink {
    fn default() -> Self {
        Self::new()
    }
}

impl LogSink for StderrSink {
    fn write_event(&mut self, event: &LogEvent) {
        write_line(&mut self.stderr.lock(), event);
    }

    fn flush(&mut self) {
        let _ = self.stderr.flush();
    }
}

/// Discards everything (load testing)
#[derive(Debug, Default)]
pub struct NullSink;

impl LogSink for NullSink {
    fn write_event(&mut self, _event: &LogEvent) {}

    fn flush(&mut self) {}
}

/// Collects events in a shared vector
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<LogEvent>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything delivered so far
    pub fn events(&self) -> Vec<LogEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LogSink for MemorySink {
    fn write_event(&mut self, event: &LogEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event.clone());
    }

    fn flush(&mut self) {}
}

/// Single consumer draining a `BoundedEventBuffer`
///
/// Runs until the buffer is closed and empty, so every event accepted
/// before shutdown reaches the sink.
pub struct BlockingConsumer {
    buffer: Arc<BoundedEventBuffer>,
    sink: Box<dyn LogSink>,
    stats: Arc<StatsRegistry>,
}

impl BlockingConsumer {
    /// Create a new blocking consumer with given buffer and sink
    pub fn new(
        buffer: Arc<BoundedEventBuffer>,
        sink: Box<dyn LogSink>,
        stats: Arc<StatsRegistry>,
    ) -> Self {
        Self {
            buffer,
            sink,
            stats,
        }
    }

    /// Run the consumer (blocks until the buffer is closed and drained)
    pub fn run(mut self) {
        tracing::debug!(capacity = self.buffer.capacity(), "log consumer started");

        while let Some(event) = self.buffer.dequeue() {
            self.sink.write_event(&event);
            self.stats.record_delivered();

            // Batch flushes: only flush once we've caught up
            if self.buffer.is_empty() {
                self.sink.flush();
            }
        }

        // Final flush
        self.sink.flush();
        tracing::debug!(
            delivered = self.stats.delivered_events(),
            "log consumer stopped"
        );
    }

    /// Run the consumer on a dedicated named thread
    pub fn spawn(self, name: &str) -> std::io::Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || self.run())
    }
}
