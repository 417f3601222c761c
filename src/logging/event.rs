// SPDX-License-Identifier: Apache-2.0 OR MIT
// Log event value passed from producers through the buffer to the sink

use super::Level;
use serde::{Deserialize, Serialize};

/// A fully formatted log event
///
/// Events are produced by the caller's logging front end and are never
/// mutated by the pipeline. Ownership moves producer -> buffer -> consumer.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    level: Level,
    logger_name: String,
    message: String,
    thread_name: String,
    timestamp_millis: i64,
}

impl LogEvent {
    /// Create an event stamped with the current thread name and wall clock
    pub fn new(level: Level, logger_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            logger_name: logger_name.into(),
            message: message.into(),
            thread_name: current_thread_name(),
            timestamp_millis: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Create an event with every field supplied by the caller
    pub fn with_parts(
        level: Level,
        logger_name: impl Into<String>,
        message: impl Into<String>,
        thread_name: impl Into<String>,
        timestamp_millis: i64,
    ) -> Self {
        Self {
            level,
            logger_name: logger_name.into(),
            message: message.into(),
            thread_name: thread_name.into(),
            timestamp_millis,
        }
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn logger_name(&self) -> &str {
        &self.logger_name
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn thread_name(&self) -> &str {
        &self.thread_name
    }

    /// Milliseconds since the Unix epoch
    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp_millis
    }
}

impl std::fmt::Debug for LogEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogEvent")
            .field("level", &self.level)
            .field("logger", &self.logger_name)
            .field("message", &self.message)
            .finish()
    }
}

/// Name of the calling thread, falling back to its id for unnamed threads
fn current_thread_name() -> String {
    let thread = std::thread::current();
    match thread.name() {
        Some(name) => name.to_string(),
        None => format!("{:?}", thread.id()),
    }
}
