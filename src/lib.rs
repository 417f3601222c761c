// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Log-volume control for high-rate log producers.
//!
//! - [`sampling`]: per-event keep/drop decisions (rate, adaptive, priority,
//!   count-based, head- and tail-based) with request-scoped context
//! - [`logging`]: the bounded buffer, backpressure policies, overflow spill
//!   and the single consumer that feeds the downstream sink
//! - [`config`]: JSON5 configuration for both
//!
//! ```no_run
//! use logflow::config::Config;
//! use logflow::logging::{Level, LogEvent, Pipeline, StdoutSink};
//!
//! # fn main() -> anyhow::Result<()> {
//! let pipeline = Pipeline::builder(Config::default())
//!     .sink(StdoutSink::new())
//!     .build()?;
//! pipeline.start()?;
//!
//! pipeline.append(LogEvent::new(Level::Info, "app", "hello"));
//!
//! pipeline.shutdown();
//! println!("{:?}", pipeline.stats());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod logging;
pub mod sampling;

pub use config::{Config, ConfigError};
pub use logging::{LogEvent, Pipeline, StatsSnapshot};
