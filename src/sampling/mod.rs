// SPDX-License-Identifier: Apache-2.0 OR MIT
// Sampling: decides per event whether it is kept before it reaches the buffer

pub mod context;
mod engine;
mod load;
mod random;

use serde::{Deserialize, Serialize};

pub use context::{ContextGuard, SamplingContext};
pub use engine::{matches_path, Marker, SamplingEngine};
pub use load::{LoadLevel, LoadMonitor, LoadThresholds};
pub use random::{RandomSource, ScriptedRandom, SeededRandom, ThreadRandom};

/// Sampling strategy names as they appear in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SamplingStrategy {
    /// Keep everything
    None,
    /// Keep with probability `effective_rate`
    Rate,
    /// RATE scaled by the load multiplier
    Adaptive,
    /// RATE scaled down for DEBUG and TRACE
    Priority,
    /// Keep every Nth event
    CountBased,
    /// One draw per request context
    HeadBased,
    /// Keep everything; retention is decided downstream from the tail mark
    TailBased,
}

impl SamplingStrategy {
    pub const ALL: [SamplingStrategy; 7] = [
        SamplingStrategy::None,
        SamplingStrategy::Rate,
        SamplingStrategy::Adaptive,
        SamplingStrategy::Priority,
        SamplingStrategy::CountBased,
        SamplingStrategy::HeadBased,
        SamplingStrategy::TailBased,
    ];
}
