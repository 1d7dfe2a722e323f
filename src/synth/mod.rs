//! Synthetic dataset generation engine.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐      ┌──────────────────┐      ┌──────────────────┐
//! │ WeatherGenerator │─────▶│ TrafficGenerator │─────▶│  DatasetMerger   │
//! │ (timestamp chain)│ rows │ (positional pair)│ rows │  (inner join)    │
//! └──────────────────┘      └──────────────────┘      └──────────────────┘
//!          │                         │
//!          └──────────┬──────────────┘
//!                     ▼
//!           ┌──────────────────┐
//!           │  DefectInjector  │  nulls + outliers, per field
//!           └──────────────────┘
//!                     │
//!                     ▼
//!           ┌──────────────────┐
//!           │     RunRng       │  two seeded ChaCha8 streams per run
//!           └──────────────────┘
//! ```
//!
//! # Determinism Guarantees
//!
//! - No wall clock: all timestamps are synthesized from a fixed base
//! - No global random state: every draw comes from the run-owned `RunRng`
//! - Same seed pair + same configuration = byte-identical output tables
//!
//! Control flow is single-threaded and single-pass; the traffic generator
//! requires the weather table fully materialized before it starts.

pub mod defects;
pub mod records;
pub mod rng;
pub mod timestamp;
pub mod traffic;
pub mod weather;


pub use defects::{DefectInjector, Derived, FallbackReason};
pub use records::{
    CongestionLevel, District, RoadCondition, Season, TrafficRecord, Visibility,
    WeatherCondition, WeatherRecord,
};
pub use rng::RunRng;
pub use traffic::{TrafficGenerator, TrafficStats};
pub use weather::{WeatherGenerator, WeatherStats};

/// Round to two decimals; keeps the rendered tables byte-stable.
pub(crate) fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Sample `floor(base_rows * ratio)` rows without replacement and return exact
/// copies, in sampled order. The draw comes from the numeric stream so tail
/// selection stays independent of the per-field stream.
pub(crate) fn duplicate_tail<T: Clone>(rng: &mut RunRng, rows: &[T], base_rows: usize, ratio: f64) -> Vec<T> {
    let count = ((base_rows as f64 * ratio).floor() as usize).min(rows.len());
    if count == 0 {
        return Vec::new();
    }
    rand::seq::index::sample(rng.numeric(), rows.len(), count)
        .into_iter()
        .map(|i| rows[i].clone())
        .collect()
}
