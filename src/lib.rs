//! MetroSynth Library
//!
//! Exposes the generation, merge, and storage modules for use by the
//! binaries and integration tests.

pub mod config;
pub mod merge;
pub mod storage;
pub mod synth;

pub use config::GeneratorConfig;
pub use merge::DatasetMerger;
pub use storage::LakeLayout;
