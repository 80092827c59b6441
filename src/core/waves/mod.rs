//! Wave decomposition subsystem: DSP, output paths, and the worker pool.

pub mod decompose;
pub mod paths;
pub mod pool;

pub use decompose::{DecomposeError, DecomposeOutcome, slot_freq_range};
pub use paths::{SUMMARY_TURN, waves_output_dir, waves_relative_dir};
pub use pool::{WaveJob, WaveJobResult, WaveTrack, WaveWorkerPool};
