//! Resource-usage sampling for a monitoring agent.
//!
//! A [`Sampler`] reads raw counters from a [`Platform`] and turns them into
//! [`Sample`]s: integer percentages clamped to `0..=100` and byte deltas
//! since the previous sample.

pub mod agent;
pub mod collectors;
pub mod config;
pub mod delta;
pub mod percent;
pub mod sample;
pub mod sampler;
pub mod sink;

pub use collectors::{Platform, PlatformError, PlatformKind};
pub use sample::Sample;
pub use sampler::{SampleError, Sampler};
