//! The sampling loop: warm up once, then sample on every tick until shutdown.

use crate::collectors::Platform;
use crate::sample::Sample;
use crate::sampler::{SampleError, Sampler};
use crate::sink::{SampleSink, SinkError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AgentStats {
    pub samples_written: u64,
    pub samples_failed: u64,
    pub sink_errors: u64,
}

#[derive(Debug, Error)]
pub enum OnceError {
    #[error(transparent)]
    Sample(#[from] SampleError),
    #[error(transparent)]
    Sink(#[from] SinkError),
    #[error("shutdown requested before the sample was taken")]
    Cancelled,
}

/// Takes the warm-up sample and discards it.
///
/// A failure is only logged and `false` returned. Until a warm-up succeeds
/// the loops keep seeding instead of writing, so a zero-delta seeding
/// sample never reaches a sink.
pub fn warm_up<P: Platform>(sampler: &mut Sampler<P>) -> bool {
    match sampler.sample() {
        Ok(sample) => {
            debug!(timestamp = sample.timestamp, "sampler warmed up");
            true
        }
        Err(err) => {
            warn!(error = %err, "cannot take warm-up sample");
            false
        }
    }
}

/// Samples every `interval` and writes each sample to `sink` until
/// `shutdown` flips to `true` or its sender is dropped.
///
/// The first tick fires one `interval` after the warm-up. Failed samples
/// are logged and skipped; the loop never stops on its own.
pub async fn run<P, S>(
    sampler: &mut Sampler<P>,
    sink: &mut S,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> AgentStats
where
    P: Platform,
    S: SampleSink + ?Sized,
{
    let mut stats = AgentStats::default();
    if !sampler.is_warmed_up() && !warm_up(sampler) {
        stats.samples_failed += 1;
    }

    info!(
        interval = %humantime::format_duration(interval),
        "will write samples in background"
    );
    let mut ticker = time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("shutdown signal received, stopping sampling loop");
                    break;
                }
            }
            _ = ticker.tick() => {
                if !sampler.is_warmed_up() {
                    if !warm_up(sampler) {
                        stats.samples_failed += 1;
                    }
                    continue;
                }
                let sample = match sampler.sample() {
                    Ok(sample) => sample,
                    Err(err) => {
                        stats.samples_failed += 1;
                        warn!(error = %err, "cannot sample");
                        continue;
                    }
                };
                log_sample(&sample);
                match sink.write(&sample) {
                    Ok(()) => stats.samples_written += 1,
                    Err(err) => {
                        stats.sink_errors += 1;
                        error!(error = %err, "cannot hand off sample");
                    }
                }
            }
        }
    }

    stats
}

/// Warm-up, wait one `interval`, take a single sample and write it.
///
/// When the warm-up fails, the first sample after the wait seeds the
/// counters instead and the written sample comes one `interval` later.
pub async fn run_once<P, S>(
    sampler: &mut Sampler<P>,
    sink: &mut S,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> Result<Sample, OnceError>
where
    P: Platform,
    S: SampleSink + ?Sized,
{
    warm_up(sampler);
    wait_or_cancel(&mut shutdown, interval).await?;
    if !sampler.is_warmed_up() {
        let seed = sampler.sample()?;
        debug!(timestamp = seed.timestamp, "sampler warmed up late");
        wait_or_cancel(&mut shutdown, interval).await?;
    }
    let sample = sampler.sample()?;
    log_sample(&sample);
    sink.write(&sample)?;
    Ok(sample)
}

async fn wait_or_cancel(
    shutdown: &mut watch::Receiver<bool>,
    interval: Duration,
) -> Result<(), OnceError> {
    tokio::select! {
        changed = shutdown.changed() => {
            if changed.is_err() || *shutdown.borrow() {
                return Err(OnceError::Cancelled);
            }
        }
        _ = time::sleep(interval) => {}
    }
    Ok(())
}

fn log_sample(sample: &Sample) {
    debug!(
        timestamp = sample.timestamp,
        cpu = sample.cpu_percent,
        mem = sample.mem_percent,
        disk = sample.disk_percent,
        disk_read = sample.disk_read,
        disk_write = sample.disk_write,
        net_recv = sample.net_recv,
        net_send = sample.net_send,
        "sampled"
    );
}
