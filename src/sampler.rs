use crate::collectors::{Platform, PlatformError};
use crate::delta::CounterTracker;
use crate::percent::sanitize;
use crate::sample::{Reading, Sample};
use std::fmt;
use thiserror::Error;

/// Which platform reading failed during a sampling pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadingKind {
    LoadAverage,
    CpuPercent,
    MemPercent,
    DiskPercent,
    DiskBytes,
    NetBytes,
}

impl fmt::Display for ReadingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReadingKind::LoadAverage => "load average",
            ReadingKind::CpuPercent => "cpu percent",
            ReadingKind::MemPercent => "mem percent",
            ReadingKind::DiskPercent => "disk percent",
            ReadingKind::DiskBytes => "disk bytes",
            ReadingKind::NetBytes => "net bytes",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum SampleError {
    #[error("cannot read {reading}: {source}")]
    Read {
        reading: ReadingKind,
        #[source]
        source: PlatformError,
    },
}

impl SampleError {
    pub fn reading(&self) -> ReadingKind {
        match self {
            SampleError::Read { reading, .. } => *reading,
        }
    }
}

/// Counter trackers for the four cumulative byte counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Counters {
    disk_read: CounterTracker,
    disk_write: CounterTracker,
    net_recv: CounterTracker,
    net_send: CounterTracker,
}

/// Turns platform readings into [`Sample`]s.
///
/// The first sample after construction only seeds the byte counters, so
/// its `disk_read`, `disk_write`, `net_recv` and `net_send` are always 0.
/// Take it once at startup and discard it.
///
/// `sample` takes `&mut self`; callers sharing a sampler across threads
/// must wrap it in a lock.
#[derive(Debug)]
pub struct Sampler<P> {
    platform: P,
    counters: Counters,
    samples_taken: u64,
}

impl<P: Platform> Sampler<P> {
    pub fn new(platform: P) -> Self {
        Self {
            platform,
            counters: Counters::default(),
            samples_taken: 0,
        }
    }

    /// Reads the platform and builds one sample.
    ///
    /// Fails on the first platform error without touching counter state,
    /// so a failed pass leaves the sampler exactly as it was.
    pub fn sample(&mut self) -> Result<Sample, SampleError> {
        let reading = self.read()?;

        let mut next = self.counters;
        let disk_read = next.disk_read.observe(reading.disk_read_bytes);
        let disk_write = next.disk_write.observe(reading.disk_write_bytes);
        let net_recv = next.net_recv.observe(reading.net_recv_bytes);
        let net_send = next.net_send.observe(reading.net_send_bytes);
        self.counters = next;
        self.samples_taken += 1;

        Ok(Sample {
            timestamp: reading.timestamp,
            load1: reading.load[0],
            load5: reading.load[1],
            load15: reading.load[2],
            cpu_percent: sanitize(reading.cpu_percent),
            mem_percent: sanitize(reading.mem_percent),
            disk_percent: sanitize(reading.disk_percent),
            disk_read,
            disk_write,
            net_recv,
            net_send,
        })
    }

    fn read(&mut self) -> Result<Reading, SampleError> {
        let p = &mut self.platform;
        let load = p.load_average().map_err(read_err(ReadingKind::LoadAverage))?;
        let cpu_percent = p.cpu_percent().map_err(read_err(ReadingKind::CpuPercent))?;
        let mem_percent = p.mem_percent().map_err(read_err(ReadingKind::MemPercent))?;
        let disk_percent = p.disk_percent().map_err(read_err(ReadingKind::DiskPercent))?;
        let (disk_read_bytes, disk_write_bytes) =
            p.disk_bytes().map_err(read_err(ReadingKind::DiskBytes))?;
        let (net_recv_bytes, net_send_bytes) =
            p.net_bytes().map_err(read_err(ReadingKind::NetBytes))?;
        Ok(Reading {
            timestamp: p.current_time_millis(),
            load,
            cpu_percent,
            mem_percent,
            disk_percent,
            disk_read_bytes,
            disk_write_bytes,
            net_recv_bytes,
            net_send_bytes,
        })
    }

    /// True once a sample has succeeded and the byte counters are seeded.
    pub fn is_warmed_up(&self) -> bool {
        self.samples_taken > 0
    }

    pub fn samples_taken(&self) -> u64 {
        self.samples_taken
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    pub fn into_platform(self) -> P {
        self.platform
    }
}

fn read_err(reading: ReadingKind) -> impl FnOnce(PlatformError) -> SampleError {
    move |source| SampleError::Read { reading, source }
}
