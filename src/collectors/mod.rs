//! Platform providers: where raw machine readings come from.

pub mod parse;
pub mod procfs;
pub mod system;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("cannot parse {what}: {detail}")]
    Parse { what: &'static str, detail: String },
    #[error("cannot run {program}: {detail}")]
    Command { program: String, detail: String },
    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),
}

impl PlatformError {
    pub(crate) fn parse(what: &'static str, detail: impl Into<String>) -> Self {
        PlatformError::Parse {
            what,
            detail: detail.into(),
        }
    }
}

/// Source of raw, instantaneous machine readings.
///
/// Percentages are returned unsanitized and counters are cumulative since
/// boot (or device start); turning them into bounded values and interval
/// deltas is the sampler's job.
pub trait Platform {
    /// Wall-clock time in milliseconds since the Unix epoch.
    fn current_time_millis(&self) -> i64;

    fn cpu_percent(&mut self) -> Result<f64, PlatformError>;

    fn mem_percent(&mut self) -> Result<f64, PlatformError>;

    fn disk_percent(&mut self) -> Result<f64, PlatformError>;

    /// 1, 5 and 15 minute load averages, in that order.
    fn load_average(&mut self) -> Result<[f64; 3], PlatformError>;

    /// Cumulative `(read, written)` bytes across whole disks.
    fn disk_bytes(&mut self) -> Result<(u64, u64), PlatformError>;

    /// Cumulative `(received, sent)` bytes across non-loopback interfaces.
    fn net_bytes(&mut self) -> Result<(u64, u64), PlatformError>;
}

impl<P: Platform + ?Sized> Platform for Box<P> {
    fn current_time_millis(&self) -> i64 {
        (**self).current_time_millis()
    }

    fn cpu_percent(&mut self) -> Result<f64, PlatformError> {
        (**self).cpu_percent()
    }

    fn mem_percent(&mut self) -> Result<f64, PlatformError> {
        (**self).mem_percent()
    }

    fn disk_percent(&mut self) -> Result<f64, PlatformError> {
        (**self).disk_percent()
    }

    fn load_average(&mut self) -> Result<[f64; 3], PlatformError> {
        (**self).load_average()
    }

    fn disk_bytes(&mut self) -> Result<(u64, u64), PlatformError> {
        (**self).disk_bytes()
    }

    fn net_bytes(&mut self) -> Result<(u64, u64), PlatformError> {
        (**self).net_bytes()
    }
}

/// Which provider the agent samples from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformKind {
    #[default]
    Procfs,
    Sysinfo,
}

impl PlatformKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PlatformKind::Procfs => "procfs",
            PlatformKind::Sysinfo => "sysinfo",
        }
    }
}

impl fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PlatformKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "procfs" | "proc" => Ok(PlatformKind::Procfs),
            "sysinfo" => Ok(PlatformKind::Sysinfo),
            other => Err(format!("unknown platform '{other}', expected procfs or sysinfo")),
        }
    }
}

pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
