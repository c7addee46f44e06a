use crate::collectors::system::DEFAULT_FS_EXCLUDES;
use crate::collectors::PlatformKind;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const MIN_INTERVAL_SECS: u64 = 60;
pub const MAX_INTERVAL_SECS: u64 = 24 * 60 * 60;
pub const MAX_DF_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default)]
    pub platform: PlatformKind,
    #[serde(default = "default_output")]
    pub output: String,
    #[serde(default = "default_df_timeout_secs")]
    pub df_timeout_secs: u64,
    #[serde(default = "default_fs_excludes")]
    pub fs_excludes: Vec<String>,
}

/// Where finished samples are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    Stdout,
    File(PathBuf),
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            platform: PlatformKind::default(),
            output: default_output(),
            df_timeout_secs: default_df_timeout_secs(),
            fs_excludes: default_fs_excludes(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("cannot parse YAML in {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("invalid config: {0}")]
    Validation(String),
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        let cfg: Config = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path_display,
            source,
        })?;

        cfg.validate()?;
        Ok(cfg)
    }

    /// Like [`Config::load_from_file`], but a missing file yields the defaults.
    ///
    /// Returns whether the file was found alongside the config.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<(Self, bool), ConfigError> {
        match Self::load_from_file(path) {
            Ok(cfg) => Ok((cfg, true)),
            Err(ConfigError::Read { source, .. }) if source.kind() == ErrorKind::NotFound => {
                Ok((Self::default(), false))
            }
            Err(err) => Err(err),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_INTERVAL_SECS..=MAX_INTERVAL_SECS).contains(&self.interval_secs) {
            return Err(ConfigError::Validation(format!(
                "interval_secs must be in {MIN_INTERVAL_SECS}..={MAX_INTERVAL_SECS}, got {}",
                self.interval_secs
            )));
        }
        if self.output.trim().is_empty() {
            return Err(ConfigError::Validation(
                "output must be \"stdout\" or a file path".to_string(),
            ));
        }
        if !(1..=MAX_DF_TIMEOUT_SECS).contains(&self.df_timeout_secs) {
            return Err(ConfigError::Validation(format!(
                "df_timeout_secs must be in 1..={MAX_DF_TIMEOUT_SECS}, got {}",
                self.df_timeout_secs
            )));
        }
        if self.fs_excludes.iter().any(|fs| fs.trim().is_empty()) {
            return Err(ConfigError::Validation(
                "fs_excludes must not contain empty entries".to_string(),
            ));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn df_timeout(&self) -> Duration {
        Duration::from_secs(self.df_timeout_secs)
    }

    pub fn output_target(&self) -> OutputTarget {
        let output = self.output.trim();
        if output == "-" || output.eq_ignore_ascii_case("stdout") {
            OutputTarget::Stdout
        } else {
            OutputTarget::File(PathBuf::from(output))
        }
    }

    /// One `key value` line per setting, as shown by `--print-config`.
    pub fn describe(&self) -> String {
        [
            format!("interval        {}", humantime::format_duration(self.interval())),
            format!("platform        {}", self.platform),
            format!("output          {}", self.output),
            format!("dfTimeout       {}", humantime::format_duration(self.df_timeout())),
            format!("fsExcludes      {}", self.fs_excludes.join(",")),
        ]
        .join("\n")
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../config.yaml.example")
    }
}

/// Parses a sampling interval: plain seconds (`300`) or a duration such as
/// `5m` or `1h 30m`. Sub-second parts are rejected.
pub fn parse_interval(text: &str) -> Result<Duration, ConfigError> {
    let text = text.trim();
    if let Ok(secs) = text.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    let interval = humantime::parse_duration(text)
        .map_err(|err| ConfigError::Validation(format!("invalid interval {text:?}: {err}")))?;
    if interval.subsec_nanos() != 0 {
        return Err(ConfigError::Validation(format!(
            "interval {text:?} must be whole seconds"
        )));
    }
    Ok(interval)
}

const fn default_interval_secs() -> u64 {
    300
}

fn default_output() -> String {
    "stdout".to_string()
}

const fn default_df_timeout_secs() -> u64 {
    10
}

fn default_fs_excludes() -> Vec<String> {
    DEFAULT_FS_EXCLUDES.iter().map(|s| s.to_string()).collect()
}
