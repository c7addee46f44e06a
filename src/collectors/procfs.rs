use super::parse::{self, CpuStat, DiskIo};
use super::{now_millis, Platform, PlatformError};
use crate::percent::percent_of;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::debug;

pub const DEFAULT_PROC_ROOT: &str = "/proc";
pub const DEFAULT_DF_PROGRAM: &str = "df";
pub const DEFAULT_DF_TIMEOUT: Duration = Duration::from_secs(10);

const DF_ARGS: [&str; 3] = [
    "--exclude-type=tmpfs",
    "--total",
    "--output=source,size,used",
];

/// Reads machine counters from the Linux `/proc` filesystem and `df`.
///
/// CPU usage is the busy share of `/proc/stat` ticks since the previous
/// call, so the first call reports 0.
#[derive(Debug)]
pub struct ProcfsPlatform {
    root: PathBuf,
    df_program: String,
    df_timeout: Duration,
    last_cpu: Option<CpuStat>,
}

impl Default for ProcfsPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcfsPlatform {
    pub fn new() -> Self {
        Self::with_root(DEFAULT_PROC_ROOT)
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            df_program: DEFAULT_DF_PROGRAM.to_string(),
            df_timeout: DEFAULT_DF_TIMEOUT,
            last_cpu: None,
        }
    }

    pub fn df_program(mut self, program: impl Into<String>) -> Self {
        self.df_program = program.into();
        self
    }

    pub fn df_timeout(mut self, timeout: Duration) -> Self {
        self.df_timeout = timeout;
        self
    }

    fn read(&self, name: &str) -> Result<String, PlatformError> {
        read_file(&self.root.join(name))
    }
}

impl Platform for ProcfsPlatform {
    fn current_time_millis(&self) -> i64 {
        now_millis()
    }

    fn cpu_percent(&mut self) -> Result<f64, PlatformError> {
        let stat = parse::parse_cpu_stat(&self.read("stat")?)?;
        let percent = match self.last_cpu {
            Some(last) => stat.busy_percent_since(&last),
            None => 0.0,
        };
        self.last_cpu = Some(stat);
        Ok(percent)
    }

    fn mem_percent(&mut self) -> Result<f64, PlatformError> {
        let mem = parse::parse_meminfo(&self.read("meminfo")?)?;
        Ok(percent_of(mem.used_kb(), mem.total_kb))
    }

    fn disk_percent(&mut self) -> Result<f64, PlatformError> {
        let output = run_command(&self.df_program, &DF_ARGS, self.df_timeout)?;
        let total = parse::parse_df_total(&output)?;
        debug!(size_kb = total.size_kb, used_kb = total.used_kb, "df total");
        Ok(percent_of(total.used_kb, total.size_kb))
    }

    fn load_average(&mut self) -> Result<[f64; 3], PlatformError> {
        parse::parse_loadavg(&self.read("loadavg")?)
    }

    fn disk_bytes(&mut self) -> Result<(u64, u64), PlatformError> {
        let io = read_diskstats(&self.root.join("diskstats"))?;
        Ok((io.read_bytes, io.write_bytes))
    }

    fn net_bytes(&mut self) -> Result<(u64, u64), PlatformError> {
        let io = parse::parse_net_dev(&self.read("net/dev")?)?;
        Ok((io.recv_bytes, io.send_bytes))
    }
}

pub(crate) fn read_file(path: &Path) -> Result<String, PlatformError> {
    fs::read_to_string(path).map_err(|source| PlatformError::Io {
        path: path.display().to_string(),
        source,
    })
}

pub(crate) fn read_diskstats(path: &Path) -> Result<DiskIo, PlatformError> {
    let io = parse::parse_diskstats(&read_file(path)?)?;
    debug!(disks = ?io.disks, skipped = ?io.skipped, "diskstats devices");
    Ok(io)
}

/// Runs `program` and returns its stdout, killing it once `timeout` elapses.
///
/// Both pipes are drained on reader threads while the child runs, so
/// output larger than the pipe buffer cannot stall it.
fn run_command(program: &str, args: &[&str], timeout: Duration) -> Result<String, PlatformError> {
    let command_err = |detail: String| PlatformError::Command {
        program: program.to_string(),
        detail,
    };
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| command_err(err.to_string()))?;
    let stdout_reader = drain(child.stdout.take());
    let stderr_reader = drain(child.stderr.take());

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(command_err(format!(
                    "timed out after {}",
                    humantime::format_duration(timeout)
                )));
            }
            Ok(None) => thread::sleep(Duration::from_millis(20)),
            Err(err) => return Err(command_err(err.to_string())),
        }
    };

    let stdout = stdout_reader
        .join()
        .map_err(|_| command_err("stdout reader panicked".to_string()))?
        .map_err(|err| command_err(err.to_string()))?;
    // df exits 1 when a single mount is unreadable but still prints the total
    if !status.success() && !stdout.lines().any(|l| l.trim_start().starts_with("total")) {
        let stderr = stderr_reader.join().ok().and_then(Result::ok).unwrap_or_default();
        return Err(command_err(format!("{status}: {}", stderr.trim())));
    }
    Ok(stdout)
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<std::io::Result<String>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            pipe.read_to_end(&mut buf)?;
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    struct FakeProc {
        root: PathBuf,
    }

    impl FakeProc {
        fn new(tag: &str) -> Self {
            let nanos = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos())
                .unwrap_or(0);
            let root = std::env::temp_dir().join(format!(
                "moni-agent-{tag}-{}-{nanos}",
                std::process::id()
            ));
            fs::create_dir_all(root.join("net")).unwrap();
            Self { root }
        }

        fn write(&self, name: &str, text: &str) {
            fs::write(self.root.join(name), text).unwrap();
        }
    }

    impl Drop for FakeProc {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.root);
        }
    }

    #[test]
    fn reads_counters_from_proc_files() {
        let proc = FakeProc::new("counters");
        proc.write("loadavg", "0.54 0.56 0.55 1/1006 176235\n");
        proc.write(
            "diskstats",
            "   8       0 sda 10 0 100 0 10 0 200 0 0 0 0 0 0 0 0\n   8       1 sda1 10 0 100 0 10 0 200 0 0 0 0 0 0 0 0\n",
        );
        proc.write(
            "net/dev",
            "Inter-| Receive | Transmit\n face |bytes packets|bytes\n  eth0: 300 0 0 0 0 0 0 0 400 0 0 0 0 0 0 0\n",
        );
        proc.write("meminfo", "MemTotal: 1000 kB\nMemAvailable: 250 kB\n");

        let mut platform = ProcfsPlatform::with_root(&proc.root);
        assert_eq!(platform.load_average().unwrap(), [0.54, 0.56, 0.55]);
        assert_eq!(platform.disk_bytes().unwrap(), (100 * 512, 200 * 512));
        assert_eq!(platform.net_bytes().unwrap(), (300, 400));
        assert_eq!(platform.mem_percent().unwrap(), 75.0);
    }

    #[test]
    fn cpu_percent_is_relative_to_previous_call() {
        let proc = FakeProc::new("cpu");
        let mut platform = ProcfsPlatform::with_root(&proc.root);

        proc.write("stat", "cpu  100 0 100 800 0 0 0 0 0 0\n");
        assert_eq!(platform.cpu_percent().unwrap(), 0.0);

        proc.write("stat", "cpu  150 0 100 850 0 0 0 0 0 0\n");
        assert_eq!(platform.cpu_percent().unwrap(), 50.0);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let proc = FakeProc::new("missing");
        let mut platform = ProcfsPlatform::with_root(&proc.root);
        let err = platform.load_average().unwrap_err();
        assert!(matches!(err, PlatformError::Io { .. }));
        assert!(err.to_string().contains("loadavg"));
    }

    #[cfg(unix)]
    #[test]
    fn output_beyond_the_pipe_buffer_is_read_in_full() {
        // ~100 KiB on each of stdout and stderr before the total line
        let script = r#"
i=0
while [ $i -lt 4000 ]; do
  echo "/dev/loop$i          1000       400"
  echo "df: /run/user/$i/doc: Permission denied" >&2
  i=$((i+1))
done
echo "total 100 40"
exit 1
"#;
        let output = run_command("sh", &["-c", script], Duration::from_secs(30)).unwrap();
        assert!(output.len() > 64 * 1024);
        let total = parse::parse_df_total(&output).unwrap();
        assert_eq!(percent_of(total.used_kb, total.size_kb), 40.0);
    }

    #[cfg(unix)]
    #[test]
    fn hung_command_times_out() {
        let err = run_command("sh", &["-c", "sleep 5"], Duration::from_millis(100)).unwrap_err();
        assert!(err.to_string().contains("timed out"), "{err}");
    }

    #[test]
    fn missing_df_program_is_a_command_error() {
        let mut platform =
            ProcfsPlatform::new().df_program("/nonexistent/moni-agent-df-does-not-exist");
        let err = platform.disk_percent().unwrap_err();
        assert!(matches!(err, PlatformError::Command { .. }));
    }
}
