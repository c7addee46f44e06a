use super::{now_millis, Platform, PlatformError};
use crate::percent::percent_of;
use sysinfo::{CpuExt, DiskExt, NetworkExt, NetworksExt, System, SystemExt};
use tracing::debug;

/// File systems left out of disk usage by default.
pub const DEFAULT_FS_EXCLUDES: [&str; 4] = ["tmpfs", "devtmpfs", "overlay", "squashfs"];

/// Platform readings from the `sysinfo` crate.
///
/// `sysinfo` has no machine-wide disk I/O counters, so on Linux those come
/// from `/proc/diskstats` and elsewhere the reading is unsupported.
pub struct SysinfoPlatform {
    system: System,
    fs_excludes: Vec<String>,
}

impl Default for SysinfoPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl SysinfoPlatform {
    pub fn new() -> Self {
        Self::with_fs_excludes(DEFAULT_FS_EXCLUDES.iter().map(|s| s.to_string()).collect())
    }

    pub fn with_fs_excludes(fs_excludes: Vec<String>) -> Self {
        let mut system = System::new();
        system.refresh_disks_list();
        system.refresh_networks_list();
        Self {
            system,
            fs_excludes,
        }
    }

    fn excluded(&self, fs_type: &str) -> bool {
        self.fs_excludes.iter().any(|e| e.eq_ignore_ascii_case(fs_type))
    }
}

impl Platform for SysinfoPlatform {
    fn current_time_millis(&self) -> i64 {
        now_millis()
    }

    fn cpu_percent(&mut self) -> Result<f64, PlatformError> {
        self.system.refresh_cpu();
        Ok(self.system.global_cpu_info().cpu_usage() as f64)
    }

    fn mem_percent(&mut self) -> Result<f64, PlatformError> {
        self.system.refresh_memory();
        let total = self.system.total_memory();
        if total == 0 {
            return Err(PlatformError::parse("memory", "total memory is 0"));
        }
        Ok(percent_of(self.system.used_memory(), total))
    }

    fn disk_percent(&mut self) -> Result<f64, PlatformError> {
        self.system.refresh_disks_list();
        self.system.refresh_disks();
        let mut total = 0_u64;
        let mut used = 0_u64;
        for disk in self.system.disks() {
            let fs_type = String::from_utf8_lossy(disk.file_system()).to_string();
            let mount = disk.mount_point().to_string_lossy().to_string();
            if self.excluded(&fs_type) {
                debug!(mount = %mount, fs = %fs_type, "skip mount");
                continue;
            }
            debug!(mount = %mount, fs = %fs_type, "include mount");
            let size = disk.total_space();
            total = total.saturating_add(size);
            used = used.saturating_add(size.saturating_sub(disk.available_space()));
        }
        if total == 0 {
            return Err(PlatformError::parse("disks", "no mounted file system with a size"));
        }
        Ok(percent_of(used, total))
    }

    fn load_average(&mut self) -> Result<[f64; 3], PlatformError> {
        let load = self.system.load_average();
        Ok([load.one, load.five, load.fifteen])
    }

    fn disk_bytes(&mut self) -> Result<(u64, u64), PlatformError> {
        linux_disk_bytes()
    }

    fn net_bytes(&mut self) -> Result<(u64, u64), PlatformError> {
        self.system.refresh_networks_list();
        let mut recv = 0_u64;
        let mut send = 0_u64;
        for (iface, data) in self.system.networks().iter() {
            if iface.starts_with("lo") {
                debug!(iface = %iface, "skip interface");
                continue;
            }
            recv = recv.saturating_add(data.total_received());
            send = send.saturating_add(data.total_transmitted());
        }
        Ok((recv, send))
    }
}

#[cfg(target_os = "linux")]
fn linux_disk_bytes() -> Result<(u64, u64), PlatformError> {
    let io = super::procfs::read_diskstats(std::path::Path::new("/proc/diskstats"))?;
    Ok((io.read_bytes, io.write_bytes))
}

#[cfg(not(target_os = "linux"))]
fn linux_disk_bytes() -> Result<(u64, u64), PlatformError> {
    Err(PlatformError::Unsupported("disk I/O counters"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fs_excludes_match_case_insensitively() {
        let platform = SysinfoPlatform::with_fs_excludes(vec!["tmpfs".to_string()]);
        assert!(platform.excluded("TMPFS"));
        assert!(!platform.excluded("ext4"));
    }

    #[test]
    fn readings_from_live_system_are_sane() {
        let mut platform = SysinfoPlatform::new();
        let cpu = platform.cpu_percent().unwrap();
        assert!(cpu.is_finite());
        let load = platform.load_average().unwrap();
        assert!(load.iter().all(|v| v.is_finite()));
        assert!(platform.net_bytes().is_ok());
    }
}
