//! Parsers for Linux counter text (`/proc` files and `df` output).
//!
//! These are pure functions over the file contents so they can be tested
//! against fixtures captured on real machines.

use super::PlatformError;

/// Bytes per sector in `/proc/diskstats`, independent of the device's real sector size.
pub const DISKSTATS_SECTOR_BYTES: u64 = 512;

/// Whole-disk name prefixes counted for disk activity.
const DISK_PREFIXES: [&str; 6] = ["sd", "vd", "xvd", "hd", "nvme", "mmcblk"];

/// Aggregate CPU time counters from the `cpu ` line of `/proc/stat`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuStat {
    pub total: u64,
    pub idle: u64,
}

impl CpuStat {
    /// Busy percentage between an earlier stat and this one.
    pub fn busy_percent_since(&self, earlier: &CpuStat) -> f64 {
        let total = self.total.saturating_sub(earlier.total);
        if total == 0 {
            return 0.0;
        }
        let idle = self.idle.saturating_sub(earlier.idle).min(total);
        (total - idle) as f64 * 100.0 / total as f64
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemInfo {
    pub total_kb: u64,
    pub available_kb: u64,
}

impl MemInfo {
    pub fn used_kb(&self) -> u64 {
        self.total_kb.saturating_sub(self.available_kb)
    }
}

/// Filesystem totals from the `total` line of `df --total`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DfTotal {
    pub size_kb: u64,
    pub used_kb: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiskIo {
    pub read_bytes: u64,
    pub write_bytes: u64,
    /// Whole disks whose counters were summed.
    pub disks: Vec<String>,
    /// Partitions and non-disk devices left out.
    pub skipped: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetIo {
    pub recv_bytes: u64,
    pub send_bytes: u64,
}

/// Parses `/proc/loadavg`, e.g. `0.54 0.56 0.55 1/1006 176235`.
pub fn parse_loadavg(text: &str) -> Result<[f64; 3], PlatformError> {
    let toks: Vec<&str> = text.split_whitespace().collect();
    if toks.len() < 3 {
        return Err(PlatformError::parse(
            "loadavg",
            format!("want 3 fields in {text:?}, got {}", toks.len()),
        ));
    }
    let mut load = [0.0; 3];
    for (i, tok) in toks.iter().take(3).enumerate() {
        load[i] = tok.parse::<f64>().map_err(|err| {
            PlatformError::parse("loadavg", format!("field {i} {tok:?}: {err}"))
        })?;
    }
    Ok(load)
}

/// Parses the aggregate `cpu ` line of `/proc/stat`.
///
/// ```text
/// cpu  611762 30 136480 16065151 13896 0 5946 0 0 0
/// cpu0 75636 5 17226 2003361 1647 0 2358 0 0 0
/// ```
pub fn parse_cpu_stat(text: &str) -> Result<CpuStat, PlatformError> {
    for line in text.lines() {
        let mut toks = line.split_whitespace();
        if toks.next() != Some("cpu") {
            continue;
        }
        let values = toks
            .map(|tok| {
                tok.parse::<u64>()
                    .map_err(|err| PlatformError::parse("stat", format!("{tok:?} in {line:?}: {err}")))
            })
            .collect::<Result<Vec<u64>, _>>()?;
        if values.len() < 4 {
            return Err(PlatformError::parse(
                "stat",
                format!("want at least 4 columns in {line:?}, got {}", values.len()),
            ));
        }
        let total = values.iter().fold(0_u64, |acc, v| acc.saturating_add(*v));
        return Ok(CpuStat {
            total,
            idle: values[3],
        });
    }
    Err(PlatformError::parse("stat", "aggregate \"cpu \" line not found"))
}

/// Parses `/proc/meminfo`, falling back to `MemFree + Buffers + Cached`
/// on kernels without `MemAvailable`.
pub fn parse_meminfo(text: &str) -> Result<MemInfo, PlatformError> {
    let mut total = None;
    let mut available = None;
    let mut free = 0_u64;
    let mut buffers = 0_u64;
    let mut cached = 0_u64;
    for line in text.lines() {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        if !matches!(key, "MemTotal" | "MemAvailable" | "MemFree" | "Buffers" | "Cached") {
            continue;
        }
        let Some(value) = rest.split_whitespace().next() else {
            continue;
        };
        let kb = value
            .parse::<u64>()
            .map_err(|err| PlatformError::parse("meminfo", format!("{key}: {value:?}: {err}")))?;
        match key {
            "MemTotal" => total = Some(kb),
            "MemAvailable" => available = Some(kb),
            "MemFree" => free = kb,
            "Buffers" => buffers = kb,
            _ => cached = kb,
        }
    }
    let total_kb = total.ok_or_else(|| PlatformError::parse("meminfo", "MemTotal not found"))?;
    if total_kb == 0 {
        return Err(PlatformError::parse("meminfo", "MemTotal is 0"));
    }
    let available_kb = available
        .unwrap_or_else(|| free.saturating_add(buffers).saturating_add(cached))
        .min(total_kb);
    Ok(MemInfo {
        total_kb,
        available_kb,
    })
}

/// Parses `df --exclude-type=tmpfs --total --output=source,size,used`.
///
/// ```text
/// Filesystem     1K-blocks      Used
/// /dev/nvme0n1p2 981876212 235000596
/// total          990394692 235006572
/// ```
pub fn parse_df_total(text: &str) -> Result<DfTotal, PlatformError> {
    for line in text.lines() {
        let toks: Vec<&str> = line.split_whitespace().collect();
        if toks.first() != Some(&"total") {
            continue;
        }
        if toks.len() < 3 {
            return Err(PlatformError::parse(
                "df output",
                format!("want size and used in {line:?}"),
            ));
        }
        let size_kb = parse_u64_field("df output", toks[1], line)?;
        let used_kb = parse_u64_field("df output", toks[2], line)?;
        if size_kb == 0 {
            return Err(PlatformError::parse("df output", format!("size is 0 in {line:?}")));
        }
        if used_kb > size_kb {
            return Err(PlatformError::parse(
                "df output",
                format!("used {used_kb} > size {size_kb} in {line:?}"),
            ));
        }
        return Ok(DfTotal { size_kb, used_kb });
    }
    Err(PlatformError::parse("df output", "\"total\" line not found"))
}

/// Sums sectors read and written over whole disks in `/proc/diskstats`.
///
/// Partitions are skipped so their I/O is not counted twice; loop, ram,
/// md, dm and optical devices are ignored.
/// See <https://www.kernel.org/doc/Documentation/admin-guide/iostats.rst>.
pub fn parse_diskstats(text: &str) -> Result<DiskIo, PlatformError> {
    let mut io = DiskIo::default();
    for line in text.lines() {
        let toks: Vec<&str> = line.split_whitespace().collect();
        // major minor name + 11 counters on every kernel since 2.6
        if toks.len() < 14 {
            continue;
        }
        let device = toks[2];
        if !DISK_PREFIXES.iter().any(|p| device.starts_with(p))
            || io.disks.iter().any(|disk| is_partition_of(device, disk))
        {
            io.skipped.push(device.to_string());
            continue;
        }
        io.disks.push(device.to_string());
        let sectors_read = parse_u64_field("diskstats", toks[5], line)?;
        let sectors_written = parse_u64_field("diskstats", toks[9], line)?;
        io.read_bytes = io
            .read_bytes
            .saturating_add(sectors_read.saturating_mul(DISKSTATS_SECTOR_BYTES));
        io.write_bytes = io
            .write_bytes
            .saturating_add(sectors_written.saturating_mul(DISKSTATS_SECTOR_BYTES));
    }
    Ok(io)
}

/// `sda1` is a partition of `sda`; `nvme0n1p2` of `nvme0n1`; `sdaa` is not of `sda`.
fn is_partition_of(device: &str, disk: &str) -> bool {
    let Some(rest) = device.strip_prefix(disk) else {
        return false;
    };
    let digits = if disk.ends_with(|c: char| c.is_ascii_digit()) {
        match rest.strip_prefix('p') {
            Some(d) => d,
            None => return false,
        }
    } else {
        rest
    };
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Sums received and transmitted bytes over `/proc/net/dev`, skipping loopback.
///
/// ```text
/// Inter-|   Receive                            |  Transmit
///  face |bytes    packets errs drop ...        |bytes    packets ...
///     lo:   117864359   32173    0     0 ...
/// enp4s0:    21640725   46246    0 13520 ...
/// ```
pub fn parse_net_dev(text: &str) -> Result<NetIo, PlatformError> {
    let mut io = NetIo::default();
    for line in text.lines() {
        let Some((name, counters)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();
        if name.is_empty() || name.contains('|') || name.starts_with("lo") {
            continue;
        }
        let toks: Vec<&str> = counters.split_whitespace().collect();
        if toks.len() < 9 {
            return Err(PlatformError::parse(
                "net/dev",
                format!("want at least 9 counters for {name}, got {}", toks.len()),
            ));
        }
        let recv = parse_u64_field("net/dev", toks[0], line)?;
        let send = parse_u64_field("net/dev", toks[8], line)?;
        io.recv_bytes = io.recv_bytes.saturating_add(recv);
        io.send_bytes = io.send_bytes.saturating_add(send);
    }
    Ok(io)
}

fn parse_u64_field(what: &'static str, tok: &str, line: &str) -> Result<u64, PlatformError> {
    tok.parse::<u64>()
        .map_err(|err| PlatformError::parse(what, format!("{tok:?} in {:?}: {err}", line.trim())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loadavg_takes_first_three_fields() {
        let load = parse_loadavg("2.01 0.56 0.15 1/1006 176235\n").unwrap();
        assert_eq!(load, [2.01, 0.56, 0.15]);
        assert!(parse_loadavg("0.1 0.2").is_err());
        assert!(parse_loadavg("0.1 x 0.3 1/2 3").is_err());
    }

    #[test]
    fn cpu_stat_uses_aggregate_line() {
        let text = "
cpu  634755 30 142645 16649013 14328 0 6168 0 0 0
cpu0 78454 5 17986 2076297 1702 0 2432 0 0 0
cpu1 79965 6 17364 2082887 1852 0 722 0 0 0
";
        let stat = parse_cpu_stat(text).unwrap();
        assert_eq!(stat.total, 17_446_939);
        assert_eq!(stat.idle, 16_649_013);
    }

    #[test]
    fn cpu_stat_rejects_missing_or_short_line() {
        assert!(parse_cpu_stat("cpu0 1 2 3 4 5\n").is_err());
        assert!(parse_cpu_stat("cpu 1 2 3\n").is_err());
        assert!(parse_cpu_stat("cpu 1 2 x 4 5\n").is_err());
    }

    #[test]
    fn busy_percent_between_two_stats() {
        let a = CpuStat { total: 1000, idle: 800 };
        let b = CpuStat { total: 1100, idle: 870 };
        assert!((b.busy_percent_since(&a) - 30.0).abs() < 1e-9);
        assert_eq!(a.busy_percent_since(&a), 0.0);
        // counters went backwards after a reset
        assert_eq!(a.busy_percent_since(&b), 0.0);
    }

    #[test]
    fn meminfo_prefers_mem_available() {
        let text = "\
MemTotal:       16072456 kB
MemFree:          301288 kB
MemAvailable:   13208456 kB
Buffers:          102400 kB
Cached:         13579404 kB
";
        let mem = parse_meminfo(text).unwrap();
        assert_eq!(mem.total_kb, 16_072_456);
        assert_eq!(mem.used_kb(), 16_072_456 - 13_208_456);
    }

    #[test]
    fn meminfo_falls_back_without_mem_available() {
        let text = "\
MemTotal:       1000 kB
MemFree:         200 kB
Buffers:         100 kB
Cached:          300 kB
";
        let mem = parse_meminfo(text).unwrap();
        assert_eq!(mem.available_kb, 600);
        assert_eq!(mem.used_kb(), 400);
        assert!(parse_meminfo("MemFree: 1 kB\n").is_err());
        assert!(parse_meminfo("MemTotal: 0 kB\n").is_err());
    }

    #[test]
    fn df_total_line() {
        let text = "
Filesystem     1K-blocks      Used
udev             7995232         0
/dev/nvme0n1p2 981876212 235000596
/dev/nvme0n1p1    523248      5976
total          990394692 235006572
";
        let df = parse_df_total(text).unwrap();
        assert_eq!(df.size_kb, 990_394_692);
        assert_eq!(df.used_kb, 235_006_572);
    }

    #[test]
    fn df_total_tolerates_tabs_and_rejects_nonsense() {
        let df = parse_df_total("total\t\t100\t 40\r\n").unwrap();
        assert_eq!(df, DfTotal { size_kb: 100, used_kb: 40 });
        assert!(parse_df_total("Filesystem 1K-blocks Used\n").is_err());
        assert!(parse_df_total("total 0 0\n").is_err());
        assert!(parse_df_total("total 10 20\n").is_err());
        assert!(parse_df_total("total 10\n").is_err());
    }

    #[test]
    fn diskstats_skips_partitions() {
        let text = "
259       0 nvme0n1   348631 57325 49778168 51034 237722 390973 34542122 662471 0 262444 729800 0 0 0 0 14038 16295
259       1 nvme0n1p1    187  1000    13454    31      2      0        2      7 0     60     39 0 0 0 0 0 0
259       2 nvme0n1p2 348152 56277 49752186 50957 237639 388315 34512056 662230 0 262220 713187 0 0 0 0 0 0
 13       3 sda        48631   7325  778168  1034   7722  90973  4542122  62471 0 62444   29800 0 0 0 0 4038 6295
";
        let io = parse_diskstats(text).unwrap();
        assert_eq!(io.read_bytes, (49_778_168 + 778_168) * 512);
        assert_eq!(io.write_bytes, (34_542_122 + 4_542_122) * 512);
    }

    #[test]
    fn diskstats_counts_each_nvme_disk_and_ignores_loop_devices() {
        let text = "
  259       0 nvme0n1 362239 46299 56104016 50812 164382 271075 31063762 427750 0 237596 488351 0 0 0 0 8754 9787
  259       1 nvme0n1p1 187 1000 13454 29 2 0 2 0 0 52 29 0 0 0 0 0 0
  259       2 nvme0n1p2 361764 45248 56078058 50743 164357 270919 31062336 427726 0 237536 478470 0 0 0 0 0 0
  259       3 nvme0n1p3 109 51 5312 17 22 156 1424 23 0 116 41 0 0 0 0 0 0
  259       4 nvme1n1 328 0 18150 55 0 0 0 0 0 56 55 0 0 0 0 0 0
  259       5 nvme1n1p1 58 0 4192 10 0 0 0 0 0 28 10 0 0 0 0 0 0
  7       0 loop0 10 0 99 0 0 0 0 0 0 0 0 0 0 0 0 0 0
  7       1 loop1 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0
";
        let io = parse_diskstats(text).unwrap();
        assert_eq!(io.read_bytes, (56_104_016 + 18_150) * 512);
        assert_eq!(io.write_bytes, 31_063_762 * 512);
        assert_eq!(io.disks, ["nvme0n1", "nvme1n1"]);
        assert_eq!(
            io.skipped,
            ["nvme0n1p1", "nvme0n1p2", "nvme0n1p3", "nvme1n1p1", "loop0", "loop1"]
        );
    }

    #[test]
    fn diskstats_with_tabs_and_optical_drive() {
        let text = "
\t8       0 sda 80084 15703 18492198 19522 5844738 2423893 86294228 1739631 0 4086808 1850825 15827 2 56772622 5738 759399 85932
\t8       1 sda1 79680 10018 18464405 19458 5799604 2423893 86294226 1735890 0 4086728 1761086 15823 0 56281328 5737 0 0
\t8      14 sda14 55 0 440 6 0 0 0 0 0 36 6 0 0 0 0 0 0
\t8      15 sda15 257 5685 23633 46 2 0 2 0 0 140 47 4 2 491294 0 0 0
   11       0 sr0 9 0 3 0 0 0 0 0 0 16 0 0 0 0 0 0 0
";
        let io = parse_diskstats(text).unwrap();
        assert_eq!(io.read_bytes, 18_492_198 * 512);
        assert_eq!(io.write_bytes, 86_294_228 * 512);
        assert_eq!(io.disks, ["sda"]);
        assert!(io.skipped.iter().any(|d| d == "sr0"));
    }

    #[test]
    fn diskstats_raid_members_counted_once_each() {
        // old kernels expose 11 counters only
        let text = "
   8       0 sda 116758444 39021759 19926482661 203182717 26000897 8268143 3426527240 237899876 0 54951320 275172048
   8       1 sda1 932947 115896 134102032 1387743 1249 1439 17766 32427 0 327904 1378300
   8      16 sdb 110318118 11905564 15643223942 1882821133 29859093 37404888 7649927176 643942724 0 119562340 2134899904
   8      17 sdb1 866789 180858 134088392 14575763 1222 1466 17766 104537 0 933184 14547152
   9       0 md0 1286 0 15896 0 2154 0 17232 0 0 0 0
";
        let io = parse_diskstats(text).unwrap();
        assert_eq!(io.read_bytes, (19_926_482_661 + 15_643_223_942) * 512);
        assert_eq!(io.write_bytes, (3_426_527_240 + 7_649_927_176) * 512);
    }

    #[test]
    fn partition_detection() {
        assert!(is_partition_of("sda1", "sda"));
        assert!(is_partition_of("sda15", "sda"));
        assert!(!is_partition_of("sdaa", "sda"));
        assert!(!is_partition_of("sda", "sda"));
        assert!(is_partition_of("nvme0n1p2", "nvme0n1"));
        assert!(!is_partition_of("nvme0n10", "nvme0n1"));
        assert!(is_partition_of("mmcblk0p1", "mmcblk0"));
    }

    #[test]
    fn diskstats_rejects_garbage_counters() {
        let text = "8 0 sda 1 2 x 4 5 6 7 8 9 10 11\n";
        assert!(parse_diskstats(text).is_err());
        assert_eq!(parse_diskstats("").unwrap(), DiskIo::default());
    }

    #[test]
    fn net_dev_sums_non_loopback_interfaces() {
        let text = "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo:   117864359   32173    0     0    0     0          0         0  117864359   32173    0    0    0     0       0          0
enp4s0:    21640725   46246    0 13520    0     0          0      1053   13613968   31281    0    0    0     0       0          0
wlp0s20f3:1 2 3 4 5 6 7 8 9 10 11 12 13 14 15 16
";
        let io = parse_net_dev(text).unwrap();
        assert_eq!(io.recv_bytes, 21_640_725 + 1);
        assert_eq!(io.send_bytes, 13_613_968 + 9);
    }

    #[test]
    fn net_dev_rejects_short_or_garbage_lines() {
        assert!(parse_net_dev("eth0: 1 2 3\n").is_err());
        assert!(parse_net_dev("eth0: x 2 3 4 5 6 7 8 9\n").is_err());
        assert_eq!(parse_net_dev("").unwrap(), NetIo::default());
    }
}
