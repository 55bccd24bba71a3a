//! Host resource sampling
//!
//! Reads CPU, memory and connection counts from `/proc` and disk usage via
//! `statvfs`. Platforms without these sources report zeros.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Point-in-time host resource usage
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SystemSample {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub memory_available_gb: f64,
    pub disk_percent: f64,
    pub connection_count: usize,
}

/// Limits past which the host counts as overloaded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverloadThresholds {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_percent: f64,
}

impl Default for OverloadThresholds {
    fn default() -> Self {
        Self {
            cpu_percent: 90.0,
            memory_percent: 90.0,
            disk_percent: 95.0,
        }
    }
}

impl OverloadThresholds {
    /// Any single resource over its limit trips the check
    pub fn is_exceeded(&self, sample: &SystemSample) -> bool {
        sample.cpu_percent > self.cpu_percent
            || sample.memory_percent > self.memory_percent
            || sample.disk_percent > self.disk_percent
    }
}

/// Source of host samples
pub trait SystemProbe: Send + Sync {
    fn sample(&self) -> SystemSample;
}

/// Cumulative CPU jiffies from `/proc/stat`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct CpuTimes {
    total: u64,
    idle: u64,
}

/// Samples the machine the process runs on
pub struct HostProbe {
    disk_path: PathBuf,
    /// CPU counters from the previous sample; usage is the delta since then
    last_cpu: Mutex<Option<CpuTimes>>,
}

impl HostProbe {
    pub fn new(disk_path: impl Into<PathBuf>) -> Self {
        Self {
            disk_path: disk_path.into(),
            last_cpu: Mutex::new(None),
        }
    }

    fn cpu_percent(&self) -> f64 {
        let Some(current) = std::fs::read_to_string("/proc/stat")
            .ok()
            .and_then(|s| parse_cpu_times(&s))
        else {
            return 0.0;
        };
        let previous = self.last_cpu.lock().replace(current);
        cpu_usage(previous, current)
    }
}

impl Default for HostProbe {
    fn default() -> Self {
        Self::new("/")
    }
}

impl SystemProbe for HostProbe {
    fn sample(&self) -> SystemSample {
        let (memory_percent, memory_available_gb) = std::fs::read_to_string("/proc/meminfo")
            .ok()
            .and_then(|s| parse_meminfo(&s))
            .unwrap_or((0.0, 0.0));

        SystemSample {
            cpu_percent: self.cpu_percent(),
            memory_percent,
            memory_available_gb,
            disk_percent: disk_usage_percent(&self.disk_path).unwrap_or(0.0),
            connection_count: count_connections(),
        }
    }
}

/// Parse the aggregate `cpu` line of `/proc/stat`
pub(crate) fn parse_cpu_times(contents: &str) -> Option<CpuTimes> {
    let line = contents.lines().find(|l| l.starts_with("cpu "))?;
    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .filter_map(|f| f.parse().ok())
        .collect();
    if fields.len() < 4 {
        return None;
    }

    // user nice system idle iowait irq softirq steal; guest time is already in user
    let total = fields.iter().take(8).sum();
    let idle = fields[3] + fields.get(4).copied().unwrap_or(0);
    Some(CpuTimes { total, idle })
}

/// Busy share between two counter readings (since boot without a previous one)
pub(crate) fn cpu_usage(previous: Option<CpuTimes>, current: CpuTimes) -> f64 {
    let base = previous.unwrap_or_default();
    let total = current.total.saturating_sub(base.total);
    if total == 0 {
        return 0.0;
    }
    let idle = current.idle.saturating_sub(base.idle);
    ((1.0 - idle as f64 / total as f64) * 100.0).clamp(0.0, 100.0)
}

/// Used-memory percent and available GiB from `/proc/meminfo`
pub(crate) fn parse_meminfo(contents: &str) -> Option<(f64, f64)> {
    let mut total_kb = None;
    let mut available_kb = None;

    for line in contents.lines() {
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("MemTotal:") => total_kb = parts.next().and_then(|v| v.parse::<u64>().ok()),
            Some("MemAvailable:") => available_kb = parts.next().and_then(|v| v.parse::<u64>().ok()),
            _ => {}
        }
    }

    let total_kb = total_kb.filter(|t| *t > 0)?;
    let available_kb = available_kb?.min(total_kb);
    let percent = (total_kb - available_kb) as f64 / total_kb as f64 * 100.0;
    let available_gb = available_kb as f64 * 1024.0 / GIB;
    Some((percent, available_gb))
}

#[cfg(unix)]
fn disk_usage_percent(path: &Path) -> Option<f64> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes()).ok()?;
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    if unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) } != 0 {
        return None;
    }

    let fragment = stat.f_frsize as f64;
    let total = stat.f_blocks as f64 * fragment;
    let free = stat.f_bfree as f64 * fragment;
    let available = stat.f_bavail as f64 * fragment;
    let used = total - free;
    // same basis as `df`: space reserved for root is not counted as usable
    let usable = used + available;
    if usable <= 0.0 {
        return Some(0.0);
    }
    Some(used / usable * 100.0)
}

#[cfg(not(unix))]
fn disk_usage_percent(_path: &Path) -> Option<f64> {
    None
}

/// Open inet sockets (tcp and udp, v4 and v6)
fn count_connections() -> usize {
    ["/proc/net/tcp", "/proc/net/tcp6", "/proc/net/udp", "/proc/net/udp6"]
        .iter()
        .filter_map(|table| std::fs::read_to_string(table).ok())
        .map(|contents| count_socket_rows(&contents))
        .sum()
}

pub(crate) fn count_socket_rows(contents: &str) -> usize {
    contents
        .lines()
        .skip(1)
        .filter(|l| !l.trim().is_empty())
        .count()
}
