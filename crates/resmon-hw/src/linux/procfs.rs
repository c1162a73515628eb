//! `/proc` parsing for CPU load and memory usage.

/// Aggregate CPU jiffies from the first line of `/proc/stat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuTimes {
    pub idle: u64,
    pub total: u64,
}

impl CpuTimes {
    /// Busy percentage between two readings, `None` if no time elapsed.
    pub fn load_since(&self, previous: &CpuTimes) -> Option<f32> {
        let idle_delta = self.idle.saturating_sub(previous.idle);
        let total_delta = self.total.saturating_sub(previous.total);
        if total_delta == 0 {
            return None;
        }
        Some((100.0 * (1.0 - (idle_delta as f64 / total_delta as f64))) as f32)
    }
}

/// Parses the aggregate `cpu` line of `/proc/stat`.
///
/// Idle time includes iowait so a disk-bound system does not read as busy.
pub fn parse_cpu_times(content: &str) -> Option<CpuTimes> {
    let line = content.lines().find(|l| l.starts_with("cpu "))?;
    let parts: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .filter_map(|s| s.parse().ok())
        .collect();

    if parts.len() < 4 {
        return None;
    }
    let idle = parts[3] + parts.get(4).copied().unwrap_or(0);
    let total = parts.iter().sum();
    Some(CpuTimes { idle, total })
}

/// Memory totals from `/proc/meminfo`, in kB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemInfo {
    pub total_kb: u64,
    pub available_kb: u64,
}

impl MemInfo {
    pub fn used_kb(&self) -> u64 {
        self.total_kb.saturating_sub(self.available_kb)
    }

    /// Used memory as a percentage of total, 0 when total is unknown.
    pub fn load(&self) -> f32 {
        if self.total_kb == 0 {
            return 0.0;
        }
        (100.0 * (self.used_kb() as f64 / self.total_kb as f64)) as f32
    }
}

/// Parses `MemTotal` and `MemAvailable` out of `/proc/meminfo`.
pub fn parse_meminfo(content: &str) -> Option<MemInfo> {
    let mut total_kb = None;
    let mut available_kb = None;
    for line in content.lines() {
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("MemTotal:") => total_kb = parts.next().and_then(|v| v.parse().ok()),
            Some("MemAvailable:") => available_kb = parts.next().and_then(|v| v.parse().ok()),
            _ => {}
        }
    }
    Some(MemInfo {
        total_kb: total_kb?,
        available_kb: available_kb?,
    })
}

/// CPU model name from `/proc/cpuinfo`.
pub fn parse_cpu_model(content: &str) -> Option<String> {
    content
        .lines()
        .find(|l| l.starts_with("model name"))
        .and_then(|l| l.split_once(':'))
        .map(|(_, name)| name.trim().to_string())
        .filter(|name| !name.is_empty())
}
