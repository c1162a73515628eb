//! Telemetry snapshot and the metrics it carries.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One immutable set of telemetry values produced per collection tick.
///
/// Metrics whose sensor was not found are reported as 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TelemetrySnapshot {
    /// Total CPU load (%)
    pub cpu_load_total: f32,
    /// CPU package temperature (C)
    pub cpu_temperature_package: f32,
    /// CPU package power (W)
    pub cpu_power_package: f32,
    /// GPU core load (%)
    pub gpu_load_core: f32,
    /// GPU memory controller load (%)
    pub gpu_load_memory: f32,
    /// GPU core temperature (C)
    pub gpu_temperature_core: f32,
    /// GPU package power (W)
    pub gpu_power_package: f32,
    /// GPU memory used as a share of total (%)
    pub gpu_memory_load: f32,
    /// Physical memory load (%)
    pub memory_load_physical: f32,
}

/// Names one field of a [`TelemetrySnapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Metric {
    CpuLoadTotal,
    CpuTemperaturePackage,
    CpuPowerPackage,
    GpuLoadCore,
    GpuLoadMemory,
    GpuTemperatureCore,
    GpuPowerPackage,
    GpuMemoryLoad,
    MemoryLoadPhysical,
}

impl Metric {
    /// All metrics in snapshot field order.
    pub const ALL: [Metric; 9] = [
        Metric::CpuLoadTotal,
        Metric::CpuTemperaturePackage,
        Metric::CpuPowerPackage,
        Metric::GpuLoadCore,
        Metric::GpuLoadMemory,
        Metric::GpuTemperatureCore,
        Metric::GpuPowerPackage,
        Metric::GpuMemoryLoad,
        Metric::MemoryLoadPhysical,
    ];

    /// Wire name of the field (camelCase).
    pub fn key(self) -> &'static str {
        match self {
            Metric::CpuLoadTotal => "cpuLoadTotal",
            Metric::CpuTemperaturePackage => "cpuTemperaturePackage",
            Metric::CpuPowerPackage => "cpuPowerPackage",
            Metric::GpuLoadCore => "gpuLoadCore",
            Metric::GpuLoadMemory => "gpuLoadMemory",
            Metric::GpuTemperatureCore => "gpuTemperatureCore",
            Metric::GpuPowerPackage => "gpuPowerPackage",
            Metric::GpuMemoryLoad => "gpuMemoryLoad",
            Metric::MemoryLoadPhysical => "memoryLoadPhysical",
        }
    }

    /// Human readable label.
    pub fn label(self) -> &'static str {
        match self {
            Metric::CpuLoadTotal => "CPU load",
            Metric::CpuTemperaturePackage => "CPU temp",
            Metric::CpuPowerPackage => "CPU power",
            Metric::GpuLoadCore => "GPU core load",
            Metric::GpuLoadMemory => "GPU memory load",
            Metric::GpuTemperatureCore => "GPU temp",
            Metric::GpuPowerPackage => "GPU power",
            Metric::GpuMemoryLoad => "GPU memory",
            Metric::MemoryLoadPhysical => "Memory used",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            Metric::CpuTemperaturePackage | Metric::GpuTemperatureCore => "C",
            Metric::CpuPowerPackage | Metric::GpuPowerPackage => "W",
            _ => "%",
        }
    }

    /// Upper bound of the chart scale.
    pub fn max_value(self) -> f32 {
        match self {
            Metric::CpuPowerPackage | Metric::GpuPowerPackage => 200.0,
            _ => 100.0,
        }
    }

    /// Reads this metric from a snapshot.
    pub fn value(self, snapshot: &TelemetrySnapshot) -> f32 {
        match self {
            Metric::CpuLoadTotal => snapshot.cpu_load_total,
            Metric::CpuTemperaturePackage => snapshot.cpu_temperature_package,
            Metric::CpuPowerPackage => snapshot.cpu_power_package,
            Metric::GpuLoadCore => snapshot.gpu_load_core,
            Metric::GpuLoadMemory => snapshot.gpu_load_memory,
            Metric::GpuTemperatureCore => snapshot.gpu_temperature_core,
            Metric::GpuPowerPackage => snapshot.gpu_power_package,
            Metric::GpuMemoryLoad => snapshot.gpu_memory_load,
            Metric::MemoryLoadPhysical => snapshot.memory_load_physical,
        }
    }

    /// Field of a snapshot under construction.
    pub fn field_mut(self, snapshot: &mut TelemetrySnapshot) -> &mut f32 {
        match self {
            Metric::CpuLoadTotal => &mut snapshot.cpu_load_total,
            Metric::CpuTemperaturePackage => &mut snapshot.cpu_temperature_package,
            Metric::CpuPowerPackage => &mut snapshot.cpu_power_package,
            Metric::GpuLoadCore => &mut snapshot.gpu_load_core,
            Metric::GpuLoadMemory => &mut snapshot.gpu_load_memory,
            Metric::GpuTemperatureCore => &mut snapshot.gpu_temperature_core,
            Metric::GpuPowerPackage => &mut snapshot.gpu_power_package,
            Metric::GpuMemoryLoad => &mut snapshot.gpu_memory_load,
            Metric::MemoryLoadPhysical => &mut snapshot.memory_load_physical,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl std::str::FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Metric::ALL
            .into_iter()
            .find(|m| m.key().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown metric: {}", s))
    }
}
