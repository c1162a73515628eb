//! Sensor source contract and the device tree it exposes.

use std::fmt;

use crate::Result;

/// Kind of hardware device a sensor belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HardwareType {
    Cpu,
    GpuNvidia,
    GpuAmd,
    GpuIntel,
    Memory,
}

impl HardwareType {
    /// Returns true for any GPU vendor.
    pub fn is_gpu(self) -> bool {
        matches!(
            self,
            HardwareType::GpuNvidia | HardwareType::GpuAmd | HardwareType::GpuIntel
        )
    }
}

impl fmt::Display for HardwareType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HardwareType::Cpu => "cpu",
            HardwareType::GpuNvidia => "gpu-nvidia",
            HardwareType::GpuAmd => "gpu-amd",
            HardwareType::GpuIntel => "gpu-intel",
            HardwareType::Memory => "memory",
        };
        write!(f, "{}", name)
    }
}

/// Kind of measurement a sensor reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorType {
    /// Utilization in percent.
    Load,
    /// Degrees Celsius.
    Temperature,
    /// Watts.
    Power,
    /// Small data amounts (MB for GPU memory, GB for system memory).
    SmallData,
}

impl fmt::Display for SensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SensorType::Load => "load",
            SensorType::Temperature => "temperature",
            SensorType::Power => "power",
            SensorType::SmallData => "data",
        };
        write!(f, "{}", name)
    }
}

/// Stable identifier of a sensor within one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SensorId(pub u32);

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A single measurement point with its value as of the last refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct Sensor {
    pub id: SensorId,
    pub name: String,
    pub sensor_type: SensorType,
    pub value: Option<f32>,
}

/// A device with its own sensors and nested sub-devices.
#[derive(Debug, Clone, PartialEq)]
pub struct Hardware {
    pub name: String,
    pub hardware_type: HardwareType,
    pub sensors: Vec<Sensor>,
    pub sub_hardware: Vec<Hardware>,
}

impl Hardware {
    pub fn new(name: impl Into<String>, hardware_type: HardwareType) -> Self {
        Self {
            name: name.into(),
            hardware_type,
            sensors: Vec::new(),
            sub_hardware: Vec::new(),
        }
    }

    /// Finds a sensor anywhere below this device.
    pub fn find(&self, id: SensorId) -> Option<&Sensor> {
        self.sub_hardware
            .iter()
            .find_map(|sub| sub.find(id))
            .or_else(|| self.sensors.iter().find(|s| s.id == id))
    }
}

/// Source of hardware telemetry.
///
/// `refresh` re-reads every device; `hardware` and `read` then report the
/// values captured by that refresh.
pub trait SensorSource: Send {
    /// Re-reads all hardware.
    fn refresh(&mut self) -> Result<()>;

    /// Top-level devices.
    fn hardware(&self) -> &[Hardware];

    /// Current value of one sensor. `Ok(None)` means the sensor exists but
    /// has no reading.
    fn read(&self, id: SensorId) -> Result<Option<f32>> {
        self.hardware()
            .iter()
            .find_map(|hw| hw.find(id))
            .map(|sensor| sensor.value)
            .ok_or(crate::Error::SensorGone(id))
    }

    /// Releases the underlying hardware.
    fn close(&mut self) {}
}

/// Walks the device tree depth first, sub-devices before a device's own
/// sensors, yielding each sensor together with the type of the device that
/// owns it.
pub fn enumerate<'a>(hardware: &'a [Hardware]) -> Vec<(HardwareType, &'a Sensor)> {
    fn walk<'a>(hw: &'a Hardware, out: &mut Vec<(HardwareType, &'a Sensor)>) {
        for sub in &hw.sub_hardware {
            walk(sub, out);
        }
        for sensor in &hw.sensors {
            out.push((hw.hardware_type, sensor));
        }
    }

    let mut out = Vec::new();
    for hw in hardware {
        walk(hw, &mut out);
    }
    out
}
