//! Resolves the fixed set of metrics to sensors of the source.

use std::collections::BTreeMap;

use resmon_client::Metric;
use resmon_hw::{enumerate, HardwareType, SensorId, SensorSource, SensorType};
use tracing::{debug, info};

/// Device class a metric is looked up in. GPUs of every vendor form one class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeviceClass {
    Cpu,
    Gpu,
    Memory,
}

impl DeviceClass {
    fn matches(self, hardware_type: HardwareType) -> bool {
        match self {
            DeviceClass::Cpu => hardware_type == HardwareType::Cpu,
            DeviceClass::Gpu => hardware_type.is_gpu(),
            DeviceClass::Memory => hardware_type == HardwareType::Memory,
        }
    }
}

/// Sensor names accepted for one directly read metric.
struct MetricRule {
    metric: Metric,
    class: DeviceClass,
    sensor_type: SensorType,
    names: &'static [&'static str],
}

const RULES: &[MetricRule] = &[
    MetricRule {
        metric: Metric::CpuLoadTotal,
        class: DeviceClass::Cpu,
        sensor_type: SensorType::Load,
        names: &["CPU Total"],
    },
    MetricRule {
        metric: Metric::CpuTemperaturePackage,
        class: DeviceClass::Cpu,
        sensor_type: SensorType::Temperature,
        names: &["CPU Package", "Core (Tctl/Tdie)"],
    },
    MetricRule {
        metric: Metric::CpuPowerPackage,
        class: DeviceClass::Cpu,
        sensor_type: SensorType::Power,
        names: &["CPU Package", "Package"],
    },
    MetricRule {
        metric: Metric::GpuLoadCore,
        class: DeviceClass::Gpu,
        sensor_type: SensorType::Load,
        names: &["GPU Core"],
    },
    MetricRule {
        metric: Metric::GpuLoadMemory,
        class: DeviceClass::Gpu,
        sensor_type: SensorType::Load,
        names: &["GPU Memory Controller"],
    },
    MetricRule {
        metric: Metric::GpuTemperatureCore,
        class: DeviceClass::Gpu,
        sensor_type: SensorType::Temperature,
        names: &["GPU Core"],
    },
    MetricRule {
        metric: Metric::GpuPowerPackage,
        class: DeviceClass::Gpu,
        sensor_type: SensorType::Power,
        names: &["GPU Package"],
    },
    MetricRule {
        metric: Metric::MemoryLoadPhysical,
        class: DeviceClass::Memory,
        sensor_type: SensorType::Load,
        names: &["Memory"],
    },
];

const GPU_MEMORY_USED: &str = "GPU Memory Used";
const GPU_MEMORY_TOTAL: &str = "GPU Memory Total";

/// A resolved reference to one physical sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorHandle {
    pub id: SensorId,
    pub hardware_type: HardwareType,
    pub name: String,
}

impl SensorHandle {
    /// Reads the current value from the source.
    pub fn read<S: SensorSource + ?Sized>(&self, source: &S) -> resmon_hw::Result<Option<f32>> {
        source.read(self.id)
    }
}

/// How a metric's value is obtained.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    /// Read straight from one sensor.
    Direct(SensorHandle),
    /// `used / total * 100` from two sensors.
    Ratio {
        used: SensorHandle,
        total: SensorHandle,
    },
}

/// Metric bindings established at startup. Metrics without a binding read as 0.
#[derive(Debug, Clone, Default)]
pub struct ResolvedSensors {
    bindings: BTreeMap<Metric, Binding>,
}

impl ResolvedSensors {
    #[cfg(test)]
    pub fn binding(&self, metric: Metric) -> Option<&Binding> {
        self.bindings.get(&metric)
    }

    /// Sensor bound directly to a metric, if any.
    #[cfg(test)]
    pub fn handle(&self, metric: Metric) -> Option<&SensorHandle> {
        match self.bindings.get(&metric) {
            Some(Binding::Direct(handle)) => Some(handle),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Metric, &Binding)> {
        self.bindings.iter().map(|(m, b)| (*m, b))
    }

    /// Metrics no sensor was found for.
    pub fn missing(&self) -> Vec<Metric> {
        Metric::ALL
            .into_iter()
            .filter(|m| !self.bindings.contains_key(m))
            .collect()
    }
}

/// Owns the sensor source and resolves metrics against it.
pub struct SensorCatalog<S> {
    source: S,
}

impl<S: SensorSource> SensorCatalog<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Re-reads all hardware.
    pub fn refresh(&mut self) -> resmon_hw::Result<()> {
        self.source.refresh()
    }

    /// Refreshes the source and binds every metric to a sensor.
    ///
    /// Sensor names match case-insensitively. When several sensors match,
    /// the last one enumerated is kept.
    pub fn resolve(&mut self) -> resmon_hw::Result<ResolvedSensors> {
        self.source.refresh()?;
        let sensors = enumerate(self.source.hardware());

        for (hardware_type, sensor) in &sensors {
            debug!(
                "{}.{}: {} = {:?}",
                hardware_type, sensor.sensor_type, sensor.name, sensor.value
            );
        }

        let find_last = |class: DeviceClass, sensor_type: SensorType, names: &[&str]| {
            let mut found = None;
            for (hardware_type, sensor) in &sensors {
                if class.matches(*hardware_type)
                    && sensor.sensor_type == sensor_type
                    && names.iter().any(|n| sensor.name.eq_ignore_ascii_case(n))
                {
                    found = Some(SensorHandle {
                        id: sensor.id,
                        hardware_type: *hardware_type,
                        name: sensor.name.clone(),
                    });
                }
            }
            found
        };

        let mut resolved = ResolvedSensors::default();
        for rule in RULES {
            if let Some(handle) = find_last(rule.class, rule.sensor_type, rule.names) {
                resolved
                    .bindings
                    .insert(rule.metric, Binding::Direct(handle));
            }
        }

        let used = find_last(DeviceClass::Gpu, SensorType::SmallData, &[GPU_MEMORY_USED]);
        let total = find_last(DeviceClass::Gpu, SensorType::SmallData, &[GPU_MEMORY_TOTAL]);
        if let (Some(used), Some(total)) = (used, total) {
            resolved
                .bindings
                .insert(Metric::GpuMemoryLoad, Binding::Ratio { used, total });
        }

        for (metric, binding) in resolved.iter() {
            match binding {
                Binding::Direct(h) => debug!("{} -> {} ({})", metric, h.name, h.hardware_type),
                Binding::Ratio { used, total } => {
                    debug!("{} -> {} / {}", metric, used.name, total.name)
                }
            }
        }
        for metric in resolved.missing() {
            debug!("{} has no matching sensor, reporting 0", metric);
        }
        info!(
            "Resolved {} of {} metrics from {} sensors",
            resolved.bindings.len(),
            Metric::ALL.len(),
            sensors.len()
        );

        Ok(resolved)
    }

    /// Releases the source.
    pub fn close(&mut self) {
        self.source.close();
    }
}
