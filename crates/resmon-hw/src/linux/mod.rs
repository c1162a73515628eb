//! Linux sensor source backed by procfs and sysfs.
//!
//! Devices are discovered once when the source is opened. Every
//! [`SensorSource::refresh`] re-reads the files behind the discovered sensors;
//! a file that disappears or becomes unreadable reports `None` rather than
//! failing the whole refresh.

pub mod procfs;
pub mod sysfs;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, info};

use crate::{Error, Hardware, HardwareType, Result, Sensor, SensorId, SensorSource, SensorType};
use procfs::CpuTimes;
use sysfs::{hwmon_chips, read_attr};

const BYTES_PER_MB: f32 = 1024.0 * 1024.0;
const KB_PER_GB: f32 = 1024.0 * 1024.0;

/// How a sensor's value is produced on refresh.
#[derive(Debug)]
enum Probe {
    /// Busy percentage from `/proc/stat` deltas.
    CpuTotal,
    MemoryLoad,
    MemoryUsed,
    MemoryAvailable,
    /// Integer attribute divided by a fixed factor.
    Scaled { path: PathBuf, divisor: f32 },
    /// Microjoule counter turned into watts between refreshes.
    Energy {
        path: PathBuf,
        last: Option<(u64, Instant)>,
    },
}

/// Assigns sensor ids while the device tree is being discovered.
#[derive(Default)]
struct TreeBuilder {
    next_id: u32,
    probes: Vec<(SensorId, Probe)>,
}

impl TreeBuilder {
    fn add(&mut self, hw: &mut Hardware, name: &str, sensor_type: SensorType, probe: Probe) {
        let id = SensorId(self.next_id);
        self.next_id += 1;
        debug!("Discovered {} sensor {} '{}' on {}", sensor_type, id, name, hw.name);
        hw.sensors.push(Sensor {
            id,
            name: name.to_string(),
            sensor_type,
            value: None,
        });
        self.probes.push((id, probe));
    }

    fn add_scaled(
        &mut self,
        hw: &mut Hardware,
        name: &str,
        sensor_type: SensorType,
        path: Option<PathBuf>,
        divisor: f32,
    ) {
        if let Some(path) = path.filter(|p| p.exists()) {
            self.add(hw, name, sensor_type, Probe::Scaled { path, divisor });
        }
    }
}

/// Sensor source reading `/proc` and `/sys`.
pub struct LinuxSource {
    proc_root: PathBuf,
    hardware: Vec<Hardware>,
    probes: Vec<(SensorId, Probe)>,
    last_cpu: Option<CpuTimes>,
    closed: bool,
}

impl LinuxSource {
    /// Opens the source against the live `/proc` and `/sys`.
    pub fn open() -> Result<Self> {
        Self::with_roots("/proc", "/sys")
    }

    /// Opens the source against alternative procfs and sysfs mount points.
    pub fn with_roots<P: AsRef<Path>, S: AsRef<Path>>(proc_root: P, sys_root: S) -> Result<Self> {
        let proc_root = proc_root.as_ref().to_path_buf();
        let sys_root = sys_root.as_ref();
        let mut builder = TreeBuilder::default();

        let mut hardware = vec![
            discover_cpu(&proc_root, sys_root, &mut builder),
            discover_memory(&proc_root, &mut builder)?,
        ];
        hardware.extend(discover_gpus(sys_root, &mut builder));

        info!(
            "Opened Linux sensor source: {} devices, {} sensors",
            hardware.len(),
            builder.probes.len()
        );

        Ok(Self {
            proc_root,
            hardware,
            probes: builder.probes,
            last_cpu: None,
            closed: false,
        })
    }

    fn read_proc(&self, name: &str) -> Option<String> {
        fs::read_to_string(self.proc_root.join(name)).ok()
    }
}

impl SensorSource for LinuxSource {
    fn refresh(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::Closed);
        }

        let cpu_times = self.read_proc("stat").and_then(|s| procfs::parse_cpu_times(&s));
        let cpu_load = match (cpu_times, self.last_cpu) {
            (Some(now), Some(previous)) => now.load_since(&previous),
            _ => None,
        };
        if cpu_times.is_some() {
            self.last_cpu = cpu_times;
        }
        let mem = self.read_proc("meminfo").and_then(|s| procfs::parse_meminfo(&s));
        let now = Instant::now();

        let mut values = HashMap::with_capacity(self.probes.len());
        for (id, probe) in &mut self.probes {
            let value = match probe {
                Probe::CpuTotal => cpu_load,
                Probe::MemoryLoad => mem.map(|m| m.load()),
                Probe::MemoryUsed => mem.map(|m| m.used_kb() as f32 / KB_PER_GB),
                Probe::MemoryAvailable => mem.map(|m| m.available_kb as f32 / KB_PER_GB),
                Probe::Scaled { path, divisor } => read_attr(path)
                    .and_then(|s| sysfs::parse_int(&s))
                    .map(|v| v as f32 / *divisor),
                Probe::Energy { path, last } => {
                    let counter = read_attr(path)
                        .and_then(|s| sysfs::parse_int(&s))
                        .and_then(|v| u64::try_from(v).ok());
                    let watts = match (counter, *last) {
                        (Some(uj), Some((prev_uj, prev_at))) if uj >= prev_uj => {
                            let secs = now.duration_since(prev_at).as_secs_f64();
                            (secs > 0.0).then(|| ((uj - prev_uj) as f64 / 1e6 / secs) as f32)
                        }
                        _ => None,
                    };
                    *last = counter.map(|uj| (uj, now));
                    watts
                }
            };
            values.insert(*id, value);
        }

        for hw in &mut self.hardware {
            apply_values(hw, &values);
        }
        Ok(())
    }

    fn hardware(&self) -> &[Hardware] {
        &self.hardware
    }

    fn close(&mut self) {
        if !self.closed {
            debug!("Closing Linux sensor source");
            self.closed = true;
            self.probes.clear();
        }
    }
}

fn apply_values(hw: &mut Hardware, values: &HashMap<SensorId, Option<f32>>) {
    for sub in &mut hw.sub_hardware {
        apply_values(sub, values);
    }
    for sensor in &mut hw.sensors {
        if let Some(value) = values.get(&sensor.id) {
            sensor.value = *value;
        }
    }
}

fn discover_cpu(proc_root: &Path, sys_root: &Path, builder: &mut TreeBuilder) -> Hardware {
    let name = fs::read_to_string(proc_root.join("cpuinfo"))
        .ok()
        .and_then(|s| procfs::parse_cpu_model(&s))
        .unwrap_or_else(|| "CPU".to_string());
    let mut cpu = Hardware::new(name, HardwareType::Cpu);

    if proc_root.join("stat").exists() {
        builder.add(&mut cpu, "CPU Total", SensorType::Load, Probe::CpuTotal);
    }

    for chip in hwmon_chips(&sys_root.join("class/hwmon")) {
        match chip.name.as_str() {
            "coretemp" => {
                let input = chip.temp_input_by_label(&["Package id 0"]);
                builder.add_scaled(&mut cpu, "CPU Package", SensorType::Temperature, input, 1000.0);
            }
            "k10temp" | "zenpower" => {
                let input = chip
                    .temp_input_by_label(&["Tctl", "Tdie"])
                    .or_else(|| chip.attr("temp1_input"));
                builder.add_scaled(
                    &mut cpu,
                    "Core (Tctl/Tdie)",
                    SensorType::Temperature,
                    input,
                    1000.0,
                );
            }
            _ => {}
        }
    }

    let rapl = sys_root.join("class/powercap/intel-rapl:0");
    let energy = rapl.join("energy_uj");
    if energy.exists() && read_attr(&rapl.join("name")).as_deref() == Some("package-0") {
        builder.add(
            &mut cpu,
            "Package",
            SensorType::Power,
            Probe::Energy {
                path: energy,
                last: None,
            },
        );
    }

    cpu
}

fn discover_memory(proc_root: &Path, builder: &mut TreeBuilder) -> Result<Hardware> {
    let path = proc_root.join("meminfo");
    let content = fs::read_to_string(&path).map_err(|source| Error::Io {
        path: path.display().to_string(),
        source,
    })?;
    if procfs::parse_meminfo(&content).is_none() {
        return Err(Error::Parse {
            path: path.display().to_string(),
            reason: "missing MemTotal or MemAvailable".to_string(),
        });
    }

    let mut memory = Hardware::new("Generic Memory", HardwareType::Memory);
    builder.add(&mut memory, "Memory", SensorType::Load, Probe::MemoryLoad);
    builder.add(&mut memory, "Memory Used", SensorType::SmallData, Probe::MemoryUsed);
    builder.add(
        &mut memory,
        "Memory Available",
        SensorType::SmallData,
        Probe::MemoryAvailable,
    );
    Ok(memory)
}

fn discover_gpus(sys_root: &Path, builder: &mut TreeBuilder) -> Vec<Hardware> {
    let mut gpus = Vec::new();

    for card in sysfs::sorted_entries(&sys_root.join("class/drm")) {
        let card_name = match card.file_name().and_then(|n| n.to_str()) {
            Some(name) if sysfs::is_card_name(name) => name.to_string(),
            _ => continue,
        };
        let device = card.join("device");
        let Some(hardware_type) = read_attr(&device.join("vendor")).and_then(|v| sysfs::gpu_vendor(&v))
        else {
            continue;
        };

        let mut gpu = Hardware::new(format!("{} ({})", card_name, hardware_type), hardware_type);
        builder.add_scaled(
            &mut gpu,
            "GPU Core",
            SensorType::Load,
            Some(device.join("gpu_busy_percent")),
            1.0,
        );
        builder.add_scaled(
            &mut gpu,
            "GPU Memory Controller",
            SensorType::Load,
            Some(device.join("mem_busy_percent")),
            1.0,
        );
        builder.add_scaled(
            &mut gpu,
            "GPU Memory Used",
            SensorType::SmallData,
            Some(device.join("mem_info_vram_used")),
            BYTES_PER_MB,
        );
        builder.add_scaled(
            &mut gpu,
            "GPU Memory Total",
            SensorType::SmallData,
            Some(device.join("mem_info_vram_total")),
            BYTES_PER_MB,
        );

        for chip in hwmon_chips(&device.join("hwmon")) {
            let temp = chip
                .temp_input_by_label(&["edge"])
                .or_else(|| chip.attr("temp1_input"));
            builder.add_scaled(&mut gpu, "GPU Core", SensorType::Temperature, temp, 1000.0);
            let power = chip
                .attr("power1_average")
                .or_else(|| chip.attr("power1_input"));
            builder.add_scaled(&mut gpu, "GPU Package", SensorType::Power, power, 1e6);
        }

        gpus.push(gpu);
    }

    gpus
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enumerate;

    use tempfile::TempDir;

    /// Fake procfs and sysfs trees under one temporary directory.
    struct Fixture {
        dir: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                dir: TempDir::new().unwrap(),
            }
        }

        fn path(&self, rel: &str) -> PathBuf {
            self.dir.path().join(rel)
        }

        fn write(&self, rel: &str, content: &str) {
            let path = self.path(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
    }

    fn value_of(source: &LinuxSource, hw: HardwareType, name: &str, ty: SensorType) -> Option<f32> {
        enumerate(source.hardware())
            .into_iter()
            .find(|(t, s)| *t == hw && s.name == name && s.sensor_type == ty)
            .and_then(|(_, s)| s.value)
    }

    #[test]
    fn test_discovers_and_refreshes_fixture_tree() {
        let fx = Fixture::new();
        fx.write("proc/stat", "cpu  100 0 50 800 50 0 0 0 0 0\n");
        fx.write("proc/meminfo", "MemTotal: 1000 kB\nMemAvailable: 250 kB\n");
        fx.write("proc/cpuinfo", "model name\t: Test CPU\n");
        fx.write("sys/class/hwmon/hwmon0/name", "k10temp\n");
        fx.write("sys/class/hwmon/hwmon0/temp1_label", "Tctl\n");
        fx.write("sys/class/hwmon/hwmon0/temp1_input", "55000\n");
        fx.write("sys/class/drm/card0/device/vendor", "0x1002\n");
        fx.write("sys/class/drm/card0/device/gpu_busy_percent", "40\n");
        fx.write("sys/class/drm/card0/device/mem_info_vram_used", "1073741824\n");
        fx.write("sys/class/drm/card0/device/mem_info_vram_total", "4294967296\n");
        fx.write("sys/class/drm/card0/device/hwmon/hwmon3/name", "amdgpu\n");
        fx.write("sys/class/drm/card0/device/hwmon/hwmon3/temp1_input", "61000\n");
        fx.write("sys/class/drm/card0/device/hwmon/hwmon3/power1_average", "35000000\n");
        fx.write("sys/class/drm/card0-DP-1/status", "connected\n");

        let mut source = LinuxSource::with_roots(fx.path("proc"), fx.path("sys")).unwrap();
        assert_eq!(source.hardware().len(), 3);
        assert_eq!(source.hardware()[0].name, "Test CPU");

        source.refresh().unwrap();
        let cpu = HardwareType::Cpu;
        let gpu = HardwareType::GpuAmd;
        assert_eq!(value_of(&source, cpu, "CPU Total", SensorType::Load), None);
        assert_eq!(
            value_of(&source, cpu, "Core (Tctl/Tdie)", SensorType::Temperature),
            Some(55.0)
        );
        assert_eq!(
            value_of(&source, HardwareType::Memory, "Memory", SensorType::Load),
            Some(75.0)
        );
        assert_eq!(value_of(&source, gpu, "GPU Core", SensorType::Load), Some(40.0));
        assert_eq!(value_of(&source, gpu, "GPU Core", SensorType::Temperature), Some(61.0));
        assert_eq!(value_of(&source, gpu, "GPU Package", SensorType::Power), Some(35.0));
        assert_eq!(
            value_of(&source, gpu, "GPU Memory Used", SensorType::SmallData),
            Some(1024.0)
        );
        assert_eq!(
            value_of(&source, gpu, "GPU Memory Total", SensorType::SmallData),
            Some(4096.0)
        );

        fx.write("proc/stat", "cpu  150 0 75 875 50 0 0 0 0 0\n");
        source.refresh().unwrap();
        assert_eq!(value_of(&source, cpu, "CPU Total", SensorType::Load), Some(50.0));

        fs::remove_file(fx.path("sys/class/drm/card0/device/gpu_busy_percent")).unwrap();
        source.refresh().unwrap();
        assert_eq!(value_of(&source, gpu, "GPU Core", SensorType::Load), None);
    }

    #[test]
    fn test_missing_meminfo_fails_open() {
        let fx = Fixture::new();
        fx.write("proc/stat", "cpu  1 0 1 1 0 0 0 0 0 0\n");
        let result = LinuxSource::with_roots(fx.path("proc"), fx.path("sys"));
        assert!(matches!(result, Err(Error::Io { .. })));
    }

    #[test]
    fn test_refresh_after_close_fails() {
        let fx = Fixture::new();
        fx.write("proc/meminfo", "MemTotal: 1000 kB\nMemAvailable: 250 kB\n");
        let mut source = LinuxSource::with_roots(fx.path("proc"), fx.path("sys")).unwrap();
        source.close();
        assert!(matches!(source.refresh(), Err(Error::Closed)));
    }
}
