//! `/sys` discovery: hwmon chips, RAPL energy counters and DRM cards.

use std::fs;
use std::path::{Path, PathBuf};

use crate::HardwareType;

/// Reads a sysfs attribute as a trimmed string.
pub fn read_attr(path: &Path) -> Option<String> {
    fs::read_to_string(path).ok().map(|s| s.trim().to_string())
}

/// Parses an integer sysfs attribute (millidegrees, microwatts, bytes...).
pub fn parse_int(content: &str) -> Option<i64> {
    content.trim().parse().ok()
}

/// Maps a PCI vendor id (`0x10de`) to a GPU hardware type.
pub fn gpu_vendor(vendor: &str) -> Option<HardwareType> {
    match vendor.trim().to_ascii_lowercase().as_str() {
        "0x10de" => Some(HardwareType::GpuNvidia),
        "0x1002" => Some(HardwareType::GpuAmd),
        "0x8086" => Some(HardwareType::GpuIntel),
        _ => None,
    }
}

/// Returns true for `cardN` entries, excluding connector entries like `card0-DP-1`.
pub fn is_card_name(name: &str) -> bool {
    name.strip_prefix("card")
        .map(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(false)
}

/// Lists subdirectories of `dir` sorted by name.
pub fn sorted_entries(dir: &Path) -> Vec<PathBuf> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)
        .map(|rd| rd.flatten().map(|e| e.path()).collect())
        .unwrap_or_default();
    entries.sort();
    entries
}

/// A hwmon chip directory with its driver name.
#[derive(Debug, Clone)]
pub struct HwmonChip {
    pub name: String,
    pub path: PathBuf,
}

impl HwmonChip {
    /// Finds the `tempN_input` whose `tempN_label` matches one of `labels`.
    pub fn temp_input_by_label(&self, labels: &[&str]) -> Option<PathBuf> {
        for n in 1..=32 {
            let label = self.path.join(format!("temp{}_label", n));
            if let Some(text) = read_attr(&label) {
                if labels.iter().any(|l| l.eq_ignore_ascii_case(&text)) {
                    return Some(self.path.join(format!("temp{}_input", n)));
                }
            }
        }
        None
    }

    /// Path to an attribute if it exists.
    pub fn attr(&self, name: &str) -> Option<PathBuf> {
        let path = self.path.join(name);
        path.exists().then_some(path)
    }
}

/// Lists hwmon chips below a directory (`/sys/class/hwmon` or a device's `hwmon`).
pub fn hwmon_chips(dir: &Path) -> Vec<HwmonChip> {
    sorted_entries(dir)
        .into_iter()
        .filter_map(|path| {
            let name = read_attr(&path.join("name"))?;
            Some(HwmonChip { name, path })
        })
        .collect()
}
