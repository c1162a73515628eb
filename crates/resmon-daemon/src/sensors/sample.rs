//! Snapshot assembly from resolved sensors.

use resmon_client::TelemetrySnapshot;
use resmon_hw::SensorSource;

use super::{Binding, CollectError, ResolvedSensors};

/// GPU memory usage in percent; 0 unless both values are present and total is positive.
fn gpu_memory_load(used: Option<f32>, total: Option<f32>) -> f32 {
    match (used, total) {
        (Some(used), Some(total)) if total > 0.0 => used / total * 100.0,
        _ => 0.0,
    }
}

/// Reads every bound sensor and builds one snapshot.
///
/// Unbound metrics and sensors without a current reading are reported as 0.
/// Fails if a bound sensor can no longer be read.
pub fn build_snapshot<S: SensorSource + ?Sized>(
    source: &S,
    resolved: &ResolvedSensors,
) -> Result<TelemetrySnapshot, CollectError> {
    let mut snapshot = TelemetrySnapshot::default();

    for (metric, binding) in resolved.iter() {
        let value = match binding {
            Binding::Direct(handle) => handle.read(source)?.unwrap_or(0.0),
            Binding::Ratio { used, total } => {
                gpu_memory_load(used.read(source)?, total.read(source)?)
            }
        };
        *metric.field_mut(&mut snapshot) = value;
    }

    Ok(snapshot)
}
