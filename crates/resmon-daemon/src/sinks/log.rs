//! Sink writing each snapshot as one structured log event.

use futures::future::BoxFuture;
use futures::FutureExt;
use resmon_client::TelemetrySnapshot;
use tracing::info;

use super::{Sink, SinkError};

/// Sink writing every snapshot as one structured info event.
pub struct LogSink;

fn one_decimal(value: f32) -> f64 {
    (f64::from(value) * 10.0).round() / 10.0
}

impl Sink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    fn consume<'a>(
        &'a self,
        snapshot: &'a TelemetrySnapshot,
    ) -> BoxFuture<'a, Result<(), SinkError>> {
        info!(
            cpu_load = one_decimal(snapshot.cpu_load_total),
            cpu_temp = one_decimal(snapshot.cpu_temperature_package),
            cpu_power = one_decimal(snapshot.cpu_power_package),
            gpu_load = one_decimal(snapshot.gpu_load_core),
            gpu_mem_ctrl = one_decimal(snapshot.gpu_load_memory),
            gpu_temp = one_decimal(snapshot.gpu_temperature_core),
            gpu_power = one_decimal(snapshot.gpu_power_package),
            gpu_mem = one_decimal(snapshot.gpu_memory_load),
            mem_load = one_decimal(snapshot.memory_load_physical),
            "Telemetry sample"
        );
        async { Ok(()) }.boxed()
    }
}
