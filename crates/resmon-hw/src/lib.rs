//! resmon Hardware Library
//!
//! Exposes hardware telemetry as a tree of devices and sensors behind the
//! [`SensorSource`] contract, with a Linux backend reading sysfs and procfs.

pub mod error;
pub mod linux;
pub mod source;

pub use error::{Error, Result};
pub use linux::LinuxSource;
pub use source::{enumerate, Hardware, HardwareType, Sensor, SensorId, SensorSource, SensorType};
