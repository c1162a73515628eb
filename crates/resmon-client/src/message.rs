//! Push channel wire format.
//!
//! Every server frame is a JSON text frame of the form
//! `{"type":"Receive","data":{...}}`.

use serde::{Deserialize, Serialize};

use crate::{Result, TelemetrySnapshot};

/// Messages pushed from the daemon to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerMessage {
    /// A new telemetry snapshot.
    Receive(TelemetrySnapshot),
}

/// Encodes a message as a text frame.
pub fn encode(message: &ServerMessage) -> Result<String> {
    Ok(serde_json::to_string(message)?)
}

/// Decodes a text frame.
pub fn decode(frame: &str) -> Result<ServerMessage> {
    Ok(serde_json::from_str(frame)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receive_frame_shape() {
        let snapshot = TelemetrySnapshot {
            memory_load_physical: 42.0,
            ..Default::default()
        };
        let frame = encode(&ServerMessage::Receive(snapshot)).unwrap();
        let json: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(json["type"], "Receive");
        assert_eq!(json["data"]["memoryLoadPhysical"], 42.0);
    }

    #[test]
    fn test_decode_partial_payload() {
        let msg = decode(r#"{"type":"Receive","data":{"cpuLoadTotal":7.5}}"#).unwrap();
        let ServerMessage::Receive(snapshot) = msg;
        assert_eq!(snapshot.cpu_load_total, 7.5);
        assert_eq!(snapshot.gpu_power_package, 0.0);
    }

    #[test]
    fn test_decode_rejects_unknown_type() {
        assert!(decode(r#"{"type":"Ping","data":{}}"#).is_err());
        assert!(decode("not json").is_err());
    }
}
