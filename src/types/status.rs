//! JSON payloads returned by the proxy's status and settings endpoints

use serde::{Deserialize, Serialize};

/// Response of the `status` endpoint, polled every 2 seconds while a stream
/// session is open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotStatus {
    /// Frames per second the camera is currently producing, if reported
    #[serde(default)]
    pub fps: Option<f64>,

    /// Whether the device believes a stream is active
    #[serde(default)]
    pub streaming: bool,
}

/// Current camera configuration as reported by the `camera/settings`
/// endpoint.
///
/// `resolution` is a device-defined frame-size name (e.g. `VGA`, `SVGA`);
/// `quality` is the JPEG quality knob; `led` is the illumination brightness
/// in percent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraSettings {
    #[serde(default)]
    pub resolution: String,

    #[serde(default)]
    pub quality: u8,

    #[serde(default)]
    pub led: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_with_missing_fields() {
        let status: RobotStatus = serde_json::from_str("{}").unwrap();
        assert_eq!(status.fps, None);
        assert!(!status.streaming);

        let status: RobotStatus = serde_json::from_str(r#"{"fps": 24.5, "streaming": true}"#).unwrap();
        assert_eq!(status.fps, Some(24.5));
        assert!(status.streaming);
    }

    #[test]
    fn settings_parse() {
        let settings: CameraSettings =
            serde_json::from_str(r#"{"resolution": "VGA", "quality": 12, "led": 40}"#).unwrap();
        assert_eq!(settings.resolution, "VGA");
        assert_eq!(settings.quality, 12);
        assert_eq!(settings.led, 40);
    }
}
