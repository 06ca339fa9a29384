//! Core value types shared by the frame source, the platform adapters and the
//! HTTP layer.

use crate::errors::CameraError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const DEV_VIDEO_PREFIX: &str = "/dev/video";

/// Identifies one OS camera device, either by index or by device path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum DeviceId {
    Index(u32),
    Path(String),
}

impl DeviceId {
    /// Numeric camera index, if the identifier names one.
    ///
    /// `/dev/videoN` resolves to `N`, which is what the capture library expects.
    pub fn index(&self) -> Option<u32> {
        match self {
            DeviceId::Index(i) => Some(*i),
            DeviceId::Path(p) => p.strip_prefix(DEV_VIDEO_PREFIX)?.parse().ok(),
        }
    }

    /// Device node path handed to the `v4l2-ctl` utility.
    pub fn device_path(&self) -> String {
        match self {
            DeviceId::Index(i) => format!("{}{}", DEV_VIDEO_PREFIX, i),
            DeviceId::Path(p) => p.clone(),
        }
    }
}

impl Default for DeviceId {
    fn default() -> Self {
        DeviceId::Path(format!("{}0", DEV_VIDEO_PREFIX))
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceId::Index(i) => write!(f, "{}", i),
            DeviceId::Path(p) => write!(f, "{}", p),
        }
    }
}

impl FromStr for DeviceId {
    type Err = CameraError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(CameraError::InvalidArgument(
                "device identifier must not be empty".to_string(),
            ));
        }
        if s.bytes().all(|b| b.is_ascii_digit()) {
            return s
                .parse()
                .map(DeviceId::Index)
                .map_err(|e| CameraError::InvalidArgument(format!("bad device index {s}: {e}")));
        }
        Ok(DeviceId::Path(s.to_string()))
    }
}

impl From<DeviceId> for String {
    fn from(id: DeviceId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for DeviceId {
    type Error = CameraError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Capture size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True when both axes differ from `other` by at most `tolerance` pixels.
    pub fn within(&self, other: &Resolution, tolerance: u32) -> bool {
        self.width.abs_diff(other.width) <= tolerance
            && self.height.abs_diff(other.height) <= tolerance
    }

    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = CameraError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(|| CameraError::InvalidArgument(format!("resolution must be WxH: {s}")))?;
        let width = w
            .trim()
            .parse()
            .map_err(|_| CameraError::InvalidArgument(format!("bad width in {s}")))?;
        let height = h
            .trim()
            .parse()
            .map_err(|_| CameraError::InvalidArgument(format!("bad height in {s}")))?;
        if width == 0 || height == 0 {
            return Err(CameraError::InvalidArgument(format!(
                "resolution must be non-zero: {s}"
            )));
        }
        Ok(Resolution { width, height })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelLayout {
    Rgb8,
}

impl PixelLayout {
    pub fn channels(&self) -> usize {
        match self {
            PixelLayout::Rgb8 => 3,
        }
    }
}

/// One decoded camera frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub layout: PixelLayout,
    pub sequence: u64,
    pub captured_at: DateTime<Utc>,
}

impl Frame {
    pub fn rgb(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
            layout: PixelLayout::Rgb8,
            sequence: 0,
            captured_at: Utc::now(),
        }
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    /// Buffer length implied by the dimensions and layout.
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.layout.channels()
    }

    pub fn is_complete(&self) -> bool {
        !self.data.is_empty() && self.data.len() == self.expected_len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Stopped,
    Running,
}

/// A capture-capable device reported by enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub name: String,
    pub path: String,
}

impl DeviceDescriptor {
    pub fn new(card: &str, path: &str) -> Self {
        Self {
            name: format!("{} ({})", card, path),
            path: path.to_string(),
        }
    }
}

/// Point-in-time view of a frame source, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceStatus {
    pub state: RunState,
    pub device: String,
    pub resolution: Option<Resolution>,
    pub latest_sequence: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_id_parsing() {
        assert_eq!("2".parse::<DeviceId>().unwrap(), DeviceId::Index(2));
        assert_eq!(
            "/dev/video1".parse::<DeviceId>().unwrap(),
            DeviceId::Path("/dev/video1".to_string())
        );
        assert!("   ".parse::<DeviceId>().is_err());
    }

    #[test]
    fn test_device_id_index_and_path() {
        assert_eq!(DeviceId::Path("/dev/video3".to_string()).index(), Some(3));
        assert_eq!(DeviceId::Path("/dev/v4l/by-id/cam".to_string()).index(), None);
        assert_eq!(DeviceId::Index(4).device_path(), "/dev/video4");
        assert_eq!(DeviceId::default().to_string(), "/dev/video0");
    }

    #[test]
    fn test_device_id_serde_as_string() {
        let json = serde_json::to_string(&DeviceId::Index(1)).unwrap();
        assert_eq!(json, "\"1\"");
        let back: DeviceId = serde_json::from_str("\"/dev/video2\"").unwrap();
        assert_eq!(back.index(), Some(2));
    }

    #[test]
    fn test_resolution_parse_and_display() {
        let r: Resolution = "1280x720".parse().unwrap();
        assert_eq!(r, Resolution::new(1280, 720));
        assert_eq!(r.to_string(), "1280x720");
        assert!("1280".parse::<Resolution>().is_err());
        assert!("0x720".parse::<Resolution>().is_err());
    }

    #[test]
    fn test_resolution_within_tolerance() {
        let requested = Resolution::new(1920, 1080);
        assert!(requested.within(&Resolution::new(1921, 1079), 1));
        assert!(!requested.within(&Resolution::new(1922, 1080), 1));
        assert!(!requested.within(&Resolution::new(1280, 720), 1));
    }

    #[test]
    fn test_frame_completeness() {
        let frame = Frame::rgb(vec![0; 4 * 2 * 3], 4, 2);
        assert!(frame.is_complete());
        let torn = Frame::rgb(vec![0; 10], 4, 2);
        assert!(!torn.is_complete());
    }

    #[test]
    fn test_descriptor_name_format() {
        let d = DeviceDescriptor::new("HD Webcam", "/dev/video0");
        assert_eq!(d.name, "HD Webcam (/dev/video0)");
        assert_eq!(d.path, "/dev/video0");
    }
}
