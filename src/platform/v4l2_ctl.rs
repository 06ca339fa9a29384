//! Device metadata through the `v4l2-ctl` utility.
//!
//! Enumeration is best-effort: any failure to run the tool or to parse its
//! output is logged and yields an empty result.

use crate::platform::DeviceQuery;
use crate::types::{DeviceDescriptor, DeviceId, Resolution};
use regex::Regex;
use std::collections::HashSet;
use std::path::PathBuf;
use std::process::Command;

/// Device capability mask reported by capture-only UVC nodes.
pub const VIDEO_CAPTURE_CAPS: &str = "0x04200001";

lazy_static::lazy_static! {
    static ref VIDEO_CAPS_PATTERN: Regex =
        Regex::new(r"Device\s+Caps\s*:\s*0x04200001").expect("static regex");
    static ref DISCRETE_SIZE_PATTERN: Regex =
        Regex::new(r"Size:\s*Discrete\s+(\d+)x(\d+)").expect("static regex");
}

#[derive(Debug, Clone)]
pub struct V4l2Ctl {
    program: PathBuf,
}

impl Default for V4l2Ctl {
    fn default() -> Self {
        Self::new("v4l2-ctl")
    }
}

impl V4l2Ctl {
    /// Use `program` instead of the `v4l2-ctl` found on `PATH`.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn run(&self, args: &[&str]) -> Option<String> {
        match Command::new(&self.program).args(args).output() {
            Ok(output) if output.status.success() => {
                Some(String::from_utf8_lossy(&output.stdout).into_owned())
            }
            Ok(output) => {
                log::debug!(
                    "{} {:?} exited with {}",
                    self.program.display(),
                    args,
                    output.status
                );
                None
            }
            Err(e) => {
                log::error!("Failed to run {}: {}", self.program.display(), e);
                None
            }
        }
    }

    fn reports_video_capture(&self, path: &str) -> bool {
        self.run(&["-d", path, "-D"])
            .map(|caps| has_video_capture_caps(&caps))
            .unwrap_or(false)
    }
}

impl DeviceQuery for V4l2Ctl {
    fn list_devices(&self) -> Vec<DeviceDescriptor> {
        let Some(listing) = self.run(&["--list-devices"]) else {
            log::error!("Failed to list video devices");
            return Vec::new();
        };

        parse_device_list(&listing)
            .into_iter()
            .filter(|(_, path)| self.reports_video_capture(path))
            .map(|(card, path)| DeviceDescriptor::new(&card, &path))
            .collect()
    }

    fn supported_resolutions(&self, device: &DeviceId) -> Vec<Resolution> {
        let path = device.device_path();
        match self.run(&["-d", &path, "--list-formats-ext"]) {
            Some(formats) => parse_discrete_sizes(&formats),
            None => {
                log::warn!("Failed to query formats for {}", path);
                Vec::new()
            }
        }
    }
}

/// Split `v4l2-ctl --list-devices` output into `(card name, device path)` pairs.
///
/// A header line contains `:` but not `dev`; every `/dev/video` line below it
/// belongs to that card.
pub fn parse_device_list(listing: &str) -> Vec<(String, String)> {
    let mut devices = Vec::new();
    let mut current: Option<String> = None;

    for line in listing.lines() {
        if line.contains(':') && !line.contains("dev") {
            current = line.split(':').next().map(|s| s.trim().to_string());
        } else if line.contains("/dev/video") {
            let card = current.clone().unwrap_or_default();
            devices.push((card, line.trim().to_string()));
        }
    }

    devices
}

pub fn has_video_capture_caps(report: &str) -> bool {
    VIDEO_CAPS_PATTERN.is_match(report)
}

/// Discrete sizes from `--list-formats-ext`, first occurrence order kept.
pub fn parse_discrete_sizes(formats: &str) -> Vec<Resolution> {
    let mut seen = HashSet::new();
    DISCRETE_SIZE_PATTERN
        .captures_iter(formats)
        .filter_map(|caps| {
            let width = caps[1].parse().ok()?;
            let height = caps[2].parse().ok()?;
            Some(Resolution::new(width, height))
        })
        .filter(|r| seen.insert(*r))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIST_DEVICES: &str = "\
HD Pro Webcam C920 (usb-0000:00:14.0-1):
\t/dev/video0
\t/dev/video1
\t/dev/media0

Integrated Camera: Integrated C (usb-0000:00:14.0-8):
\t/dev/video2
\t/dev/video3
";

    #[test]
    fn test_parse_device_list_groups_by_card() {
        let devices = parse_device_list(LIST_DEVICES);
        assert_eq!(
            devices,
            vec![
                ("HD Pro Webcam C920 (usb-0000".to_string(), "/dev/video0".to_string()),
                ("HD Pro Webcam C920 (usb-0000".to_string(), "/dev/video1".to_string()),
                ("Integrated Camera".to_string(), "/dev/video2".to_string()),
                ("Integrated Camera".to_string(), "/dev/video3".to_string()),
            ]
        );
    }

    #[test]
    fn test_media_nodes_are_skipped() {
        let devices = parse_device_list(LIST_DEVICES);
        assert!(devices.iter().all(|(_, p)| p.starts_with("/dev/video")));
    }

    #[test]
    fn test_capability_match_tolerates_spacing() {
        assert!(has_video_capture_caps("\tDevice Caps      : 0x04200001\n"));
        assert!(has_video_capture_caps("Device  Caps:0x04200001"));
        assert!(!has_video_capture_caps("\tDevice Caps      : 0x04a00000\n"));
        assert!(!has_video_capture_caps(""));
    }

    #[test]
    fn test_discrete_sizes_deduplicated() {
        let formats = "\
ioctl: VIDIOC_ENUM_FMT
\tType: Video Capture

\t[0]: 'MJPG' (Motion-JPEG, compressed)
\t\tSize: Discrete 1280x720
\t\t\tInterval: Discrete 0.033s (30.000 fps)
\t\tSize: Discrete 640x480
\t[1]: 'YUYV' (YUYV 4:2:2)
\t\tSize: Discrete 640x480
\t\tSize: Discrete 320x240
\t\tSize: Stepwise 16x16 - 1920x1080
";
        assert_eq!(
            parse_discrete_sizes(formats),
            vec![
                Resolution::new(1280, 720),
                Resolution::new(640, 480),
                Resolution::new(320, 240),
            ]
        );
    }

    #[test]
    fn test_missing_program_yields_empty() {
        let ctl = V4l2Ctl::new("/nonexistent/v4l2-ctl");
        assert!(ctl.list_devices().is_empty());
        assert!(ctl.supported_resolutions(&DeviceId::Index(0)).is_empty());
    }
}
