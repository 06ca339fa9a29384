//! In-process camera simulator.
//!
//! Behaves like a UVC device where it matters to the frame source: opening a
//! device that is already open fails as busy, unsupported modes are silently
//! substituted with the nearest supported one, and reads can be made to fail
//! periodically. Devices can also be unplugged at runtime, and mode requests
//! refused outright.

use crate::errors::CameraError;
use crate::platform::{CaptureBackend, DeviceHandle, DeviceQuery};
use crate::testing::synthetic_data::synthetic_video_frame;
use crate::types::{DeviceDescriptor, DeviceId, Frame, Resolution};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

const FALLBACK_MODE: Resolution = Resolution::new(640, 480);

#[derive(Debug, Clone)]
pub struct SyntheticDevice {
    pub id: DeviceId,
    pub card: String,
    /// Supported modes; the first one is the power-on default.
    pub modes: Vec<Resolution>,
}

impl SyntheticDevice {
    pub fn new(id: &str, card: &str, modes: &[(u32, u32)]) -> Self {
        Self {
            id: id.parse().unwrap_or_default(),
            card: card.to_string(),
            modes: modes.iter().map(|&(w, h)| Resolution::new(w, h)).collect(),
        }
    }

    fn default_mode(&self) -> Resolution {
        self.modes.first().copied().unwrap_or(FALLBACK_MODE)
    }
}

struct Inner {
    devices: Vec<SyntheticDevice>,
    busy: Mutex<HashSet<String>>,
    unplugged: Mutex<HashSet<String>>,
    refuse_modes: AtomicBool,
    total_opens: AtomicUsize,
    read_failure_every: Option<u64>,
    frame_delay: Duration,
}

impl Inner {
    fn busy(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.busy.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn unplugged(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.unplugged.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Clone)]
pub struct SyntheticBackend {
    inner: Arc<Inner>,
}

impl SyntheticBackend {
    pub fn new(devices: Vec<SyntheticDevice>) -> Self {
        Self::build(devices, None, Duration::ZERO)
    }

    /// Two cameras: `/dev/video0` (640x480, 1280x720) and `/dev/video2`
    /// (320x240, 640x480).
    pub fn demo() -> Self {
        Self::new(vec![
            SyntheticDevice::new("/dev/video0", "Synthetic HD Camera", &[(640, 480), (1280, 720)]),
            SyntheticDevice::new("/dev/video2", "Synthetic VGA Camera", &[(320, 240), (640, 480)]),
        ])
    }

    /// Fail every `n`th read on every handle.
    pub fn with_read_failures(self, n: u64) -> Self {
        let (devices, _, delay) = self.into_parts();
        Self::build(devices, Some(n.max(1)), delay)
    }

    /// Block each read for `delay`, like a device pacing its frame rate.
    pub fn with_frame_delay(self, delay: Duration) -> Self {
        let (devices, failures, _) = self.into_parts();
        Self::build(devices, failures, delay)
    }

    fn build(devices: Vec<SyntheticDevice>, read_failure_every: Option<u64>, frame_delay: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                devices,
                busy: Mutex::new(HashSet::new()),
                unplugged: Mutex::new(HashSet::new()),
                refuse_modes: AtomicBool::new(false),
                total_opens: AtomicUsize::new(0),
                read_failure_every,
                frame_delay,
            }),
        }
    }

    fn into_parts(self) -> (Vec<SyntheticDevice>, Option<u64>, Duration) {
        (
            self.inner.devices.clone(),
            self.inner.read_failure_every,
            self.inner.frame_delay,
        )
    }

    /// Make `device` disappear: opens fail and open handles stop delivering
    /// frames until `replug`.
    pub fn unplug(&self, device: &DeviceId) {
        self.inner.unplugged().insert(device.device_path());
    }

    pub fn replug(&self, device: &DeviceId) {
        self.inner.unplugged().remove(&device.device_path());
    }

    /// While set, every `set_resolution` on any handle fails and leaves the
    /// current mode in place.
    pub fn refuse_mode_changes(&self, refuse: bool) {
        self.inner.refuse_modes.store(refuse, Ordering::SeqCst);
    }

    /// Number of handles currently holding a device.
    pub fn open_handles(&self) -> usize {
        self.inner.busy().len()
    }

    pub fn is_open(&self, device: &DeviceId) -> bool {
        self.inner.busy().contains(&device.device_path())
    }

    /// Successful opens since construction.
    pub fn total_opens(&self) -> usize {
        self.inner.total_opens.load(Ordering::SeqCst)
    }

    fn find(&self, device: &DeviceId) -> Option<&SyntheticDevice> {
        let path = device.device_path();
        self.inner.devices.iter().find(|d| d.id.device_path() == path)
    }
}

impl CaptureBackend for SyntheticBackend {
    fn open(&self, device: &DeviceId) -> Result<Box<dyn DeviceHandle>, CameraError> {
        let entry = self
            .find(device)
            .ok_or_else(|| CameraError::DeviceUnavailable(format!("No such device: {}", device)))?;

        let key = device.device_path();
        if self.inner.unplugged().contains(&key) {
            return Err(CameraError::DeviceUnavailable(format!("Device unplugged: {}", device)));
        }
        if !self.inner.busy().insert(key.clone()) {
            return Err(CameraError::DeviceUnavailable(format!("Device busy: {}", device)));
        }
        self.inner.total_opens.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(SyntheticHandle {
            inner: Arc::clone(&self.inner),
            key,
            modes: entry.modes.clone(),
            mode: entry.default_mode(),
            frame_number: 0,
            released: false,
        }))
    }
}

impl DeviceQuery for SyntheticBackend {
    fn list_devices(&self) -> Vec<DeviceDescriptor> {
        self.inner
            .devices
            .iter()
            .map(|d| DeviceDescriptor::new(&d.card, &d.id.device_path()))
            .collect()
    }

    fn supported_resolutions(&self, device: &DeviceId) -> Vec<Resolution> {
        self.find(device).map(|d| d.modes.clone()).unwrap_or_default()
    }
}

struct SyntheticHandle {
    inner: Arc<Inner>,
    key: String,
    modes: Vec<Resolution>,
    mode: Resolution,
    frame_number: u64,
    released: bool,
}

impl DeviceHandle for SyntheticHandle {
    fn read_frame(&mut self) -> Result<Frame, CameraError> {
        if self.released {
            return Err(CameraError::TransientReadFailure("device released".to_string()));
        }
        if self.inner.unplugged().contains(&self.key) {
            return Err(CameraError::TransientReadFailure(format!(
                "{} unplugged",
                self.key
            )));
        }
        self.frame_number += 1;
        if !self.inner.frame_delay.is_zero() {
            std::thread::sleep(self.inner.frame_delay);
        }
        if let Some(n) = self.inner.read_failure_every {
            if self.frame_number % n == 0 {
                return Err(CameraError::TransientReadFailure(format!(
                    "simulated read failure on frame {}",
                    self.frame_number
                )));
            }
        }
        Ok(synthetic_video_frame(
            self.frame_number,
            self.mode.width,
            self.mode.height,
        ))
    }

    fn resolution(&self) -> Resolution {
        self.mode
    }

    fn set_resolution(&mut self, requested: Resolution) -> Result<(), CameraError> {
        if self.inner.refuse_modes.load(Ordering::SeqCst) {
            return Err(CameraError::reconfiguration(format!(
                "{} refused mode {}",
                self.key, requested
            )));
        }
        let nearest = self.modes.iter().copied().min_by_key(|m| {
            m.width.abs_diff(requested.width) as u64 + m.height.abs_diff(requested.height) as u64
        });
        if let Some(mode) = nearest {
            self.mode = mode;
        }
        Ok(())
    }

    fn release(&mut self) {
        if !self.released {
            self.inner.busy().remove(&self.key);
            self.released = true;
        }
    }
}

impl Drop for SyntheticHandle {
    fn drop(&mut self) {
        self.release();
    }
}
