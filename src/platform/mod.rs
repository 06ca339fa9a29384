//! Camera and device-query seams.
//!
//! `CaptureBackend` opens devices, `DeviceHandle` owns one open device, and
//! `DeviceQuery` answers enumeration questions without opening anything.
//! Handles are opened, read and released on the acquisition thread, so
//! `DeviceHandle` does not need to be `Send`.

pub mod linux;
pub mod v4l2_ctl;

use crate::errors::CameraError;
use crate::types::{DeviceDescriptor, DeviceId, Frame, Resolution};

pub use linux::NokhwaBackend;
pub use v4l2_ctl::V4l2Ctl;

pub trait CaptureBackend: Send + Sync {
    /// Open the device with its default settings.
    fn open(&self, device: &DeviceId) -> Result<Box<dyn DeviceHandle>, CameraError>;
}

pub trait DeviceHandle {
    /// Read and decode one frame. Failures are transient from the caller's view.
    fn read_frame(&mut self) -> Result<Frame, CameraError>;

    /// Currently applied capture size, as reported by the device.
    fn resolution(&self) -> Resolution;

    /// Request a capture size. The device may substitute a nearby mode; read
    /// `resolution()` afterwards to learn what was applied.
    fn set_resolution(&mut self, requested: Resolution) -> Result<(), CameraError>;

    /// Give the device back to the OS. Must be idempotent.
    fn release(&mut self);
}

pub trait DeviceQuery: Send + Sync {
    /// Capture-capable devices. Best effort: failures yield an empty list.
    fn list_devices(&self) -> Vec<DeviceDescriptor>;

    /// Discrete capture sizes advertised by `device`, de-duplicated.
    fn supported_resolutions(&self, device: &DeviceId) -> Vec<Resolution>;
}
