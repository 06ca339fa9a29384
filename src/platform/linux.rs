use crate::errors::CameraError;
use crate::platform::{CaptureBackend, DeviceHandle};
use crate::types::{DeviceId, Frame, Resolution};
use nokhwa::{
    pixel_format::RgbFormat,
    utils::{CameraIndex, RequestedFormat, RequestedFormatType},
    Camera,
};

/// Opens V4L2 cameras through nokhwa.
#[derive(Debug, Default, Clone, Copy)]
pub struct NokhwaBackend;

impl NokhwaBackend {
    pub fn new() -> Self {
        Self
    }
}

fn camera_index(device: &DeviceId) -> CameraIndex {
    match device.index() {
        Some(i) => CameraIndex::Index(i),
        None => CameraIndex::String(device.device_path()),
    }
}

impl CaptureBackend for NokhwaBackend {
    fn open(&self, device: &DeviceId) -> Result<Box<dyn DeviceHandle>, CameraError> {
        let requested =
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);

        let camera = Camera::new(camera_index(device), requested).map_err(|e| {
            CameraError::DeviceUnavailable(format!("Failed to open camera {}: {}", device, e))
        })?;

        let mut handle = NokhwaHandle {
            camera,
            device: device.clone(),
            stream_open: false,
        };
        // On error `handle` drops here, which releases the device.
        handle.open_stream()?;

        log::debug!(
            "Opened camera {} at {}",
            device,
            handle.resolution()
        );
        Ok(Box::new(handle))
    }
}

/// One open nokhwa camera.
pub struct NokhwaHandle {
    camera: Camera,
    device: DeviceId,
    stream_open: bool,
}

impl NokhwaHandle {
    fn open_stream(&mut self) -> Result<(), CameraError> {
        self.camera.open_stream().map_err(|e| {
            CameraError::DeviceUnavailable(format!(
                "Failed to start stream on {}: {}",
                self.device, e
            ))
        })?;
        self.stream_open = true;
        Ok(())
    }
}

impl DeviceHandle for NokhwaHandle {
    fn read_frame(&mut self) -> Result<Frame, CameraError> {
        let buffer = self
            .camera
            .frame()
            .map_err(|e| CameraError::TransientReadFailure(format!("Failed to capture frame: {}", e)))?;

        let rgb = buffer
            .decode_image::<RgbFormat>()
            .map_err(|e| CameraError::TransientReadFailure(format!("Failed to decode frame: {}", e)))?;

        let (width, height) = (rgb.width(), rgb.height());
        Ok(Frame::rgb(rgb.into_raw(), width, height))
    }

    fn resolution(&self) -> Resolution {
        let res = self.camera.resolution();
        Resolution::new(res.width(), res.height())
    }

    fn set_resolution(&mut self, requested: Resolution) -> Result<(), CameraError> {
        self.camera
            .set_resolution(nokhwa::utils::Resolution::new(
                requested.width,
                requested.height,
            ))
            .map_err(|e| {
                CameraError::reconfiguration(format!(
                    "Camera {} rejected {}: {}",
                    self.device, requested, e
                ))
            })
    }

    fn release(&mut self) {
        if !self.stream_open {
            return;
        }
        if let Err(e) = self.camera.stop_stream() {
            log::warn!("Failed to stop stream on {}: {}", self.device, e);
        }
        self.stream_open = false;
        log::debug!("Released camera {}", self.device);
    }
}

impl Drop for NokhwaHandle {
    fn drop(&mut self) {
        self.release();
    }
}
