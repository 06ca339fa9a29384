//! CrabStream: webcam MJPEG streaming over HTTP
//!
//! The core is [`FrameSource`], a latest-frame buffer over one camera device.
//! A dedicated acquisition thread keeps the newest decoded frame in a shared
//! slot; any number of readers take copies or JPEG encodings of it without
//! touching the device. The [`http`] module exposes the source as an MJPEG
//! stream plus a small JSON control API.
//!
//! # Features
//! - V4L2 capture through nokhwa, device enumeration through `v4l2-ctl`
//! - Resolution changes and device switching with automatic fallback
//! - Synthetic backend for running without hardware
//!
//! # Usage
//! ```rust,no_run
//! use crabstream::{FrameSource, SourceOptions};
//!
//! let source = FrameSource::v4l2(SourceOptions::default());
//! source.start().expect("camera available");
//! if let Some(jpeg) = source.get_jpeg(80) {
//!     println!("{} bytes", jpeg.len());
//! }
//! source.stop();
//! ```
pub mod codec;
pub mod config;
pub mod errors;
pub mod frame_source;
pub mod http;
pub mod platform;
pub mod storage;
pub mod types;

// Testing utilities - synthetic backend for offline testing
pub mod testing;

// Re-exports for convenience
pub use config::StreamConfig;
pub use errors::CameraError;
pub use frame_source::{FrameSource, SourceOptions};
pub use platform::{CaptureBackend, DeviceHandle, DeviceQuery};
pub use storage::CaptureStore;
pub use types::{DeviceDescriptor, DeviceId, Frame, Resolution, RunState, SourceStatus};

/// Initialize logging for the camera system
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "crabstream=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get crate information
pub fn get_info() -> CrateInfo {
    CrateInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
    }
}

/// Crate information structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrateInfo {
    pub name: String,
    pub version: String,
    pub description: String,
}
