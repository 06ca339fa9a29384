//! Testing utilities for CrabStream
//!
//! A synthetic camera backend and frame generator for running the frame
//! source and the HTTP layer without hardware.

pub mod backend;
pub mod synthetic_data;

pub use backend::{SyntheticBackend, SyntheticDevice};
pub use synthetic_data::synthetic_video_frame;
