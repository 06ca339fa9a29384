//! Capture directory for stills written on request.

use crate::errors::CameraError;
use chrono::{DateTime, Local};
use std::fs;
use std::path::{Path, PathBuf};

const FILENAME_FORMAT: &str = "capture_%Y%m%d_%H%M%S.jpg";

#[derive(Debug, Clone)]
pub struct CaptureStore {
    dir: PathBuf,
}

impl CaptureStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the directory if absent.
    pub fn ensure_dir(&self) -> Result<(), CameraError> {
        fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    /// `capture_<YYYYMMDD_HHMMSS>.jpg` for the given local time.
    pub fn filename_at(time: DateTime<Local>) -> String {
        time.format(FILENAME_FORMAT).to_string()
    }

    /// Path for a capture taken now. Creates the directory first.
    pub fn next_path(&self) -> Result<(String, PathBuf), CameraError> {
        self.ensure_dir()?;
        let filename = Self::filename_at(Local::now());
        let path = self.dir.join(&filename);
        Ok((filename, path))
    }
}
