//! Latest-frame buffer over one camera device.
//!
//! A `FrameSource` owns at most one open device. A dedicated acquisition
//! thread opens the device, negotiates the capture mode, and then keeps
//! replacing a single shared slot with the newest decoded frame. Readers clone
//! the slot's `Arc` under a short lock and copy the pixels afterwards, so they
//! never block on device I/O and never observe a partially written frame.
//!
//! Two locks are involved:
//! - the frame lock, held only to swap or clone the slot;
//! - the control lock, held for the whole of `start`, `stop`,
//!   `set_resolution` and `switch_device`, so reconfigurations never
//!   interleave.
//!
//! The device handle lives and dies on the acquisition thread. Once `stop`
//! has joined that thread the device has been released.

use crate::codec;
use crate::errors::CameraError;
use crate::platform::{CaptureBackend, DeviceHandle, DeviceQuery, NokhwaBackend, V4l2Ctl};
use crate::types::{DeviceDescriptor, DeviceId, Frame, Resolution, RunState, SourceStatus};
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub use crate::codec::DEFAULT_JPEG_QUALITY;

pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(10);
pub const DEFAULT_RESOLUTION_TOLERANCE: u32 = 1;

#[derive(Debug, Clone)]
pub struct SourceOptions {
    pub device: DeviceId,
    /// Mode requested on open; `None` keeps the device default.
    pub resolution: Option<Resolution>,
    /// Sleep between loop iterations.
    pub frame_interval: Duration,
    /// Largest per-axis deviation `set_resolution` accepts.
    pub resolution_tolerance: u32,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            device: DeviceId::default(),
            resolution: None,
            frame_interval: DEFAULT_FRAME_INTERVAL,
            resolution_tolerance: DEFAULT_RESOLUTION_TOLERANCE,
        }
    }
}

impl SourceOptions {
    pub fn new(device: DeviceId) -> Self {
        Self {
            device,
            ..Self::default()
        }
    }

    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = Some(resolution);
        self
    }

    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    pub fn with_tolerance(mut self, pixels: u32) -> Self {
        self.resolution_tolerance = pixels;
        self
    }
}

/// State shared with the acquisition thread.
struct Shared {
    latest: Mutex<Option<Arc<Frame>>>,
    running: AtomicBool,
    sequence: AtomicU64,
}

impl Shared {
    fn slot(&self) -> MutexGuard<'_, Option<Arc<Frame>>> {
        // The slot only ever holds a complete frame or nothing.
        self.latest.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, frame: Frame) {
        let frame = Arc::new(frame);
        *self.slot() = Some(frame);
    }

    fn snapshot(&self) -> Option<Arc<Frame>> {
        self.slot().clone()
    }

    fn clear(&self) {
        self.slot().take();
    }
}

struct ControlState {
    device: DeviceId,
    resolution: Option<Resolution>,
    negotiated: Option<Resolution>,
    worker: Option<JoinHandle<()>>,
}

impl ControlState {
    /// A worker that has exited on its own (a panic inside the backend) no
    /// longer counts as running.
    fn run_state(&self) -> RunState {
        match &self.worker {
            Some(worker) if !worker.is_finished() => RunState::Running,
            _ => RunState::Stopped,
        }
    }

    fn worker_exited(&self) -> bool {
        self.worker.as_ref().is_some_and(JoinHandle::is_finished)
    }
}

/// How strictly a requested mode must be honoured when opening.
#[derive(Debug, Clone, Copy)]
enum Negotiation {
    /// Keep whatever the device settles on.
    Lenient,
    /// The device must accept the mode request, whatever it then applies.
    Accepted,
    /// The applied mode must be within this many pixels of the request.
    Strict(u32),
}

struct OpenRequest {
    device: DeviceId,
    /// `None` skips the mode request and keeps the device defaults.
    mode: Option<Resolution>,
    negotiation: Negotiation,
}

pub struct FrameSource {
    backend: Arc<dyn CaptureBackend>,
    query: Arc<dyn DeviceQuery>,
    control: Mutex<ControlState>,
    shared: Arc<Shared>,
    frame_interval: Duration,
    tolerance: u32,
}

impl FrameSource {
    pub fn new(
        backend: Arc<dyn CaptureBackend>,
        query: Arc<dyn DeviceQuery>,
        options: SourceOptions,
    ) -> Self {
        Self {
            backend,
            query,
            control: Mutex::new(ControlState {
                device: options.device,
                resolution: options.resolution,
                negotiated: None,
                worker: None,
            }),
            shared: Arc::new(Shared {
                latest: Mutex::new(None),
                running: AtomicBool::new(false),
                sequence: AtomicU64::new(0),
            }),
            frame_interval: options.frame_interval,
            tolerance: options.resolution_tolerance,
        }
    }

    /// Use one value as both the capture backend and the device query.
    pub fn with_backend<B>(backend: B, options: SourceOptions) -> Self
    where
        B: CaptureBackend + DeviceQuery + 'static,
    {
        let backend = Arc::new(backend);
        Self::new(backend.clone(), backend, options)
    }

    /// nokhwa for capture, `v4l2-ctl` for enumeration.
    pub fn v4l2(options: SourceOptions) -> Self {
        Self::new(
            Arc::new(NokhwaBackend::new()),
            Arc::new(V4l2Ctl::default()),
            options,
        )
    }

    fn control(&self) -> MutexGuard<'_, ControlState> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open the configured device and start the acquisition loop.
    /// No-op when already running.
    pub fn start(&self) -> Result<(), CameraError> {
        let mut state = self.control();
        self.reap(&mut state);
        if state.worker.is_some() {
            return Ok(());
        }

        let request = OpenRequest {
            device: state.device.clone(),
            mode: state.resolution,
            negotiation: Negotiation::Lenient,
        };
        self.launch(&mut state, request)?;
        Ok(())
    }

    /// Stop the loop and release the device. Blocks until the acquisition
    /// thread has exited. Idempotent.
    pub fn stop(&self) {
        let mut state = self.control();
        self.halt(&mut state);
    }

    pub fn run_state(&self) -> RunState {
        self.control().run_state()
    }

    pub fn is_running(&self) -> bool {
        self.run_state() == RunState::Running
    }

    pub fn device_id(&self) -> DeviceId {
        self.control().device.clone()
    }

    /// Mode negotiated by the running device, `None` when stopped.
    pub fn resolution(&self) -> Option<Resolution> {
        self.control().negotiated
    }

    pub fn status(&self) -> SourceStatus {
        let state = self.control();
        SourceStatus {
            state: state.run_state(),
            device: state.device.to_string(),
            resolution: state.negotiated,
            latest_sequence: self.shared.snapshot().map(|f| f.sequence),
        }
    }

    /// Private copy of the most recent frame, if any. Never blocks on the device.
    pub fn get_frame(&self) -> Option<Frame> {
        let latest = self.shared.snapshot()?;
        Some(Frame::clone(&latest))
    }

    /// Most recent frame as JPEG. Encoding failures yield `None`.
    pub fn get_jpeg(&self, quality: u8) -> Option<Vec<u8>> {
        let latest = self.shared.snapshot()?;
        match codec::encode_jpeg(&latest, quality) {
            Ok(jpeg) => Some(jpeg),
            Err(e) => {
                log::warn!("Failed to encode frame {}: {}", latest.sequence, e);
                None
            }
        }
    }

    /// Write the most recent frame to `path` at full resolution.
    pub fn capture_to_file(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        let Some(latest) = self.shared.snapshot() else {
            log::warn!("No frame available to capture to {}", path.display());
            return false;
        };
        match codec::save_frame(&latest, path) {
            Ok(()) => {
                log::info!(
                    "Captured frame {} ({}) to {}",
                    latest.sequence,
                    latest.resolution(),
                    path.display()
                );
                true
            }
            Err(e) => {
                log::error!("Failed to save capture to {}: {}", path.display(), e);
                false
            }
        }
    }

    /// Reopen the device at `width`x`height` and return the negotiated mode.
    ///
    /// The change is rejected when the device applies a mode further than the
    /// configured tolerance from the request. On any failure the previous
    /// configuration is restored (falling back to device defaults when that
    /// fails too) before the error is returned.
    pub fn set_resolution(&self, width: u32, height: u32) -> Result<Resolution, CameraError> {
        if width == 0 || height == 0 {
            return Err(CameraError::InvalidArgument(format!(
                "resolution must be non-zero, got {}x{}",
                width, height
            )));
        }
        let requested = Resolution::new(width, height);

        let mut state = self.control();
        self.reap(&mut state);
        let was_running = state.worker.is_some();
        let device = state.device.clone();
        let previous = state.resolution;

        self.halt(&mut state);
        let request = OpenRequest {
            device: device.clone(),
            mode: Some(requested),
            negotiation: Negotiation::Strict(self.tolerance),
        };

        match self.launch(&mut state, request) {
            Ok(actual) => {
                state.resolution = Some(actual);
                log::info!(
                    "Camera {} resolution set to {} (requested {})",
                    device,
                    actual,
                    requested
                );
                Ok(actual)
            }
            Err(e) => {
                log::warn!(
                    "Resolution change to {} on {} failed: {}",
                    requested,
                    device,
                    e
                );
                if was_running {
                    self.recover(&mut state, device, previous);
                }
                Err(match e {
                    CameraError::ReconfigurationFailure { .. } => e,
                    other => CameraError::ReconfigurationFailure {
                        reason: other.to_string(),
                        negotiated: None,
                    },
                })
            }
        }
    }

    /// Switch to another device. On failure the previous device is reopened
    /// with its previous mode before the error is returned.
    pub fn switch_device(&self, device: DeviceId) -> Result<(), CameraError> {
        let mut state = self.control();
        self.reap(&mut state);
        let was_running = state.worker.is_some();
        let previous_device = state.device.clone();
        let previous_mode = state.resolution;

        self.halt(&mut state);
        let request = OpenRequest {
            device: device.clone(),
            mode: None,
            negotiation: Negotiation::Lenient,
        };

        match self.launch(&mut state, request) {
            Ok(_) => {
                state.device = device;
                state.resolution = None;
                Ok(())
            }
            Err(e) => {
                log::warn!(
                    "Switch from {} to {} failed: {}",
                    previous_device,
                    device,
                    e
                );
                if was_running {
                    self.recover(&mut state, previous_device, previous_mode);
                }
                Err(e)
            }
        }
    }

    /// Capture-capable devices visible to the OS. Does not touch this
    /// source's device.
    pub fn list_available_devices(&self) -> Vec<DeviceDescriptor> {
        self.query.list_devices()
    }

    /// Discrete sizes advertised by the configured device, whether or not it
    /// is currently open.
    pub fn list_supported_resolutions(&self) -> Vec<Resolution> {
        let device = self.device_id();
        let mut seen = HashSet::new();
        self.query
            .supported_resolutions(&device)
            .into_iter()
            .filter(|r| seen.insert(*r))
            .collect()
    }

    /// Spawn the acquisition thread and wait for its open to complete.
    fn launch(
        &self,
        state: &mut ControlState,
        request: OpenRequest,
    ) -> Result<Resolution, CameraError> {
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        let backend = Arc::clone(&self.backend);
        let shared = Arc::clone(&self.shared);
        let interval = self.frame_interval;
        let device = request.device.clone();

        self.shared.running.store(true, Ordering::SeqCst);
        let spawned = thread::Builder::new()
            .name("crabstream-acquisition".to_string())
            .spawn(move || {
                let handle = match open_device(backend.as_ref(), &request) {
                    Ok(handle) => handle,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(handle.resolution()));
                drop(ready_tx);
                acquisition_loop(handle, &shared, interval);
            });

        let thread = match spawned {
            Ok(thread) => thread,
            Err(e) => {
                self.shared.running.store(false, Ordering::SeqCst);
                return Err(CameraError::DeviceUnavailable(format!(
                    "Failed to spawn acquisition thread: {}",
                    e
                )));
            }
        };

        let outcome = ready_rx.recv().unwrap_or_else(|_| {
            Err(CameraError::DeviceUnavailable(format!(
                "Acquisition thread for {} exited during open",
                device
            )))
        });

        match outcome {
            Ok(actual) => {
                state.worker = Some(thread);
                state.negotiated = Some(actual);
                log::info!("Camera {} started at {}", device, actual);
                Ok(actual)
            }
            Err(e) => {
                self.shared.running.store(false, Ordering::SeqCst);
                if thread.join().is_err() {
                    log::error!("Acquisition thread for {} panicked during open", device);
                }
                Err(e)
            }
        }
    }

    fn halt(&self, state: &mut ControlState) {
        self.shared.running.store(false, Ordering::SeqCst);
        if let Some(worker) = state.worker.take() {
            if worker.join().is_err() {
                log::error!("Acquisition thread for {} panicked", state.device);
            }
            log::info!("Camera {} stopped", state.device);
        }
        state.negotiated = None;
        self.shared.clear();
    }

    /// Join a worker that exited without being stopped.
    fn reap(&self, state: &mut ControlState) {
        if state.worker_exited() {
            log::warn!("Acquisition thread for {} exited unexpectedly", state.device);
            self.halt(state);
        }
    }

    /// Bring `device` back after a failed reconfiguration: first with `mode`,
    /// which the device must accept, then without any mode request.
    fn recover(&self, state: &mut ControlState, device: DeviceId, mode: Option<Resolution>) {
        let mut attempts = vec![(mode, Negotiation::Accepted)];
        if mode.is_some() {
            attempts.push((None, Negotiation::Lenient));
        }

        for (attempt, negotiation) in attempts {
            let request = OpenRequest {
                device: device.clone(),
                mode: attempt,
                negotiation,
            };
            match self.launch(state, request) {
                Ok(actual) => {
                    log::info!("Recovered camera {} at {}", device, actual);
                    state.device = device;
                    state.resolution = attempt;
                    return;
                }
                Err(e) => log::error!("Fallback open of {} failed: {}", device, e),
            }
        }

        log::error!("Camera {} could not be recovered; source is stopped", device);
        state.device = device;
        state.resolution = mode;
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Open the device and apply the requested mode. Runs on the acquisition
/// thread; a rejected handle is released before the error is returned.
fn open_device(
    backend: &dyn CaptureBackend,
    request: &OpenRequest,
) -> Result<Box<dyn DeviceHandle>, CameraError> {
    let mut handle = backend.open(&request.device)?;

    let Some(requested) = request.mode else {
        return Ok(handle);
    };
    if let Err(e) = handle.set_resolution(requested) {
        if let Negotiation::Accepted = request.negotiation {
            handle.release();
            return Err(e);
        }
        log::warn!("{}", e);
    }

    let actual = handle.resolution();
    match request.negotiation {
        Negotiation::Strict(tolerance) if !actual.within(&requested, tolerance) => {
            handle.release();
            Err(CameraError::ReconfigurationFailure {
                reason: format!(
                    "camera {} negotiated {} instead of {}",
                    request.device, actual, requested
                ),
                negotiated: Some(actual),
            })
        }
        _ => Ok(handle),
    }
}

/// Empties the slot if the loop unwinds.
struct ClearOnPanic<'a>(&'a Shared);

impl Drop for ClearOnPanic<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.clear();
        }
    }
}

fn acquisition_loop(mut handle: Box<dyn DeviceHandle>, shared: &Shared, interval: Duration) {
    let _guard = ClearOnPanic(shared);
    while shared.running.load(Ordering::SeqCst) {
        match handle.read_frame() {
            Ok(frame) => {
                let sequence = shared.sequence.fetch_add(1, Ordering::SeqCst) + 1;
                shared.publish(frame.with_sequence(sequence));
            }
            Err(e) => log::trace!("Skipping frame: {}", e),
        }
        thread::sleep(interval);
    }
    handle.release();
}
