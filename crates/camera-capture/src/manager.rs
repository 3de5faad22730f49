//! Capture Manager
//!
//! Owns the capture lifecycle of one camera at a time. Control calls come
//! from any thread; hardware callbacks are serialized on a dedicated
//! background thread through a channel, so backends never mutate state
//! directly.

use crate::backend::{CameraDevice, CameraEvent, Envelope, EventSink, OutputSurface};
use crate::descriptor::{dedup_cameras, CameraDescriptor, Facing};
use crate::frame::{jpeg_dimensions, rotate_jpeg};
use crate::orientation::{required_rotation, OrientationTracker, Rotation};
use crate::preferences::PreferenceStore;
use crate::{CameraError, CaptureConfig, CapturePlatform};
use bytes::Bytes;
use frame_store::FrameStore;
use metrics::counter;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Upper bound on waiting for the background thread to drain
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Capture session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Uninitialized,
    Initialized,
    CameraOpening,
    CameraReady,
    Streaming,
    Stopped,
    Error,
}

impl CaptureState {
    pub fn as_str(self) -> &'static str {
        match self {
            CaptureState::Uninitialized => "uninitialized",
            CaptureState::Initialized => "initialized",
            CaptureState::CameraOpening => "camera_opening",
            CaptureState::CameraReady => "camera_ready",
            CaptureState::Streaming => "streaming",
            CaptureState::Stopped => "stopped",
            CaptureState::Error => "error",
        }
    }

    /// A device is open or being opened
    pub fn is_active(self) -> bool {
        matches!(
            self,
            CaptureState::CameraOpening | CaptureState::CameraReady | CaptureState::Streaming
        )
    }
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which camera `start` should open
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CameraSelector {
    /// Saved camera, else the first camera with the default facing
    #[default]
    Auto,
    Id(String),
    Facing(Facing),
}

/// Lifecycle flags as seen by the watchdog and HTTP handlers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CaptureHealth {
    pub initialized: bool,
    pub ready: bool,
    pub streaming: bool,
}

impl CaptureHealth {
    /// Initialized but never reached a ready camera
    pub fn is_stalled(&self) -> bool {
        self.initialized && !self.ready
    }
}

struct Session {
    state: CaptureState,
    /// Bumped whenever callbacks from the current device become stale
    generation: u64,
    cameras: Vec<CameraDescriptor>,
    active: Option<CameraDescriptor>,
    device: Option<Box<dyn CameraDevice>>,
    output: Option<OutputSurface>,
    events: Option<flume::Sender<Envelope>>,
    local_description: Option<String>,
    sensor_enabled: bool,
}

struct Shared {
    config: CaptureConfig,
    platform: CapturePlatform,
    store: Arc<FrameStore>,
    tracker: Arc<OrientationTracker>,
    initialized: AtomicBool,
    ready: AtomicBool,
    streaming: AtomicBool,
    pending_frames: Arc<AtomicUsize>,
    session: Mutex<Session>,
    changed: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, session: &mut Session, state: CaptureState) {
        if session.state != state {
            debug!("Capture state: {} -> {}", session.state, state);
        }
        session.state = state;
        self.ready.store(
            matches!(state, CaptureState::CameraReady | CaptureState::Streaming),
            Ordering::Release,
        );
        self.streaming
            .store(state == CaptureState::Streaming, Ordering::Release);
        self.changed.notify_all();
    }

    fn release_device(&self, session: &mut Session) {
        if let Some(mut device) = session.device.take() {
            device.close_session();
            device.close();
        }
        session.output = None;
    }

    fn stop_session(&self, session: &mut Session) {
        session.generation += 1;
        if let Some(device) = session.device.as_mut() {
            device.close_session();
        }
        session.local_description = None;
        self.set_state(session, CaptureState::Stopped);
    }

    fn fail(&self, session: &mut Session, reason: &str) {
        if !session.state.is_active() {
            return;
        }
        error!("Camera failure in state {}: {}", session.state, reason);
        session.generation += 1;
        self.release_device(session);
        session.local_description = None;
        self.set_state(session, CaptureState::Error);
    }

    fn handle_event(&self, generation: u64, event: CameraEvent) {
        if let CameraEvent::Frame(data) = event {
            self.on_frame(generation, data);
            return;
        }

        let mut session = self.lock();
        if generation != session.generation {
            trace!("Ignoring event from stale session {}", generation);
            return;
        }

        match event {
            CameraEvent::Opened => {
                if session.state != CaptureState::CameraOpening {
                    return;
                }
                let output = OutputSurface::jpeg(self.config.width, self.config.height);
                let Some(device) = session.device.as_mut() else {
                    return;
                };
                match device.create_session(&output) {
                    Ok(()) => {
                        debug!("Camera opened, configuring {}x{} session", output.width, output.height);
                        session.output = Some(output);
                    }
                    Err(e) => self.fail(&mut session, &format!("session setup failed: {}", e)),
                }
            }
            CameraEvent::SessionConfigured => {
                if session.state != CaptureState::CameraOpening {
                    return;
                }
                let Some(device) = session.device.as_mut() else {
                    return;
                };
                match device.set_repeating() {
                    Ok(()) => {
                        self.set_state(&mut session, CaptureState::CameraReady);
                        if let Some(camera) = &session.active {
                            info!("Camera ready: {}", camera);
                        }
                    }
                    Err(e) => self.fail(&mut session, &format!("repeating request failed: {}", e)),
                }
            }
            CameraEvent::SessionConfigureFailed => {
                self.fail(&mut session, "capture session configuration failed");
            }
            CameraEvent::Disconnected => {
                self.fail(&mut session, "camera disconnected");
            }
            CameraEvent::Error(kind) => {
                self.fail(&mut session, &format!("device error {} ({})", kind.code(), kind));
            }
            // Handled before locking
            CameraEvent::Frame(_) => {}
        }
    }

    /// Orient and publish one captured still.
    ///
    /// The session lock is only taken to look up the camera and to publish,
    /// never across decode and encode.
    fn on_frame(&self, generation: u64, data: Bytes) {
        let camera = {
            let session = self.lock();
            if generation != session.generation
                || !matches!(
                    session.state,
                    CaptureState::CameraReady | CaptureState::Streaming
                )
            {
                trace!("Dropping frame from inactive session {}", generation);
                return;
            }
            match session.active.clone() {
                Some(camera) => camera,
                None => return,
            }
        };

        let frame = self.orient(&camera, data);
        if !self.publish_current(generation, frame) {
            trace!("Session {} ended while orienting a frame", generation);
        }
    }

    /// Rotate `data` upright for `camera`. Falls back to the frame as captured.
    fn orient(&self, camera: &CameraDescriptor, data: Bytes) -> OrientedFrame {
        let rotation = required_rotation(
            camera.facing,
            camera.sensor_orientation,
            self.tracker.current(),
        );
        if rotation == Rotation::Deg0 {
            return self.unrotated(data);
        }

        match rotate_jpeg(&data, rotation, self.config.jpeg_quality) {
            Ok(rotated) => OrientedFrame {
                data: Bytes::from(rotated.data),
                width: rotated.width,
                height: rotated.height,
            },
            Err(e) => {
                warn!("Rotating frame by {} failed, publishing as captured: {}", rotation, e);
                counter!("securecam_frame_rotation_failures_total").increment(1);
                self.unrotated(data)
            }
        }
    }

    fn unrotated(&self, data: Bytes) -> OrientedFrame {
        let (width, height) =
            jpeg_dimensions(&data).unwrap_or((self.config.width, self.config.height));
        OrientedFrame {
            data,
            width,
            height,
        }
    }

    /// Publish unless the session that produced the frame has since ended
    fn publish_current(&self, generation: u64, frame: OrientedFrame) -> bool {
        let session = self.lock();
        if generation != session.generation {
            return false;
        }
        self.store.publish(frame.data, frame.width, frame.height);
        counter!("securecam_frames_published_total").increment(1);
        true
    }
}

/// Frame ready for the store
struct OrientedFrame {
    data: Bytes,
    width: u32,
    height: u32,
}

fn run_background(shared: Arc<Shared>, events: flume::Receiver<Envelope>) {
    debug!("Camera background thread started");
    while let Ok(envelope) = events.recv() {
        match envelope {
            Envelope::Event { generation, event } => {
                if matches!(event, CameraEvent::Frame(_)) {
                    shared.pending_frames.fetch_sub(1, Ordering::AcqRel);
                }
                shared.handle_event(generation, event);
            }
            Envelope::Flush(ack) => {
                let _ = ack.send(());
            }
            Envelope::Shutdown => break,
        }
    }
    debug!("Camera background thread stopped");
}

/// Wait until everything queued before the barrier has been handled
fn drain(events: &flume::Sender<Envelope>) -> bool {
    let (ack_tx, ack_rx) = flume::bounded(1);
    events.send(Envelope::Flush(ack_tx)).is_ok() && ack_rx.recv_timeout(DRAIN_TIMEOUT).is_ok()
}

/// Pick the camera to open
pub fn select_camera(
    cameras: &[CameraDescriptor],
    selector: &CameraSelector,
    preferences: &dyn PreferenceStore,
) -> Result<CameraDescriptor, CameraError> {
    if cameras.is_empty() {
        return Err(CameraError::NoCameras);
    }

    match selector {
        CameraSelector::Id(id) => cameras
            .iter()
            .find(|camera| &camera.id == id)
            .cloned()
            .ok_or_else(|| CameraError::CameraNotFound(id.clone())),
        CameraSelector::Facing(facing) => cameras
            .iter()
            .find(|camera| camera.facing == *facing)
            .cloned()
            .ok_or_else(|| CameraError::CameraNotFound(format!("{} camera", facing))),
        CameraSelector::Auto => {
            if let Some(id) = preferences.selected_camera_id() {
                if let Some(camera) = cameras.iter().find(|camera| camera.id == id) {
                    return Ok(camera.clone());
                }
                warn!("Saved camera {} is not available", id);
            }
            let facing = preferences.default_facing();
            Ok(cameras
                .iter()
                .find(|camera| camera.facing == facing)
                .unwrap_or(&cameras[0])
                .clone())
        }
    }
}

/// Camera capture manager
pub struct CaptureManager {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl CaptureManager {
    /// Create an uninitialized manager with an empty frame store
    pub fn new(config: CaptureConfig, platform: CapturePlatform) -> Self {
        let session = Session {
            state: CaptureState::Uninitialized,
            generation: 0,
            cameras: Vec::new(),
            active: None,
            device: None,
            output: None,
            events: None,
            local_description: None,
            sensor_enabled: false,
        };

        Self {
            shared: Arc::new(Shared {
                config,
                platform,
                store: Arc::new(FrameStore::new()),
                tracker: Arc::new(OrientationTracker::new()),
                initialized: AtomicBool::new(false),
                ready: AtomicBool::new(false),
                streaming: AtomicBool::new(false),
                pending_frames: Arc::new(AtomicUsize::new(0)),
                session: Mutex::new(session),
                changed: Condvar::new(),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Connect the backend, start the background thread, enable the
    /// orientation sensor and enumerate cameras. Idempotent.
    pub fn initialize(&self) -> Result<(), CameraError> {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if self.shared.initialized.load(Ordering::Acquire) {
            debug!("Capture manager already initialized");
            return Ok(());
        }

        let platform = &self.shared.platform;
        if let Err(e) = platform.backend.connect() {
            error!("Failed to connect camera backend {}: {}", platform.backend.name(), e);
            return Err(e);
        }

        let cameras = match platform.backend.enumerate() {
            Ok(cameras) => dedup_cameras(cameras),
            Err(e) => {
                warn!("Camera enumeration failed: {}", e);
                Vec::new()
            }
        };
        for camera in &cameras {
            debug!("Found {} facing {}, sensor {}", camera, camera.facing, camera.sensor_orientation);
        }

        let (events, receiver) = flume::unbounded();
        let handle = {
            let shared = self.shared.clone();
            thread::Builder::new()
                .name("camera-background".to_string())
                .spawn(move || run_background(shared, receiver))?
        };

        let sensor_enabled = platform.sensor.enable(self.shared.tracker.clone());
        if !sensor_enabled {
            self.shared.tracker.reset();
            info!("Orientation detection unavailable, assuming 0°");
        }

        let count = cameras.len();
        {
            let mut session = self.shared.lock();
            session.cameras = cameras;
            session.events = Some(events);
            session.sensor_enabled = sensor_enabled;
            self.shared.set_state(&mut session, CaptureState::Initialized);
        }
        *worker = Some(handle);
        self.shared.initialized.store(true, Ordering::Release);

        info!(
            "Capture manager initialized: {} cameras via {} backend",
            count,
            platform.backend.name()
        );
        Ok(())
    }

    /// Deduplicated cameras found at initialization
    pub fn list_cameras(&self) -> Vec<CameraDescriptor> {
        if !self.is_initialized() {
            warn!("Camera list requested before initialization");
            return Vec::new();
        }
        self.shared.lock().cameras.clone()
    }

    /// Open a camera. Completion is asynchronous; see [`Self::wait_until_ready`].
    pub fn start(&self, selector: CameraSelector) -> Result<(), CameraError> {
        if !self.is_initialized() {
            return Err(CameraError::NotInitialized);
        }

        let mut session = self.shared.lock();
        match session.state {
            CaptureState::Uninitialized => return Err(CameraError::NotInitialized),
            CaptureState::Error => {
                warn!("Start rejected: capture is in error state, dispose and initialize first");
                return Err(CameraError::InvalidState(CaptureState::Error));
            }
            state if state.is_active() => {
                info!("Stopping current camera before restart");
                self.shared.stop_session(&mut session);
            }
            _ => {}
        }
        self.shared.release_device(&mut session);

        let camera = select_camera(
            &session.cameras,
            &selector,
            self.shared.platform.preferences.as_ref(),
        )?;
        let events = session
            .events
            .clone()
            .ok_or(CameraError::NotInitialized)?;

        session.generation += 1;
        self.shared.store.clear();
        let sink = EventSink::new(
            session.generation,
            events,
            self.shared.pending_frames.clone(),
            self.shared.config.max_pending_frames,
        );

        info!("Opening {}", camera);
        match self.shared.platform.backend.open(&camera.id, sink) {
            Ok(device) => {
                session.device = Some(device);
                session.active = Some(camera);
                self.shared
                    .set_state(&mut session, CaptureState::CameraOpening);
                Ok(())
            }
            Err(CameraError::CameraNotFound(id)) => Err(CameraError::CameraNotFound(id)),
            Err(e) => {
                error!("Failed to open {}: {}", camera, e);
                session.active = Some(camera);
                self.shared.set_state(&mut session, CaptureState::Error);
                Err(CameraError::Open(e.to_string()))
            }
        }
    }

    /// Block until the camera opened by `start` is ready
    pub fn wait_until_ready(&self, timeout: Duration) -> Result<(), CameraError> {
        let session = self.shared.lock();
        let (session, _) = self
            .shared
            .changed
            .wait_timeout_while(session, timeout, |s| s.state == CaptureState::CameraOpening)
            .unwrap_or_else(PoisonError::into_inner);

        match session.state {
            CaptureState::CameraReady | CaptureState::Streaming => Ok(()),
            CaptureState::CameraOpening => Err(CameraError::Timeout(timeout)),
            other => Err(CameraError::NotReady(other)),
        }
    }

    /// Start streaming from a ready camera and publish the local description
    pub fn go_live(&self) -> Result<(), CameraError> {
        let mut session = self.shared.lock();
        if session.state != CaptureState::CameraReady {
            debug!("go_live ignored in state {}", session.state);
            return Err(CameraError::NotReady(session.state));
        }

        session.local_description = Some(signaling::local_offer());
        self.shared.set_state(&mut session, CaptureState::Streaming);
        info!("Camera streaming");
        Ok(())
    }

    /// Close the capture session. Idempotent.
    pub fn stop(&self) {
        let mut session = self.shared.lock();
        if !session.state.is_active() {
            debug!("Stop ignored in state {}", session.state);
            return;
        }
        self.shared.stop_session(&mut session);
        info!("Camera stopped");
    }

    /// Stop, drain callbacks, release every resource and join the
    /// background thread. Safe to repeat.
    pub fn dispose(&self) {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);

        let events = {
            let mut session = self.shared.lock();
            if session.state.is_active() {
                self.shared.stop_session(&mut session);
            }
            session.generation += 1;
            session.events.take()
        };

        // The session lock must be free while the background thread drains
        if let Some(events) = &events {
            if !drain(events) {
                warn!("Timed out draining camera callbacks");
            }
        }

        {
            let mut session = self.shared.lock();
            self.shared.release_device(&mut session);
            session.active = None;
            session.local_description = None;
            session.cameras.clear();
            if session.sensor_enabled {
                self.shared.platform.sensor.disable();
                session.sensor_enabled = false;
            }
            self.shared
                .set_state(&mut session, CaptureState::Uninitialized);
        }

        if let Some(events) = events {
            let _ = events.send(Envelope::Shutdown);
        }
        if let Some(handle) = worker.take() {
            if handle.join().is_err() {
                error!("Camera background thread panicked");
            }
            info!("Capture manager disposed");
        }

        self.shared.store.clear();
        self.shared.pending_frames.store(0, Ordering::Release);
        self.shared.initialized.store(false, Ordering::Release);
    }

    /// Restart with the camera facing the other way
    pub fn toggle_facing(&self) -> Result<(), CameraError> {
        let current = self
            .active_camera()
            .map(|camera| camera.facing)
            .unwrap_or_else(|| self.shared.platform.preferences.default_facing());
        info!("Switching to {} camera", current.opposite());
        self.start(CameraSelector::Facing(current.opposite()))
    }

    /// Restart with a specific camera
    pub fn switch(&self, id: &str) -> Result<(), CameraError> {
        self.start(CameraSelector::Id(id.to_string()))
    }

    pub fn state(&self) -> CaptureState {
        self.shared.lock().state
    }

    pub fn health(&self) -> CaptureHealth {
        CaptureHealth {
            initialized: self.is_initialized(),
            ready: self.is_ready(),
            streaming: self.is_streaming(),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.shared.initialized.load(Ordering::Acquire)
    }

    pub fn is_ready(&self) -> bool {
        self.shared.ready.load(Ordering::Acquire)
    }

    pub fn is_streaming(&self) -> bool {
        self.shared.streaming.load(Ordering::Acquire)
    }

    pub fn active_camera(&self) -> Option<CameraDescriptor> {
        self.shared.lock().active.clone()
    }

    /// Description synthesized when the camera went live
    pub fn local_description(&self) -> Option<String> {
        self.shared.lock().local_description.clone()
    }

    pub fn frame_store(&self) -> Arc<FrameStore> {
        self.shared.store.clone()
    }

    /// Configured output surface size
    pub fn output_size(&self) -> (u32, u32) {
        (self.shared.config.width, self.shared.config.height)
    }

    /// Current quantized device orientation
    pub fn device_orientation(&self) -> Rotation {
        self.shared.tracker.current()
    }
}

impl Drop for CaptureManager {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for CaptureManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureManager")
            .field("state", &self.state())
            .field("health", &self.health())
            .field("platform", &self.shared.platform)
            .finish()
    }
}
