//! Camera platform seam
//!
//! Backends never touch capture manager state. Every hardware callback is
//! posted through an [`EventSink`] and handled on the manager's background
//! thread, tagged with the generation of the session that produced it.

mod synthetic;
#[cfg(feature = "v4l2")]
mod v4l2;

pub use synthetic::{SyntheticBackend, SyntheticCamera};
#[cfg(feature = "v4l2")]
pub use v4l2::V4l2Backend;

use crate::descriptor::CameraDescriptor;
use crate::CameraError;
use bytes::Bytes;
use metrics::counter;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Device failure reported asynchronously by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceErrorKind {
    InUse,
    MaxCamerasInUse,
    Disabled,
    Device,
    Service,
    Other(i32),
}

impl DeviceErrorKind {
    /// Map a platform error code
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => DeviceErrorKind::InUse,
            2 => DeviceErrorKind::MaxCamerasInUse,
            3 => DeviceErrorKind::Disabled,
            4 => DeviceErrorKind::Device,
            5 => DeviceErrorKind::Service,
            other => DeviceErrorKind::Other(other),
        }
    }

    pub fn code(self) -> i32 {
        match self {
            DeviceErrorKind::InUse => 1,
            DeviceErrorKind::MaxCamerasInUse => 2,
            DeviceErrorKind::Disabled => 3,
            DeviceErrorKind::Device => 4,
            DeviceErrorKind::Service => 5,
            DeviceErrorKind::Other(code) => code,
        }
    }
}

impl fmt::Display for DeviceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceErrorKind::InUse => f.write_str("camera in use"),
            DeviceErrorKind::MaxCamerasInUse => f.write_str("too many cameras in use"),
            DeviceErrorKind::Disabled => f.write_str("camera disabled"),
            DeviceErrorKind::Device => f.write_str("fatal device error"),
            DeviceErrorKind::Service => f.write_str("camera service error"),
            DeviceErrorKind::Other(code) => write!(f, "unknown error {}", code),
        }
    }
}

/// Asynchronous hardware callback
#[derive(Debug, Clone)]
pub enum CameraEvent {
    Opened,
    Disconnected,
    Error(DeviceErrorKind),
    SessionConfigured,
    SessionConfigureFailed,
    /// One encoded still from the repeating request
    Frame(Bytes),
}

/// Message consumed by the background thread
pub(crate) enum Envelope {
    Event { generation: u64, event: CameraEvent },
    /// Barrier: acknowledged once every earlier message is handled
    Flush(flume::Sender<()>),
    Shutdown,
}

/// Handle backends use to post events for one capture session
#[derive(Clone)]
pub struct EventSink {
    generation: u64,
    tx: flume::Sender<Envelope>,
    pending_frames: Arc<AtomicUsize>,
    max_pending_frames: usize,
}

impl EventSink {
    pub(crate) fn new(
        generation: u64,
        tx: flume::Sender<Envelope>,
        pending_frames: Arc<AtomicUsize>,
        max_pending_frames: usize,
    ) -> Self {
        Self {
            generation,
            tx,
            pending_frames,
            max_pending_frames,
        }
    }

    /// Post an event. Returns false when the manager is gone or a frame
    /// was dropped because too many are already queued.
    pub fn post(&self, event: CameraEvent) -> bool {
        if matches!(event, CameraEvent::Frame(_)) {
            if self.pending_frames.load(Ordering::Acquire) >= self.max_pending_frames {
                trace!("Frame dropped, background thread busy");
                counter!("securecam_frames_dropped_total").increment(1);
                return false;
            }
            self.pending_frames.fetch_add(1, Ordering::AcqRel);
        }

        let is_frame = matches!(event, CameraEvent::Frame(_));
        let sent = self
            .tx
            .send(Envelope::Event {
                generation: self.generation,
                event,
            })
            .is_ok();
        if !sent && is_frame {
            self.pending_frames.fetch_sub(1, Ordering::AcqRel);
        }
        sent
    }

    /// Session generation this sink belongs to
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True once the manager's background thread has gone away
    pub fn is_closed(&self) -> bool {
        self.tx.is_disconnected()
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink")
            .field("generation", &self.generation)
            .finish()
    }
}

/// Still-image output the session writes into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputSurface {
    pub width: u32,
    pub height: u32,
    /// Buffers the surface may hold at once
    pub max_images: u32,
}

impl OutputSurface {
    pub fn jpeg(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            max_images: 2,
        }
    }
}

/// Camera subsystem
pub trait CameraBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Acquire the camera subsystem
    fn connect(&self) -> Result<(), CameraError>;

    /// Cameras present on the platform, possibly with duplicates
    fn enumerate(&self) -> Result<Vec<CameraDescriptor>, CameraError>;

    /// Begin opening camera `id`. Completion arrives later as
    /// [`CameraEvent::Opened`], [`CameraEvent::Disconnected`] or
    /// [`CameraEvent::Error`].
    fn open(&self, id: &str, sink: EventSink) -> Result<Box<dyn CameraDevice>, CameraError>;
}

/// Open camera handle
pub trait CameraDevice: Send {
    /// Configure a capture session; posts `SessionConfigured` or
    /// `SessionConfigureFailed`
    fn create_session(&mut self, output: &OutputSurface) -> Result<(), CameraError>;

    /// Arm continuous capture; frames arrive as `Frame` events
    fn set_repeating(&mut self) -> Result<(), CameraError>;

    fn close_session(&mut self);

    fn close(&mut self);
}
