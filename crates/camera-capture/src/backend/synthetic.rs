//! Synthetic camera backend producing JPEG test patterns

use super::{CameraBackend, CameraDevice, CameraEvent, DeviceErrorKind, EventSink, OutputSurface};
use crate::descriptor::{CameraDescriptor, Facing};
use crate::frame::{encode_jpeg, test_pattern};
use crate::orientation::Rotation;
use crate::CameraError;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Backend with configurable fake cameras
#[derive(Debug)]
pub struct SyntheticBackend {
    cameras: Vec<CameraDescriptor>,
    fps: u32,
    quality: u8,
    fail_open: Option<DeviceErrorKind>,
    stall_configure: bool,
    opens: AtomicUsize,
}

impl Default for SyntheticBackend {
    /// Phone-like pair: back sensor mounted at 90°, front at 270°
    fn default() -> Self {
        Self::new(vec![
            CameraDescriptor::new("0", Facing::Back, Rotation::Deg90),
            CameraDescriptor::new("1", Facing::Front, Rotation::Deg270),
        ])
    }
}

impl SyntheticBackend {
    pub fn new(cameras: Vec<CameraDescriptor>) -> Self {
        Self {
            cameras,
            fps: 30,
            quality: 85,
            fail_open: None,
            stall_configure: false,
            opens: AtomicUsize::new(0),
        }
    }

    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps.max(1);
        self
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }

    /// Every open reports `kind` instead of succeeding
    pub fn with_open_failure(mut self, kind: DeviceErrorKind) -> Self {
        self.fail_open = Some(kind);
        self
    }

    /// Sessions never finish configuring, leaving the manager not ready
    pub fn with_stalled_configure(mut self) -> Self {
        self.stall_configure = true;
        self
    }

    /// Number of open attempts so far
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::Relaxed)
    }
}

impl CameraBackend for SyntheticBackend {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn connect(&self) -> Result<(), CameraError> {
        debug!("Synthetic backend connected ({} cameras)", self.cameras.len());
        Ok(())
    }

    fn enumerate(&self) -> Result<Vec<CameraDescriptor>, CameraError> {
        Ok(self.cameras.clone())
    }

    fn open(&self, id: &str, sink: EventSink) -> Result<Box<dyn CameraDevice>, CameraError> {
        let descriptor = self
            .cameras
            .iter()
            .find(|camera| camera.id == id)
            .cloned()
            .ok_or_else(|| CameraError::CameraNotFound(id.to_string()))?;
        self.opens.fetch_add(1, Ordering::Relaxed);

        match self.fail_open {
            Some(kind) => {
                sink.post(CameraEvent::Error(kind));
            }
            None => {
                sink.post(CameraEvent::Opened);
            }
        }

        Ok(Box::new(SyntheticCamera {
            descriptor,
            sink,
            fps: self.fps,
            quality: self.quality,
            stall_configure: self.stall_configure,
            output: None,
            producer: None,
        }))
    }
}

struct Producer {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Open synthetic camera
pub struct SyntheticCamera {
    descriptor: CameraDescriptor,
    sink: EventSink,
    fps: u32,
    quality: u8,
    stall_configure: bool,
    output: Option<OutputSurface>,
    producer: Option<Producer>,
}

impl SyntheticCamera {
    fn produce(
        sink: EventSink,
        stop: Arc<AtomicBool>,
        output: OutputSurface,
        fps: u32,
        quality: u8,
    ) {
        let interval = Duration::from_millis(1000 / fps as u64);
        let mut frame_index = 0u64;

        while !stop.load(Ordering::Acquire) && !sink.is_closed() {
            let image = test_pattern(output.width, output.height, frame_index);
            match encode_jpeg(&image, quality) {
                Ok(jpeg) => {
                    sink.post(CameraEvent::Frame(Bytes::from(jpeg)));
                }
                Err(e) => {
                    warn!("Synthetic frame encoding failed: {}", e);
                    sink.post(CameraEvent::Error(DeviceErrorKind::Device));
                    break;
                }
            }
            frame_index += 1;
            thread::park_timeout(interval);
        }
    }
}

impl CameraDevice for SyntheticCamera {
    fn create_session(&mut self, output: &OutputSurface) -> Result<(), CameraError> {
        self.output = Some(*output);
        if self.stall_configure {
            debug!("Synthetic camera {} stalling session configuration", self.descriptor.id);
            return Ok(());
        }
        self.sink.post(CameraEvent::SessionConfigured);
        Ok(())
    }

    fn set_repeating(&mut self) -> Result<(), CameraError> {
        if self.producer.is_some() {
            return Ok(());
        }
        let output = self
            .output
            .ok_or_else(|| CameraError::Backend("no capture session".to_string()))?;

        let stop = Arc::new(AtomicBool::new(false));
        let handle = {
            let sink = self.sink.clone();
            let stop = stop.clone();
            let (fps, quality) = (self.fps, self.quality);
            thread::Builder::new()
                .name(format!("synthetic-camera-{}", self.descriptor.id))
                .spawn(move || Self::produce(sink, stop, output, fps, quality))?
        };

        info!(
            "Synthetic camera {} streaming {}x{} @ {} fps",
            self.descriptor.id, output.width, output.height, self.fps
        );
        self.producer = Some(Producer { stop, handle });
        Ok(())
    }

    fn close_session(&mut self) {
        if let Some(producer) = self.producer.take() {
            producer.stop.store(true, Ordering::Release);
            producer.handle.thread().unpark();
            if producer.handle.join().is_err() {
                warn!("Synthetic producer thread panicked");
            }
        }
    }

    fn close(&mut self) {
        self.close_session();
        self.output = None;
    }
}

impl Drop for SyntheticCamera {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Envelope;

    fn sink() -> (EventSink, flume::Receiver<Envelope>) {
        let (tx, rx) = flume::unbounded();
        (EventSink::new(1, tx, Arc::new(AtomicUsize::new(0)), 64), rx)
    }

    fn next_event(rx: &flume::Receiver<Envelope>) -> CameraEvent {
        match rx.recv_timeout(Duration::from_secs(2)).unwrap() {
            Envelope::Event { event, .. } => event,
            _ => panic!("expected event"),
        }
    }

    #[test]
    fn test_open_unknown_camera() {
        let backend = SyntheticBackend::default();
        let (sink, _rx) = sink();
        assert!(matches!(
            backend.open("42", sink),
            Err(CameraError::CameraNotFound(_))
        ));
        assert_eq!(backend.opens(), 0);
    }

    #[test]
    fn test_open_configure_stream() {
        let backend = SyntheticBackend::default().with_fps(50);
        let (sink, rx) = sink();

        let mut device = backend.open("0", sink).unwrap();
        assert!(matches!(next_event(&rx), CameraEvent::Opened));

        device.create_session(&OutputSurface::jpeg(32, 24)).unwrap();
        assert!(matches!(next_event(&rx), CameraEvent::SessionConfigured));

        device.set_repeating().unwrap();
        match next_event(&rx) {
            CameraEvent::Frame(data) => {
                assert_eq!(crate::frame::jpeg_dimensions(&data), Some((32, 24)));
            }
            other => panic!("expected frame, got {:?}", other),
        }
        device.close();
    }

    #[test]
    fn test_open_failure_is_reported_async() {
        let backend = SyntheticBackend::default().with_open_failure(DeviceErrorKind::InUse);
        let (sink, rx) = sink();

        let _device = backend.open("1", sink).unwrap();
        assert!(matches!(
            next_event(&rx),
            CameraEvent::Error(DeviceErrorKind::InUse)
        ));
    }

    #[test]
    fn test_repeating_requires_session() {
        let backend = SyntheticBackend::default();
        let (sink, _rx) = sink();
        let mut device = backend.open("0", sink).unwrap();
        assert!(device.set_repeating().is_err());
    }
}
