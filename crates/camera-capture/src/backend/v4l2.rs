//! V4L2 capture backend

use super::{CameraBackend, CameraDevice, CameraEvent, DeviceErrorKind, EventSink, OutputSurface};
use crate::descriptor::{CameraDescriptor, Facing};
use crate::orientation::Rotation;
use crate::CameraError;
use bytes::Bytes;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};
use v4l::buffer::Type;
use v4l::io::mmap::Stream as MmapStream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, Format, FourCC};

const MAX_DEVICES: usize = 16;

/// Longest a dequeue may block before the capture loop rechecks its stop flag
const DEQUEUE_TIMEOUT: Duration = Duration::from_millis(250);

/// A dequeue that returned no buffer in time rather than failing
fn is_dequeue_timeout(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// Linux capture devices under `/dev/video*`.
///
/// V4L2 exposes no facing or mounting information, so every device is
/// reported as back-facing with a 0° sensor.
#[derive(Debug)]
pub struct V4l2Backend {
    fps: u32,
    buffer_count: u32,
}

impl Default for V4l2Backend {
    fn default() -> Self {
        Self {
            fps: 30,
            buffer_count: 4,
        }
    }
}

impl V4l2Backend {
    pub fn new(fps: u32) -> Self {
        Self {
            fps: fps.max(1),
            ..Default::default()
        }
    }
}

impl CameraBackend for V4l2Backend {
    fn name(&self) -> &str {
        "v4l2"
    }

    fn connect(&self) -> Result<(), CameraError> {
        if !Path::new("/dev").exists() {
            return Err(CameraError::Backend("/dev not available".to_string()));
        }
        Ok(())
    }

    fn enumerate(&self) -> Result<Vec<CameraDescriptor>, CameraError> {
        let cameras = (0..MAX_DEVICES)
            .filter(|index| Path::new(&format!("/dev/video{}", index)).exists())
            .map(|index| CameraDescriptor::new(index.to_string(), Facing::Back, Rotation::Deg0))
            .collect::<Vec<_>>();
        debug!("Found {} V4L2 devices", cameras.len());
        Ok(cameras)
    }

    fn open(&self, id: &str, sink: EventSink) -> Result<Box<dyn CameraDevice>, CameraError> {
        let index: usize = id
            .parse()
            .map_err(|_| CameraError::CameraNotFound(id.to_string()))?;

        let device = match Device::new(index) {
            Ok(device) => {
                sink.post(CameraEvent::Opened);
                Some(Arc::new(device))
            }
            Err(e) => {
                warn!("Failed to open /dev/video{}: {}", index, e);
                // EBUSY
                let kind = if e.raw_os_error() == Some(16) {
                    DeviceErrorKind::InUse
                } else if e.kind() == std::io::ErrorKind::PermissionDenied {
                    DeviceErrorKind::Disabled
                } else {
                    DeviceErrorKind::Device
                };
                sink.post(CameraEvent::Error(kind));
                None
            }
        };

        Ok(Box::new(V4l2Camera {
            index,
            device,
            sink,
            fps: self.fps,
            buffer_count: self.buffer_count,
            configured: false,
            capture: None,
        }))
    }
}

struct CaptureThread {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

struct V4l2Camera {
    index: usize,
    device: Option<Arc<Device>>,
    sink: EventSink,
    fps: u32,
    buffer_count: u32,
    configured: bool,
    capture: Option<CaptureThread>,
}

impl V4l2Camera {
    fn configure(device: &Device, output: &OutputSurface, fps: u32) -> Result<(), CameraError> {
        let format = Format::new(output.width, output.height, FourCC::new(b"MJPG"));
        let format = device.set_format(&format)?;
        if format.fourcc != FourCC::new(b"MJPG") {
            return Err(CameraError::Backend(
                "MJPEG format not supported by device".to_string(),
            ));
        }
        let params = v4l::video::capture::Parameters::with_fps(fps);
        device.set_params(&params)?;
        Ok(())
    }

    fn capture_loop(
        device: Arc<Device>,
        sink: EventSink,
        stop: Arc<AtomicBool>,
        buffer_count: u32,
    ) -> Result<(), CameraError> {
        let mut stream = MmapStream::with_buffers(&device, Type::VideoCapture, buffer_count)?;
        stream.set_timeout(DEQUEUE_TIMEOUT);

        while !stop.load(Ordering::Acquire) && !sink.is_closed() {
            match CaptureStream::next(&mut stream) {
                Ok((data, _meta)) => {
                    // The mmap buffer is only valid until the next dequeue
                    sink.post(CameraEvent::Frame(Bytes::copy_from_slice(data)));
                }
                Err(e) if is_dequeue_timeout(&e) => {
                    trace!("No buffer within {:?}", DEQUEUE_TIMEOUT);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

impl CameraDevice for V4l2Camera {
    fn create_session(&mut self, output: &OutputSurface) -> Result<(), CameraError> {
        let device = self.device.as_ref().ok_or(CameraError::NotInitialized)?;
        match Self::configure(device, output, self.fps) {
            Ok(()) => {
                self.configured = true;
                self.sink.post(CameraEvent::SessionConfigured);
            }
            Err(e) => {
                warn!("Configuring /dev/video{} failed: {}", self.index, e);
                self.sink.post(CameraEvent::SessionConfigureFailed);
            }
        }
        Ok(())
    }

    fn set_repeating(&mut self) -> Result<(), CameraError> {
        if self.capture.is_some() {
            return Ok(());
        }
        if !self.configured {
            return Err(CameraError::Backend("no capture session".to_string()));
        }
        let device = self.device.clone().ok_or(CameraError::NotInitialized)?;

        let stop = Arc::new(AtomicBool::new(false));
        let handle = {
            let sink = self.sink.clone();
            let stop = stop.clone();
            let buffer_count = self.buffer_count;
            let index = self.index;
            thread::Builder::new()
                .name(format!("v4l2-capture-{}", index))
                .spawn(move || {
                    if let Err(e) = Self::capture_loop(device, sink.clone(), stop, buffer_count) {
                        error!("Capture on /dev/video{} failed: {}", index, e);
                        sink.post(CameraEvent::Disconnected);
                    }
                })?
        };

        info!("Streaming from /dev/video{}", self.index);
        self.capture = Some(CaptureThread { stop, handle });
        Ok(())
    }

    fn close_session(&mut self) {
        if let Some(capture) = self.capture.take() {
            capture.stop.store(true, Ordering::Release);
            // Bounded by DEQUEUE_TIMEOUT even when the device delivers nothing
            if capture.handle.join().is_err() {
                warn!("V4L2 capture thread panicked");
            }
        }
        self.configured = false;
    }

    fn close(&mut self) {
        self.close_session();
        if self.device.take().is_some() {
            debug!("Closed /dev/video{}", self.index);
        }
    }
}

impl Drop for V4l2Camera {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dequeue_timeout_is_not_fatal() {
        assert!(is_dequeue_timeout(&io::Error::new(
            io::ErrorKind::TimedOut,
            "VIDIOC_DQBUF"
        )));
        assert!(is_dequeue_timeout(&io::Error::from(io::ErrorKind::Interrupted)));
        assert!(!is_dequeue_timeout(&io::Error::from_raw_os_error(19)));
    }
}
