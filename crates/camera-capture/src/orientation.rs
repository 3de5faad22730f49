//! Device orientation tracking and rotation rules

use crate::descriptor::Facing;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

/// Clockwise rotation in quarter turns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn degrees(self) -> u32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    /// Exact multiple of 90 in `0..360`
    pub fn from_degrees(degrees: u32) -> Option<Self> {
        match degrees {
            0 => Some(Rotation::Deg0),
            90 => Some(Rotation::Deg90),
            180 => Some(Rotation::Deg180),
            270 => Some(Rotation::Deg270),
            _ => None,
        }
    }

    /// Bucket a raw reading into the nearest quarter turn
    pub fn quantize(degrees: i32) -> Self {
        match degrees.rem_euclid(360) {
            45..=134 => Rotation::Deg90,
            135..=224 => Rotation::Deg180,
            225..=314 => Rotation::Deg270,
            _ => Rotation::Deg0,
        }
    }

    /// True when width and height trade places
    pub fn swaps_dimensions(self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

/// Rotation that turns a sensor-oriented frame upright for the viewer.
///
/// Front cameras are mirrored, so the device rotation is subtracted.
pub fn required_rotation(facing: Facing, sensor: Rotation, device: Rotation) -> Rotation {
    let sensor = sensor.degrees();
    let device = device.degrees();
    let degrees = match facing {
        Facing::Front => (sensor + 360 - device) % 360,
        Facing::Back => (sensor + device) % 360,
    };
    // Both operands are quarter turns, so the sum is too
    Rotation::from_degrees(degrees).unwrap_or_default()
}

/// Debounced device orientation, written by sensors and read per frame
#[derive(Debug, Default)]
pub struct OrientationTracker {
    degrees: AtomicU32,
}

impl OrientationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current quantized device orientation
    pub fn current(&self) -> Rotation {
        Rotation::from_degrees(self.degrees.load(Ordering::Acquire)).unwrap_or_default()
    }

    /// Feed a raw reading. `None` means the platform could not tell.
    ///
    /// Returns the new orientation when the reading moved to another bucket.
    pub fn observe(&self, reading: Option<i32>) -> Option<Rotation> {
        let rotation = Rotation::quantize(reading?);
        let previous = self.degrees.swap(rotation.degrees(), Ordering::AcqRel);
        if previous == rotation.degrees() {
            return None;
        }
        debug!("Device orientation changed: {}° -> {}", previous, rotation);
        Some(rotation)
    }

    pub fn reset(&self) {
        self.degrees.store(0, Ordering::Release);
    }
}

/// Source of device orientation readings
pub trait OrientationSensor: Send + Sync {
    /// Start delivering readings into `tracker`.
    ///
    /// Returns false when the platform cannot detect orientation.
    fn enable(&self, tracker: Arc<OrientationTracker>) -> bool;

    fn disable(&self);
}

/// Sensor for platforms without orientation detection; the device stays at 0°
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedOrientation;

impl OrientationSensor for FixedOrientation {
    fn enable(&self, _tracker: Arc<OrientationTracker>) -> bool {
        false
    }

    fn disable(&self) {}
}

/// Sensor fed by the host application
#[derive(Debug, Default)]
pub struct ManualOrientation {
    initial: Option<i32>,
    tracker: Mutex<Option<Arc<OrientationTracker>>>,
}

impl ManualOrientation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sensor that reports `degrees` as soon as it is enabled
    pub fn with_initial(degrees: i32) -> Self {
        Self {
            initial: Some(degrees),
            tracker: Mutex::new(None),
        }
    }

    /// Deliver a raw reading. Ignored while disabled.
    pub fn report(&self, reading: Option<i32>) -> Option<Rotation> {
        let tracker = self
            .tracker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        tracker.and_then(|tracker| tracker.observe(reading))
    }

    pub fn is_enabled(&self) -> bool {
        self.tracker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl OrientationSensor for ManualOrientation {
    fn enable(&self, tracker: Arc<OrientationTracker>) -> bool {
        if let Some(degrees) = self.initial {
            tracker.observe(Some(degrees));
        }
        *self.tracker.lock().unwrap_or_else(PoisonError::into_inner) = Some(tracker);
        info!("Orientation sensor enabled");
        true
    }

    fn disable(&self) {
        if self
            .tracker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some()
        {
            info!("Orientation sensor disabled");
        }
    }
}
