//! Camera descriptors

use crate::orientation::Rotation;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Direction a camera faces relative to the screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    Front,
    Back,
}

impl Facing {
    pub fn opposite(self) -> Self {
        match self {
            Facing::Front => Facing::Back,
            Facing::Back => Facing::Front,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Facing::Front => "front",
            Facing::Back => "back",
        }
    }
}

impl fmt::Display for Facing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Camera as reported by the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraDescriptor {
    pub id: String,
    pub facing: Facing,
    /// Clockwise rotation of the sensor relative to the device's natural orientation
    pub sensor_orientation: Rotation,
}

impl CameraDescriptor {
    pub fn new(id: impl Into<String>, facing: Facing, sensor_orientation: Rotation) -> Self {
        Self {
            id: id.into(),
            facing,
            sensor_orientation,
        }
    }

    /// Human readable name shown in camera pickers
    pub fn display_name(&self) -> String {
        if self.facing == Facing::Front {
            return "Front Camera".to_string();
        }
        match self.id.as_str() {
            "0" => "Main Camera".to_string(),
            "1" => "Front Camera".to_string(),
            "2" => "Wide Camera".to_string(),
            "3" => "Telephoto Camera".to_string(),
            "4" => "Ultra Wide Camera".to_string(),
            other => format!("Back Camera {}", other),
        }
    }
}

impl fmt::Display for CameraDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (ID: {})", self.display_name(), self.id)
    }
}

/// Drop repeated `(id, facing)` pairs, keeping the first one seen
pub fn dedup_cameras(cameras: Vec<CameraDescriptor>) -> Vec<CameraDescriptor> {
    let mut seen = HashSet::with_capacity(cameras.len());
    cameras
        .into_iter()
        .filter(|camera| seen.insert((camera.id.clone(), camera.facing)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_display_names() {
        let main = CameraDescriptor::new("0", Facing::Back, Rotation::Deg90);
        let front = CameraDescriptor::new("7", Facing::Front, Rotation::Deg270);
        let extra = CameraDescriptor::new("9", Facing::Back, Rotation::Deg90);

        assert_eq!(main.display_name(), "Main Camera");
        assert_eq!(front.display_name(), "Front Camera");
        assert_eq!(extra.display_name(), "Back Camera 9");
        assert_eq!(main.to_string(), "Main Camera (ID: 0)");
    }

    #[test]
    fn test_dedup_keeps_first() {
        let cameras = vec![
            CameraDescriptor::new("0", Facing::Back, Rotation::Deg90),
            CameraDescriptor::new("1", Facing::Front, Rotation::Deg270),
            CameraDescriptor::new("0", Facing::Back, Rotation::Deg0),
            CameraDescriptor::new("0", Facing::Front, Rotation::Deg270),
        ];
        let unique = dedup_cameras(cameras);

        assert_eq!(unique.len(), 3);
        assert_eq!(unique[0].sensor_orientation, Rotation::Deg90);
        assert_eq!(unique[2].facing, Facing::Front);
    }

    fn descriptor() -> impl Strategy<Value = CameraDescriptor> {
        (0u8..4, any::<bool>()).prop_map(|(id, front)| {
            let facing = if front { Facing::Front } else { Facing::Back };
            CameraDescriptor::new(id.to_string(), facing, Rotation::Deg0)
        })
    }

    proptest! {
        #[test]
        fn prop_dedup_unique_and_ordered(cameras in prop::collection::vec(descriptor(), 0..20)) {
            let unique = dedup_cameras(cameras.clone());

            let keys: HashSet<_> = unique.iter().map(|c| (c.id.clone(), c.facing)).collect();
            prop_assert_eq!(keys.len(), unique.len());

            let all: HashSet<_> = cameras.iter().map(|c| (c.id.clone(), c.facing)).collect();
            prop_assert_eq!(all, keys);

            // Survivors keep their relative order
            let mut cursor = cameras.iter();
            for camera in &unique {
                prop_assert!(cursor.any(|c| c == camera));
            }
        }
    }
}
