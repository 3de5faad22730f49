//! Persisted camera preferences

use crate::descriptor::Facing;

/// Camera choice remembered between runs
pub trait PreferenceStore: Send + Sync {
    fn selected_camera_id(&self) -> Option<String>;

    fn default_facing(&self) -> Facing;
}

/// Preferences fixed at startup from configuration
#[derive(Debug, Clone)]
pub struct StaticPreferences {
    pub selected_camera_id: Option<String>,
    pub default_facing: Facing,
}

impl Default for StaticPreferences {
    fn default() -> Self {
        Self {
            selected_camera_id: None,
            default_facing: Facing::Back,
        }
    }
}

impl PreferenceStore for StaticPreferences {
    fn selected_camera_id(&self) -> Option<String> {
        self.selected_camera_id
            .clone()
            .filter(|id| !id.trim().is_empty())
    }

    fn default_facing(&self) -> Facing {
        self.default_facing
    }
}
