use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub enum Capability {
    Camera,
    Media,
    Overlay,
    Screenshot,
}

impl Capability {
    pub const ALL: [Capability; 4] = [
        Capability::Camera,
        Capability::Media,
        Capability::Overlay,
        Capability::Screenshot,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Camera => "camera",
            Capability::Media => "media",
            Capability::Overlay => "overlay",
            Capability::Screenshot => "screenshot",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Capability::Camera => "Camera",
            Capability::Media => "Photo Library",
            Capability::Overlay => "Display over other apps",
            Capability::Screenshot => "Screenshot",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Capability::Camera => "Take photos to analyze",
            Capability::Media => "Save and access photos",
            Capability::Overlay => "Show the capture button over other apps",
            Capability::Screenshot => "Capture screenshots for analysis",
        }
    }

    /// Whether this capability is needed before the session may go active.
    pub fn required_by_default(&self) -> bool {
        matches!(self, Capability::Camera | Capability::Screenshot)
    }

    /// Drawing over other apps only exists on Android; everything else is
    /// meaningful on every target.
    pub fn applies_to(&self, platform: Platform) -> bool {
        match self {
            Capability::Overlay => platform == Platform::Android,
            Capability::Camera | Capability::Media | Capability::Screenshot => true,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Platform {
    Android,
    Ios,
    Desktop,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "android") {
            Platform::Android
        } else if cfg!(target_os = "ios") {
            Platform::Ios
        } else {
            Platform::Desktop
        }
    }
}
