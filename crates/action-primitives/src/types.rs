//! Core data types for page interactions

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Navigation completion gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitUntil {
    /// DOMContentLoaded fired
    DomContentLoaded,

    /// `load` event fired
    #[default]
    Load,

    /// Network quiet for the driver's idle window
    NetworkIdle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigateOptions {
    pub timeout: Duration,
    pub wait_until: WaitUntil,
}

impl Default for NavigateOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            wait_until: WaitUntil::Load,
        }
    }
}

/// Options for element interactions (click, fill, visibility probes)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractOptions {
    pub timeout: Duration,
    pub force: bool,
}

impl InteractOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }
}

impl Default for InteractOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            force: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScreenshotOptions {
    pub full_page: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Rectangle in CSS pixels relative to the viewport
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Region {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn center(&self) -> Point {
        Point {
            x: self.x + self.width / 2.0,
            y: self.y + self.height / 2.0,
        }
    }
}

/// Stored visual signature of the element a step interacted with when the
/// test was recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualFingerprint {
    /// Perceptual hash or matcher-specific signature
    pub signature: String,

    /// Where the element was when the fingerprint was captured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<Region>,

    /// Human-readable hint (visible text, alt text)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Result of matching a fingerprint against the live page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualMatch {
    pub found: bool,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<Region>,
}

impl VisualMatch {
    pub fn not_found() -> Self {
        Self {
            found: false,
            confidence: 0.0,
            region: None,
        }
    }

    pub fn at(region: Region, confidence: f64) -> Self {
        Self {
            found: true,
            confidence,
            region: Some(region),
        }
    }

    /// Matched region, present only when the matcher reported a hit
    pub fn hit(&self) -> Option<Region> {
        if self.found {
            self.region
        } else {
            None
        }
    }
}

/// Trace/video artifact finalised when a page is torn down
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub kind: String,
    pub location: String,
}
