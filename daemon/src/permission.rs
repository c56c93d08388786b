/// Capability gate deciding whether a presence of a given work category may be
/// shown right now.
///
/// The gate holds no state of its own beyond the platform thresholds; grants and
/// the OS generation are read from a [`CapabilitySource`] on every call, so a
/// config reload that swaps the source takes effect on the next command.
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::presence::WorkCategory;

/// A capability the OS may or may not have granted to this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Minimal capability needed to show any persistent indicator.
    PostIndicator,
    LocationWork,
    MediaPlaybackWork,
}

impl Capability {
    pub fn as_str(self) -> &'static str {
        match self {
            Capability::PostIndicator => "post_indicator",
            Capability::LocationWork => "location_work",
            Capability::MediaPlaybackWork => "media_playback_work",
        }
    }
}

/// Registration requirements for one work category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategorySpec {
    /// Capability needed in addition to the base one, if any.
    pub required_capability: Option<Capability>,
    /// Flag passed to the OS when registering the indicator.
    pub platform_flag: u32,
}

impl WorkCategory {
    pub const fn spec(self) -> CategorySpec {
        match self {
            WorkCategory::DataSync => CategorySpec {
                required_capability: None,
                platform_flag: 1,
            },
            WorkCategory::MediaPlayback => CategorySpec {
                required_capability: Some(Capability::MediaPlaybackWork),
                platform_flag: 2,
            },
            WorkCategory::Location => CategorySpec {
                required_capability: Some(Capability::LocationWork),
                platform_flag: 8,
            },
        }
    }
}

/// The OS capability layer as seen by the gate.
pub trait CapabilitySource {
    /// Generation number of the running OS, compared against the thresholds.
    fn os_version(&self) -> u32;
    fn is_granted(&self, capability: Capability) -> bool;
}

/// A fixed set of grants, loaded from the daemon config.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrantTable {
    pub os_version: u32,
    pub granted: HashSet<Capability>,
}

impl GrantTable {
    pub fn new(os_version: u32, granted: impl IntoIterator<Item = Capability>) -> Self {
        Self {
            os_version,
            granted: granted.into_iter().collect(),
        }
    }
}

impl CapabilitySource for GrantTable {
    fn os_version(&self) -> u32 {
        self.os_version
    }

    fn is_granted(&self, capability: Capability) -> bool {
        self.granted.contains(&capability)
    }
}

/// OS generations at which requirements become mandatory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Thresholds {
    pub base_capability: u32,
    pub category_declaration: u32,
}

pub struct PermissionGate {
    thresholds: Thresholds,
    source: Box<dyn CapabilitySource>,
}

impl PermissionGate {
    pub fn new(thresholds: Thresholds, source: Box<dyn CapabilitySource>) -> Self {
        Self { thresholds, source }
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    pub fn os_version(&self) -> u32 {
        self.source.os_version()
    }

    /// Installs a new capability source and thresholds (config reload).
    pub fn replace(&mut self, thresholds: Thresholds, source: Box<dyn CapabilitySource>) {
        self.thresholds = thresholds;
        self.source = source;
    }

    /// True when the base indicator capability is granted, or not required at
    /// this OS generation.
    pub fn has_base_capability(&self) -> bool {
        if self.source.os_version() < self.thresholds.base_capability {
            return true;
        }
        self.source.is_granted(Capability::PostIndicator)
    }

    /// True when registrations must name a work category.
    pub fn requires_category_declaration(&self) -> bool {
        self.source.os_version() >= self.thresholds.category_declaration
    }

    pub fn is_category_authorized(&self, category: WorkCategory) -> bool {
        self.has_base_capability() && self.missing_category_capability(category).is_none()
    }

    /// Category capabilities only apply where categories must be declared.
    fn missing_category_capability(&self, category: WorkCategory) -> Option<Capability> {
        if !self.requires_category_declaration() {
            return None;
        }
        category
            .spec()
            .required_capability
            .filter(|cap| !self.source.is_granted(*cap))
    }

    /// Human-readable reason for the most specific unmet requirement. The base
    /// capability is reported before any category-specific one.
    pub fn explain(&self, category: WorkCategory) -> String {
        if !self.has_base_capability() {
            return format!(
                "capability '{}' is required on OS generation {} and above; grant it before starting the presence",
                Capability::PostIndicator.as_str(),
                self.thresholds.base_capability,
            );
        }
        if let Some(cap) = self.missing_category_capability(category) {
            return format!(
                "capability '{}' is required for work category '{}'; grant it before starting the presence",
                cap.as_str(),
                category.as_str(),
            );
        }
        format!("work category '{}' is authorized", category.as_str())
    }
}
