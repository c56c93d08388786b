/// Presence configuration: the validated description of the persistent
/// indicator a host application wants shown while its background work runs.
///
/// Commands carry a loosely-typed [`RawPresenceConfig`] (every field optional,
/// camelCase on the wire). It is validated exactly once, at the boundary, into a
/// [`PresenceConfig`]; nothing downstream re-checks required fields.
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_ICON: &str = "ic_notification";
pub const DEFAULT_LARGE_ICON: &str = "ic_launcher";
pub const DEFAULT_MAIN_ON_PRESS: &str = "mainOnPress";
pub const MAX_ACTIONS: usize = 2;

/// Declared category of the background work. Some categories need their own
/// capability on top of the base one; see [`crate::permission`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WorkCategory {
    DataSync,
    Location,
    MediaPlayback,
}

impl WorkCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkCategory::DataSync => "dataSync",
            WorkCategory::Location => "location",
            WorkCategory::MediaPlayback => "mediaPlayback",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Private,
    #[default]
    Public,
    Secret,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    None,
    Min,
    Low,
    Default,
    High,
    #[default]
    Max,
}

/// A button shown on the indicator. `on_press_event` is the identifier
/// reported back to the host application when the button is pressed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorAction {
    pub text: String,
    pub on_press_event: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub max: u32,
    pub curr: u32,
}

/// Optional presentation fields. All defaults match what the indicator shows
/// when the caller leaves a field out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Presentation {
    pub color: Option<String>,
    pub icon: String,
    pub large_icon: String,
    pub visibility: Visibility,
    pub importance: Importance,
    pub badge: Option<String>,
    pub actions: Vec<IndicatorAction>,
    pub main_on_press: String,
    pub progress: Option<Progress>,
    pub only_alert_once: bool,
    pub ongoing: bool,
    pub vibration: bool,
}

impl Default for Presentation {
    fn default() -> Self {
        Self {
            color: None,
            icon: DEFAULT_ICON.to_string(),
            large_icon: DEFAULT_LARGE_ICON.to_string(),
            visibility: Visibility::default(),
            importance: Importance::default(),
            badge: None,
            actions: Vec::new(),
            main_on_press: DEFAULT_MAIN_ON_PRESS.to_string(),
            progress: None,
            only_alert_once: true,
            ongoing: false,
            vibration: false,
        }
    }
}

/// A validated, immutable presence configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresenceConfig {
    pub id: i32,
    pub title: String,
    pub message: String,
    pub work_category: Option<WorkCategory>,
    pub presentation: Presentation,
}

#[cfg(test)]
impl PresenceConfig {
    /// Builds a config with default presentation.
    pub fn new(id: i32, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            message: message.into(),
            work_category: None,
            presentation: Presentation::default(),
        }
    }

    pub fn with_category(mut self, category: WorkCategory) -> Self {
        self.work_category = Some(category);
        self
    }
}

/// Wire form of a presence configuration, as received from the host
/// application. Unknown keys are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPresenceConfig {
    pub id: Option<f64>,
    pub title: Option<String>,
    pub message: Option<String>,
    #[serde(alias = "serviceType")]
    pub work_category: Option<WorkCategory>,
    pub color: Option<String>,
    pub icon: Option<String>,
    pub large_icon: Option<String>,
    pub visibility: Option<Visibility>,
    pub importance: Option<Importance>,
    pub number: Option<String>,
    pub button: Option<IndicatorAction>,
    pub button2: Option<IndicatorAction>,
    pub main_on_press: Option<String>,
    pub progress: Option<Progress>,
    pub set_only_alert_once: Option<bool>,
    pub ongoing: Option<bool>,
    pub vibration: Option<bool>,
}

impl TryFrom<RawPresenceConfig> for PresenceConfig {
    type Error = ConfigError;

    fn try_from(raw: RawPresenceConfig) -> Result<Self, Self::Error> {
        let id = raw.id.ok_or(ConfigError::Missing("id"))?;
        // Ids arrive as JSON numbers; only whole numbers that fit an i32 are usable.
        if id.fract() != 0.0 || id < i32::MIN as f64 || id > i32::MAX as f64 {
            return Err(ConfigError::Malformed {
                field: "id",
                reason: format!("{id} is not a 32-bit integer"),
            });
        }
        let title = raw.title.ok_or(ConfigError::Missing("title"))?;
        let message = raw.message.ok_or(ConfigError::Missing("message"))?;

        let defaults = Presentation::default();
        let presentation = Presentation {
            color: raw.color,
            icon: raw.icon.unwrap_or(defaults.icon),
            large_icon: raw.large_icon.unwrap_or(defaults.large_icon),
            visibility: raw.visibility.unwrap_or(defaults.visibility),
            importance: raw.importance.unwrap_or(defaults.importance),
            badge: raw.number,
            actions: raw.button.into_iter().chain(raw.button2).collect(),
            main_on_press: raw.main_on_press.unwrap_or(defaults.main_on_press),
            progress: raw.progress,
            only_alert_once: raw.set_only_alert_once.unwrap_or(defaults.only_alert_once),
            ongoing: raw.ongoing.unwrap_or(defaults.ongoing),
            vibration: raw.vibration.unwrap_or(defaults.vibration),
        };
        debug_assert!(presentation.actions.len() <= MAX_ACTIONS);

        Ok(Self {
            id: id as i32,
            title,
            message,
            work_category: raw.work_category,
            presentation,
        })
    }
}
