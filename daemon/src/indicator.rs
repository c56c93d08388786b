/// Indicator composition: turns a [`PresenceConfig`] into the artifact the host
/// publishes while the presence is live.
///
/// Builders must be deterministic for a given config so that re-registering
/// under the same id updates the indicator in place.
use serde::{Deserialize, Serialize};

use crate::presence::{Importance, IndicatorAction, PresenceConfig, Progress, Visibility};

/// The composed, ready-to-publish indicator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorArtifact {
    pub id: i32,
    pub title: String,
    pub text: String,
    /// `0xRRGGBB`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    pub small_icon: String,
    pub large_icon: String,
    pub visibility: Visibility,
    pub importance: Importance,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge: Option<String>,
    pub main_on_press: String,
    pub only_alert_once: bool,
    pub ongoing: bool,
    pub vibration: bool,
    // Table-valued fields stay last so the TOML form serializes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<Progress>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<IndicatorAction>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildFailure {
    #[error("color '{0}' is not of the form #RRGGBB")]
    InvalidColor(String),

    #[error("progress {curr} exceeds maximum {max}")]
    InvalidProgress { curr: u32, max: u32 },

    #[error("action {0} has no text")]
    EmptyAction(usize),
}

pub trait IndicatorBuilder {
    fn build(&self, config: &PresenceConfig) -> Result<IndicatorArtifact, BuildFailure>;
}

/// Default builder: validates presentation fields and copies them through.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardIndicatorBuilder;

impl IndicatorBuilder for StandardIndicatorBuilder {
    fn build(&self, config: &PresenceConfig) -> Result<IndicatorArtifact, BuildFailure> {
        let p = &config.presentation;

        let color = p.color.as_deref().map(parse_color).transpose()?;

        if let Some(progress) = p.progress {
            if progress.curr > progress.max {
                return Err(BuildFailure::InvalidProgress {
                    curr: progress.curr,
                    max: progress.max,
                });
            }
        }

        if let Some(idx) = p.actions.iter().position(|a| a.text.trim().is_empty()) {
            return Err(BuildFailure::EmptyAction(idx));
        }

        Ok(IndicatorArtifact {
            id: config.id,
            title: config.title.clone(),
            text: config.message.clone(),
            color,
            small_icon: p.icon.clone(),
            large_icon: p.large_icon.clone(),
            visibility: p.visibility,
            importance: p.importance,
            badge: p.badge.clone(),
            main_on_press: p.main_on_press.clone(),
            only_alert_once: p.only_alert_once,
            ongoing: p.ongoing,
            vibration: p.vibration,
            progress: p.progress,
            actions: p.actions.clone(),
        })
    }
}

/// Parses `#RRGGBB` (case-insensitive) into `0xRRGGBB`.
fn parse_color(s: &str) -> Result<u32, BuildFailure> {
    let invalid = || BuildFailure::InvalidColor(s.to_string());
    let hex = s.strip_prefix('#').ok_or_else(invalid)?;
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }
    u32::from_str_radix(hex, 16).map_err(|_| invalid())
}
