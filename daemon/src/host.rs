/// OS registration of the presence indicator.
///
/// [`PresenceHost`] is the seam between the lifecycle controller and whatever
/// the platform uses to keep a persistent task visible. The bundled
/// [`IndicatorFileHost`] publishes the indicator as `indicator.toml` in the data
/// directory, where a tray applet or shell prompt can pick it up. There is only
/// ever one published indicator; registering again replaces it.
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::indicator::IndicatorArtifact;

pub trait PresenceHost {
    /// Makes `artifact` the live indicator, tagged with the category's
    /// platform flag when one was declared. Re-registering the same id
    /// updates it in place.
    fn register(&mut self, artifact: &IndicatorArtifact, platform_flag: Option<u32>) -> Result<()>;

    /// Removes the live indicator. Succeeds when nothing is registered.
    fn deregister(&mut self) -> Result<()>;

    /// Removes a published indicator with the given id, if there is one.
    fn cancel(&mut self, id: i32) -> Result<()>;
}

/// On-disk form of the published indicator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedIndicator {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform_flag: Option<u32>,
    /// RFC 3339 timestamp of the last registration.
    pub published_at: String,
    pub indicator: IndicatorArtifact,
}

pub struct IndicatorFileHost {
    path: PathBuf,
}

impl IndicatorFileHost {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Reads the currently published indicator, if any.
    #[cfg(test)]
    pub fn read(&self) -> Result<Option<PublishedIndicator>> {
        read_published(&self.path)
    }
}

impl PresenceHost for IndicatorFileHost {
    fn register(&mut self, artifact: &IndicatorArtifact, platform_flag: Option<u32>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        let published = PublishedIndicator {
            platform_flag,
            published_at: chrono::Local::now().to_rfc3339(),
            indicator: artifact.clone(),
        };
        let content = toml::to_string_pretty(&published).context("Failed to serialize indicator")?;

        // Write-then-rename so readers never observe a half-written indicator.
        let tmp = self.path.with_extension("toml.tmp");
        std::fs::write(&tmp, content)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to publish {}", self.path.display()))?;

        info!(id = artifact.id, ?platform_flag, "indicator published");
        Ok(())
    }

    fn deregister(&mut self) -> Result<()> {
        remove_if_present(&self.path)
    }

    fn cancel(&mut self, id: i32) -> Result<()> {
        match read_published(&self.path)? {
            Some(published) if published.indicator.id == id => remove_if_present(&self.path),
            _ => {
                debug!(id, "no published indicator with this id");
                Ok(())
            }
        }
    }
}

fn read_published(path: &Path) -> Result<Option<PublishedIndicator>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let published = toml::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(Some(published))
}

fn remove_if_present(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            info!(path = %path.display(), "indicator removed");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
    }
}
