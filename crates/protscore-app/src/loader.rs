//! Extension points for host applications that construct plugins.

use crate::app::{ScoringApp, SequenceScorer};
use crate::config::AppConfig;
use crate::device::DeviceSpec;
use protscore_core::Result;
use std::path::Path;

/// Constructs scoring plugins for a compute target.
///
/// A host runtime holds one of these and calls [`load_app`](Self::load_app)
/// with the target it wants (`"cpu"`, `"cuda:0"`, ...). Implement this trait to
/// ship plugins whose embedding provider or scoring model is not the built-in
/// Candle stack.
pub trait AppLoaderPlugin: Send + Sync {
    /// Build a plugin instance on the given compute target.
    fn load_app(&self, device: &str) -> Result<Box<dyn ScoringApp>>;

    /// Human-readable summary of what this loader builds.
    fn describe(&self) -> String;
}

/// Loader backed by an [`AppConfig`]
#[derive(Debug, Clone)]
pub struct ConfiguredAppLoader {
    config: AppConfig,
}

impl ConfiguredAppLoader {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    /// Create a loader from a YAML configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(AppConfig::from_file(path)?))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

impl AppLoaderPlugin for ConfiguredAppLoader {
    fn load_app(&self, device: &str) -> Result<Box<dyn ScoringApp>> {
        let device: DeviceSpec = device.parse()?;
        Ok(Box::new(SequenceScorer::from_config_on(&self.config, device)?))
    }

    fn describe(&self) -> String {
        let source = self
            .config
            .transformer
            .resolved_source()
            .map(|s| s.to_string())
            .unwrap_or_else(|e| format!("<{}>", e));

        format!(
            "{} ({} pooling) -> {} -> [{}]",
            source,
            self.config.transformer.pooling,
            self.config.checkpoint.path.display(),
            self.config.score_names.join(", ")
        )
    }
}
