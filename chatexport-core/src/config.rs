use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ExportError, Result};
use crate::message::{DedupStrategy, MIN_CONTENT_CHARS};
use crate::render::ExportFormat;

/// Environment variable that overrides `[output] dir`.
pub const OUTPUT_DIR_ENV: &str = "CHATEXPORT_OUTPUT_DIR";

/// Settings for export and batch delete, read from
/// `~/.chatexport/config.toml`. Every field has a default, so an empty file
/// (or none at all) is a valid configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub scroll: ScrollConfig,
    pub batch: BatchConfig,
    pub output: OutputConfig,
}

/// Timing and bounds for the two-phase scroll collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrollConfig {
    /// Pause after a jump to either end of the list.
    pub settle_ms: u64,
    /// Pause after each upward loading step.
    pub load_step_ms: u64,
    /// Pause after each downward collection step.
    pub collect_step_ms: u64,
    /// Pause before the final collection at the bottom.
    pub final_settle_ms: u64,
    /// Loading wait after the first jump to the bottom.
    pub initial_loading_wait_ms: u64,
    /// Loading wait once the top has been reached.
    pub loading_wait_ms: u64,
    pub loading_poll_ms: u64,
    /// Step bound for each phase.
    pub max_steps: usize,
    /// Upward step, in viewports.
    pub load_step_factor: f64,
    /// Downward step, in viewports. Below 1.0 so consecutive windows overlap.
    pub collect_step_factor: f64,
    /// Viewport height assumed when the container reports zero.
    pub fallback_viewport: f64,
    pub min_content_chars: usize,
    pub dedup: DedupStrategy,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            settle_ms: 500,
            load_step_ms: 150,
            collect_step_ms: 200,
            final_settle_ms: 300,
            initial_loading_wait_ms: 2000,
            loading_wait_ms: 8000,
            loading_poll_ms: 200,
            max_steps: 500,
            load_step_factor: 1.5,
            collect_step_factor: 0.8,
            fallback_viewport: 500.0,
            min_content_chars: MIN_CONTENT_CHARS,
            dedup: DedupStrategy::PrefixLength,
        }
    }
}

/// Delays between the UI steps of deleting one conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub hover_ms: u64,
    pub menu_ms: u64,
    pub dialog_ms: u64,
    pub delete_animation_ms: u64,
    pub between_ms: u64,
    pub escape_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            hover_ms: 300,
            menu_ms: 500,
            dialog_ms: 500,
            delete_animation_ms: 800,
            between_ms: 800,
            escape_ms: 200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Where exports are written; current directory when unset.
    pub dir: Option<PathBuf>,
    pub format: ExportFormat,
    /// Heading used for assistant turns in the rendered output.
    pub assistant_label: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: None,
            format: ExportFormat::Markdown,
            assistant_label: "Gemini".to_string(),
        }
    }
}

pub(crate) fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

impl ExportConfig {
    /// Default config file path: ~/.chatexport/config.toml
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".chatexport/config.toml")
    }

    /// Load from `path`, or from the default location when `None`.
    ///
    /// An explicit path must exist; a missing default file yields defaults.
    /// `CHATEXPORT_OUTPUT_DIR` is applied on top either way.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default = Self::default_path();
                if default.exists() {
                    Self::from_file(&default)?
                } else {
                    Self::default()
                }
            }
        };

        if let Ok(dir) = env::var(OUTPUT_DIR_ENV) {
            if !dir.trim().is_empty() {
                config.output.dir = Some(PathBuf::from(dir));
            }
        }

        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            ExportError::config(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        toml::from_str(&content).map_err(|e| {
            ExportError::config(format!("Failed to parse config file {:?}: {}", path, e))
        })
    }

    fn validate(&self) -> Result<()> {
        let scroll = &self.scroll;
        if scroll.load_step_factor <= 0.0 || scroll.collect_step_factor <= 0.0 {
            return Err(ExportError::config("scroll step factors must be positive"));
        }
        if scroll.fallback_viewport <= 0.0 {
            return Err(ExportError::config("fallback_viewport must be positive"));
        }
        if scroll.max_steps == 0 {
            return Err(ExportError::config("max_steps must be at least 1"));
        }
        let waits_for_loading = scroll.initial_loading_wait_ms > 0 || scroll.loading_wait_ms > 0;
        if waits_for_loading && scroll.loading_poll_ms == 0 {
            return Err(ExportError::config(
                "loading_poll_ms must be positive when a loading wait is set",
            ));
        }
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| ExportError::config(format!("Failed to serialize config: {}", e)))?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output.dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    /// Same bounds, no waiting. For fixtures and tests, where the page
    /// settles synchronously.
    pub fn instant() -> Self {
        let mut config = Self::default();
        config.zero_delays();
        config
    }

    /// Zero every timed pause, keeping step bounds and factors.
    pub fn zero_delays(&mut self) {
        let scroll = &mut self.scroll;
        scroll.settle_ms = 0;
        scroll.load_step_ms = 0;
        scroll.collect_step_ms = 0;
        scroll.final_settle_ms = 0;
        scroll.initial_loading_wait_ms = 0;
        scroll.loading_wait_ms = 0;
        scroll.loading_poll_ms = 0;
        self.batch = BatchConfig {
            hover_ms: 0,
            menu_ms: 0,
            dialog_ms: 0,
            delete_animation_ms: 0,
            between_ms: 0,
            escape_ms: 0,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[scroll]\nmax_steps = 40\ndedup = \"content-digest\"\n\n[output]\nassistant_label = \"Bard\"\n",
        )
        .unwrap();

        let config = ExportConfig::from_file(&path).unwrap();
        assert_eq!(config.scroll.max_steps, 40);
        assert_eq!(config.scroll.dedup, DedupStrategy::ContentDigest);
        assert_eq!(config.scroll.load_step_ms, 150);
        assert_eq!(config.batch.hover_ms, 300);
        assert_eq!(config.output.assistant_label, "Bard");
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/config.toml");
        let mut config = ExportConfig::default();
        config.output.format = ExportFormat::Html;
        config.save(&path).unwrap();

        let loaded = ExportConfig::from_file(&path).unwrap();
        assert_eq!(loaded.output.format, ExportFormat::Html);
        assert_eq!(loaded.scroll, ScrollConfig::default());
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = ExportConfig::load(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn invalid_values_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[scroll]\ncollect_step_factor = 0.0\n").unwrap();
        assert!(ExportConfig::load(Some(&path)).is_err());
    }

    #[test]
    fn zero_poll_with_loading_wait_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[scroll]\nloading_poll_ms = 0\n").unwrap();
        let err = ExportConfig::load(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("loading_poll_ms"));

        fs::write(
            &path,
            "[scroll]\nloading_poll_ms = 0\ninitial_loading_wait_ms = 0\nloading_wait_ms = 0\n",
        )
        .unwrap();
        assert!(ExportConfig::load(Some(&path)).is_ok());
    }

    #[test]
    fn instant_zeroes_delays_only() {
        let config = ExportConfig::instant();
        assert_eq!(config.scroll.settle_ms, 0);
        assert_eq!(config.batch.between_ms, 0);
        assert_eq!(config.scroll.max_steps, 500);
    }
}
