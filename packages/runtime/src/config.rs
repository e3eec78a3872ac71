use folio_engine::SessionOptions;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_NAME: &str = "folio.config.json";

/// Preview configuration file format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PreviewConfig {
    /// Quiet period after the last edit before regenerating
    pub quiescence_ms: u64,

    /// Interval of the countdown shown while the window runs
    pub countdown_tick_ms: u64,

    /// Upper bound for a single page content fetch
    pub hydration_timeout_ms: u64,

    /// Neighbours on each side prefetched after a page is shown
    pub prefetch_radius: usize,

    /// Capacity of the command and observer channels
    pub event_buffer: usize,

    /// Ignore edits until the first preview has been generated
    pub initial_load_grace: bool,
}

impl PreviewConfig {
    /// Load config from a directory
    pub fn load(cwd: &Path) -> anyhow::Result<Self> {
        let config_path = cwd.join(DEFAULT_CONFIG_NAME);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: PreviewConfig = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            Ok(PreviewConfig::default())
        }
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            quiescence: Duration::from_millis(self.quiescence_ms),
            countdown_tick: Duration::from_millis(self.countdown_tick_ms),
            prefetch_radius: self.prefetch_radius,
            initial_load_grace: self.initial_load_grace,
        }
    }

    pub fn hydration_timeout(&self) -> Duration {
        Duration::from_millis(self.hydration_timeout_ms)
    }
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            quiescence_ms: 2000,
            countdown_tick_ms: 1000,
            hydration_timeout_ms: 10_000,
            prefetch_radius: 1,
            event_buffer: 100,
            initial_load_grace: true,
        }
    }
}
