use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::engine::retained_window::DEFAULT_RETAINED_LIMIT;
use crate::engine::scroll_mode::DEFAULT_BOTTOM_THRESHOLD;
use crate::engine::validation::DEFAULT_MAX_COMMENT_LENGTH;

/// Top-level engine configuration, loaded from danmaku.toml.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    pub session: SessionSection,
    pub display: DisplaySection,
    pub scroll: ScrollSection,
    pub database: DatabaseSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    /// How many prior comments to request when a session starts.
    pub backlog_limit: usize,
    pub max_comment_length: usize,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            backlog_limit: 50,
            max_comment_length: DEFAULT_MAX_COMMENT_LENGTH,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DisplaySection {
    pub retained_limit: usize,
    /// Upper bound on comments held while the tab is hidden. Unset = unbounded.
    pub overflow_cap: Option<usize>,
}

impl Default for DisplaySection {
    fn default() -> Self {
        Self {
            retained_limit: DEFAULT_RETAINED_LIMIT,
            overflow_cap: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScrollSection {
    pub debounce_ms: u64,
    pub bottom_threshold_px: f64,
}

impl Default for ScrollSection {
    fn default() -> Self {
        Self {
            debounce_ms: 100,
            bottom_threshold_px: DEFAULT_BOTTOM_THRESHOLD,
        }
    }
}

impl ScrollSection {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    pub url: String,
    /// Persist mute settings. When off, mutes live only in memory.
    pub persist: bool,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            url: "sqlite:danmaku.db?mode=rwc".into(),
            persist: true,
        }
    }
}

impl EngineConfig {
    /// Load config from a TOML file. Falls back to defaults if the file doesn't exist.
    /// Environment variables override TOML values.
    pub fn load(path: &str) -> Result<Self, String> {
        let mut config = if Path::new(path).exists() {
            let contents = std::fs::read_to_string(path)
                .map_err(|e| format!("failed to read config file {}: {}", path, e))?;
            Self::from_toml(&contents)
                .map_err(|e| format!("failed to parse config file {}: {}", path, e))?
        } else {
            info!("No config file found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("DANMAKU_BACKLOG_LIMIT")
            && let Ok(limit) = v.parse()
        {
            self.session.backlog_limit = limit;
        }
        if let Ok(v) = std::env::var("DANMAKU_RETAINED_LIMIT")
            && let Ok(limit) = v.parse()
        {
            self.display.retained_limit = limit;
        }
        if let Ok(v) = std::env::var("DANMAKU_OVERFLOW_CAP") {
            // An empty value clears a cap set in the config file.
            if v.trim().is_empty() {
                self.display.overflow_cap = None;
            } else if let Ok(cap) = v.trim().parse() {
                self.display.overflow_cap = Some(cap);
            }
        }
        if let Ok(v) = std::env::var("DANMAKU_SCROLL_DEBOUNCE_MS")
            && let Ok(ms) = v.parse()
        {
            self.scroll.debounce_ms = ms;
        }
        if let Ok(v) = std::env::var("DANMAKU_BOTTOM_THRESHOLD_PX")
            && let Ok(px) = v.parse()
        {
            self.scroll.bottom_threshold_px = px;
        }
        if let Ok(v) = std::env::var("DATABASE_URL") {
            self.database.url = v;
        }
    }
}
