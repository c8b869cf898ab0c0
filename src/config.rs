//! Persisted application settings.

use std::path::PathBuf;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use log::debug;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub width: f64,
    pub height: f64,
    pub book_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            width: 1200.0,
            height: 1200.0,
            book_dir: None,
        }
    }
}

fn config_file() -> Option<PathBuf> {
    ProjectDirs::from("com", "devo", "devo").map(|dirs| dirs.config_dir().join("config.json"))
}

impl AppConfig {
    /// Load the saved config, falling back to defaults when missing or
    /// unreadable.
    pub fn load() -> Self {
        let Some(path) = config_file() else {
            return Self::default();
        };
        match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_default(),
            Err(err) => {
                debug!("no config at {}: {}", path.display(), err);
                Self::default()
            }
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = config_file().context("no config directory available")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, text).with_context(|| format!("writing {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let cfg: AppConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.width, 1200.0);
        assert_eq!(cfg.height, 1200.0);
        assert!(cfg.book_dir.is_none());
    }

    #[test]
    fn roundtrips_through_json() {
        let cfg = AppConfig {
            width: 900.0,
            height: 700.0,
            book_dir: Some(PathBuf::from("/books/limp")),
        };
        let text = serde_json::to_string(&cfg).unwrap();
        let back: AppConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(back.width, 900.0);
        assert_eq!(back.book_dir, cfg.book_dir);
    }
}
