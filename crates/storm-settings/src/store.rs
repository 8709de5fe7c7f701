//! File-backed settings store.
//!
//! Loading flow:
//! 1. Start from compiled [`SavedSettings::default()`]
//! 2. If the file exists, deep-merge its values over the defaults
//! 3. An unreadable or unparseable file is replaced with defaults (the
//!    panel must keep working even if the file was hand-edited badly)
//!
//! Deep merge rules:
//! - Objects are merged recursively (file overrides defaults per-key)
//! - Arrays and primitives are replaced entirely
//! - Nulls in the file are skipped (preserving defaults)

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::SavedSettings;

/// Resolve the application data directory (`$STORM_DATA_DIR` else
/// `~/.streamstorm`).
pub fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("STORM_DATA_DIR") {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".streamstorm")
}

/// Serializes writers to `settings.json`. Reads always go through the file,
/// so the panel sees hand edits on the next request.
pub struct SettingsStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl SettingsStore {
    /// Store at the default location, creating the file if missing.
    pub fn open_default() -> Self {
        Self::at(data_dir().join("settings.json"))
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load settings, falling back to (and persisting) defaults when the
    /// file is missing or broken.
    pub fn load(&self) -> SavedSettings {
        let defaults = SavedSettings::default();
        if !self.path.exists() {
            debug!(path = %self.path.display(), "settings file not found, writing defaults");
            if let Err(e) = self.save(&defaults) {
                warn!(error = %e, "failed to write default settings");
            }
            return defaults;
        }

        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                warn!(error = %e, "failed to read settings file, using defaults");
                return defaults;
            }
        };

        match serde_json::from_str::<Value>(&content) {
            Ok(user) => {
                let base = serde_json::to_value(&defaults).unwrap_or(Value::Null);
                match serde_json::from_value(deep_merge(base, user)) {
                    Ok(settings) => settings,
                    Err(e) => {
                        warn!(error = %e, "settings file has wrong shape, recreating");
                        let _ = self.save(&defaults);
                        defaults
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "settings file is not valid JSON, recreating");
                let _ = self.save(&defaults);
                defaults
            }
        }
    }

    pub fn save(&self, settings: &SavedSettings) -> Result<()> {
        let _guard = self.write_lock.lock();
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(settings)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }

    /// Load-modify-save in one step.
    pub fn update<F>(&self, mutate: F) -> Result<SavedSettings>
    where
        F: FnOnce(&mut SavedSettings),
    {
        let mut settings = self.load();
        mutate(&mut settings);
        self.save(&settings)?;
        Ok(settings)
    }
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}
