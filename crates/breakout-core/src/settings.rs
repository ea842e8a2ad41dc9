use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::errors::BreakoutError;
use crate::manager::DEFAULT_ROOM_TITLE_PREFIX;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct BreakoutSettings {
    /// Rooms suggested when setting up a new breakout.
    pub default_room_count: u32,
    pub min_rooms: u32,
    pub room_title_min_chars: usize,
    pub room_title_prefix: String,
    /// How long confirmations stay in the status bar.
    pub ephemeral_status_ms: u64,
}

impl Default for BreakoutSettings {
    fn default() -> Self {
        Self {
            default_room_count: 2,
            min_rooms: 1,
            room_title_min_chars: 3,
            room_title_prefix: DEFAULT_ROOM_TITLE_PREFIX.to_string(),
            ephemeral_status_ms: 3000,
        }
    }
}

impl BreakoutSettings {
    pub fn validate_room_title(&self, title: &str) -> Result<(), BreakoutError> {
        if title.chars().count() < self.room_title_min_chars {
            return Err(BreakoutError::InvalidTitle(format!(
                "{title:?} is shorter than {} characters",
                self.room_title_min_chars
            )));
        }
        Ok(())
    }
}

pub struct SettingsStore {
    settings: Mutex<BreakoutSettings>,
    file_path: PathBuf,
}

impl SettingsStore {
    pub fn new(data_dir: &str) -> Self {
        let file_path = PathBuf::from(data_dir).join("breakout.json");
        let settings = Self::load(&file_path);
        Self {
            settings: Mutex::new(settings),
            file_path,
        }
    }

    pub fn get(&self) -> BreakoutSettings {
        self.settings.lock().unwrap().clone()
    }

    pub fn set_default_room_count(&self, count: u32) -> Result<(), BreakoutError> {
        {
            let mut settings = self.settings.lock().unwrap();
            settings.default_room_count = count.max(settings.min_rooms);
        }
        self.save()
    }

    pub fn set_room_title_prefix(&self, prefix: String) -> Result<(), BreakoutError> {
        self.settings.lock().unwrap().room_title_prefix = prefix;
        self.save()
    }

    fn save(&self) -> Result<(), BreakoutError> {
        let settings = self.get();
        if let Some(parent) = self.file_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| BreakoutError::Settings(e.to_string()))?;
        }
        let json = serde_json::to_string_pretty(&settings)
            .map_err(|e| BreakoutError::Settings(e.to_string()))?;
        std::fs::write(&self.file_path, json).map_err(|e| {
            tracing::warn!("failed to write {}: {e}", self.file_path.display());
            BreakoutError::Settings(e.to_string())
        })
    }

    fn load(path: &PathBuf) -> BreakoutSettings {
        match std::fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("ignoring unreadable {}: {e}", path.display());
                BreakoutSettings::default()
            }),
            Err(_) => BreakoutSettings::default(),
        }
    }
}
