//! Persisted user preferences.
//!
//! A single namespaced JSON file holds `{username, mood, language,
//! sfxEnabled, voiceEnabled}`. Missing keys fall back to defaults and an
//! unreadable file is treated as absent.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::Result;
use crate::persona::{Language, Mood};

pub const PREF_KEY: &str = "whisperlink_prefs_v1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Preferences {
    pub username: String,
    pub mood: Mood,
    pub language: Language,
    pub sfx_enabled: bool,
    pub voice_enabled: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Preferences {
            username: String::new(),
            mood: Mood::Funny,
            language: Language::English,
            sfx_enabled: true,
            voice_enabled: false,
        }
    }
}

impl Preferences {
    /// The stored username, or a freshly generated `adjective-noun` handle.
    pub fn username_or_generate(&self) -> String {
        if !self.username.trim().is_empty() {
            return self.username.trim().to_string();
        }
        names::Generator::default()
            .next()
            .unwrap_or_else(|| format!("anon-{}", &uuid::Uuid::new_v4().to_string()[..4]))
    }
}

/// File-backed preference store.
#[derive(Debug, Clone)]
pub struct PrefsStore {
    path: PathBuf,
}

impl PrefsStore {
    /// Store rooted at `dir`; the file is `<dir>/whisperlink_prefs_v1.json`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        PrefsStore {
            path: dir.as_ref().join(format!("{PREF_KEY}.json")),
        }
    }

    /// `$WHISPERLINK_HOME`, else `$HOME/.config/whisperlink`, else the
    /// current directory.
    pub fn default_location() -> Self {
        let dir = std::env::var_os("WHISPERLINK_HOME")
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config").join("whisperlink"))
            })
            .unwrap_or_else(|| PathBuf::from("."));
        PrefsStore::in_dir(dir)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Preferences {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(_) => return Preferences::default(),
        };
        match serde_json::from_str::<Preferences>(&content) {
            Ok(prefs) => {
                debug!(path = %self.path.display(), "loaded preferences");
                prefs
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "ignoring unreadable preferences");
                Preferences::default()
            }
        }
    }

    pub fn save(&self, prefs: &Preferences) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(prefs)?)?;
        Ok(())
    }

    /// Load, apply `f`, save, and return the updated preferences.
    pub fn update(&self, f: impl FnOnce(&mut Preferences)) -> Result<Preferences> {
        let mut prefs = self.load();
        f(&mut prefs);
        self.save(&prefs)?;
        Ok(prefs)
    }
}
