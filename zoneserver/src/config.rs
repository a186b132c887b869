//! `zone.toml`: the process-wide configuration `main` loads before
//! anything else exists (spec.md §3's `General:NeedCap`,
//! `Modules:AttachModules`, `Arenas:PermanentArenas`, plus the
//! authfile-specific `passwd.conf` settings this binary wires in).

use authfile::AuthFileSettings;
use flux::logging::LogConfig;
use serde::{Deserialize, Serialize};

#[derive(Clone, Serialize, Deserialize)]
pub struct ZoneServerConfig {
    pub general: General,
    pub modules: Modules,
    pub arenas: Arenas,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub auth: AuthFileSettings,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct General {
    pub need_cap: bool,
    pub tick_interval_ms: u64,
    /// Server-chosen checksums the `LoginResponse` packet carries (spec.md
    /// §4.5); checksum computation itself is the map/exe-download
    /// collaborator's concern (spec.md §1), these are whatever values that
    /// collaborator published to config.
    #[serde(default)]
    pub server_version: u32,
    #[serde(default)]
    pub exe_checksum: u32,
    #[serde(default)]
    pub code_checksum: u32,
    #[serde(default)]
    pub news_checksum: u32,
    #[serde(default)]
    pub cont_version: u16,
}

impl Default for General {
    fn default() -> Self {
        General {
            need_cap: false,
            tick_interval_ms: 10,
            server_version: 1,
            exe_checksum: 0,
            code_checksum: 0,
            news_checksum: 0,
            cont_version: 40,
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Modules {
    pub attach_modules: String,
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Arenas {
    pub permanent_arenas: String,
}

impl Default for ZoneServerConfig {
    fn default() -> Self {
        ZoneServerConfig {
            general: General::default(),
            modules: Modules::default(),
            arenas: Arenas::default(),
            log: LogConfig::default(),
            auth: AuthFileSettings::default(),
        }
    }
}

impl ZoneServerConfig {
    /// Splits `Arenas:PermanentArenas` the same way
    /// `zone_core::config::ConfigHandle::get_list` does (spec.md §4.4).
    pub fn permanent_arenas(&self) -> Vec<String> {
        self.arenas
            .permanent_arenas
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }

    pub fn attach_modules(&self) -> Vec<String> {
        self.modules
            .attach_modules
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permanent_arenas_splits_on_spec_delimiters() {
        let mut config = ZoneServerConfig::default();
        config.arenas.permanent_arenas = "turf, duel\tasteroids".to_string();
        assert_eq!(config.permanent_arenas(), vec!["turf", "duel", "asteroids"]);
    }
}
