use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Directory holding the account records. Defaults to the per-user data
    /// directory when unset.
    #[serde(default)]
    pub mafiles_dir: Option<PathBuf>,
    pub log_level: String,
    pub network: NetworkSettings,
    pub clock: ClockSettings,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NetworkSettings {
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ClockSettings {
    /// How long a cached clock offset stays usable before a resync.
    pub max_offset_age_secs: u64,
}

impl NetworkSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl ClockSettings {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_offset_age_secs)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mafiles_dir: None,
            log_level: "info".to_string(),
            network: NetworkSettings::default(),
            clock: ClockSettings::default(),
        }
    }
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            connect_timeout_secs: 10,
        }
    }
}

impl Default for ClockSettings {
    fn default() -> Self {
        Self {
            max_offset_age_secs: 300,
        }
    }
}
