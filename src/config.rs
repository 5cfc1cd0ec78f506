use serde::{Deserialize, Serialize};

use crate::compile::MistakeConfig;

/// Which action sink variant a session uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputMode {
    /// Direct key emulation against the host input device.
    #[default]
    Key,
    /// Numeric-keypad macros for an external listener.
    NumpadMacro,
}

/// Session settings. Every field has a documented default so a partial or
/// missing config file still produces a playable session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub output_mode: OutputMode,
    pub enable_mistakes: bool,
    /// Probability in [0, 1] that an eligible note is substituted.
    pub mistake_chance: f64,
    /// Run a 3-2-1 countdown before the first event.
    pub countdown: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            output_mode: OutputMode::Key,
            enable_mistakes: false,
            mistake_chance: 0.005,
            countdown: false,
        }
    }
}

impl PlayerConfig {
    pub fn mistakes(&self) -> MistakeConfig {
        MistakeConfig {
            enabled: self.enable_mistakes,
            chance: self.mistake_chance.clamp(0.0, 1.0),
        }
    }
}
