use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::PlayerConfig;
use crate::model::{Event, MusicalSection, Note};

/// Everything the upstream preparation stages hand over for one piece: the
/// humanized note list, section boundaries, pre-tiered pedal events and the
/// session config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Performance {
    pub name: String,
    pub notes: Vec<Note>,
    #[serde(default)]
    pub sections: Vec<MusicalSection>,
    #[serde(default)]
    pub pedal_events: Vec<Event>,
    #[serde(default)]
    pub config: PlayerConfig,
}

/// Failure of upstream input preparation. The only fatal condition in the
/// system; reported once, before any real-time execution starts, and never
/// retried.
#[derive(Debug, Error)]
pub enum PerformanceError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("malformed performance file {path}: {source}")]
    Parse {
        path: String,
        source: ron::error::SpannedError,
    },
}

impl Performance {
    pub fn load(path: &Path) -> Result<Self, PerformanceError> {
        let text = fs::read_to_string(path).map_err(|source| PerformanceError::Io {
            path: path.display().to_string(),
            source,
        })?;
        ron::from_str(&text).map_err(|source| PerformanceError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let text = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?;
        fs::write(path, text)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Hand;

    #[test]
    fn round_trips_through_ron_text() {
        let performance = Performance {
            name: "etude".into(),
            notes: vec![Note {
                id: 0,
                pitch: 60,
                velocity: 90,
                start_time: 0.0,
                duration: 0.5,
                hand: Hand::Right,
                track: 0,
                channel: 0,
            }],
            sections: vec![],
            pedal_events: vec![],
            config: PlayerConfig::default(),
        };

        let text = ron::ser::to_string_pretty(&performance, Default::default()).unwrap();
        let parsed: Performance = ron::from_str(&text).unwrap();
        assert_eq!(parsed.name, "etude");
        assert_eq!(parsed.notes.len(), 1);
        assert_eq!(parsed.notes[0].pitch, 60);
    }

    #[test]
    fn load_reports_missing_files_as_io_errors() {
        let err = Performance::load(Path::new("/nonexistent/piece.ron")).unwrap_err();
        assert!(matches!(err, PerformanceError::Io { .. }));
    }
}
