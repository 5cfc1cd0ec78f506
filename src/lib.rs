pub mod compile;
pub mod config;
pub mod keyboard;
pub mod mapper;
pub mod model;
pub mod performance;
pub mod player;
pub mod sink;
pub mod transport;

pub use compile::{compile, MistakeConfig, Timeline};
pub use config::{OutputMode, PlayerConfig};
pub use keyboard::{Actuation, Key, Keyboard, KeyboardError, NullKeyboard, RecordingKeyboard};
pub use mapper::{is_black_key, KeyChord, KeyMapper, StandardLayout};
pub use model::{Action, Event, Hand, KeyState, MusicalSection, Note, PedalDirection, Tier};
pub use performance::{Performance, PerformanceError};
pub use player::{spawn_player, PlayerCommand, PlayerHandle, PlayerUpdate};
pub use sink::{ActionSink, DirectKeys, NumpadEncoder};
pub use transport::Transport;
