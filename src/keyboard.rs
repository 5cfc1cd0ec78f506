use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::trace;

/// A host-level key the driver can actuate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Char(char),
    Shift,
    Ctrl,
    Alt,
    /// Sustain pedal key.
    Space,
    NumLock,
    /// Numpad digit 0..=9.
    Numpad(u8),
    NumpadAdd,
    NumpadSubtract,
    NumpadMultiply,
}

#[derive(Debug, Error)]
pub enum KeyboardError {
    #[error("key {0:?} is not available on this host")]
    Unavailable(Key),
    #[error("host input rejected {key:?}: {reason}")]
    Rejected { key: Key, reason: String },
}

/// Boundary to the host input device. Every actuation is fallible; callers
/// swallow failures at the call site so a single bad keystroke never aborts
/// a batch or the dispatch loop.
pub trait Keyboard: Send {
    fn press(&mut self, key: Key) -> Result<(), KeyboardError>;

    fn release(&mut self, key: Key) -> Result<(), KeyboardError>;

    fn tap(&mut self, key: Key) -> Result<(), KeyboardError> {
        self.press(key)?;
        self.release(key)
    }

    /// Num-lock state if the host exposes one. None means unknown or not
    /// applicable; the numeric-macro encoder then leaves it alone.
    fn numlock_enabled(&self) -> Option<bool> {
        None
    }
}

/// Actuator that emits nothing but trace logs. Used for dry runs and as the
/// default backend when no host injector is wired up.
pub struct NullKeyboard;

impl Keyboard for NullKeyboard {
    fn press(&mut self, key: Key) -> Result<(), KeyboardError> {
        trace!(?key, "press");
        Ok(())
    }

    fn release(&mut self, key: Key) -> Result<(), KeyboardError> {
        trace!(?key, "release");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actuation {
    Press(Key),
    Release(Key),
}

/// Captures every actuation into a shared log so sessions can be inspected
/// after the fact. The handle stays valid after the keyboard moves into a
/// sink.
pub struct RecordingKeyboard {
    log: Arc<Mutex<Vec<Actuation>>>,
    numlock: Option<bool>,
}

impl RecordingKeyboard {
    pub fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(Vec::new())),
            numlock: Some(true),
        }
    }

    pub fn with_numlock(numlock: Option<bool>) -> Self {
        Self {
            log: Arc::new(Mutex::new(Vec::new())),
            numlock,
        }
    }

    pub fn handle(&self) -> Arc<Mutex<Vec<Actuation>>> {
        self.log.clone()
    }
}

impl Default for RecordingKeyboard {
    fn default() -> Self {
        Self::new()
    }
}

impl Keyboard for RecordingKeyboard {
    fn press(&mut self, key: Key) -> Result<(), KeyboardError> {
        self.log.lock().push(Actuation::Press(key));
        Ok(())
    }

    fn release(&mut self, key: Key) -> Result<(), KeyboardError> {
        self.log.lock().push(Actuation::Release(key));
        Ok(())
    }

    fn numlock_enabled(&self) -> Option<bool> {
        self.numlock
    }
}
