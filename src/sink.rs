use std::collections::HashMap;
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use crate::keyboard::{Key, Keyboard};
use crate::mapper::KeyMapper;
use crate::model::{Action, Event, KeyState, PedalDirection};

/// Reserved control number whose base-12 split ([11, 11]) marks a pedal
/// macro on the wire.
const PEDAL_SENTINEL: u8 = 143;

/// Gap between the release and the re-press of a re-strike.
const RESTRIKE_GAP: Duration = Duration::from_millis(1);

/// The backend that turns a timeline action into an externally observable
/// effect. Exactly one variant is selected per session; the dispatcher only
/// ever talks to this interface.
pub enum ActionSink {
    Direct(DirectKeys),
    Macro(NumpadEncoder),
}

impl ActionSink {
    pub fn direct(keyboard: Box<dyn Keyboard>, key_states: HashMap<char, KeyState>) -> Self {
        Self::Direct(DirectKeys::new(keyboard, key_states))
    }

    pub fn numpad(keyboard: Box<dyn Keyboard>) -> Self {
        Self::Macro(NumpadEncoder::new(keyboard))
    }

    pub fn apply(&mut self, event: &Event, mapper: &dyn KeyMapper) {
        match self {
            Self::Direct(sink) => sink.apply(event, mapper),
            Self::Macro(sink) => sink.apply(event),
        }
    }

    /// Releases everything the session may be holding. Idempotent; invoked
    /// on every pause/seek/stop and on loop exit.
    pub fn shutdown(&mut self) {
        match self {
            Self::Direct(sink) => sink.shutdown(),
            Self::Macro(sink) => sink.shutdown(),
        }
    }
}

/// Direct key emulation: holds physical keys for the lifetime of each note
/// and deduplicates overlapping holds on the same key.
pub struct DirectKeys {
    keyboard: Box<dyn Keyboard>,
    states: HashMap<char, KeyState>,
    pedal_down: bool,
}

impl DirectKeys {
    pub fn new(keyboard: Box<dyn Keyboard>, key_states: HashMap<char, KeyState>) -> Self {
        Self {
            keyboard,
            states: key_states,
            pedal_down: false,
        }
    }

    #[cfg(test)]
    fn state(&self, key: char) -> Option<KeyState> {
        self.states.get(&key).copied()
    }

    fn apply(&mut self, event: &Event, mapper: &dyn KeyMapper) {
        match event.action {
            Action::Press { key } => self.press(key, event.pitch, mapper),
            Action::Release { key } => self.release(key),
            Action::Pedal(direction) => self.pedal(direction),
        }
    }

    fn press(&mut self, key: char, pitch: Option<u8>, mapper: &dyn KeyMapper) {
        let Some(state) = self.states.get_mut(&key) else {
            return;
        };
        let shift = pitch
            .and_then(|p| mapper.resolve(p))
            .is_some_and(|chord| chord.shift);

        let was_down = state.active;
        let restrike = state.sustained_only();
        state.press();

        if was_down && !restrike {
            // Already physically held by a fresh strike; nothing to do.
            return;
        }

        if shift {
            swallow(self.keyboard.press(Key::Shift));
        }
        if restrike {
            debug!(%key, "re-striking under sustain");
            swallow(self.keyboard.release(Key::Char(key)));
            thread::sleep(RESTRIKE_GAP);
            swallow(self.keyboard.press(Key::Char(key)));
        } else {
            debug!(%key, shift, "pressing");
            swallow(self.keyboard.press(Key::Char(key)));
        }
        if shift {
            swallow(self.keyboard.release(Key::Shift));
        }
    }

    fn release(&mut self, key: char) {
        let Some(state) = self.states.get_mut(&key) else {
            return;
        };
        state.release();
        debug!(%key, "releasing");
        swallow(self.keyboard.release(Key::Char(key)));
    }

    fn pedal(&mut self, direction: PedalDirection) {
        match direction {
            PedalDirection::Down if !self.pedal_down => {
                self.pedal_down = true;
                debug!("pedal down");
                swallow(self.keyboard.press(Key::Space));
            }
            PedalDirection::Up if self.pedal_down => {
                self.pedal_down = false;
                debug!("pedal up");
                swallow(self.keyboard.release(Key::Space));
            }
            _ => {}
        }
    }

    fn shutdown(&mut self) {
        for (&key, state) in self.states.iter_mut() {
            if state.active {
                swallow(self.keyboard.release(Key::Char(key)));
            }
            state.release();
        }
        if self.pedal_down {
            self.pedal_down = false;
            swallow(self.keyboard.release(Key::Space));
        }
        // A modifier-scoped press can be interrupted mid-chord by
        // cancellation, so the modifiers are released unconditionally.
        for modifier in [Key::Shift, Key::Ctrl, Key::Alt] {
            swallow(self.keyboard.release(modifier));
        }
    }
}

/// Re-encodes actions as numeric-keypad macros for a third-party listener.
/// One start symbol (`*`), then four base-12 digits over numpad 0..9, `-`
/// (ten) and `+` (eleven). Carries no key-hold state of its own.
pub struct NumpadEncoder {
    keyboard: Box<dyn Keyboard>,
    numlock_checked: bool,
}

impl NumpadEncoder {
    pub fn new(keyboard: Box<dyn Keyboard>) -> Self {
        Self {
            keyboard,
            numlock_checked: false,
        }
    }

    fn apply(&mut self, event: &Event) {
        match event.action {
            Action::Press { .. } => {
                if let Some(pitch) = event.pitch {
                    self.send_note(pitch, event.velocity, false);
                }
            }
            Action::Release { .. } => {
                if let Some(pitch) = event.pitch {
                    self.send_note(pitch, 0, true);
                }
            }
            Action::Pedal(direction) => {
                let value = match direction {
                    PedalDirection::Down => 127,
                    PedalDirection::Up => 0,
                };
                self.send_pedal(value);
            }
        }
    }

    fn send_note(&mut self, pitch: u8, velocity: u8, note_off: bool) {
        let (v1, v2) = if note_off {
            (0, 0)
        } else {
            let velocity = velocity.min(127);
            (velocity / 12, velocity % 12)
        };
        self.send_macro([pitch / 12, pitch % 12, v1, v2]);
    }

    fn send_pedal(&mut self, value: u8) {
        let value = value.min(127);
        self.send_macro([
            PEDAL_SENTINEL / 12,
            PEDAL_SENTINEL % 12,
            value / 12,
            value % 12,
        ]);
    }

    fn send_macro(&mut self, digits: [u8; 4]) {
        self.ensure_numlock();
        swallow(self.keyboard.tap(Key::NumpadMultiply));
        for digit in digits {
            swallow(self.keyboard.tap(digit_key(digit.min(11))));
        }
    }

    // Satisfied once per sink, before the first transmission. Hosts that
    // report no num-lock state are left alone.
    fn ensure_numlock(&mut self) {
        if self.numlock_checked {
            return;
        }
        self.numlock_checked = true;
        if self.keyboard.numlock_enabled() == Some(false) {
            debug!("enabling num-lock before first macro");
            swallow(self.keyboard.tap(Key::NumLock));
        }
    }

    fn shutdown(&mut self) {
        // The listener tracks note state itself; releasing the pedal is the
        // only side effect this variant can leave behind.
        self.send_pedal(0);
    }
}

fn digit_key(digit: u8) -> Key {
    match digit {
        10 => Key::NumpadSubtract,
        11 => Key::NumpadAdd,
        n => Key::Numpad(n),
    }
}

fn swallow(result: Result<(), crate::keyboard::KeyboardError>) {
    if let Err(err) = result {
        warn!(%err, "actuation failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyboard::{Actuation, RecordingKeyboard};
    use crate::mapper::{KeyMapper as _, StandardLayout};

    fn direct_with(
        pitches: &[u8],
    ) -> (DirectKeys, std::sync::Arc<parking_lot::Mutex<Vec<Actuation>>>) {
        let layout = StandardLayout::new();
        let mut states = HashMap::new();
        for &p in pitches {
            states.insert(layout.resolve(p).unwrap().base, KeyState::default());
        }
        let keyboard = RecordingKeyboard::new();
        let handle = keyboard.handle();
        (DirectKeys::new(Box::new(keyboard), states), handle)
    }

    #[test]
    fn press_and_release_actuate_the_base_key() {
        let (mut sink, log) = direct_with(&[60]);
        let mapper = StandardLayout::new();

        sink.apply(&Event::press(0.0, 't', 60, 100), &mapper);
        sink.apply(&Event::release(0.5, 't', 60), &mapper);

        assert_eq!(
            *log.lock(),
            vec![
                Actuation::Press(Key::Char('t')),
                Actuation::Release(Key::Char('t'))
            ]
        );
        assert_eq!(sink.state('t'), Some(KeyState::default()));
    }

    #[test]
    fn sharp_press_wraps_the_key_in_shift() {
        let (mut sink, log) = direct_with(&[61]);
        let mapper = StandardLayout::new();

        sink.apply(&Event::press(0.0, 't', 61, 100), &mapper);

        assert_eq!(
            *log.lock(),
            vec![
                Actuation::Press(Key::Shift),
                Actuation::Press(Key::Char('t')),
                Actuation::Release(Key::Shift),
            ]
        );
    }

    #[test]
    fn redundant_press_is_deduplicated() {
        let (mut sink, log) = direct_with(&[60]);
        let mapper = StandardLayout::new();

        sink.apply(&Event::press(0.0, 't', 60, 100), &mapper);
        sink.apply(&Event::press(0.1, 't', 60, 100), &mapper);

        assert_eq!(log.lock().len(), 1);
    }

    #[test]
    fn sustained_only_key_is_released_and_restruck() {
        let (mut sink, log) = direct_with(&[60]);
        sink.states.insert(
            't',
            KeyState {
                active: false,
                sustained: true,
            },
        );
        let mapper = StandardLayout::new();

        sink.apply(&Event::press(0.0, 't', 60, 100), &mapper);

        assert_eq!(
            *log.lock(),
            vec![
                Actuation::Release(Key::Char('t')),
                Actuation::Press(Key::Char('t'))
            ]
        );
        assert_eq!(
            sink.state('t'),
            Some(KeyState {
                active: true,
                sustained: true
            })
        );
    }

    #[test]
    fn press_on_unknown_key_is_ignored() {
        let (mut sink, log) = direct_with(&[]);
        let mapper = StandardLayout::new();
        sink.apply(&Event::press(0.0, 't', 60, 100), &mapper);
        assert!(log.lock().is_empty());
    }

    #[test]
    fn pedal_is_idempotent_both_directions() {
        let (mut sink, log) = direct_with(&[]);
        let mapper = StandardLayout::new();

        sink.apply(&Event::pedal(0.0, PedalDirection::Down), &mapper);
        sink.apply(&Event::pedal(0.1, PedalDirection::Down), &mapper);
        sink.apply(&Event::pedal(0.2, PedalDirection::Up), &mapper);
        sink.apply(&Event::pedal(0.3, PedalDirection::Up), &mapper);

        assert_eq!(
            *log.lock(),
            vec![Actuation::Press(Key::Space), Actuation::Release(Key::Space)]
        );
    }

    #[test]
    fn shutdown_releases_every_held_key_and_pedal() {
        let (mut sink, log) = direct_with(&[60, 64]);
        let mapper = StandardLayout::new();

        sink.apply(&Event::press(0.0, 't', 60, 100), &mapper);
        sink.apply(&Event::press(0.0, 'u', 64, 100), &mapper);
        sink.apply(&Event::pedal(0.0, PedalDirection::Down), &mapper);
        log.lock().clear();

        sink.shutdown();

        let releases = log.lock().clone();
        assert!(releases.contains(&Actuation::Release(Key::Char('t'))));
        assert!(releases.contains(&Actuation::Release(Key::Char('u'))));
        assert!(releases.contains(&Actuation::Release(Key::Space)));
        assert!(releases.contains(&Actuation::Release(Key::Shift)));
        assert!(releases.contains(&Actuation::Release(Key::Ctrl)));
        assert!(releases.contains(&Actuation::Release(Key::Alt)));
        assert!(sink.states.values().all(|s| !s.active && !s.sustained));
    }

    #[test]
    fn shutdown_is_idempotent() {
        let (mut sink, log) = direct_with(&[60]);
        let mapper = StandardLayout::new();
        sink.apply(&Event::press(0.0, 't', 60, 100), &mapper);

        sink.shutdown();
        log.lock().clear();
        sink.shutdown();

        // Second pass only re-releases the modifiers.
        assert_eq!(
            *log.lock(),
            vec![
                Actuation::Release(Key::Shift),
                Actuation::Release(Key::Ctrl),
                Actuation::Release(Key::Alt),
            ]
        );
    }

    fn taps(log: &[Actuation]) -> Vec<Key> {
        log.iter()
            .filter_map(|a| match a {
                Actuation::Press(k) => Some(*k),
                Actuation::Release(_) => None,
            })
            .collect()
    }

    #[test]
    fn note_on_macro_splits_pitch_and_velocity_base_twelve() {
        let keyboard = RecordingKeyboard::new();
        let log = keyboard.handle();
        let mut encoder = NumpadEncoder::new(Box::new(keyboard));

        encoder.send_note(60, 127, false);

        assert_eq!(
            taps(&log.lock()),
            vec![
                Key::NumpadMultiply,
                Key::Numpad(5),
                Key::Numpad(0),
                Key::NumpadSubtract, // 127 / 12 == 10
                Key::Numpad(7),
            ]
        );
    }

    #[test]
    fn note_off_macro_zeroes_the_velocity_digits() {
        let keyboard = RecordingKeyboard::new();
        let log = keyboard.handle();
        let mut encoder = NumpadEncoder::new(Box::new(keyboard));

        encoder.send_note(61, 99, true);

        assert_eq!(
            taps(&log.lock()),
            vec![
                Key::NumpadMultiply,
                Key::Numpad(5),
                Key::Numpad(1),
                Key::Numpad(0),
                Key::Numpad(0),
            ]
        );
    }

    #[test]
    fn pedal_macro_uses_the_sentinel_prefix() {
        let keyboard = RecordingKeyboard::new();
        let log = keyboard.handle();
        let mut encoder = NumpadEncoder::new(Box::new(keyboard));

        encoder.send_pedal(127);

        assert_eq!(
            taps(&log.lock()),
            vec![
                Key::NumpadMultiply,
                Key::NumpadAdd, // 143 / 12 == 11
                Key::NumpadAdd, // 143 % 12 == 11
                Key::NumpadSubtract,
                Key::Numpad(7),
            ]
        );
    }

    #[test]
    fn numlock_is_engaged_once_before_the_first_macro() {
        let keyboard = RecordingKeyboard::with_numlock(Some(false));
        let log = keyboard.handle();
        let mut encoder = NumpadEncoder::new(Box::new(keyboard));

        encoder.send_pedal(0);
        encoder.send_pedal(0);

        let numlock_taps = log
            .lock()
            .iter()
            .filter(|a| matches!(a, Actuation::Press(Key::NumLock)))
            .count();
        assert_eq!(numlock_taps, 1);
        assert_eq!(log.lock().first(), Some(&Actuation::Press(Key::NumLock)));
    }

    #[test]
    fn unknown_numlock_state_is_left_alone() {
        let keyboard = RecordingKeyboard::with_numlock(None);
        let log = keyboard.handle();
        let mut encoder = NumpadEncoder::new(Box::new(keyboard));

        encoder.send_pedal(0);

        assert!(!log
            .lock()
            .iter()
            .any(|a| matches!(a, Actuation::Press(Key::NumLock))));
    }

    #[test]
    fn macro_shutdown_sends_pedal_zero() {
        let keyboard = RecordingKeyboard::new();
        let log = keyboard.handle();
        let mut sink = ActionSink::numpad(Box::new(keyboard));

        sink.shutdown();

        assert_eq!(
            taps(&log.lock()),
            vec![
                Key::NumpadMultiply,
                Key::NumpadAdd,
                Key::NumpadAdd,
                Key::Numpad(0),
                Key::Numpad(0),
            ]
        );
    }
}
