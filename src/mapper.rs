use std::collections::HashMap;

/// Physical realization of a pitch: a base character plus whether shift
/// must be held while striking it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyChord {
    pub base: char,
    pub shift: bool,
}

/// Resolves pitches to physical key chords. Layout construction and
/// fingering live upstream; the compiler and dispatcher only consume this.
pub trait KeyMapper {
    /// None means the pitch has no key on this layout; the note is dropped
    /// silently and no keystroke events are produced for it.
    fn resolve(&self, pitch: u8) -> Option<KeyChord>;
}

/// True for the five raised keys of each octave.
pub fn is_black_key(pitch: u8) -> bool {
    matches!(pitch % 12, 1 | 3 | 6 | 8 | 10)
}

/// The conventional 61-key virtual-piano layout: naturals from C2 (36)
/// through C7 (96) on `1..0 q..p a..l z..m`, each sharp played as its lower
/// neighbor's key with shift held.
pub struct StandardLayout {
    map: HashMap<u8, KeyChord>,
}

const NATURAL_KEYS: &str = "1234567890qwertyuiopasdfghjklzxcvbnm";
const LOWEST_PITCH: u8 = 36;
const HIGHEST_PITCH: u8 = 96;

impl StandardLayout {
    pub fn new() -> Self {
        let mut map = HashMap::new();
        let mut naturals = NATURAL_KEYS.chars();
        let mut last_natural = None;

        for pitch in LOWEST_PITCH..=HIGHEST_PITCH {
            if is_black_key(pitch) {
                if let Some(base) = last_natural {
                    map.insert(pitch, KeyChord { base, shift: true });
                }
            } else if let Some(base) = naturals.next() {
                map.insert(pitch, KeyChord { base, shift: false });
                last_natural = Some(base);
            }
        }

        Self { map }
    }
}

impl Default for StandardLayout {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyMapper for StandardLayout {
    fn resolve(&self, pitch: u8) -> Option<KeyChord> {
        self.map.get(&pitch).copied()
    }
}
