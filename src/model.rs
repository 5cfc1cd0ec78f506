use serde::{Deserialize, Serialize};

/// Hand assignment carried over from the upstream analysis stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Hand {
    Left,
    Right,
    #[default]
    Unknown,
}

/// A finalized, already-humanized note. Immutable input to the compiler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub id: u32,
    pub pitch: u8,
    pub velocity: u8,
    /// Onset in seconds from the start of the piece.
    pub start_time: f64,
    /// Sounding length in seconds, always positive.
    pub duration: f64,
    #[serde(default)]
    pub hand: Hand,
    #[serde(default = "unassigned")]
    pub track: i32,
    #[serde(default = "unassigned")]
    pub channel: i32,
}

const fn unassigned() -> i32 {
    -1
}

impl Note {
    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }
}

/// Dispatch ordering class for simultaneously-due events. A pedal change
/// must be visible to co-timed articulation, and a key released and
/// re-struck at the same instant must release first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Tier {
    Pedal,
    Release,
    Press,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PedalDirection {
    Down,
    Up,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Press { key: char },
    Release { key: char },
    Pedal(PedalDirection),
}

/// One scheduled entry on the compiled timeline. Immutable once produced;
/// total order on the timeline is (time, tier, insertion sequence).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub time: f64,
    pub tier: Tier,
    pub action: Action,
    /// Realized source pitch, absent for pedal events.
    pub pitch: Option<u8>,
    pub velocity: u8,
}

impl Event {
    pub fn press(time: f64, key: char, pitch: u8, velocity: u8) -> Self {
        Self {
            time,
            tier: Tier::Press,
            action: Action::Press { key },
            pitch: Some(pitch),
            velocity,
        }
    }

    pub fn release(time: f64, key: char, pitch: u8) -> Self {
        Self {
            time,
            tier: Tier::Release,
            action: Action::Release { key },
            pitch: Some(pitch),
            velocity: 0,
        }
    }

    pub fn pedal(time: f64, direction: PedalDirection) -> Self {
        Self {
            time,
            tier: Tier::Pedal,
            action: Action::Pedal(direction),
            pitch: None,
            velocity: 0,
        }
    }
}

/// Per-key hold state. `active` is true exactly between a dispatched press
/// and its matching dispatched release. `sustained` marks a hold that is a
/// continuation rather than a fresh strike; a press on a sustained-only key
/// must release and re-strike instead of deduplicating.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyState {
    pub active: bool,
    pub sustained: bool,
}

impl KeyState {
    pub fn press(&mut self) {
        self.active = true;
    }

    pub fn release(&mut self) {
        self.active = false;
        self.sustained = false;
    }

    /// A key held purely as a continuation, with no active strike behind it.
    pub fn sustained_only(&self) -> bool {
        self.sustained && !self.active
    }
}

/// Read-only section boundary from the external analyzer. Only used to
/// reset the per-section substitution memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MusicalSection {
    pub start_time: f64,
    pub end_time: f64,
    #[serde(default)]
    pub label: String,
}

impl MusicalSection {
    pub fn contains(&self, time: f64) -> bool {
        self.start_time <= time && time < self.end_time
    }
}
