use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use rand::Rng;

use crate::mapper::{is_black_key, KeyMapper};
use crate::model::{Event, KeyState, MusicalSection, Note};

/// Probabilistic wrong-note settings. `chance` is a probability in [0, 1],
/// drawn once per eligible note.
#[derive(Debug, Clone, Copy)]
pub struct MistakeConfig {
    pub enabled: bool,
    pub chance: f64,
}

impl MistakeConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            chance: 0.0,
        }
    }
}

/// The compiled, totally ordered action timeline for one session, plus the
/// initial hold-state table for every key it touches.
#[derive(Debug, Clone)]
pub struct Timeline {
    pub events: Vec<Event>,
    pub key_states: HashMap<char, KeyState>,
    pub total_duration: f64,
}

// Heap entry; the sequence number keeps equal (time, tier) entries in
// insertion order.
struct Queued {
    seq: u64,
    event: Event,
}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        self.event
            .time
            .total_cmp(&other.event.time)
            .then(self.event.tier.cmp(&other.event.tier))
            .then(self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Queued {}

/// Turns a finalized note list plus externally generated pedal events into
/// one strictly ordered action timeline.
///
/// Notes must already be sorted by start time. Each note yields one press at
/// its onset and one release at its offset on the realized key, unless the
/// realized pitch has no key on the layout, in which case the note is
/// skipped silently. Substitution only ever changes the realized key, never
/// the count or timing of onsets and offsets.
pub fn compile<M: KeyMapper + ?Sized, R: Rng + ?Sized>(
    notes: &[Note],
    sections: &[MusicalSection],
    pedal_events: &[Event],
    mistakes: MistakeConfig,
    mapper: &M,
    rng: &mut R,
) -> Timeline {
    let mut heap: BinaryHeap<std::cmp::Reverse<Queued>> = BinaryHeap::new();
    let mut seq = 0u64;
    let mut push = |heap: &mut BinaryHeap<_>, event: Event| {
        heap.push(std::cmp::Reverse(Queued { seq, event }));
        seq += 1;
    };

    let mut key_states: HashMap<char, KeyState> = HashMap::new();
    let mut played_in_section: HashSet<u8> = HashSet::new();
    let mut current_section: Option<usize> = None;

    for note in notes {
        let section = sections.iter().position(|s| s.contains(note.start_time));
        if section != current_section {
            played_in_section.clear();
            current_section = section;
        }

        // One Bernoulli draw per eligible note keeps the RNG stream aligned
        // with the note order, so identical inputs reproduce identical
        // timelines.
        let mut realized = note.pitch;
        if mistakes.enabled
            && !played_in_section.contains(&note.pitch)
            && rng.gen_range(0.0..1.0) < mistakes.chance
        {
            if let Some(substitute) = mistake_pitch(note.pitch, rng) {
                realized = substitute;
            }
        }

        // The true pitch gates future eligibility even when the note was
        // substituted or unmappable.
        played_in_section.insert(note.pitch);

        if let Some(chord) = mapper.resolve(realized) {
            push(
                &mut heap,
                Event::press(note.start_time, chord.base, realized, note.velocity),
            );
            push(
                &mut heap,
                Event::release(note.end_time(), chord.base, realized),
            );
            key_states.entry(chord.base).or_default();
        }
    }

    for event in pedal_events {
        push(&mut heap, *event);
    }

    let mut events = Vec::with_capacity(heap.len());
    while let Some(std::cmp::Reverse(queued)) = heap.pop() {
        events.push(queued.event);
    }

    let total_duration = events.last().map_or(0.0, |e| e.time);

    Timeline {
        events,
        key_states,
        total_duration,
    }
}

/// Picks the wrong key for a substitution. A black key slips to any of the
/// four neighbors; a white key only slips to white neighbors, and None
/// means no white neighbor exists so the true pitch stands.
fn mistake_pitch<R: Rng + ?Sized>(pitch: u8, rng: &mut R) -> Option<u8> {
    let candidates: Vec<u8> = [-2i16, -1, 1, 2]
        .iter()
        .filter_map(|offset| {
            let p = pitch as i16 + offset;
            (0..=127).contains(&p).then_some(p as u8)
        })
        .filter(|&p| is_black_key(pitch) || !is_black_key(p))
        .collect();

    if candidates.is_empty() {
        None
    } else {
        Some(candidates[rng.gen_range(0..candidates.len())])
    }
}
