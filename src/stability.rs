//! Onset settling and note stability
//!
//! Frame-by-frame pitch estimates are unreliable right after a note starts and
//! while it fades, so raw estimates are not shown directly. Two pieces of state
//! sit between the detector and the display:
//!
//! - [`OnsetTracker`] spots a sudden rise in level and holds detection back
//!   until the attack has had time to settle.
//! - [`NoteStabilizer`] remembers when each note was first seen and only
//!   promotes a note to "stable" once it has been around long enough. A
//!   promoted note is held for a minimum time so one stray frame cannot flip
//!   the display.
//!
//! Both are owned by the detection loop and take the current time as an
//! argument rather than reading the clock.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::gate::SILENCE_DB;
use crate::note::{Note, NoteId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilityConfig {
    /// Rise in dB between consecutive frames that counts as an onset.
    pub onset_jump_db: f32,
    /// Onsets quieter than this (dB) are ignored.
    pub onset_floor_db: f32,
    pub stabilization_delay_ms: u64,
    /// Minimum time between two note events.
    pub emit_interval_ms: u64,
    /// How long a note must be seen before it is promoted.
    pub note_stability_ms: u64,
    /// How long a promoted note is held against competitors.
    pub display_continuity_ms: u64,
    /// Notes not seen for this long are forgotten.
    pub history_window_ms: u64,
    pub level_interval_ms: u64,
    pub report_levels: bool,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            onset_jump_db: 3.0,
            onset_floor_db: -40.0,
            stabilization_delay_ms: 300,
            emit_interval_ms: 80,
            note_stability_ms: 300,
            display_continuity_ms: 500,
            history_window_ms: 2000,
            level_interval_ms: 200,
            report_levels: true,
        }
    }
}

impl StabilityConfig {
    pub fn stabilization_delay(&self) -> Duration {
        Duration::from_millis(self.stabilization_delay_ms)
    }

    pub fn emit_interval(&self) -> Duration {
        Duration::from_millis(self.emit_interval_ms)
    }

    pub fn note_stability(&self) -> Duration {
        Duration::from_millis(self.note_stability_ms)
    }

    pub fn display_continuity(&self) -> Duration {
        Duration::from_millis(self.display_continuity_ms)
    }

    pub fn history_window(&self) -> Duration {
        Duration::from_millis(self.history_window_ms)
    }

    pub fn level_interval(&self) -> Duration {
        Duration::from_millis(self.level_interval_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnsetPhase {
    /// An attack is in progress; do not detect this frame.
    Settling,
    /// Detection may run. `onset` is set on the frame that ends a settle and
    /// holds the time the rise began.
    Settled { onset: Option<Instant> },
}

#[derive(Debug, Clone)]
pub struct OnsetTracker {
    rising_since: Option<Instant>,
    previous_db: f32,
    jump_db: f32,
    floor_db: f32,
    delay: Duration,
}

impl OnsetTracker {
    pub fn new(config: &StabilityConfig) -> Self {
        Self {
            rising_since: None,
            previous_db: SILENCE_DB,
            jump_db: config.onset_jump_db,
            floor_db: config.onset_floor_db,
            delay: config.stabilization_delay(),
        }
    }

    pub fn observe(&mut self, db: f32, now: Instant) -> OnsetPhase {
        let jumped = db > self.previous_db + self.jump_db && db > self.floor_db;
        self.previous_db = db;

        match self.rising_since {
            None if jumped => {
                log::trace!("Onset at {:.1} dB, settling", db);
                self.rising_since = Some(now);
                OnsetPhase::Settling
            }
            Some(since) if now.saturating_duration_since(since) < self.delay => OnsetPhase::Settling,
            _ => OnsetPhase::Settled {
                onset: self.rising_since.take(),
            },
        }
    }

    /// Forgets any rise in progress; called when the gate reports silence.
    pub fn silence(&mut self, db: f32) {
        self.rising_since = None;
        self.previous_db = db;
    }

    pub fn is_rising(&self) -> bool {
        self.rising_since.is_some()
    }

    pub fn previous_db(&self) -> f32 {
        self.previous_db
    }

    pub fn reset(&mut self) {
        self.silence(SILENCE_DB);
    }
}

#[derive(Debug, Clone, Copy)]
struct Sighting {
    /// Start of the current unbroken run of this note.
    first_seen: Instant,
    last_seen: Instant,
}

#[derive(Debug, Clone)]
struct StableNote {
    note: Note,
    promoted_at: Instant,
    last_seen: Instant,
}

#[derive(Debug, Clone)]
pub struct NoteStabilizer {
    history: HashMap<NoteId, Sighting>,
    previous: Option<NoteId>,
    stable: Option<StableNote>,
    note_stability: Duration,
    display_continuity: Duration,
    history_window: Duration,
}

impl NoteStabilizer {
    pub fn new(config: &StabilityConfig) -> Self {
        Self {
            history: HashMap::new(),
            previous: None,
            stable: None,
            note_stability: config.note_stability(),
            display_continuity: config.display_continuity(),
            history_window: config.history_window(),
        }
    }

    /// Records a candidate and returns the note that should be displayed.
    ///
    /// A note's run restarts whenever a different note was seen on the frame
    /// before it. `onset` is the start of a just-completed attack; the settle
    /// time counts toward the stability of the note that emerges from it.
    pub fn observe(&mut self, candidate: Note, now: Instant, onset: Option<Instant>) -> Option<&Note> {
        let window = self.history_window;
        self.history
            .retain(|_, sighting| now.saturating_duration_since(sighting.last_seen) <= window);

        let id = candidate.id();
        let continuing = self.previous == Some(id);
        self.previous = Some(id);

        let sighting = self.history.entry(id).or_insert(Sighting {
            first_seen: now,
            last_seen: now,
        });
        if !continuing {
            sighting.first_seen = now;
        }
        sighting.last_seen = now;
        if let Some(onset) = onset {
            if onset < sighting.first_seen {
                sighting.first_seen = onset;
            }
        }
        let promotable = now.saturating_duration_since(sighting.first_seen) >= self.note_stability;

        let stale = self.stable.as_ref().is_some_and(|stable| {
            stable.note.id() != id && now.saturating_duration_since(stable.last_seen) > self.display_continuity
        });
        if stale {
            if let Some(stable) = self.stable.take() {
                log::debug!("Dropping {}, not heard since {:?}", stable.note.id(), stable.last_seen);
            }
        }

        let (same_note, held) = match &self.stable {
            Some(stable) => (
                stable.note.id() == id,
                now.saturating_duration_since(stable.promoted_at) < self.display_continuity,
            ),
            None => (false, false),
        };

        if same_note {
            if let Some(stable) = self.stable.as_mut() {
                stable.note = candidate;
                stable.last_seen = now;
            }
        } else if promotable && !held {
            log::debug!("Promoting {} to stable", id);
            self.stable = Some(StableNote {
                note: candidate,
                promoted_at: now,
                last_seen: now,
            });
        }

        self.stable.as_ref().map(|stable| &stable.note)
    }

    pub fn stable(&self) -> Option<&Note> {
        self.stable.as_ref().map(|stable| &stable.note)
    }

    pub fn tracked_notes(&self) -> usize {
        self.history.len()
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.previous = None;
        self.stable = None;
    }
}

/// Everything the detection loop carries from one frame to the next.
#[derive(Debug, Clone)]
pub struct StabilityState {
    pub onset: OnsetTracker,
    pub notes: NoteStabilizer,
}

impl StabilityState {
    pub fn new(config: &StabilityConfig) -> Self {
        Self {
            onset: OnsetTracker::new(config),
            notes: NoteStabilizer::new(config),
        }
    }

    pub fn reset(&mut self) {
        self.onset.reset();
        self.notes.reset();
    }
}
