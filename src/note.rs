//! Musical note conversion
//!
//! Maps frequencies onto 12-tone equal temperament referenced to A4 = 440 Hz,
//! with the deviation from the nearest pitch expressed in cents.

use std::fmt;

pub const A4_FREQUENCY: f32 = 440.0;

pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Pitch class plus octave, used to tell notes apart regardless of tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NoteId {
    pub name: &'static str,
    pub octave: i32,
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.octave)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub name: &'static str,
    /// Octave 4 contains A4.
    pub octave: i32,
    /// The detected frequency, not the equal-tempered one.
    pub frequency: f32,
    /// Signed deviation from the nearest pitch, roughly -50..=50.
    pub cents: f32,
}

impl Note {
    pub fn id(&self) -> NoteId {
        NoteId {
            name: self.name,
            octave: self.octave,
        }
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{} ({:.2} Hz, {:+.1} cents)",
            self.name, self.octave, self.frequency, self.cents
        )
    }
}

/// Converts a positive frequency to the nearest equal-tempered note.
pub fn frequency_to_note(frequency: f32) -> Note {
    let semitones_from_a4 = 12.0 * (frequency as f64 / A4_FREQUENCY as f64).log2();
    let nearest_semitone = semitones_from_a4.round();
    let cents = (100.0 * (semitones_from_a4 - nearest_semitone)) as f32;

    // A is nine semitones above C within an octave.
    let semitones_from_c4 = nearest_semitone as i32 + 9;
    let note_index = semitones_from_c4.rem_euclid(12) as usize;
    let octave = 4 + semitones_from_c4.div_euclid(12);

    Note {
        name: NOTE_NAMES[note_index],
        octave,
        frequency,
        cents,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_note_mapping() {
        let test_cases = [
            (440.0, "A", 4),
            (466.16, "A#", 4),
            (493.88, "B", 4),
            (523.25, "C", 5),
            (392.0, "G", 4),
            (220.0, "A", 3),
            (880.0, "A", 5),
            (261.63, "C", 4),
            (82.41, "E", 2),
            (27.5, "A", 0),
        ];

        for (freq, name, octave) in test_cases.iter() {
            let note = frequency_to_note(*freq);
            assert_eq!(note.name, *name, "{} Hz", freq);
            assert_eq!(note.octave, *octave, "{} Hz", freq);
            assert!(
                note.cents.abs() < 1.0,
                "Frequency {} Hz should be close to perfect pitch, got {} cents off",
                freq,
                note.cents
            );
        }
    }

    #[test]
    fn a440_is_exact() {
        let note = frequency_to_note(440.0);
        assert_eq!(note.id().to_string(), "A4");
        assert_eq!(note.frequency, 440.0);
        assert!(note.cents.abs() < 1e-4);
    }

    #[test]
    fn b_below_c_stays_in_lower_octave() {
        let note = frequency_to_note(246.94);
        assert_eq!((note.name, note.octave), ("B", 3));
        let note = frequency_to_note(30.87);
        assert_eq!((note.name, note.octave), ("B", 0));
    }

    #[test]
    fn sharp_and_flat_deviation_signs() {
        assert!(frequency_to_note(445.0).cents > 0.0);
        assert!(frequency_to_note(435.0).cents < 0.0);
        assert_eq!(frequency_to_note(466.16).name, "A#");
    }

    proptest! {
        #[test]
        fn cents_stay_within_half_semitone(freq in 20.0f32..5000.0) {
            let note = frequency_to_note(freq);
            prop_assert!(note.cents >= -50.001 && note.cents <= 50.001);
        }

        #[test]
        fn cents_rise_continuously_within_a_semitone(
            semitone in -36i32..36,
            low in -0.45f64..-0.01,
            high in 0.01f64..0.45,
        ) {
            let freq_at = |offset: f64| {
                (440.0 * 2f64.powf((semitone as f64 + offset) / 12.0)) as f32
            };
            let lower = frequency_to_note(freq_at(low));
            let upper = frequency_to_note(freq_at(high));

            prop_assert_eq!(lower.id(), upper.id());
            prop_assert!(lower.cents < upper.cents);
            prop_assert!((lower.cents as f64 - low * 100.0).abs() < 0.1);
            prop_assert!((upper.cents as f64 - high * 100.0).abs() < 0.1);
        }
    }
}
