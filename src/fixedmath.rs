//! Fixed-point numeric layer used throughout the audio path.
//!
//! Everything downstream of the oscillators works in Q16.15: a signed 32 bit
//! word with one sign bit, 16 integer bits, and 15 fractional bits, giving a
//! range of +/-65536 at a resolution of about 3e-5.  Reference (full scale)
//! level is 1.0; the headroom above it is what lets the ladder filter ring up
//! to +/-16 internally without wrapping.
//!
//! Multiplication goes through a 64 bit intermediate followed by an
//! arithmetic shift right by 15, and division left-shifts the dividend by 15
//! before the quotient - both provided by the [`fixed`] crate's full-precision
//! arithmetic for [`I17F15`].  Addition and subtraction are ordinary 32 bit
//! arithmetic; keeping accumulations in range is the caller's job, and the
//! DSP code clamps explicitly at the points where signals can grow.

pub use fixed::types::I17F15;

/// The Q16.15 scalar.  `Fix15::ONE` has the raw value 32768.
pub type Fix15 = I17F15;

/// 0.5 in Q16.15.
pub const HALF: Fix15 = Fix15::lit("0.5");

/// 2.0 in Q16.15.
pub const TWO: Fix15 = Fix15::lit("2");

/// The largest representable value strictly below 1.0 (raw 32767).  Samples
/// are clamped to `[-ONE, MAX_SAMPLE]` before conversion to 16 bit PCM.
pub const MAX_SAMPLE: Fix15 = Fix15::lit("0x0.FFFE");

// Twelve-tone equal temperament ratios, 2^(k/12) for k = 0..11.
const SEMITONE_RATIOS: [f32; 12] = [
    1.0,
    1.059_463_1,
    1.122_462_0,
    1.189_207_1,
    1.259_921_0,
    1.334_839_9,
    1.414_213_6,
    1.498_307_1,
    1.587_401_1,
    1.681_792_8,
    1.781_797_4,
    1.887_748_6,
];

const fn build_pitch_table() -> [f32; 128] {
    let mut table = [0f32; 128];
    let mut n = 0usize;
    while n < 128 {
        let rel = n as i32 - 69;
        let mut octave = rel.div_euclid(12);
        let mut freq = 440.0f32 * SEMITONE_RATIOS[rel.rem_euclid(12) as usize];
        while octave > 0 {
            freq *= 2.0;
            octave -= 1;
        }
        while octave < 0 {
            freq *= 0.5;
            octave += 1;
        }
        table[n] = freq;
        n += 1;
    }
    table
}

static PITCH_TABLE: [f32; 128] = build_pitch_table();

/// Convert a MIDI note number to a frequency in Hz (A440, 12-TET).
///
/// Values of 128 and above clamp to note 127 rather than wrapping.
pub fn midi_note_to_hz(note: u8) -> f32 {
    PITCH_TABLE[note.min(127) as usize]
}

/// Convert a 7 bit MIDI velocity to a Q16.15 scalar in `[0, 1]`.
pub fn velocity_to_fix15(velocity: u8) -> Fix15 {
    Fix15::from_bits(((velocity.min(127) as i32) << 15) / 127)
}
