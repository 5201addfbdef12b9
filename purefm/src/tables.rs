//! Lookup tables and integer math used internally by the synthesizer.
//!
//! The engine multiplies in the log domain: oscillators produce a
//! log-magnitude sample, envelopes produce a log-domain level, and the two
//! are added and converted back to a linear sample with a single table
//! lookup and a shift (see [Tables::output]).  The tables are built once per
//! sample rate with floating point math and are read-only afterwards, so
//! everything on the audio path is table lookups, adds and shifts.

use core::f64::consts::PI;

/// Size of the quarter wave (log, logsin and exp) tables
pub const QUARTER: usize = 0x4000;
/// Size of the one octave note table
pub const NOTES: usize = 0x1000;
/// Pitch units per octave
pub const OCTAVE: i32 = NOTES as i32;

const QUARTER_MASK: i32 = QUARTER as i32 - 1;
const NOTE_MASK: i32 = NOTES as i32 - 1;

/// Frequency of middle C, which is pitch zero
pub const MIDDLE_C_HZ: f64 = 261.625565;

// Shift a value right, saturating to zero instead of overflowing
const fn shr_sat(n: i32, shift: i32) -> i32 {
    if shift <= 0 {
        n
    } else if shift >= 31 {
        0
    } else {
        n >> shift
    }
}

/// The process-wide lookup tables.
///
/// These are relatively large (about 230kB), so they are always boxed.  See
/// [crate::Context].
#[derive(Clone)]
pub struct Tables {
    logsin: [i32; QUARTER],
    exp: [i32; QUARTER],
    log: [i32; QUARTER],
    notes: [i64; NOTES],
    scale: [i32; 12],
}

impl Tables {
    /// Build all tables for the given sample rate
    pub fn new(sample_rate: f64) -> Box<Self> {
        let mut t = Box::new(Self {
            logsin: [0; QUARTER],
            exp: [0; QUARTER],
            log: [0; QUARTER],
            notes: [0; NOTES],
            scale: [0; 12],
        });
        // 14 bits around the quarter arc gives 16 bits around the full wave,
        // with 16 bits of output per half for 17 bits of output in total
        for n in 0..QUARTER {
            // use odd samples for an even amount per quadrant
            let x = n as f64 + 0.5;

            let y = (x / 0x8000 as f64 * PI).sin();
            t.logsin[n] = (-y.log2() * QUARTER as f64).round() as i32;

            let x = x / QUARTER as f64;
            t.log[n] = (-x.log2() * QUARTER as f64).round() as i32;

            // complements each log or logsin
            t.exp[n ^ QUARTER_MASK as usize] = (x.exp2() * 0x8000 as f64).round() as i32;
        }
        // phase increment for a 32 bit phase accumulator
        let hz = MIDDLE_C_HZ * (65536.0 / sample_rate);
        for n in 0..NOTES {
            let y = hz * (n as f64 / NOTES as f64).exp2();
            t.notes[n] = (y * 65536.0).round() as i64;
        }
        for n in 0..12 {
            t.scale[n] = (OCTAVE as f64 * (n as f64 / 12.0)).round() as i32;
        }
        t
    }

    /// `-log2(sin(x))` of the quarter wave, indexed by a 14 bit phase
    pub fn logsin(&self, phase: i32) -> i32 {
        self.logsin[(phase & QUARTER_MASK) as usize]
    }

    /// `-log2(x)` over `(0, 1)`, indexed by 14 bits
    pub fn log(&self, index: i32) -> i32 {
        self.log[(index & QUARTER_MASK) as usize]
    }

    /// Inverse of [Tables::log]: the low 14 bits index the table and the
    /// remaining high bits are an octave (right shift)
    pub fn exp(&self, l: i32) -> i32 {
        shr_sat(self.exp[(l & QUARTER_MASK) as usize], l >> 14)
    }

    /// `2^(units / 0x4000)` as an integer, saturating at `i32::MAX`.  Used by
    /// exponential curves that must not touch floating point after init.
    pub fn pow2(&self, units: i32) -> i32 {
        let units = units.max(0);
        let octave = units >> 14;
        if octave > 30 {
            return i32::MAX;
        }
        let mantissa = i64::from(self.exp[((units & QUARTER_MASK) ^ QUARTER_MASK) as usize]);
        ((mantissa << octave) >> 15).min(i64::from(i32::MAX)) as i32
    }

    /// Convert a frequency in pitch units (4096 per octave, zero at middle C)
    /// to a 32 bit phase increment per sample
    pub fn pitch(&self, frequency: i32) -> i64 {
        let p = self.notes[(frequency & NOTE_MASK) as usize];
        let shift = frequency >> 12;
        if shift < 0 {
            p >> (-shift).min(63)
        } else {
            p << shift.min(31)
        }
    }

    /// Convert a signed semitone offset from middle C to pitch units
    pub fn scale(&self, note: i32) -> i32 {
        let octaves = (note.unsigned_abs() / 12) as i32;
        let n = self.scale[(note.unsigned_abs() % 12) as usize]
            .saturating_add(OCTAVE.saturating_mul(octaves));
        if note < 0 {
            -n
        } else {
            n
        }
    }

    /// Return the linear output of a log domain oscillator sample `input` and
    /// an envelope value.
    ///
    /// The envelope is silent at or below zero and full at or above
    /// `0x1000000`.  Envelopes and levels each span `[EG_MIN, EG_MAX]`, so the
    /// sum of two minimums is still silent and the sum of two maximums is just
    /// below full.  The output is in the positive 24 bit range.
    pub fn output(&self, input: i32, envelope: i32) -> i32 {
        let envelope = (0x100_0000 - i64::from(envelope)).clamp(0, 0x100_0000) as i32;
        // [0-16] << 14 + [0-16384)
        let index = input.saturating_add(envelope >> 6);
        shr_sat(self.exp[(index & QUARTER_MASK) as usize], index >> 14) << 7
    }

    /// Convert a 7 bit envelope duration setting to a ramp increment per
    /// sample.  Larger settings are longer durations; above the knee the
    /// increment grows exponentially.
    pub fn duration_param(value: i32) -> i32 {
        let v = 0x80 - value;
        if v > 0x2c {
            (f64::from(v) * (16.0 / 128.0)).exp2().round() as i32
        } else {
            v
        }
    }

    /// Approximate inverse of [Tables::duration_param]
    pub fn duration_value(rate: i32) -> i32 {
        let v = if rate > 0x2c {
            (f64::from(rate).log2() * 8.0).round() as i32
        } else {
            rate
        };
        (0x80 - v).clamp(0, 0x7f)
    }

    /// Convert a 7 bit level setting to a 24 bit level.  64 is zero.
    pub fn level_param(value: i32) -> i32 {
        // the lower 6 bits are dropped by the engine:
        // maximum output 0xfe0000, (0x1000000 - 0xfe0000) >> 6 = 0x800, -0.75dB
        (value - 64) << 17
    }

    /// Inverse of [Tables::level_param]
    pub fn level_value(level: i32) -> i32 {
        ((level >> 17) + 64).clamp(0, 0x7f)
    }

    /// Convert a 7 bit pitch envelope setting (centered on 64) to a level,
    /// scaled down by `scale` bits.  At scale 7 the range is roughly one MIDI
    /// note per increment.
    pub fn pitch_param(value: i32, scale: i32) -> i32 {
        let value = value - 64;
        let value = (value * 341) + (value / 3);
        // high 16 bits of a 24 bit value
        (value >> scale.clamp(0, 31)) << 8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EG_MAX, EG_MIN};

    #[test]
    fn output_spans_silence_to_full_scale() {
        for sr in [44100f64, 48000f64, 96000f64] {
            let t = Tables::new(sr);
            let peak = t.logsin(QUARTER_MASK);
            for x in [peak, t.logsin(0x2000), t.logsin(0x100)] {
                assert!(t.output(x, EG_MIN) <= 0x100);
                assert!(t.output(x, EG_MIN + EG_MIN) <= 0x100);
            }
            // two maximum levels added together is full scale
            assert!(t.output(peak, EG_MAX + EG_MAX) > 0x7f_0000);
            assert!(t.output(peak, EG_MAX + EG_MAX) <= 0x80_0000);
        }
    }

    #[test]
    fn output_is_monotonic_in_envelope() {
        let t = Tables::new(44100f64);
        for x in [0, 0x1234, 0x4000, 0x2_0000] {
            let mut last = 0;
            let mut env = EG_MIN;
            while env <= 0x100_0000 {
                let out = t.output(x, env);
                assert!(out >= last, "x={:#x} env={:#x}", x, env);
                last = out;
                env += 0x800;
            }
        }
    }

    #[test]
    fn pitch_doubles_per_octave() {
        let t = Tables::new(44100f64);
        let c = t.pitch(0);
        let expected = MIDDLE_C_HZ * 65536.0 * 65536.0 / 44100.0;
        assert!((c as f64 - expected).abs() < 1.0);
        assert_eq!(t.pitch(OCTAVE), c * 2);
        assert_eq!(t.pitch(-OCTAVE), c / 2);
        assert_eq!(t.pitch(3 * OCTAVE + 100), t.pitch(100) * 8);
    }

    #[test]
    fn semitone_scale() {
        let t = Tables::new(44100f64);
        assert_eq!(t.scale(0), 0);
        assert_eq!(t.scale(12), OCTAVE);
        assert_eq!(t.scale(-12), -OCTAVE);
        assert_eq!(t.scale(7), 2389);
        assert_eq!(t.scale(-19), -(OCTAVE + 2389));
        assert_eq!(t.scale(i32::MAX), i32::MAX);
        assert_eq!(t.scale(i32::MIN), -i32::MAX);
    }

    #[test]
    fn exp_and_log_are_complementary() {
        let t = Tables::new(44100f64);
        for i in (1..QUARTER as i32).step_by(97) {
            // exp(log(x)) ~= x, in 16 bit units
            let back = t.exp(t.log(i));
            let expected = (i as f64 + 0.5) / QUARTER as f64 * 65536.0;
            assert!((back as f64 - expected).abs() <= expected * 0.001 + 2.0);
        }
    }

    #[test]
    fn pow2_is_integer_exponential() {
        let t = Tables::new(44100f64);
        assert_eq!(t.pow2(0), 1);
        assert_eq!(t.pow2(0x4000 * 4), 16);
        assert!((t.pow2(0x4000 * 10 + 0x2000) - 1448).abs() <= 1);
        assert_eq!(t.pow2(0x4000 * 40), i32::MAX);
        assert_eq!(t.pow2(-5), 1);
    }

    #[test]
    fn duration_round_trip() {
        let mut last = i32::MAX;
        for v in 0..=127 {
            let rate = Tables::duration_param(v);
            assert!(rate <= last);
            last = rate;
            assert!((Tables::duration_value(rate) - v).abs() <= 1);
        }
    }

    #[test]
    fn level_round_trip() {
        for v in 0..=127 {
            let level = Tables::level_param(v);
            assert!(level >= EG_MIN && level <= EG_MAX);
            assert_eq!(Tables::level_value(level), v);
        }
    }

    #[test]
    fn pitch_param_is_centered_and_monotonic() {
        assert_eq!(Tables::pitch_param(64, 0), 0);
        assert_eq!(Tables::pitch_param(64, 7), 0);
        let mut last = i32::MIN;
        for v in 0..=127 {
            let p = Tables::pitch_param(v, 3);
            assert!(p >= last);
            last = p;
        }
    }
}
