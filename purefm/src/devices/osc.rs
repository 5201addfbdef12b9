use super::*;

use crate::tables::Tables;
use oorandom::Rand32;

/// A function generating the log domain magnitude of one half of a waveform.
///
/// The oscillator folds its phase so that `phase` runs over one half period
/// (15 bits); the second half is produced by the oscillator negating the
/// output.
pub trait Waveform {
    /// Generate the log magnitude at `phase`.  `rng` is the oscillator's
    /// private random source.
    fn generate(&self, tables: &Tables, phase: i32, rng: &mut Rand32) -> i32;
    /// True if the function has the same value over each half period.  The
    /// oscillator will only call [Waveform::generate] once per period for
    /// these.
    fn constant(&self) -> bool {
        false
    }
}

// quarter wave fold, mirroring the second quarter
fn fold(phase: i32) -> i32 {
    if phase & 0x4000 != 0 {
        (phase & 0x3fff) ^ 0x3fff
    } else {
        phase
    }
}

/// A sine wave
#[derive(Clone, Copy, Debug, Default)]
pub struct Sine;

impl Waveform for Sine {
    fn generate(&self, tables: &Tables, phase: i32, _: &mut Rand32) -> i32 {
        tables.logsin(fold(phase))
    }
}

/// A triangle wave
#[derive(Clone, Copy, Debug, Default)]
pub struct Triangle;

impl Waveform for Triangle {
    fn generate(&self, tables: &Tables, phase: i32, _: &mut Rand32) -> i32 {
        tables.log(fold(phase))
    }
}

/// A square wave
#[derive(Clone, Copy, Debug, Default)]
pub struct Square;

impl Waveform for Square {
    fn generate(&self, _: &Tables, _: i32, _: &mut Rand32) -> i32 {
        0
    }
    fn constant(&self) -> bool {
        true
    }
}

/// A rising sawtooth
#[derive(Clone, Copy, Debug, Default)]
pub struct SawUp;

impl Waveform for SawUp {
    fn generate(&self, tables: &Tables, phase: i32, _: &mut Rand32) -> i32 {
        tables.log(phase >> 1)
    }
}

/// A falling sawtooth
#[derive(Clone, Copy, Debug, Default)]
pub struct SawDown;

impl Waveform for SawDown {
    fn generate(&self, tables: &Tables, phase: i32, rng: &mut Rand32) -> i32 {
        SawUp.generate(tables, phase ^ 0x7fff, rng)
    }
}

/// Random noise, sampled once per period
#[derive(Clone, Copy, Debug, Default)]
pub struct Noise;

impl Waveform for Noise {
    fn generate(&self, _: &Tables, _: i32, rng: &mut Rand32) -> i32 {
        let r = rng.rand_u32() as i32;
        ((r >> 14) & 0xf) << 14 | (r & 0x3fff)
    }
    fn constant(&self) -> bool {
        true
    }
}

/// The waveforms available to an LFO
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Wave {
    /// Sine wave
    #[default]
    Sine,
    /// Triangle wave
    Triangle,
    /// Square wave
    Square,
    /// Rising sawtooth wave
    SawUp,
    /// Falling sawtooth wave
    SawDown,
    /// Sample and hold noise
    Noise,
}

impl Waveform for Wave {
    fn generate(&self, tables: &Tables, phase: i32, rng: &mut Rand32) -> i32 {
        match self {
            Wave::Sine => Sine.generate(tables, phase, rng),
            Wave::Triangle => Triangle.generate(tables, phase, rng),
            Wave::Square => Square.generate(tables, phase, rng),
            Wave::SawUp => SawUp.generate(tables, phase, rng),
            Wave::SawDown => SawDown.generate(tables, phase, rng),
            Wave::Noise => Noise.generate(tables, phase, rng),
        }
    }
    fn constant(&self) -> bool {
        matches!(self, Wave::Square | Wave::Noise)
    }
}

/// A phase accumulating oscillator.
///
/// This struct implements [Device], taking a phase increment and a phase
/// modulation offset as input and a [Wave] as the parameter.  The output is
/// the log domain magnitude and a flag which is true for the negative half of
/// the period.
#[derive(Clone)]
pub struct Oscillator {
    phase: u32,
    out: i32,
    rng: Rand32,
}

impl Default for Oscillator {
    fn default() -> Self {
        Self::new()
    }
}

impl Oscillator {
    /// Constructor
    pub fn new() -> Self {
        Self::with_seed(0)
    }
    /// Create an oscillator whose noise source starts from `seed`
    pub fn with_seed(seed: u64) -> Self {
        Self {
            phase: 0,
            out: 0,
            rng: Rand32::new(seed),
        }
    }
    /// Zero the phase
    pub fn reset(&mut self) {
        self.phase = 0;
    }
    /// Advance by `increment` (a 32 bit phase increment, see
    /// [Tables::pitch]) and return the waveform at the new phase plus
    /// `offset`, which is in units of 1/2^24 of a period.
    pub fn step<W: Waveform + ?Sized>(
        &mut self,
        wave: &W,
        tables: &Tables,
        increment: i64,
        offset: i32,
    ) -> (i32, bool) {
        let prev = self.phase;
        // truncating is modulo one period
        self.phase = self.phase.wrapping_add(increment as u32);
        let next = self.phase;

        let mut phase = (i64::from(next) + (i64::from(offset) << 8)) >> 16;
        let negative = phase & 0x8000 != 0;
        if negative {
            phase ^= 0x7fff;
        }
        if !wave.constant() || next < prev {
            self.out = wave.generate(tables, (phase & 0x7fff) as i32, &mut self.rng);
        }
        (self.out, negative)
    }
}

impl Device for Oscillator {
    type Input = (i64, i32);
    type Params = Wave;
    type Output = (i32, bool);
    fn next(&mut self, context: &Context, input: (i64, i32), params: &Wave) -> (i32, bool) {
        self.step(params, context.tables(), input.0, input.1)
    }
}
