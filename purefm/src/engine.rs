//! The polyphonic engine: a fixed pool of voices, MIDI decoding and voice
//! allocation.

use std::sync::Arc;

use wmidi::MidiMessage;

use crate::context::{Context, Controllers};
use crate::handoff::PatchReceiver;
use crate::patch::Patch;
use crate::status::VoiceStatus;
use crate::voice::Voice;
use crate::{SampleFxP, POLYPHONY};

const SUSTAIN_PEDAL: u8 = 64;

/// How polyphonic notes are assigned to voices
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VoiceAllocation {
    /// Reuse the voice already playing the key, otherwise steal the voice
    /// started least recently
    #[default]
    Priority,
    /// Reuse the voice already playing the key, otherwise take the voice
    /// after the last one allocated
    RoundRobin,
}

/// Engine configuration
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EngineConfig {
    /// The polyphonic voice allocation policy
    pub allocation: VoiceAllocation,
}

/// The synthesizer engine.
///
/// In poly mode with [VoiceAllocation::Priority], voices are kept in a binary
/// min-heap ordered by the clock value of their last note on, so the root is
/// always the voice to steal.  The heap holds voice indices; the voices
/// themselves stay in place and are always mixed in the same order.
///
/// In mono mode each MIDI channel plays its own voice.
pub struct Engine {
    context: Context,
    config: EngineConfig,
    patch: Option<Arc<Patch>>,
    voices: [Voice; POLYPHONY],
    heap: [usize; POLYPHONY],
    now: u64,
    next: usize,
    last: usize,
    controllers: Controllers,
    expression_in: i32,
}

impl Engine {
    /// Create an engine with no patch.  It is silent until a patch is set
    /// with [Engine::update] or [Engine::sync].
    pub fn new(context: Context, config: EngineConfig) -> Self {
        log::debug!(
            "Creating engine at {} Hz with {} voices, {:?} allocation",
            context.sample_rate(),
            POLYPHONY,
            config.allocation
        );
        Self {
            context,
            config,
            patch: None,
            voices: core::array::from_fn(|i| Voice::new(i as u64)),
            heap: core::array::from_fn(|i| i),
            now: 0,
            next: 0,
            last: 0,
            controllers: Controllers::default(),
            expression_in: 0,
        }
    }

    /// The processing context
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// The current patch
    pub fn patch(&self) -> Option<&Patch> {
        self.patch.as_deref()
    }

    /// The current controller state
    pub fn controllers(&self) -> &Controllers {
        &self.controllers
    }

    /// Replace the current patch and pass it to every voice without
    /// retriggering anything.
    ///
    /// The engine may hold the last reference to the previous patch, in which
    /// case it is freed here.  On the audio thread use [Engine::sync], which
    /// leaves freeing to the publisher.
    pub fn update(&mut self, patch: Option<Arc<Patch>>) {
        self.patch = patch;
        if let Some(patch) = self.patch.as_deref() {
            for v in self.voices.iter_mut() {
                v.update(patch);
            }
        }
    }

    /// Pick up a newly published patch, if there is one.  Call once per
    /// processing block.  Returns true if the patch changed.
    pub fn sync(&mut self, receiver: &mut PatchReceiver) -> bool {
        if receiver.fetch() {
            self.update(receiver.snapshot());
            true
        } else {
            false
        }
    }

    fn priority_at(&self, i: usize) -> u64 {
        self.voices[self.heap[i]].priority()
    }

    // restore the heap after the priority at position `pos` changed
    fn repair(&mut self, mut pos: usize) {
        let start = pos;
        loop {
            let l = (pos << 1) + 1;
            if l >= POLYPHONY {
                break;
            }
            let r = l + 1;
            let c = if r < POLYPHONY && self.priority_at(r) < self.priority_at(l) {
                r
            } else {
                l
            };
            if self.priority_at(c) < self.priority_at(pos) {
                self.heap.swap(c, pos);
                pos = c;
            } else {
                break;
            }
        }
        if pos == start {
            while pos > 0 {
                let p = (pos - 1) >> 1;
                if self.priority_at(p) <= self.priority_at(pos) {
                    break;
                }
                self.heap.swap(p, pos);
                pos = p;
            }
        }
    }

    /// Start (or, for zero velocity, release) `key` on `channel`
    pub fn start(&mut self, channel: u8, key: u8, velocity: u8) {
        let Some(patch) = self.patch.as_deref() else {
            return;
        };
        let key = i32::from(key);
        let velocity = i32::from(velocity);
        let mono = patch.mono;

        let v = if mono {
            usize::from(channel) % POLYPHONY
        } else {
            let held = self.voices.iter().position(|v| v.key() == Some(key));
            match (held, velocity) {
                (Some(v), _) => v,
                // releasing a key nobody is playing
                (None, 0) => return,
                (None, _) => match self.config.allocation {
                    VoiceAllocation::Priority => self.heap[0],
                    VoiceAllocation::RoundRobin => {
                        let v = self.next;
                        self.next = (v + 1) % POLYPHONY;
                        v
                    }
                },
            }
        };

        self.last = v;
        self.voices[v].start(&self.context, patch, key, velocity, &self.controllers);

        if !mono && velocity > 0 && self.config.allocation == VoiceAllocation::Priority {
            self.now += 1;
            self.voices[v].set_priority(self.now);
            if let Some(pos) = self.heap.iter().position(|&h| h == v) {
                self.repair(pos);
            }
        }
    }

    /// Set the pressure for `key`, or for every key if `None`
    pub fn pressure(&mut self, channel: u8, key: Option<u8>, pressure: u8) {
        let Some(patch) = self.patch.as_deref() else {
            return;
        };
        let key = key.map(i32::from);
        let voices = if patch.mono {
            let v = usize::from(channel) % POLYPHONY;
            &mut self.voices[v..=v]
        } else {
            &mut self.voices[..]
        };
        for v in voices.iter_mut() {
            if key.is_none() || v.key() == key {
                v.pressure(pressure);
            }
        }
    }

    fn control(&mut self, control: u8, value: u8) {
        if control == SUSTAIN_PEDAL {
            self.controllers.sustain = value != 0;
        } else if self
            .patch
            .as_deref()
            .is_some_and(|p| p.expression_controllers.contains(&control))
        {
            self.expression_in = i32::from(value) << 5;
        }
    }

    /// Handle one MIDI message.  Anything other than notes, pressure, pitch
    /// bend, the sustain pedal and the patch's expression controllers is
    /// ignored, as are malformed messages.
    pub fn midi(&mut self, bytes: &[u8]) {
        let Ok(message) = MidiMessage::try_from(bytes) else {
            return;
        };
        match message {
            MidiMessage::NoteOff(ch, note, _) => self.start(ch.index(), u8::from(note), 0),
            MidiMessage::NoteOn(ch, note, velocity) => {
                self.start(ch.index(), u8::from(note), u8::from(velocity))
            }
            MidiMessage::PolyphonicKeyPressure(ch, note, value) => {
                self.pressure(ch.index(), Some(u8::from(note)), u8::from(value))
            }
            MidiMessage::ChannelPressure(ch, value) => {
                self.pressure(ch.index(), None, u8::from(value))
            }
            MidiMessage::ControlChange(_, control, value) => {
                self.control(u8::from(control.0), u8::from(value))
            }
            MidiMessage::PitchBendChange(_, bend) => {
                self.controllers.pitch_bend = (i32::from(u16::from(bend)) - 0x2000) << 2;
            }
            _ => {}
        }
    }

    /// Produce one mixed sample.  A single voice at full scale is `2^23`.
    pub fn step(&mut self) -> i32 {
        let expression = &mut self.controllers.expression;
        if *expression < self.expression_in {
            *expression += 1;
        } else if *expression > self.expression_in {
            *expression -= 1;
        }

        let Some(patch) = self.patch.as_deref() else {
            return 0;
        };
        let mut out = 0i32;
        for v in self.voices.iter_mut() {
            out = out.saturating_add(v.step(&self.context, patch, &self.controllers));
        }
        out
    }

    /// Fill `buf` with mixed samples normalized to `[-8, 8)`, where a single
    /// voice at full scale is 1/32
    pub fn render(&mut self, buf: &mut [f32]) {
        for smp in buf.iter_mut() {
            *smp = SampleFxP::from_bits(self.step()).to_num::<f32>();
        }
    }

    /// The status of the voice most recently started
    pub fn status(&self) -> VoiceStatus {
        self.voices[self.last].status()
    }

    /// The status of voice `index`
    pub fn voice_status(&self, index: usize) -> Option<VoiceStatus> {
        self.voices.get(index).map(Voice::status)
    }
}
