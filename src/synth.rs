//! The polyphonic voice bank module.
//!
//! `PolySynth` owns a fixed bank of [`Voice`]s, consumes the inter-core
//! event queue, and mixes the bank into the output block.  All continuous
//! controls arrive through cached [`Parameter`] references resolved by id at
//! construction time; the audio loop itself never searches the store.
//!
//! Voice allocation on note-on, in order of preference:
//!
//! 1. a voice already playing (or still releasing) the same note - the
//!    retrigger prevents duplicate notes;
//! 2. the first voice whose envelope is idle;
//! 3. the first voice already in release (steal a dying voice);
//! 4. the sustaining voice with the lowest envelope level;
//! 5. failing all of those, the quietest voice overall.

use crate::context::Context;
use crate::engine::AudioModule;
use crate::fifo::{EventReceiver, NoteEvent, NOTE_OFF, NOTE_ON};
use crate::fixedmath::Fix15;
use crate::params::{Parameter, ParameterStore};
use crate::smoother::Smoothed;
use crate::voice::{FilterControls, FilterModConfig, OscMix, Voice};
use crate::Frame;

/// Ramp length for the oscillator mix and filter controls.
const CONTROL_RAMP_SECONDS: f32 = 0.02;

/// A bank of `NVOICES` voices behind the inter-core event queue.
pub struct PolySynth<'a, const NVOICES: usize> {
    voices: [Voice; NVOICES],
    events: EventReceiver<'a>,
    p_attack: &'a Parameter,
    p_decay: &'a Parameter,
    p_sustain: &'a Parameter,
    p_release: &'a Parameter,
    p_saw: &'a Parameter,
    p_pulse: &'a Parameter,
    p_sub: &'a Parameter,
    p_noise: &'a Parameter,
    p_pulse_width: &'a Parameter,
    p_cutoff: &'a Parameter,
    p_resonance: &'a Parameter,
    s_saw: Smoothed,
    s_pulse: Smoothed,
    s_sub: Smoothed,
    s_noise: Smoothed,
    s_pulse_width: Smoothed,
    s_cutoff: Smoothed,
    s_resonance: Smoothed,
}

impl<'a, const NVOICES: usize> PolySynth<'a, NVOICES> {
    /// Build the voice bank, resolving every parameter it needs from the
    /// store.  Fails if the canonical set has not been installed.
    pub fn new(
        store: &'a ParameterStore,
        events: EventReceiver<'a>,
        ctx: &Context,
        mod_cfg: FilterModConfig,
    ) -> Result<Self, &'static str> {
        let resolve = |id| store.by_id(id).ok_or("missing parameter");
        let mut synth = Self {
            voices: core::array::from_fn(|_| Voice::new(ctx, mod_cfg)),
            events,
            p_attack: resolve("attack")?,
            p_decay: resolve("decay")?,
            p_sustain: resolve("sustain")?,
            p_release: resolve("release")?,
            p_saw: resolve("sawLevel")?,
            p_pulse: resolve("pulseLevel")?,
            p_sub: resolve("subLevel")?,
            p_noise: resolve("noiseLevel")?,
            p_pulse_width: resolve("pulseWidth")?,
            p_cutoff: resolve("filterCutoff")?,
            p_resonance: resolve("filterResonance")?,
            s_saw: Smoothed::new(),
            s_pulse: Smoothed::new(),
            s_sub: Smoothed::new(),
            s_noise: Smoothed::new(),
            s_pulse_width: Smoothed::new(),
            s_cutoff: Smoothed::new(),
            s_resonance: Smoothed::new(),
        };
        for (smoother, param) in [
            (&mut synth.s_saw, synth.p_saw),
            (&mut synth.s_pulse, synth.p_pulse),
            (&mut synth.s_sub, synth.p_sub),
            (&mut synth.s_noise, synth.p_noise),
            (&mut synth.s_pulse_width, synth.p_pulse_width),
            (&mut synth.s_cutoff, synth.p_cutoff),
            (&mut synth.s_resonance, synth.p_resonance),
        ] {
            smoother.reset(ctx, CONTROL_RAMP_SECONDS);
            smoother.set_value(Fix15::from_num(param.value()));
        }
        Ok(synth)
    }

    /// Number of voices currently sounding (audible or releasing).
    pub fn sounding_voices(&self) -> usize {
        self.voices.iter().filter(|v| v.is_sounding()).count()
    }

    /// Immutable view of the voice bank, for diagnostics and tests.
    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    fn note_on(&mut self, note: u8, velocity: u8) {
        let slot = self.allocate(note.min(127));
        self.voices[slot].note_on(note, velocity);
    }

    fn note_off(&mut self, note: u8) {
        if let Some(v) = self
            .voices
            .iter_mut()
            .find(|v| v.is_active() && v.note() == note)
        {
            v.note_off();
        }
    }

    fn all_notes_off(&mut self) {
        for v in self.voices.iter_mut().filter(|v| v.is_active()) {
            v.note_off();
        }
    }

    fn allocate(&self, note: u8) -> usize {
        use crate::devices::EnvState;
        // Same note, still audible: retrigger it rather than doubling up.
        if let Some(i) = self
            .voices
            .iter()
            .position(|v| v.note() == note && (v.is_active() || v.is_sounding()))
        {
            return i;
        }
        if let Some(i) = self.voices.iter().position(|v| !v.is_sounding()) {
            return i;
        }
        if let Some(i) = self
            .voices
            .iter()
            .position(|v| v.env_state() == EnvState::Release)
        {
            return i;
        }
        let quietest_of = |pred: &dyn Fn(&Voice) -> bool| {
            self.voices
                .iter()
                .enumerate()
                .filter(|(_, v)| pred(v))
                .min_by_key(|(_, v)| v.env_level())
                .map(|(i, _)| i)
        };
        if let Some(i) = quietest_of(&|v: &Voice| v.env_state() == EnvState::Sustain) {
            return i;
        }
        quietest_of(&|_: &Voice| true).unwrap_or(0)
    }

    fn apply_event(&mut self, event: NoteEvent) {
        match event.command {
            NOTE_ON => self.note_on(event.data1, event.data2),
            NOTE_OFF => self.note_off(event.data1),
            _ if event.is_all_notes_off() => self.all_notes_off(),
            _ => {}
        }
    }

    fn update_targets(&mut self) {
        self.s_saw.set_target(Fix15::from_num(self.p_saw.value()));
        self.s_pulse.set_target(Fix15::from_num(self.p_pulse.value()));
        self.s_sub.set_target(Fix15::from_num(self.p_sub.value()));
        self.s_noise.set_target(Fix15::from_num(self.p_noise.value()));
        self.s_pulse_width
            .set_target(Fix15::from_num(self.p_pulse_width.value()));
        self.s_cutoff.set_target(Fix15::from_num(self.p_cutoff.value()));
        self.s_resonance
            .set_target(Fix15::from_num(self.p_resonance.value()));
        let attack = self.p_attack.value();
        let decay = self.p_decay.value();
        let sustain = self.p_sustain.value();
        let release = self.p_release.value();
        for v in self.voices.iter() {
            let env = v.envelope();
            env.set_attack_seconds(attack);
            env.set_decay_seconds(decay);
            env.set_sustain_level(sustain);
            env.set_release_seconds(release);
        }
    }
}

impl<const NVOICES: usize> AudioModule for PolySynth<'_, NVOICES> {
    fn process(&mut self, frames: &mut [Frame]) {
        while let Some(event) = self.events.poll() {
            self.apply_event(event);
        }
        self.update_targets();

        for frame in frames.iter_mut() {
            let mix = OscMix {
                saw: self.s_saw.next(),
                pulse: self.s_pulse.next(),
                sub: self.s_sub.next(),
                noise: self.s_noise.next(),
                pulse_width: self.s_pulse_width.next(),
            };
            let filter = FilterControls {
                cutoff: self.s_cutoff.next(),
                resonance: self.s_resonance.next(),
            };
            let mut acc = 0i32;
            for v in self.voices.iter_mut() {
                acc += v.render(&mix, &filter).to_bits();
            }
            // Mixing headroom for the whole bank.
            let sample = Fix15::from_bits(acc >> 3);
            frame[0] = sample;
            frame[1] = sample;
        }
    }
}
