//! A single synthesis voice: oscillator bank, filter, and amplitude
//! envelope.
//!
//! Voices are created once at startup and never destroyed; note events only
//! change their state.  Retriggering an audible voice goes through the
//! envelope's steal fade, and the new note's frequency programming and phase
//! reset are deferred until the fade reaches zero - the waveform never jumps
//! while it is audible, which is what keeps voice stealing click-free.

use crate::context::Context;
use crate::devices::{AdsrEnvelope, EnvState, Noise, Pulse, Saw, Sub};
use crate::fixedmath::{midi_note_to_hz, velocity_to_fix15, Fix15};
use crate::smoother::Smoothed;

#[cfg(not(feature = "svf"))]
use crate::devices::LadderFilter as VoiceFilter;
#[cfg(feature = "svf")]
use crate::devices::StateVariableFilter as VoiceFilter;

/// Ramp length for per-voice velocity changes.
const VELOCITY_RAMP_SECONDS: f32 = 0.01;

/// Smoothed oscillator-mix levels for one sample, shared by every voice in
/// the bank.
#[derive(Clone, Copy, Default)]
pub struct OscMix {
    /// Sawtooth level, 0..1.
    pub saw: Fix15,
    /// Pulse level, 0..1.
    pub pulse: Fix15,
    /// Sub-oscillator level, 0..1.
    pub sub: Fix15,
    /// Noise level, 0..1.
    pub noise: Fix15,
    /// Pulse duty cycle, 0.05..0.95.
    pub pulse_width: Fix15,
}

/// Smoothed filter controls for one sample, shared by every voice.
#[derive(Clone, Copy, Default)]
pub struct FilterControls {
    /// Normalized cutoff, 0..1.
    pub cutoff: Fix15,
    /// Normalized resonance, 0..1.
    pub resonance: Fix15,
}

/// Build-time filter modulation depths.
///
/// These are deliberately not store parameters: the modulated cutoff is
/// `base + env_amount * env_level + key_track * (note - 60)/12 * 0.3`,
/// clamped to `[0, 1]`.
#[derive(Clone, Copy, Default)]
pub struct FilterModConfig {
    /// Amount of amplitude-envelope modulation applied to the cutoff.
    pub env_amount: Fix15,
    /// Amount of keyboard tracking applied to the cutoff.
    pub key_track: Fix15,
}

/// One polyphonic voice.
pub struct Voice {
    note: u8,
    active: bool,
    saw: Saw,
    pulse: Pulse,
    sub: Sub,
    noise: Noise,
    filter: VoiceFilter,
    env: AdsrEnvelope,
    s_velocity: Smoothed,
    // Note waiting for the steal fade to finish before it is programmed.
    pending: Option<(u8, Fix15)>,
    key_offset: Fix15,
    mod_cfg: FilterModConfig,
    sample_rate: u32,
}

impl Voice {
    /// Create a silent voice.
    pub fn new(ctx: &Context, mod_cfg: FilterModConfig) -> Self {
        let mut s_velocity = Smoothed::new();
        s_velocity.reset(ctx, VELOCITY_RAMP_SECONDS);
        Self {
            note: 69,
            active: false,
            saw: Saw::default(),
            pulse: Pulse::default(),
            sub: Sub::default(),
            noise: Noise::default(),
            filter: VoiceFilter::new(),
            env: AdsrEnvelope::new(ctx),
            s_velocity,
            pending: None,
            key_offset: Fix15::ZERO,
            mod_cfg,
            sample_rate: ctx.sample_rate_hz(),
        }
    }

    /// Start (or steal) this voice for `note` at `velocity`.
    pub fn note_on(&mut self, note: u8, velocity: u8) {
        let note = note.min(127);
        let velocity = velocity_to_fix15(velocity);
        self.note = note;
        self.active = true;
        if self.env.note_on() {
            self.program_note(note, velocity);
        } else {
            // Keep the old pitch while the steal fade rings out.
            self.pending = Some((note, velocity));
        }
    }

    /// Release this voice.
    pub fn note_off(&mut self) {
        self.active = false;
        self.pending = None;
        self.env.note_off();
    }

    /// The MIDI note this voice is (or will be) playing.
    pub fn note(&self) -> u8 {
        self.note
    }

    /// True between note-on and note-off.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// True while the envelope is still producing output, even after the
    /// note has been released.
    pub fn is_sounding(&self) -> bool {
        self.env.is_active()
    }

    /// The voice's envelope phase.
    pub fn env_state(&self) -> EnvState {
        self.env.state()
    }

    /// The voice's current envelope level.
    pub fn env_level(&self) -> Fix15 {
        self.env.level()
    }

    /// The voice's envelope, for pushing shared timing/sustain targets.
    pub fn envelope(&self) -> &AdsrEnvelope {
        &self.env
    }

    /// Render one sample.
    pub fn render(&mut self, mix: &OscMix, filter: &FilterControls) -> Fix15 {
        if let Some((note, velocity)) = self.pending {
            if self.env.state() != EnvState::StealFade {
                self.program_note(note, velocity);
                self.pending = None;
            }
        }

        let env_level = self.env.next();
        if !self.env.is_active() && env_level == Fix15::ZERO {
            return Fix15::ZERO;
        }

        self.pulse.set_pulse_width(mix.pulse_width);
        let osc_sum = mix.saw * self.saw.next_sample()
            + mix.pulse * self.pulse.next_sample()
            + mix.sub * self.sub.next_sample()
            + mix.noise * self.noise.next_sample();
        // Headroom for four oscillators at unity.
        let shaped = Fix15::from_bits(osc_sum.to_bits() >> 2);

        let cutoff = (filter.cutoff
            + self.mod_cfg.env_amount * env_level
            + self.mod_cfg.key_track * self.key_offset)
            .clamp(Fix15::ZERO, Fix15::ONE);
        let filtered = self.filter.process(shaped, cutoff, filter.resonance);

        filtered * env_level * self.s_velocity.next()
    }

    fn program_note(&mut self, note: u8, velocity: Fix15) {
        let freq = midi_note_to_hz(note);
        self.saw.reset_phase();
        self.pulse.reset_phase();
        self.sub.reset_phase();
        self.noise.reset_phase();
        self.saw.set_frequency(freq, self.sample_rate);
        self.pulse.set_frequency(freq, self.sample_rate);
        self.sub.set_frequency(freq, self.sample_rate);
        self.key_offset = Fix15::from_num((note as i32 - 60) as f32 / 12.0 * 0.3);
        self.s_velocity.set_target(velocity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> Context {
        Context::new_441()
    }

    fn saw_mix() -> OscMix {
        OscMix {
            saw: Fix15::ONE,
            pulse: Fix15::ZERO,
            sub: Fix15::ZERO,
            noise: Fix15::ZERO,
            pulse_width: Fix15::from_num(0.5),
        }
    }

    fn open_filter() -> FilterControls {
        FilterControls {
            cutoff: Fix15::ONE,
            resonance: Fix15::ZERO,
        }
    }

    #[test]
    fn silent_voice_renders_zero() {
        let mut v = Voice::new(&ctx(), FilterModConfig::default());
        for _ in 0..64 {
            assert_eq!(v.render(&saw_mix(), &open_filter()), Fix15::ZERO);
        }
    }

    #[test]
    fn note_on_produces_audio_then_note_off_decays_to_silence() {
        let mut v = Voice::new(&ctx(), FilterModConfig::default());
        v.note_on(60, 100);
        assert!(v.is_active());
        let mut peak = Fix15::ZERO;
        for _ in 0..4410 {
            let s = v.render(&saw_mix(), &open_filter());
            if s.abs() > peak {
                peak = s.abs();
            }
        }
        assert!(peak > Fix15::from_num(0.01), "peak {peak}");
        v.note_off();
        assert!(!v.is_active());
        assert!(v.is_sounding());
        for _ in 0..4500 {
            v.render(&saw_mix(), &open_filter());
        }
        assert!(!v.is_sounding());
        assert_eq!(v.render(&saw_mix(), &open_filter()), Fix15::ZERO);
    }

    #[test]
    fn restealing_defers_pitch_until_fade_completes() {
        let mut v = Voice::new(&ctx(), FilterModConfig::default());
        v.note_on(60, 100);
        for _ in 0..2000 {
            v.render(&saw_mix(), &open_filter());
        }
        v.note_on(72, 100);
        assert_eq!(v.note(), 72);
        assert_eq!(v.env_state(), EnvState::StealFade);
        // The envelope ramps down monotonically through the steal window and
        // the retrigger happens from exact silence.
        let mut prev = v.env_level();
        for _ in 0..500 {
            let s = v.render(&saw_mix(), &open_filter());
            assert!(s.abs() <= Fix15::from_num(16));
            let l = v.env_level();
            if v.env_state() == EnvState::StealFade {
                assert!(l <= prev);
            }
            prev = l;
        }
        assert_eq!(v.env_state(), EnvState::Attack);
    }

    #[test]
    fn out_of_range_notes_clamp_to_127() {
        let mut v = Voice::new(&ctx(), FilterModConfig::default());
        v.note_on(200, 100);
        assert_eq!(v.note(), 127);
    }

    #[test]
    fn key_tracking_opens_the_filter_for_high_notes() {
        let cfg = FilterModConfig {
            env_amount: Fix15::ZERO,
            key_track: Fix15::ONE,
        };
        let mut low = Voice::new(&ctx(), cfg);
        let mut high = Voice::new(&ctx(), cfg);
        low.note_on(36, 100);
        high.note_on(96, 100);
        let closed = FilterControls {
            cutoff: Fix15::from_num(0.1),
            resonance: Fix15::ZERO,
        };
        let mut low_acc = 0i64;
        let mut high_acc = 0i64;
        for _ in 0..8820 {
            low_acc += (low.render(&saw_mix(), &closed).to_bits() as i64).abs();
            high_acc += (high.render(&saw_mix(), &closed).to_bits() as i64).abs();
        }
        assert!(
            high_acc > low_acc,
            "tracking should brighten high notes ({high_acc} vs {low_acc})"
        );
    }
}
