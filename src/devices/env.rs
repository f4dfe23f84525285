//! The ADSR/VCA envelope generator.
//!
//! A six-state machine (Idle, StealFade, Attack, Decay, Sustain, Release)
//! with counter-based, sample-accurate timing.  Phase progress is computed
//! as `p = (counter << 15) / phase_samples` in 64 bit arithmetic and clamped
//! to 1.0, so levels are pure Q16.15 with no floating point in the sample
//! loop.
//!
//! The steal fade exists to make voice reuse click-free: retriggering an
//! audible voice first ramps it to exact zero over a few milliseconds, and
//! only then starts the attack.  Sustain is smoothed, with one special case:
//! when the sustain target is exactly zero the level is forced to zero
//! rather than ramping, because a linear Q16.15 ramp would otherwise park
//! one LSB above silence.
//!
//! Timing parameters are themselves smoothed (as sample counts).  A shortened
//! phase length that would push the computed progress past 1.0 does not jump
//! the level; instead the counter is recomputed from the current level by
//! inverting the phase's interpolation formula, and the phase continues from
//! there.

use crate::context::Context;
use crate::fixedmath::Fix15;
use crate::smoother::{Smoothed, SmoothedU32};

/// Length of the steal fade, in seconds.
const STEAL_FADE_SECONDS: f32 = 0.005;
/// Ramp length for sustain-level and timing-parameter changes.
const PARAM_RAMP_SECONDS: f32 = 0.01;

/// The envelope state machine phases.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum EnvState {
    /// Silent; level is exactly zero.
    #[default]
    Idle,
    /// Ramping an audible stolen voice down to zero before retriggering.
    StealFade,
    /// Rising 0 -> 1.
    Attack,
    /// Falling 1 -> sustain level.
    Decay,
    /// Holding at the (smoothed) sustain level.
    Sustain,
    /// Falling from the level at note-off down to zero.
    Release,
}

/// An ADSR envelope generator with click-free voice stealing.
pub struct AdsrEnvelope {
    state: EnvState,
    current_level: Fix15,
    sample_counter: u32,
    steal_fade_samples: u32,
    sustain_level: Fix15,
    release_start_level: Fix15,
    steal_fade_start_level: Fix15,
    s_sustain: Smoothed,
    s_attack: SmoothedU32,
    s_decay: SmoothedU32,
    s_release: SmoothedU32,
    ctx: Context,
}

impl AdsrEnvelope {
    /// Create an envelope with 10ms attack, 200ms decay, 0.3 sustain and
    /// 100ms release.
    pub fn new(ctx: &Context) -> Self {
        let mut env = Self {
            state: EnvState::Idle,
            current_level: Fix15::ZERO,
            sample_counter: 0,
            steal_fade_samples: ctx.seconds_to_samples(STEAL_FADE_SECONDS),
            sustain_level: Fix15::ZERO,
            release_start_level: Fix15::ZERO,
            steal_fade_start_level: Fix15::ZERO,
            s_sustain: Smoothed::new(),
            s_attack: SmoothedU32::new(),
            s_decay: SmoothedU32::new(),
            s_release: SmoothedU32::new(),
            ctx: *ctx,
        };
        env.s_sustain.reset(ctx, PARAM_RAMP_SECONDS);
        env.s_attack.reset(ctx, PARAM_RAMP_SECONDS);
        env.s_decay.reset(ctx, PARAM_RAMP_SECONDS);
        env.s_release.reset(ctx, PARAM_RAMP_SECONDS);
        env.s_sustain.set_value(Fix15::from_num(0.3));
        env.sustain_level = Fix15::from_num(0.3);
        env.s_attack.set_value(ctx.seconds_to_samples(0.01));
        env.s_decay.set_value(ctx.seconds_to_samples(0.2));
        env.s_release.set_value(ctx.seconds_to_samples(0.1));
        env
    }

    /// Trigger the envelope.  Returns `true` if the attack starts on the next
    /// sample; `false` means the voice was audible and a steal fade runs
    /// first, with the attack following automatically when it reaches zero.
    pub fn note_on(&mut self) -> bool {
        self.sample_counter = 0;
        if self.current_level == Fix15::ZERO {
            self.state = EnvState::Attack;
            true
        } else {
            self.steal_fade_start_level = self.current_level;
            self.state = EnvState::StealFade;
            false
        }
    }

    /// Release the envelope from whatever phase it is in.
    pub fn note_off(&mut self) {
        if self.state != EnvState::Idle {
            self.release_start_level = self.current_level;
            self.state = EnvState::Release;
            self.sample_counter = 0;
        }
    }

    /// True while the envelope is producing (or about to produce) output.
    pub fn is_active(&self) -> bool {
        self.state != EnvState::Idle
    }

    /// The current phase.
    pub fn state(&self) -> EnvState {
        self.state
    }

    /// The most recently computed level.
    pub fn level(&self) -> Fix15 {
        self.current_level
    }

    /// Set the attack time.  Smoothed; callable every block.
    pub fn set_attack_seconds(&self, seconds: f32) {
        self.s_attack.set_target(self.ctx.seconds_to_samples(seconds));
    }

    /// Set the decay time.  Smoothed; callable every block.
    pub fn set_decay_seconds(&self, seconds: f32) {
        self.s_decay.set_target(self.ctx.seconds_to_samples(seconds));
    }

    /// Set the release time.  Smoothed; callable every block.
    pub fn set_release_seconds(&self, seconds: f32) {
        self.s_release.set_target(self.ctx.seconds_to_samples(seconds));
    }

    /// Set the sustain level in `[0, 1]`.  Exactly zero is pinned to silence
    /// rather than smoothed.
    pub fn set_sustain_level(&self, level: f32) {
        let level = level.clamp(0.0, 1.0);
        let target = if level == 0.0 {
            Fix15::ZERO
        } else {
            Fix15::from_num(level)
        };
        self.s_sustain.set_target(target);
    }

    /// Advance one sample and return the envelope level.
    pub fn next(&mut self) -> Fix15 {
        self.sustain_level = self.s_sustain.next();
        let attack_samples = self.s_attack.next();
        let decay_samples = self.s_decay.next();
        let release_samples = self.s_release.next();

        match self.state {
            EnvState::Attack => {
                if attack_samples > 0 {
                    if self.sample_counter > attack_samples {
                        self.sample_counter = Self::invert_rise(self.current_level, attack_samples);
                    }
                    self.current_level = Self::progress(self.sample_counter, attack_samples);
                    self.sample_counter += 1;
                    if self.sample_counter >= attack_samples {
                        self.current_level = Fix15::ONE;
                        self.state = EnvState::Decay;
                        self.sample_counter = 0;
                    }
                } else {
                    self.current_level = Fix15::ONE;
                    self.state = EnvState::Decay;
                    self.sample_counter = 0;
                }
            }
            EnvState::Decay => {
                if decay_samples > 0 {
                    if self.sample_counter > decay_samples {
                        self.sample_counter =
                            Self::invert_decay(self.current_level, self.sustain_level, decay_samples);
                    }
                    let p = Self::progress(self.sample_counter, decay_samples);
                    self.current_level = Fix15::ONE - p * (Fix15::ONE - self.sustain_level);
                    self.sample_counter += 1;
                    if self.sample_counter >= decay_samples {
                        self.current_level = self.sustain_level;
                        self.state = EnvState::Sustain;
                        self.sample_counter = 0;
                    }
                } else {
                    self.current_level = self.sustain_level;
                    self.state = EnvState::Sustain;
                    self.sample_counter = 0;
                }
            }
            EnvState::Sustain => {
                self.current_level = self.sustain_level;
                if self.s_sustain.target() == Fix15::ZERO {
                    self.current_level = Fix15::ZERO;
                }
            }
            EnvState::Release => {
                if release_samples > 0 {
                    if self.sample_counter > release_samples {
                        self.sample_counter = Self::invert_fall(
                            self.current_level,
                            self.release_start_level,
                            release_samples,
                        );
                    }
                    let p = Self::progress(self.sample_counter, release_samples);
                    self.current_level = self.release_start_level * (Fix15::ONE - p);
                    self.sample_counter += 1;
                    if self.sample_counter >= release_samples {
                        self.current_level = Fix15::ZERO;
                        self.state = EnvState::Idle;
                        self.sample_counter = 0;
                    }
                } else {
                    self.current_level = Fix15::ZERO;
                    self.state = EnvState::Idle;
                    self.sample_counter = 0;
                }
            }
            EnvState::StealFade => {
                if self.steal_fade_samples > 0 {
                    let p = Self::progress(self.sample_counter, self.steal_fade_samples);
                    self.current_level = self.steal_fade_start_level * (Fix15::ONE - p);
                    self.sample_counter += 1;
                    if self.sample_counter >= self.steal_fade_samples {
                        self.current_level = Fix15::ZERO;
                        self.state = EnvState::Attack;
                        self.sample_counter = 0;
                    }
                } else {
                    self.current_level = Fix15::ZERO;
                    self.state = EnvState::Attack;
                    self.sample_counter = 0;
                }
            }
            EnvState::Idle => {
                self.current_level = Fix15::ZERO;
            }
        }
        self.current_level
    }

    // p = (counter << 15) / total, clamped to 1.0, in 64 bit arithmetic.
    fn progress(counter: u32, total: u32) -> Fix15 {
        let p = ((counter as u64) << 15) / total as u64;
        Fix15::from_bits(p.min(1 << 15) as i32)
    }

    // counter such that progress(counter) == level, for level = p.
    fn invert_rise(level: Fix15, total: u32) -> u32 {
        ((level.to_bits() as u64 * total as u64) >> 15) as u32
    }

    // counter for level = 1 - p * (1 - sustain).
    fn invert_decay(level: Fix15, sustain: Fix15, total: u32) -> u32 {
        let span = Fix15::ONE - sustain;
        if span <= Fix15::ZERO {
            return total;
        }
        let p = (Fix15::ONE - level) / span;
        Self::invert_rise(p.clamp(Fix15::ZERO, Fix15::ONE), total)
    }

    // counter for level = start * (1 - p).
    fn invert_fall(level: Fix15, start: Fix15, total: u32) -> u32 {
        if start <= Fix15::ZERO {
            return total;
        }
        let p = Fix15::ONE - (level / start).clamp(Fix15::ZERO, Fix15::ONE);
        Self::invert_rise(p, total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> AdsrEnvelope {
        AdsrEnvelope::new(&Context::new_441())
    }

    #[test]
    fn attack_decay_reach_sustain_on_schedule() {
        let mut e = env();
        assert!(e.note_on());
        for _ in 0..441 {
            e.next();
        }
        assert_eq!(e.state(), EnvState::Decay);
        assert_eq!(e.level(), Fix15::ONE);
        for _ in 0..8820 {
            e.next();
        }
        assert_eq!(e.state(), EnvState::Sustain);
        assert_eq!(e.level(), Fix15::from_num(0.3));
    }

    #[test]
    fn release_reaches_idle_on_schedule() {
        let mut e = env();
        e.note_on();
        for _ in 0..(441 + 8820 + 100) {
            e.next();
        }
        e.note_off();
        for _ in 0..4410 {
            e.next();
        }
        assert_eq!(e.state(), EnvState::Idle);
        assert_eq!(e.level(), Fix15::ZERO);
        // Idle stays silent.
        assert_eq!(e.next(), Fix15::ZERO);
    }

    #[test]
    fn attack_level_is_linear_progress() {
        let mut e = env();
        e.note_on();
        e.next(); // counter 0 -> level 0
        let quarter = {
            let mut level = Fix15::ZERO;
            for _ in 0..110 {
                level = e.next();
            }
            level
        };
        let expected = Fix15::from_bits(((110u64 << 15) / 441) as i32);
        assert!((quarter - expected).abs() <= Fix15::from_bits(2));
    }

    #[test]
    fn steal_fade_runs_monotonically_to_zero_then_attacks() {
        let mut e = env();
        e.note_on();
        for _ in 0..5000 {
            e.next();
        }
        let level_before = e.level();
        assert!(level_before > Fix15::ZERO);
        assert!(!e.note_on(), "audible voice must steal-fade");
        assert_eq!(e.state(), EnvState::StealFade);
        let mut last = level_before;
        let mut faded = false;
        for _ in 0..220 {
            let l = e.next();
            assert!(l <= last, "steal fade must not rise");
            last = l;
            if e.state() == EnvState::Attack {
                faded = true;
                break;
            }
        }
        assert!(faded, "fade must complete within 220 samples");
        assert_eq!(last, Fix15::ZERO);
    }

    #[test]
    fn note_off_during_any_phase_releases() {
        let mut e = env();
        e.note_on();
        for _ in 0..100 {
            e.next();
        }
        e.note_off();
        assert_eq!(e.state(), EnvState::Release);
        let start = e.level();
        let l = e.next();
        assert!(l <= start);
    }

    #[test]
    fn zero_sustain_target_forces_exact_silence() {
        let mut e = env();
        e.note_on();
        for _ in 0..(441 + 8820 + 10) {
            e.next();
        }
        assert_eq!(e.state(), EnvState::Sustain);
        e.set_sustain_level(0.0);
        // Sustain tracks the smoother, but a zero target pins to silence
        // immediately instead of asymptoting.
        e.next();
        assert_eq!(e.level(), Fix15::ZERO);
    }

    #[test]
    fn shortening_attack_mid_phase_does_not_jump_level() {
        let mut e = env();
        e.set_attack_seconds(2.0); // 88200 samples
        // Let the timing smoother settle before triggering.
        for _ in 0..500 {
            e.next();
        }
        e.note_on();
        for _ in 0..40_000 {
            e.next();
        }
        let before = e.level();
        e.set_attack_seconds(0.1); // far below the current counter
        let mut max_step = Fix15::ZERO;
        let mut prev = before;
        for _ in 0..500 {
            let l = e.next();
            if e.state() != EnvState::Attack {
                break;
            }
            let step = (l - prev).abs();
            if step > max_step {
                max_step = step;
            }
            prev = l;
        }
        // Progress accelerates but the level itself never jumps.
        assert!(
            max_step < Fix15::from_num(0.01),
            "level jumped by {max_step}"
        );
    }

    #[test]
    fn instantaneous_phases_collapse() {
        let ctx = Context::new_441();
        let mut e = AdsrEnvelope::new(&ctx);
        e.set_attack_seconds(0.0);
        e.set_decay_seconds(0.0);
        for _ in 0..500 {
            e.next();
        }
        e.note_on();
        e.next(); // attack collapses
        e.next(); // decay collapses
        assert_eq!(e.state(), EnvState::Sustain);
    }

    #[test]
    fn retrigger_from_idle_skips_the_fade() {
        let mut e = env();
        assert!(e.note_on());
        e.note_off();
        for _ in 0..5000 {
            e.next();
        }
        assert_eq!(e.state(), EnvState::Idle);
        assert!(e.note_on(), "silent voice restarts without fading");
    }
}
