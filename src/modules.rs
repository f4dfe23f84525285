//! Supplementary engine modules: master gain, a monophonic FM voice, and
//! the oscilloscope sample tap.

use crate::context::Context;
use crate::devices::{AdsrEnvelope, Sine};
use crate::engine::AudioModule;
use crate::fixedmath::Fix15;
use crate::params::{Parameter, ParameterStore};
use crate::smoother::Smoothed;
use crate::Frame;
use core::sync::atomic::{AtomicI32, AtomicUsize, Ordering};

/// Ramp length for master volume changes.
const MASTER_RAMP_SECONDS: f32 = 0.05;

/// Applies the smoothed `masterVol` parameter to the whole mix.  Placed
/// last in the chain.  A zero target ramps linearly to exact silence.
pub struct MasterGain<'a> {
    param: &'a Parameter,
    s_gain: Smoothed,
}

impl<'a> MasterGain<'a> {
    /// Resolve the `masterVol` parameter and build the module.
    pub fn new(store: &'a ParameterStore, ctx: &Context) -> Result<Self, &'static str> {
        let param = store.by_id("masterVol").ok_or("missing parameter")?;
        let mut s_gain = Smoothed::new();
        s_gain.reset(ctx, MASTER_RAMP_SECONDS);
        s_gain.set_value(Fix15::from_num(param.value()));
        Ok(Self { param, s_gain })
    }
}

impl AudioModule for MasterGain<'_> {
    fn process(&mut self, frames: &mut [Frame]) {
        self.s_gain.set_target(Fix15::from_num(self.param.value()));
        for frame in frames.iter_mut() {
            let gain = self.s_gain.next();
            frame[0] *= gain;
            frame[1] *= gain;
        }
    }
}

/// A monophonic two-operator FM voice.
///
/// A modulator sine running at `harmonicity * base` deviates the carrier
/// frequency by up to `mod_index` Hz each sample; the voice's own envelope
/// acts as its VCA.  Controlled programmatically rather than through the
/// store, since the CC map does not cover the FM parameters.
pub struct FmVoice {
    carrier: Sine,
    modulator: Sine,
    env: AdsrEnvelope,
    base_freq: f32,
    harmonicity: f32,
    mod_index: f32,
    gain: Fix15,
    sample_rate: u32,
}

impl FmVoice {
    /// Create a voice at 220Hz with a 2:1 modulator and no deviation.
    pub fn new(ctx: &Context) -> Self {
        let mut voice = Self {
            carrier: Sine::default(),
            modulator: Sine::default(),
            env: AdsrEnvelope::new(ctx),
            base_freq: 220.0,
            harmonicity: 2.0,
            mod_index: 0.0,
            gain: Fix15::from_num(0.25),
            sample_rate: ctx.sample_rate_hz(),
        };
        voice.retune();
        voice
    }

    /// Set the carrier base frequency in Hz.
    pub fn set_base_frequency(&mut self, freq_hz: f32) {
        self.base_freq = freq_hz;
        self.retune();
    }

    /// Set the modulator/carrier frequency ratio.
    pub fn set_harmonicity(&mut self, ratio: f32) {
        self.harmonicity = ratio;
        self.retune();
    }

    /// Set the peak carrier deviation, in Hz.
    pub fn set_mod_index(&mut self, index_hz: f32) {
        self.mod_index = index_hz;
    }

    /// Set the output gain.
    pub fn set_gain(&mut self, gain: Fix15) {
        self.gain = gain;
    }

    /// Trigger the envelope.
    pub fn note_on(&mut self) {
        self.env.note_on();
    }

    /// Release the envelope.
    pub fn note_off(&mut self) {
        self.env.note_off();
    }

    fn retune(&mut self) {
        self.carrier.set_frequency(self.base_freq, self.sample_rate);
        self.modulator
            .set_frequency(self.base_freq * self.harmonicity, self.sample_rate);
    }
}

impl AudioModule for FmVoice {
    fn process(&mut self, frames: &mut [Frame]) {
        for frame in frames.iter_mut() {
            let env_level = self.env.next();
            let deviation: f32 = self.modulator.next_sample().to_num::<f32>() * self.mod_index;
            self.carrier
                .set_frequency(self.base_freq + deviation, self.sample_rate);
            let sample = self.carrier.next_sample() * self.gain * env_level;
            frame[0] += sample;
            frame[1] += sample;
        }
    }
}

/// Length of the oscilloscope ring, matching a 128 pixel wide display.
pub const SCOPE_SAMPLES: usize = 128;

/// Shared storage behind the oscilloscope tap.  Lives wherever both cores
/// can see it; [`split`](Self::split) hands out the writer and reader.
pub struct ScopeBuffer {
    samples: [AtomicI32; SCOPE_SAMPLES],
    write_pos: AtomicUsize,
}

impl ScopeBuffer {
    /// Create a zeroed buffer.
    pub const fn new() -> Self {
        const ZERO: AtomicI32 = AtomicI32::new(0);
        Self {
            samples: [ZERO; SCOPE_SAMPLES],
            write_pos: AtomicUsize::new(0),
        }
    }

    /// Split into the audio-side writer module and the display-side reader.
    pub fn split(&mut self, decimation: u32) -> (ScopeTap<'_>, ScopeReader<'_>) {
        (
            ScopeTap {
                buffer: self,
                decimation: decimation.max(1),
                countdown: 0,
            },
            ScopeReader { buffer: self },
        )
    }
}

impl Default for ScopeBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Audio-side oscilloscope tap: copies every Nth left-channel sample into
/// the ring.  Registered after the modules whose output should be shown.
pub struct ScopeTap<'a> {
    buffer: &'a ScopeBuffer,
    decimation: u32,
    countdown: u32,
}

impl AudioModule for ScopeTap<'_> {
    fn process(&mut self, frames: &mut [Frame]) {
        for frame in frames.iter() {
            if self.countdown == 0 {
                self.countdown = self.decimation;
                let pos = self.buffer.write_pos.load(Ordering::Relaxed);
                self.buffer.samples[pos].store(frame[0].to_bits(), Ordering::Relaxed);
                self.buffer
                    .write_pos
                    .store((pos + 1) % SCOPE_SAMPLES, Ordering::Relaxed);
            }
            self.countdown -= 1;
        }
    }
}

/// Display-side reader.  Snapshots are taken with relaxed loads while the
/// writer keeps running; a torn view skews one pixel of a scope trace and
/// nothing else, so no synchronization is warranted.
pub struct ScopeReader<'a> {
    buffer: &'a ScopeBuffer,
}

impl ScopeReader<'_> {
    /// Copy the ring, oldest sample first, into `out`.
    pub fn snapshot(&self, out: &mut [Fix15; SCOPE_SAMPLES]) {
        let pos = self.buffer.write_pos.load(Ordering::Relaxed);
        for (i, slot) in out.iter_mut().enumerate() {
            let idx = (pos + i) % SCOPE_SAMPLES;
            *slot = Fix15::from_bits(self.buffer.samples[idx].load(Ordering::Relaxed));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{AudioEngine, BlockProcessor};

    #[test]
    fn master_gain_scales_and_smooths() {
        let store = ParameterStore::with_defaults();
        let ctx = Context::new_441();
        store.by_id("masterVol").unwrap().set_value(1.0);
        let mut gain = MasterGain::new(&store, &ctx).unwrap();
        // Smoother starts at the value present at construction time (0.05
        // was overwritten above before construction), so output follows the
        // parameter from the first block.
        let mut buf = [[Fix15::ONE; 2]; 64];
        gain.process(&mut buf);
        assert_eq!(buf[63][0], Fix15::ONE);

        store.by_id("masterVol").unwrap().set_value(0.5);
        // 50ms ramp = 2205 samples; after 40 blocks the gain has settled.
        for _ in 0..40 {
            buf = [[Fix15::ONE; 2]; 64];
            gain.process(&mut buf);
        }
        assert_eq!(buf[63][0], Fix15::from_num(0.5));
    }

    #[test]
    fn master_gain_reaches_exact_silence() {
        let store = ParameterStore::with_defaults();
        let ctx = Context::new_441();
        store.by_id("masterVol").unwrap().set_value(0.0);
        let mut gain = MasterGain::new(&store, &ctx).unwrap();
        let mut buf = [[Fix15::ONE; 2]; 64];
        gain.process(&mut buf);
        assert_eq!(buf[0][0], Fix15::ZERO);
    }

    #[test]
    fn fm_voice_produces_sound_only_while_enveloped() {
        let ctx = Context::new_441();
        let mut fm = FmVoice::new(&ctx);
        fm.set_mod_index(50.0);
        let mut buf = [[Fix15::ZERO; 2]; 64];
        fm.process(&mut buf);
        assert_eq!(buf[10][0], Fix15::ZERO);
        fm.note_on();
        let mut peak = Fix15::ZERO;
        for _ in 0..40 {
            buf = [[Fix15::ZERO; 2]; 64];
            fm.process(&mut buf);
            for f in buf.iter() {
                if f[0].abs() > peak {
                    peak = f[0].abs();
                }
            }
        }
        assert!(peak > Fix15::from_num(0.05), "peak {peak}");
    }

    #[test]
    fn fm_deviation_changes_the_waveform() {
        let ctx = Context::new_441();
        let mut plain = FmVoice::new(&ctx);
        let mut modulated = FmVoice::new(&ctx);
        modulated.set_mod_index(100.0);
        plain.note_on();
        modulated.note_on();
        let mut a = [[Fix15::ZERO; 2]; 64];
        let mut b = [[Fix15::ZERO; 2]; 64];
        for _ in 0..40 {
            a = [[Fix15::ZERO; 2]; 64];
            b = [[Fix15::ZERO; 2]; 64];
            plain.process(&mut a);
            modulated.process(&mut b);
        }
        assert_ne!(a, b);
    }

    #[test]
    fn scope_tap_captures_the_mix() {
        struct Dc(Fix15);
        impl AudioModule for Dc {
            fn process(&mut self, frames: &mut [Frame]) {
                for f in frames.iter_mut() {
                    f[0] = self.0;
                    f[1] = self.0;
                }
            }
        }
        let mut scope = ScopeBuffer::new();
        let (mut tap, reader) = scope.split(1);
        let mut dc = Dc(Fix15::from_num(0.33));
        let mut engine = AudioEngine::new();
        engine.add_module(&mut dc).unwrap();
        engine.add_module(&mut tap).unwrap();
        let mut buf = [[Fix15::ZERO; 2]; 64];
        engine.process_block(&mut buf);
        engine.process_block(&mut buf);
        let mut view = [Fix15::ZERO; SCOPE_SAMPLES];
        reader.snapshot(&mut view);
        assert!(view.iter().all(|s| *s == Fix15::from_num(0.33)));
    }
}
