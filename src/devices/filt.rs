//! Per-voice low-pass filters.
//!
//! The normative voice filter is a four-pole transistor-ladder model: a
//! resonance feedback tap around four cascaded one-pole stages, with hard
//! clamps bounding the feedback node and the final stage so the fixed-point
//! state can never wrap.  Coefficients come from normalized (0..1) cutoff
//! and resonance controls through precomputed Q16.15 constants.
//!
//! A Chamberlin state-variable filter is also provided with the same
//! surface; the `svf` cargo feature selects it as the per-voice filter.

use crate::fixedmath::Fix15;

// g = 0.001 + 0.849 * cutoff
const G_OFFSET: Fix15 = Fix15::from_bits(33); // 0.001
const G_SCALE: Fix15 = Fix15::from_bits(27787); // 0.849
// res = 3.9 * resonance
const RES_SCALE: Fix15 = Fix15::from_bits(127795); // 3.9
const STAGE_CLAMP: Fix15 = Fix15::from_bits(262144); // 8.0
const IO_CLAMP: Fix15 = Fix15::from_bits(524288); // 16.0
const MAKEUP_GAIN: Fix15 = Fix15::from_bits(81920); // 2.5

/// A four-pole resonant low-pass (Moog-style ladder), one instance per
/// voice.
#[derive(Clone, Copy, Default)]
pub struct LadderFilter {
    stage1: Fix15,
    stage2: Fix15,
    stage3: Fix15,
    stage4: Fix15,
}

impl LadderFilter {
    /// Create a filter with quiescent stages.
    pub fn new() -> Self {
        Default::default()
    }

    /// Zero the internal state.
    pub fn reset(&mut self) {
        *self = Default::default();
    }

    /// Run one sample through the ladder.  `cutoff` and `resonance` are
    /// normalized controls in `[0, 1]`.
    pub fn process(&mut self, input: Fix15, cutoff: Fix15, resonance: Fix15) -> Fix15 {
        let g = G_OFFSET + cutoff * G_SCALE;
        let res = resonance * RES_SCALE;

        let fb = (input - res * self.stage4).clamp(-IO_CLAMP, IO_CLAMP);

        self.stage1 += g * (fb - self.stage1);
        self.stage2 += g * (self.stage1 - self.stage2);
        self.stage3 += g * (self.stage2 - self.stage3);
        self.stage4 += g * (self.stage3 - self.stage4);
        self.stage4 = self.stage4.clamp(-STAGE_CLAMP, STAGE_CLAMP);

        (self.stage4 * MAKEUP_GAIN).clamp(-IO_CLAMP, IO_CLAMP)
    }
}

/// A Chamberlin state-variable low-pass with the same control surface as
/// [`LadderFilter`].
#[derive(Clone, Copy, Default)]
pub struct StateVariableFilter {
    low: Fix15,
    band: Fix15,
}

impl StateVariableFilter {
    // f ranges over (0.001, 0.85], the same span as the ladder's per-stage
    // gain; q = 2 - 1.9 * resonance keeps the loop damped.
    const Q_SCALE: Fix15 = Fix15::lit("1.9");

    /// Create a filter with quiescent state.
    pub fn new() -> Self {
        Default::default()
    }

    /// Zero the internal state.
    pub fn reset(&mut self) {
        *self = Default::default();
    }

    /// Run one sample.  `cutoff` and `resonance` are normalized controls in
    /// `[0, 1]`.
    pub fn process(&mut self, input: Fix15, cutoff: Fix15, resonance: Fix15) -> Fix15 {
        let f = G_OFFSET + cutoff * G_SCALE;
        let q = crate::fixedmath::TWO - resonance * Self::Q_SCALE;

        let input = input.clamp(-IO_CLAMP, IO_CLAMP);
        self.low += f * self.band;
        let high = input - self.low - q * self.band;
        self.band += f * high;

        self.low = self.low.clamp(-STAGE_CLAMP, STAGE_CLAMP);
        self.band = self.band.clamp(-STAGE_CLAMP, STAGE_CLAMP);

        (self.low * MAKEUP_GAIN).clamp(-IO_CLAMP, IO_CLAMP)
    }
}
