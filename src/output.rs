//! Double-buffered output drivers.
//!
//! A driver owns two hardware-format buffers and a Q16.15 scratch block.
//! The hardware (DMA + serializer) plays one buffer while the audio loop
//! fills the other; the completion interrupt flips a single atomic index and
//! the loop refills whichever buffer just finished.  The engine's fill must
//! complete before the playing buffer drains - `frames / sample_rate` is the
//! hard per-block deadline - and a completion that arrives while the previous
//! fill is still pending is counted as an underrun.  Underruns are only
//! counted here; reporting them (via [`log`]) is the control core's job,
//! through [`FillState::report_underruns`].
//!
//! Wire formats:
//!
//! * **I2S**: 16 bit signed PCM pairs packed into one 32 bit word per frame,
//!   left in the low half-word and right in the high half-word.  Q16.15
//!   samples clamp to `[-1, 1 - 2^-15]` and the low 16 bits of the word are
//!   the PCM value (full scale maps to full scale).
//! * **PWM**: mono downmix `(L + R) / 2`, clamped, then rescaled to an
//!   unsigned level in `[0, PWM_WRAP]`.

use crate::engine::BlockProcessor;
use crate::fixedmath::{Fix15, MAX_SAMPLE};
use crate::Frame;
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

/// PWM counter wrap value; output levels span `0..=PWM_WRAP`.
pub const PWM_WRAP: u16 = 254;

/// Clamp a sample into the representable PCM range and return its 16 bit
/// two's-complement value.
fn to_pcm16(sample: Fix15) -> i16 {
    sample.clamp(-Fix15::ONE, MAX_SAMPLE).to_bits() as i16
}

/// Shared driver bookkeeping: which buffer to fill next, whether a fill is
/// pending, and the underrun count.  The flip side runs in interrupt
/// context, so everything is a single-word atomic.
#[derive(Default)]
pub struct FillState {
    fill_idx: AtomicUsize,
    needs_fill: AtomicBool,
    underruns: AtomicU32,
}

impl FillState {
    const fn new() -> Self {
        Self {
            fill_idx: AtomicUsize::new(0),
            needs_fill: AtomicBool::new(false),
            underruns: AtomicU32::new(0),
        }
    }

    /// Signal from the completion interrupt: the buffer that was playing is
    /// free, flip the fill index toward it.  Returns the index of the buffer
    /// the hardware should play next.
    pub fn buffer_complete(&self) -> usize {
        if self.needs_fill.swap(true, Ordering::AcqRel) {
            // The loop never got to the previous buffer in time.
            self.underruns.fetch_add(1, Ordering::Relaxed);
        }
        self.fill_idx.fetch_xor(1, Ordering::AcqRel)
    }

    /// True if a fill is due.
    pub fn fill_pending(&self) -> bool {
        self.needs_fill.load(Ordering::Acquire)
    }

    /// Index of the buffer the loop should fill next.
    pub fn fill_index(&self) -> usize {
        self.fill_idx.load(Ordering::Acquire)
    }

    fn fill_done(&self) {
        self.needs_fill.store(false, Ordering::Release);
    }

    /// Drain and log the underrun count.  Control core only; the audio side
    /// never logs.
    pub fn report_underruns(&self) -> u32 {
        let count = self.underruns.swap(0, Ordering::Relaxed);
        if count > 0 {
            log::warn!("audio underruns: {}", count);
        }
        count
    }
}

/// Double-buffered I2S driver front end: fills and packs 32 bit L/R words
/// for the serializer.
pub struct I2sOutput<const FRAMES: usize> {
    words: [[u32; FRAMES]; 2],
    scratch: [Frame; FRAMES],
    state: FillState,
}

impl<const FRAMES: usize> I2sOutput<FRAMES> {
    /// Create a driver with silent buffers.
    pub fn new() -> Self {
        Self {
            words: [[0; FRAMES]; 2],
            scratch: [[Fix15::ZERO; 2]; FRAMES],
            state: FillState::new(),
        }
    }

    /// Fill both buffers before the hardware starts: the second buffer
    /// first, so the loop's steady state begins by refilling buffer 0 while
    /// buffer 1 plays.
    pub fn prime<P: BlockProcessor>(&mut self, processor: &mut P) {
        for idx in [1, 0] {
            self.render_into(idx, processor);
        }
        self.state.fill_done();
    }

    /// The shared fill/underrun bookkeeping, for wiring the completion
    /// interrupt and control-core reporting.
    pub fn state(&self) -> &FillState {
        &self.state
    }

    /// If a completion signal is pending, render and pack one block into the
    /// freed buffer.  Returns the index filled, or `None` when idle.
    pub fn fill_next<P: BlockProcessor>(&mut self, processor: &mut P) -> Option<usize> {
        if !self.state.fill_pending() {
            return None;
        }
        let idx = self.state.fill_index();
        self.render_into(idx, processor);
        self.state.fill_done();
        Some(idx)
    }

    /// The packed words of one buffer, for handing to the serializer.
    pub fn words(&self, idx: usize) -> &[u32; FRAMES] {
        &self.words[idx]
    }

    fn render_into<P: BlockProcessor>(&mut self, idx: usize, processor: &mut P) {
        processor.process_block(&mut self.scratch);
        for (word, frame) in self.words[idx].iter_mut().zip(self.scratch.iter()) {
            let left = to_pcm16(frame[0]) as u16;
            let right = to_pcm16(frame[1]) as u16;
            *word = ((right as u32) << 16) | left as u32;
        }
    }
}

impl<const FRAMES: usize> Default for I2sOutput<FRAMES> {
    fn default() -> Self {
        Self::new()
    }
}

/// Double-buffered PWM driver front end: mono-downmixes into unsigned
/// counter-compare levels.
pub struct PwmOutput<const FRAMES: usize> {
    levels: [[u16; FRAMES]; 2],
    scratch: [Frame; FRAMES],
    state: FillState,
}

impl<const FRAMES: usize> PwmOutput<FRAMES> {
    /// Create a driver with mid-scale (silent) buffers.
    pub fn new() -> Self {
        Self {
            levels: [[(PWM_WRAP + 1) / 2; FRAMES]; 2],
            scratch: [[Fix15::ZERO; 2]; FRAMES],
            state: FillState::new(),
        }
    }

    /// Fill both buffers before the hardware starts.
    pub fn prime<P: BlockProcessor>(&mut self, processor: &mut P) {
        for idx in [1, 0] {
            self.render_into(idx, processor);
        }
        self.state.fill_done();
    }

    /// The shared fill/underrun bookkeeping.
    pub fn state(&self) -> &FillState {
        &self.state
    }

    /// If a completion signal is pending, render one block into the freed
    /// buffer.  Returns the index filled, or `None` when idle.
    pub fn fill_next<P: BlockProcessor>(&mut self, processor: &mut P) -> Option<usize> {
        if !self.state.fill_pending() {
            return None;
        }
        let idx = self.state.fill_index();
        self.render_into(idx, processor);
        self.state.fill_done();
        Some(idx)
    }

    /// The levels of one buffer, for handing to the PWM slice.
    pub fn levels(&self, idx: usize) -> &[u16; FRAMES] {
        &self.levels[idx]
    }

    fn render_into<P: BlockProcessor>(&mut self, idx: usize, processor: &mut P) {
        processor.process_block(&mut self.scratch);
        for (level, frame) in self.levels[idx].iter_mut().zip(self.scratch.iter()) {
            let mono = Fix15::from_bits((frame[0].to_bits() + frame[1].to_bits()) >> 1);
            let pcm = to_pcm16(mono) as i32;
            *level = (((pcm + 32768) as u32 * (PWM_WRAP as u32 + 1)) >> 16) as u16;
        }
    }
}

impl<const FRAMES: usize> Default for PwmOutput<FRAMES> {
    fn default() -> Self {
        Self::new()
    }
}
