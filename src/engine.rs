//! The block-oriented audio engine.
//!
//! The engine owns an ordered list of modules registered once at startup;
//! the order encodes the signal flow (sources, then processors, then master
//! gain).  Per block it zeroes the buffer lent by the output driver and runs
//! each module over it in turn.  Dispatch is through the module trait object
//! once per module per block, which is negligible at block granularity, and
//! nothing in the block path allocates.

use crate::{Fix15, Frame};
use arrayvec::ArrayVec;

/// Maximum number of modules an engine can hold.
pub const MAX_MODULES: usize = 8;

/// A unit of block processing in the signal chain.
pub trait AudioModule {
    /// Process one block of interleaved stereo frames in place.
    fn process(&mut self, frames: &mut [Frame]);
}

/// Anything that can fill a block on demand; implemented by
/// [`AudioEngine`] and consumed by the output drivers.
pub trait BlockProcessor {
    /// Fill `frames` with the next block of audio.
    fn process_block(&mut self, frames: &mut [Frame]);
}

/// An ordered chain of [`AudioModule`]s.
#[derive(Default)]
pub struct AudioEngine<'a> {
    modules: ArrayVec<&'a mut dyn AudioModule, MAX_MODULES>,
}

impl<'a> AudioEngine<'a> {
    /// Create an engine with no modules.
    pub fn new() -> Self {
        Self {
            modules: ArrayVec::new(),
        }
    }

    /// Append a module to the end of the chain.
    pub fn add_module(&mut self, module: &'a mut dyn AudioModule) -> Result<(), &'static str> {
        self.modules
            .try_push(module)
            .map_err(|_| "engine module list full")
    }

    /// Number of registered modules.
    pub fn module_count(&self) -> usize {
        self.modules.len()
    }
}

impl BlockProcessor for AudioEngine<'_> {
    fn process_block(&mut self, frames: &mut [Frame]) {
        for frame in frames.iter_mut() {
            *frame = [Fix15::ZERO; 2];
        }
        for module in self.modules.iter_mut() {
            module.process(frames);
        }
    }
}
