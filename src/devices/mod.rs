//! DSP primitives: oscillators, envelope, and per-voice filters.

mod env;
mod filt;
mod osc;

pub use env::{AdsrEnvelope, EnvState};
pub use filt::{LadderFilter, StateVariableFilter};
pub use osc::{Noise, Phase, Pulse, Saw, Sine, Square, Sub};
