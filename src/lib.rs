//! This crate contains the real-time core of a polyphonic subtractive/FM
//! synthesizer targeting small dual-core microcontrollers driving a stereo
//! digital audio output.  All of the audio-path DSP uses Q16.15 fixed-point
//! arithmetic ([`Fix15`]) so that it runs in bounded time on parts without an
//! FPU, and the control/audio boundary is built entirely from single-word
//! atomics and a single-producer/single-consumer queue - the audio path never
//! allocates, blocks, or logs.
//!
//! The intended deployment splits the work across the two cores:
//!
//! * The *control* core reads a serial byte stream (interleaved MIDI and
//!   ASCII text commands, see [`midi`]), writes continuous controller values
//!   into the [`params::ParameterStore`], and pushes discrete note events
//!   through the [`fifo`] to the audio core.
//! * The *audio* core owns an [`engine::AudioEngine`] holding an ordered list
//!   of modules (the [`synth::PolySynth`] voice bank, [`modules::MasterGain`],
//!   etc.) and is driven by the buffer-completion signal of a double-buffered
//!   [`output`] driver.
//!
//! Hardware peripheral programming - the I2S/PWM serializers themselves, the
//! OLED framebuffer, rotary encoders, USB - is deliberately out of scope;
//! those adapters call into this crate through the narrow interfaces above.

#![no_std]
#![warn(missing_docs)]

#[cfg(test)]
#[macro_use]
extern crate std;

pub mod context;
pub mod devices;
pub mod engine;
pub mod fifo;
pub mod fixedmath;
pub mod midi;
pub mod modules;
pub mod output;
pub mod params;
pub mod smoother;
pub mod synth;
pub mod voice;

pub use fixedmath::Fix15;

/// Number of interleaved output channels.  The whole pipeline is stereo;
/// mono hardware (PWM) downmixes at the wire-format conversion.
pub const NUM_CHANNELS: usize = 2;

/// One interleaved stereo frame: `[left, right]`.
pub type Frame = [Fix15; NUM_CHANNELS];

/// Depth of the control-to-audio event queue.  Sized far above any realistic
/// per-block event burst; the producer only ever spins when this overflows,
/// which steady state never does.
pub const EVENT_QUEUE_DEPTH: usize = 64;
