//! Per-sample linear ramps used to de-zipper parameter changes.
//!
//! A smoothed value steps linearly from its current value toward a target
//! over a fixed ramp length, landing on the target exactly on the final
//! sample.  The target side of the API is safe to call from the control core
//! while the audio core is stepping: the new target is published through a
//! one-word handshake (pending value, then flag, with release/acquire
//! ordering so the flag can never become visible before the value).  The
//! stepping side consumes the handshake and recomputes the ramp from
//! wherever the value currently is, so a retarget arriving mid-ramp restarts
//! cleanly with no discontinuity.
//!
//! Two concrete variants cover the two value domains in the synth: [`Smoothed`]
//! for Q16.15 audio-rate scalars and [`SmoothedU32`] for envelope phase
//! lengths expressed in samples.

use crate::context::Context;
use crate::Fix15;
use core::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};

/// A linearly smoothed Q16.15 value.
#[derive(Default)]
pub struct Smoothed {
    current: Fix15,
    target: Fix15,
    step: Fix15,
    remaining: u32,
    ramp_len: u32,
    pending: AtomicI32,
    has_new: AtomicBool,
}

impl Smoothed {
    /// Create a smoothed value at zero with a zero-length ramp (targets take
    /// effect immediately until [`reset`](Self::reset) is called).
    pub const fn new() -> Self {
        Self {
            current: Fix15::ZERO,
            target: Fix15::ZERO,
            step: Fix15::ZERO,
            remaining: 0,
            ramp_len: 0,
            pending: AtomicI32::new(0),
            has_new: AtomicBool::new(false),
        }
    }

    /// Set the ramp length without perturbing the current or target value.
    pub fn reset(&mut self, ctx: &Context, ramp_seconds: f32) {
        self.ramp_len = ctx.seconds_to_samples(ramp_seconds);
    }

    /// Force the value, bypassing the ramp and discarding any pending
    /// target.  Initialization only.
    pub fn set_value(&mut self, value: Fix15) {
        self.current = value;
        self.target = value;
        self.step = Fix15::ZERO;
        self.remaining = 0;
        self.pending.store(value.to_bits(), Ordering::Relaxed);
        self.has_new.store(false, Ordering::Relaxed);
    }

    /// Publish a new target.  Callable from the control core while the audio
    /// core is inside [`next`](Self::next); the value write is ordered before
    /// the flag write.  Republishing an unchanged target is a no-op, so
    /// callers may push their targets unconditionally every block without
    /// restarting an in-flight ramp.
    pub fn set_target(&self, value: Fix15) {
        // Single writer: reading back our own last publication is race-free.
        if self.pending.load(Ordering::Relaxed) == value.to_bits() {
            return;
        }
        self.pending.store(value.to_bits(), Ordering::Relaxed);
        self.has_new.store(true, Ordering::Release);
    }

    /// The value the ramp is heading toward (audio side).
    pub fn target(&self) -> Fix15 {
        self.target
    }

    /// The current value without advancing.
    pub fn current(&self) -> Fix15 {
        self.current
    }

    /// Advance one sample and return the new value.  Audio side only.
    pub fn next(&mut self) -> Fix15 {
        if self.has_new.load(Ordering::Acquire) {
            let target = Fix15::from_bits(self.pending.load(Ordering::Relaxed));
            self.has_new.store(false, Ordering::Relaxed);
            self.target = target;
            if self.ramp_len == 0 || target == self.current {
                self.current = target;
                self.remaining = 0;
            } else {
                // Per-sample step, truncated toward zero so the ramp can
                // never overshoot the segment before the final clamp.
                self.step = Fix15::from_bits(
                    (target.to_bits() - self.current.to_bits()) / self.ramp_len as i32,
                );
                self.remaining = self.ramp_len;
            }
        }
        if self.remaining > 0 {
            self.remaining -= 1;
            self.current = if self.remaining == 0 {
                // Land exactly; the integer step may carry rounding error.
                self.target
            } else {
                self.current + self.step
            };
        } else {
            self.current = self.target;
        }
        self.current
    }
}

/// A linearly smoothed sample count, used for envelope phase lengths.
#[derive(Default)]
pub struct SmoothedU32 {
    current: u32,
    target: u32,
    step: i32,
    remaining: u32,
    ramp_len: u32,
    pending: AtomicU32,
    has_new: AtomicBool,
}

impl SmoothedU32 {
    /// Create a smoothed count at zero with a zero-length ramp.
    pub const fn new() -> Self {
        Self {
            current: 0,
            target: 0,
            step: 0,
            remaining: 0,
            ramp_len: 0,
            pending: AtomicU32::new(0),
            has_new: AtomicBool::new(false),
        }
    }

    /// Set the ramp length without perturbing the current or target value.
    pub fn reset(&mut self, ctx: &Context, ramp_seconds: f32) {
        self.ramp_len = ctx.seconds_to_samples(ramp_seconds);
    }

    /// Force the value, bypassing the ramp.  Initialization only.
    pub fn set_value(&mut self, value: u32) {
        self.current = value;
        self.target = value;
        self.step = 0;
        self.remaining = 0;
        self.pending.store(value, Ordering::Relaxed);
        self.has_new.store(false, Ordering::Relaxed);
    }

    /// Publish a new target; ordering and republish behavior as for
    /// [`Smoothed::set_target`].
    pub fn set_target(&self, value: u32) {
        if self.pending.load(Ordering::Relaxed) == value {
            return;
        }
        self.pending.store(value, Ordering::Relaxed);
        self.has_new.store(true, Ordering::Release);
    }

    /// The value the ramp is heading toward (audio side).
    pub fn target(&self) -> u32 {
        self.target
    }

    /// Advance one sample and return the new value.  Audio side only.
    pub fn next(&mut self) -> u32 {
        if self.has_new.load(Ordering::Acquire) {
            let target = self.pending.load(Ordering::Relaxed);
            self.has_new.store(false, Ordering::Relaxed);
            self.target = target;
            if self.ramp_len == 0 || target == self.current {
                self.current = target;
                self.remaining = 0;
            } else {
                self.step = ((target as i64 - self.current as i64) / self.ramp_len as i64) as i32;
                self.remaining = self.ramp_len;
            }
        }
        if self.remaining > 0 {
            self.remaining -= 1;
            self.current = if self.remaining == 0 {
                self.target
            } else {
                (self.current as i64 + self.step as i64) as u32
            };
        } else {
            self.current = self.target;
        }
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> Context {
        Context::new_441()
    }

    #[test]
    fn lands_exactly_after_ramp_length_samples() {
        let mut s = Smoothed::new();
        s.reset(&ctx(), 0.01); // 441 samples
        s.set_value(Fix15::ZERO);
        s.set_target(Fix15::from_num(0.73));
        for _ in 0..440 {
            s.next();
        }
        assert_ne!(s.current(), Fix15::from_num(0.73));
        assert_eq!(s.next(), Fix15::from_num(0.73));
        // Stays put afterwards.
        assert_eq!(s.next(), Fix15::from_num(0.73));
    }

    #[test]
    fn zero_ramp_snaps() {
        let mut s = Smoothed::new();
        s.set_target(Fix15::ONE);
        assert_eq!(s.next(), Fix15::ONE);
    }

    #[test]
    fn retarget_mid_ramp_restarts_from_current() {
        let mut s = Smoothed::new();
        s.reset(&ctx(), 0.01);
        s.set_value(Fix15::ZERO);
        s.set_target(Fix15::ONE);
        for _ in 0..200 {
            s.next();
        }
        let mid = s.current();
        s.set_target(Fix15::ZERO);
        let after = s.next();
        // First step back toward zero moves, but only by one step.
        assert!(after < mid);
        assert!(mid - after < Fix15::from_num(0.01));
        for _ in 0..441 {
            s.next();
        }
        assert_eq!(s.current(), Fix15::ZERO);
    }

    #[test]
    fn ramp_is_monotonic() {
        let mut s = Smoothed::new();
        s.reset(&ctx(), 0.05);
        s.set_value(Fix15::ZERO);
        s.set_target(Fix15::ONE);
        let mut last = Fix15::ZERO;
        for _ in 0..2205 {
            let v = s.next();
            assert!(v >= last);
            last = v;
        }
        assert_eq!(last, Fix15::ONE);
    }

    #[test]
    fn u32_ramp_converges_in_both_directions() {
        let mut s = SmoothedU32::new();
        s.reset(&ctx(), 0.01);
        s.set_value(441);
        s.set_target(22050);
        for _ in 0..441 {
            s.next();
        }
        assert_eq!(s.next(), 22050);
        s.set_target(100);
        for _ in 0..441 {
            s.next();
        }
        assert_eq!(s.next(), 100);
    }

    #[test]
    fn reset_does_not_perturb_state() {
        let mut s = Smoothed::new();
        s.set_value(Fix15::from_num(0.25));
        s.reset(&ctx(), 0.05);
        assert_eq!(s.current(), Fix15::from_num(0.25));
        assert_eq!(s.target(), Fix15::from_num(0.25));
    }
}
