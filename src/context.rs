//! Processing context shared by every device in the signal path.
//!
//! The only information carried today is the output sample rate, restricted
//! to the two rates the supported serializers run at: 44.1kHz for the I2S
//! path and 22.05kHz for the PWM fallback.

/// The supported output sample rates.
#[derive(Default, Clone, Copy, PartialEq, Eq, Debug)]
pub enum SampleRate {
    /// 44.1kHz (I2S output)
    #[default]
    Khz44_1,
    /// 22.05kHz (PWM output)
    Khz22_05,
}

impl SampleRate {
    /// The sample rate in Hz.
    pub const fn value(&self) -> u32 {
        match self {
            Self::Khz44_1 => 44100,
            Self::Khz22_05 => 22050,
        }
    }
}

impl TryFrom<u32> for SampleRate {
    type Error = &'static str;
    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            44100 => Ok(Self::Khz44_1),
            22050 => Ok(Self::Khz22_05),
            _ => Err("Unsupported Sample Rate"),
        }
    }
}

/// The processing context handed to constructors throughout the crate.
#[derive(Default, Clone, Copy)]
pub struct Context {
    /// The output sample rate.
    pub sample_rate: SampleRate,
}

impl Context {
    /// Create a context running at 44.1kHz.
    pub const fn new_441() -> Self {
        Self {
            sample_rate: SampleRate::Khz44_1,
        }
    }

    /// Create a context running at 22.05kHz.
    pub const fn new_2205() -> Self {
        Self {
            sample_rate: SampleRate::Khz22_05,
        }
    }

    /// The sample rate in Hz.
    pub const fn sample_rate_hz(&self) -> u32 {
        self.sample_rate.value()
    }

    /// Convert a duration in seconds to a whole number of samples
    /// (truncating).
    pub fn seconds_to_samples(&self, seconds: f32) -> u32 {
        (seconds * self.sample_rate_hz() as f32) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rates_round_trip() {
        assert_eq!(SampleRate::try_from(44100), Ok(SampleRate::Khz44_1));
        assert_eq!(SampleRate::try_from(22050), Ok(SampleRate::Khz22_05));
        assert!(SampleRate::try_from(48000).is_err());
    }

    #[test]
    fn sample_conversions() {
        let ctx = Context::new_441();
        assert_eq!(ctx.seconds_to_samples(0.01), 441);
        assert_eq!(ctx.seconds_to_samples(0.005), 220);
        assert_eq!(Context::new_2205().seconds_to_samples(1.0), 22050);
    }
}
