//! The shared parameter store - the single source of truth for every
//! continuous control in the synth.
//!
//! Parameters carry immutable metadata (id, display name, physical range,
//! assigned MIDI CC) plus a single mutable value cell.  The cell is a 32 bit
//! atomic holding the value's bit pattern with relaxed ordering: continuous
//! controls only need monotonic eventual visibility across cores, not a
//! happens-before edge.  The store is populated exactly once on the control
//! core before the audio core starts; after that the sequence and metadata
//! are read-only and only the cells change.  Audio modules resolve their
//! parameters by id once at construction and keep the references.

use arrayvec::ArrayVec;
use core::sync::atomic::{AtomicU32, Ordering};

/// Maximum number of parameters a store can hold.  Lookup is a linear scan
/// and only happens at initialization, so small and fixed is fine.
pub const MAX_PARAMETERS: usize = 20;

/// A single named, ranged, CC-mapped control value.
pub struct Parameter {
    id: &'static str,
    name: &'static str,
    minimum: f32,
    maximum: f32,
    cc: u8,
    value: AtomicU32,
}

impl Parameter {
    /// Create a parameter.  `minimum` must be strictly less than `maximum`;
    /// the default is clamped into range.
    pub fn new(
        id: &'static str,
        name: &'static str,
        minimum: f32,
        maximum: f32,
        default: f32,
        cc: u8,
    ) -> Self {
        assert!(minimum < maximum);
        let default = default.clamp(minimum, maximum);
        Self {
            id,
            name,
            minimum,
            maximum,
            cc,
            value: AtomicU32::new(default.to_bits()),
        }
    }

    /// The identifier used by audio modules to resolve the parameter.
    pub fn id(&self) -> &'static str {
        self.id
    }

    /// The human-readable display name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Lower end of the physical range.
    pub fn minimum(&self) -> f32 {
        self.minimum
    }

    /// Upper end of the physical range.
    pub fn maximum(&self) -> f32 {
        self.maximum
    }

    /// The MIDI continuous controller number assigned to this parameter.
    pub fn cc(&self) -> u8 {
        self.cc
    }

    /// Store a new value, clamped to the physical range.
    pub fn set_value(&self, value: f32) {
        let value = value.clamp(self.minimum, self.maximum);
        self.value.store(value.to_bits(), Ordering::Relaxed);
    }

    /// Load the current value.
    pub fn value(&self) -> f32 {
        f32::from_bits(self.value.load(Ordering::Relaxed))
    }

    /// Store a value given as a normalized position in `[0, 1]`.
    pub fn set_normalized(&self, normalized: f32) {
        let normalized = normalized.clamp(0.0, 1.0);
        self.set_value(self.minimum + normalized * (self.maximum - self.minimum));
    }

    /// The current value as a normalized position in `[0, 1]`.
    pub fn normalized(&self) -> f32 {
        (self.value() - self.minimum) / (self.maximum - self.minimum)
    }
}

/// An ordered, initialize-once collection of [`Parameter`]s.
#[derive(Default)]
pub struct ParameterStore {
    params: ArrayVec<Parameter, MAX_PARAMETERS>,
}

impl ParameterStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            params: ArrayVec::new(),
        }
    }

    /// Create a store populated with the canonical parameter set.
    pub fn with_defaults() -> Self {
        let mut store = Self::new();
        store.install_defaults();
        store
    }

    /// Append a parameter.  Panics if the store is full or the id/CC is
    /// already taken - registration is a startup-time programming error, not
    /// a runtime condition.
    pub fn register(&mut self, param: Parameter) {
        assert!(self.by_id(param.id()).is_none(), "duplicate parameter id");
        assert!(self.by_cc(param.cc()).is_none(), "duplicate parameter cc");
        self.params.try_push(param).ok().expect("parameter store full");
    }

    /// Register the canonical synth parameter set, in canonical order.
    pub fn install_defaults(&mut self) {
        self.register(Parameter::new("attack", "Attack", 0.001, 2.5, 0.01, 74));
        self.register(Parameter::new("decay", "Decay", 0.003, 2.0, 0.2, 71));
        self.register(Parameter::new("sustain", "Sustain", 0.0, 1.0, 0.3, 73));
        self.register(Parameter::new("release", "Release", 0.01, 5.0, 0.1, 72));
        self.register(Parameter::new("sawLevel", "Saw Level", 0.0, 1.0, 1.0, 79));
        self.register(Parameter::new("pulseLevel", "Pulse Level", 0.0, 1.0, 0.0, 80));
        self.register(Parameter::new("subLevel", "Sub Level", 0.0, 1.0, 0.0, 82));
        self.register(Parameter::new("noiseLevel", "Noise Level", 0.0, 1.0, 0.0, 78));
        self.register(Parameter::new("pulseWidth", "Pulse Width", 0.05, 0.95, 0.5, 81));
        self.register(Parameter::new("filterCutoff", "Filter Cutoff", 0.0, 1.0, 0.5, 76));
        self.register(Parameter::new(
            "filterResonance",
            "Filter Resonance",
            0.0,
            1.0,
            0.2,
            77,
        ));
        self.register(Parameter::new("masterVol", "Master Volume", 0.0, 1.0, 0.05, 75));
        log::debug!("parameter store initialized with {} parameters", self.len());
    }

    /// Find a parameter by id.  O(n); initialization-time use only.
    pub fn by_id(&self, id: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.id() == id)
    }

    /// Find a parameter by assigned CC number.
    pub fn by_cc(&self, cc: u8) -> Option<&Parameter> {
        self.params.iter().find(|p| p.cc() == cc)
    }

    /// Iterate the parameters in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.params.iter()
    }

    /// Number of registered parameters.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// True if nothing has been registered yet.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_clamp_to_range() {
        let p = Parameter::new("x", "X", 0.05, 0.95, 0.5, 1);
        p.set_value(2.0);
        assert_eq!(p.value(), 0.95);
        p.set_value(-1.0);
        assert_eq!(p.value(), 0.05);
    }

    #[test]
    fn normalized_round_trip() {
        let p = Parameter::new("attack", "Attack", 0.001, 2.5, 0.01, 74);
        for i in 0..=100 {
            let n = i as f32 / 100.0;
            p.set_normalized(n);
            assert!((p.normalized() - n).abs() < 1e-6);
        }
    }

    #[test]
    fn normalized_input_clamps() {
        let p = Parameter::new("x", "X", -1.0, 1.0, 0.0, 2);
        p.set_normalized(1.5);
        assert_eq!(p.value(), 1.0);
        p.set_normalized(-0.5);
        assert_eq!(p.value(), -1.0);
    }

    #[test]
    fn canonical_set_shape() {
        let store = ParameterStore::with_defaults();
        assert_eq!(store.len(), 12);
        let ids: std::vec::Vec<_> = store.iter().map(|p| p.id()).collect();
        assert_eq!(
            ids,
            [
                "attack",
                "decay",
                "sustain",
                "release",
                "sawLevel",
                "pulseLevel",
                "subLevel",
                "noiseLevel",
                "pulseWidth",
                "filterCutoff",
                "filterResonance",
                "masterVol",
            ]
        );
        assert_eq!(store.by_cc(75).unwrap().id(), "masterVol");
        assert_eq!(store.by_id("sustain").unwrap().value(), 0.3);
        assert!(store.by_cc(123).is_none());
    }
}
