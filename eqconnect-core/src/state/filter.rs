//! A single equalizer band.
//!
//! Frequencies are spread logarithmically across the audible range and
//! every band shares the same Q for a given band count.

use crate::error::EqError;

/// Lowest centre frequency, in Hz.
pub const MIN_FREQUENCY: f64 = 20.0;
/// Highest centre frequency, in Hz.
pub const MAX_FREQUENCY: f64 = 20_000.0;
/// Band gain limit in dB, applied symmetrically.
pub const GAIN_MAX: f64 = 15.0;
/// Smallest gain delta that counts as a change.
pub const GAIN_ACCURACY: f64 = 0.1;
pub const MIN_Q: f64 = 0.5;
pub const MAX_Q: f64 = 14.0;
/// Preamp gain limit in dB, applied symmetrically.
pub const MAX_PREAMP_GAIN: f64 = 30.0;
/// Q per octave of band width.
const Q_PER_OCTAVE: f64 = 1.2;

/// Frequency and Q derived from a band's position in the equalizer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandParameters {
    pub frequency: f64,
    pub q: f64,
}

impl BandParameters {
    /// Parameters for band `index` of `count`.
    ///
    /// The Q is not clamped here; [`Filter`] clamps on write.
    pub fn generate(count: usize, index: usize) -> Self {
        let low = MIN_FREQUENCY.log2();
        let octaves = MAX_FREQUENCY.log2() - low;

        let octave_range = octaves / count.max(1) as f64;
        let exponent = low + octaves / (count + 1) as f64 * index as f64;

        Self {
            frequency: exponent.exp2(),
            q: octave_range * Q_PER_OCTAVE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    frequency: f64,
    gain: f64,
    q: f64,
    locked: bool,
}

impl Filter {
    pub fn new(frequency: f64, gain: f64, q: f64) -> Self {
        Self {
            frequency: frequency.clamp(MIN_FREQUENCY, MAX_FREQUENCY),
            gain: gain.clamp(-GAIN_MAX, GAIN_MAX),
            q: q.clamp(MIN_Q, MAX_Q),
            locked: false,
        }
    }

    pub fn from_parameters(params: BandParameters, gain: f64) -> Self {
        Self::new(params.frequency, gain, params.q)
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    pub fn gain(&self) -> f64 {
        self.gain
    }

    pub fn q(&self) -> f64 {
        self.q
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn set_locked(&mut self, locked: bool) {
        self.locked = locked;
    }

    /// Returns `true` if the frequency changed. No-op while locked.
    pub fn set_frequency(&mut self, hz: f64) -> bool {
        if self.locked || hz.is_nan() {
            return false;
        }
        let hz = hz.clamp(MIN_FREQUENCY, MAX_FREQUENCY);
        let changed = hz != self.frequency;
        self.frequency = hz;
        changed
    }

    /// Stores the clamped gain. Returns `true` only when it moved by at
    /// least [`GAIN_ACCURACY`]. No-op while locked.
    pub fn set_gain(&mut self, db: f64) -> bool {
        if self.locked || db.is_nan() {
            return false;
        }
        let db = db.clamp(-GAIN_MAX, GAIN_MAX);
        let changed = (db - self.gain).abs() >= GAIN_ACCURACY;
        self.gain = db;
        changed
    }

    /// Returns `true` if the Q changed. No-op while locked.
    pub fn set_q(&mut self, q: f64) -> bool {
        if self.locked || q.is_nan() {
            return false;
        }
        let q = q.clamp(MIN_Q, MAX_Q);
        let changed = q != self.q;
        self.q = q;
        changed
    }

    /// Runs `f` with the lock released, then restores it.
    pub(crate) fn unlocked<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let locked = std::mem::replace(&mut self.locked, false);
        let out = f(self);
        self.locked = locked;
        out
    }

    /// Applies regenerated band parameters, ignoring the lock.
    pub(crate) fn apply_parameters(&mut self, params: BandParameters) -> bool {
        self.unlocked(|f| {
            let frequency = f.set_frequency(params.frequency);
            let q = f.set_q(params.q);
            frequency || q
        })
    }
}

/// Parses a decibel value from the wire. Non-finite values are rejected.
pub(crate) fn parse_decibels(field: &'static str, text: &str) -> Result<f64, EqError> {
    match text.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(EqError::InvalidNumber {
            field,
            value: text.to_string(),
        }),
    }
}
