//! Harmonic mixer — additive overtones over a base cycle.

use serde::{Deserialize, Serialize};

use super::curve::MAX_AMPLITUDE;
use super::wavetable::{WaveTable, read_cyclic};

/// Number of harmonics (index 0 = fundamental).
pub const HARMONIC_COUNT: usize = 12;

/// Levels at or below this are skipped.
const SILENT_LEVEL: f64 = 0.001;

/// Per-harmonic levels in [0, 1]; index `i` scales the `(i + 1)×` overtone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HarmonicLevels(pub [f64; HARMONIC_COUNT]);

impl HarmonicLevels {
    /// Only the fundamental, at full level.
    pub fn fundamental() -> Self {
        let mut levels = [0.0; HARMONIC_COUNT];
        levels[0] = 1.0;
        HarmonicLevels(levels)
    }

    /// Build from any number of levels: extras are dropped, missing ones are
    /// zero, every value is clamped to [0, 1].
    pub fn from_slice(levels: &[f64]) -> Self {
        let mut out = [0.0; HARMONIC_COUNT];
        for (slot, &level) in out.iter_mut().zip(levels) {
            *slot = if level.is_nan() { 0.0 } else { level.clamp(0.0, 1.0) };
        }
        HarmonicLevels(out)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }
}

/// Sum the base cycle and its overtones into `output_length` samples.
///
/// Harmonic `h` reads the base table at `frac(i / output_length × (h + 1))`
/// with linear interpolation. The result is attenuated (never amplified) so
/// its peak does not exceed 0.5.
pub fn mix(base: &[f64], levels: &[f64], output_length: usize) -> WaveTable {
    let mut out = vec![0.0; output_length];
    if base.is_empty() || output_length == 0 {
        return WaveTable::new(out);
    }

    let levels = HarmonicLevels::from_slice(levels);
    let base_len = base.len() as f64;

    for (h, &level) in levels.as_slice().iter().enumerate() {
        if level <= SILENT_LEVEL {
            continue;
        }
        let multiple = (h + 1) as f64;
        for (i, sample) in out.iter_mut().enumerate() {
            let phase = (i as f64 / output_length as f64 * multiple).fract();
            *sample += read_cyclic(base, phase * base_len) * level;
        }
    }

    let peak = out.iter().fold(0.0_f64, |m, &s| m.max(s.abs()));
    if peak > MAX_AMPLITUDE {
        let scale = MAX_AMPLITUDE / peak;
        for s in out.iter_mut() {
            *s *= scale;
        }
    }

    WaveTable::new(out)
}
