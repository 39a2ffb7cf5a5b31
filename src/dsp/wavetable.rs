//! WaveTable — one immutable cycle of a periodic waveform.
//!
//! Tables are shared by reference count and never mutated after creation;
//! an edit always produces a new table.

use std::ops::Deref;
use std::sync::Arc;

/// A fixed-length single-cycle sample table, nominal amplitude [-0.5, 0.5].
#[derive(Debug, Clone, PartialEq)]
pub struct WaveTable {
    samples: Arc<[f64]>,
}

impl WaveTable {
    pub fn new(samples: Vec<f64>) -> Self {
        WaveTable {
            samples: samples.into(),
        }
    }

    /// Copy a caller-owned buffer into a new table.
    pub fn from_slice(samples: &[f64]) -> Self {
        WaveTable {
            samples: Arc::from(samples),
        }
    }

    /// A table of `len` zeros.
    pub fn silence(len: usize) -> Self {
        WaveTable::new(vec![0.0; len])
    }

    pub fn to_f32(&self) -> Vec<f32> {
        self.samples.iter().map(|&s| s as f32).collect()
    }

    /// Read a sample with linear interpolation at a fractional index.
    /// The index wraps, so the last sample interpolates back into the first.
    pub fn read_interpolated(&self, position: f64) -> f64 {
        read_cyclic(&self.samples, position)
    }

    /// Resample the cycle to `len` samples: output `i` reads phase `i / len`.
    pub fn resample(&self, len: usize) -> WaveTable {
        if self.samples.is_empty() {
            return WaveTable::silence(len);
        }
        if len == self.samples.len() {
            return self.clone();
        }
        let scale = self.samples.len() as f64 / len as f64;
        WaveTable::new((0..len).map(|i| self.read_interpolated(i as f64 * scale)).collect())
    }

    /// Index of the sample closest to zero (first one on ties). Starting
    /// playback there keeps the note-on step as small as possible.
    pub fn quietest_index(&self) -> usize {
        let mut best = 0;
        let mut best_mag = f64::INFINITY;
        for (i, &s) in self.samples.iter().enumerate() {
            if s.abs() < best_mag {
                best = i;
                best_mag = s.abs();
            }
        }
        best
    }

    /// Largest absolute sample value.
    pub fn peak(&self) -> f64 {
        self.samples.iter().fold(0.0_f64, |m, &s| m.max(s.abs()))
    }
}

impl Deref for WaveTable {
    type Target = [f64];

    fn deref(&self) -> &[f64] {
        &self.samples
    }
}

/// Linear interpolation into a cyclic buffer. Empty buffers read as silence.
pub(crate) fn read_cyclic(data: &[f64], position: f64) -> f64 {
    let len = data.len();
    if len == 0 || !position.is_finite() {
        return 0.0;
    }
    let position = position.rem_euclid(len as f64);
    let idx = (position as usize).min(len - 1);
    let frac = position - idx as f64;
    let next = if idx + 1 == len { 0 } else { idx + 1 };
    data[idx] * (1.0 - frac) + data[next] * frac
}
