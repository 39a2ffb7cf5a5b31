//! Pure-tone wavetables sized to a played frequency.

use std::f64::consts::PI;

use super::wavetable::WaveTable;

/// Shortest table a cycle can be represented with.
pub const MIN_CYCLE_LENGTH: usize = 2;

/// Number of samples in one cycle of `frequency` at `sample_rate`:
/// `round(sample_rate / frequency)`, at least [`MIN_CYCLE_LENGTH`].
pub fn cycle_length(frequency: f64, sample_rate: f64) -> usize {
    let len = (sample_rate / frequency).round();
    if len.is_finite() && len > MIN_CYCLE_LENGTH as f64 {
        len as usize
    } else {
        MIN_CYCLE_LENGTH
    }
}

/// Generate one cycle of a sine at `frequency`, scaled by `amplitude`.
pub fn generate(frequency: f64, sample_rate: f64, amplitude: f64) -> WaveTable {
    let len = cycle_length(frequency, sample_rate);
    WaveTable::new(
        (0..len)
            .map(|i| (2.0 * PI * i as f64 / len as f64).sin() * amplitude)
            .collect(),
    )
}
