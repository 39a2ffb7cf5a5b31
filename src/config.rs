//! Engine configuration — sample rate, envelope windows, polyphony and the
//! declick constants of the voice mixer.
//!
//! Loaded from the host's settings store as JSON (camelCase keys, every field
//! optional). Misconfiguration is clamped to safe values by [`EngineConfig::sanitized`]
//! rather than rejected; [`EngineConfig::validate`] is the strict variant.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Construction-time settings for the mixer and instrument.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Output sample rate in Hz.
    pub sample_rate: f64,
    /// Release window in milliseconds.
    pub release_ms: f64,
    /// Attack window in milliseconds.
    pub attack_ms: f64,
    /// Maximum number of simultaneously sounding voices.
    pub max_polyphony: usize,
    /// Crossfade window applied when the voice count changes, in milliseconds.
    pub crossfade_ms: f64,
    /// One-pole smoothing coefficient in (0, 1]. 1.0 disables smoothing.
    pub smoothing_alpha: f64,
    /// Headroom numerator: the mix is scaled by `headroom / sqrt(voices)`.
    pub headroom: f64,
    /// Length of the base table the curve is sampled into.
    pub table_length: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100.0,
            release_ms: 250.0,
            attack_ms: 5.0,
            max_polyphony: 16,
            crossfade_ms: 2.0,
            smoothing_alpha: 0.75,
            headroom: 0.6,
            table_length: 2048,
        }
    }
}

impl EngineConfig {
    /// Default config at the given sample rate.
    pub fn with_sample_rate(sample_rate: f64) -> Self {
        Self {
            sample_rate,
            ..Self::default()
        }
    }

    /// Parse a JSON settings object. Missing keys take their defaults; the
    /// result is sanitized.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        Ok(config.sanitized())
    }

    /// Strict check: reports the first field that [`sanitized`](Self::sanitized)
    /// would have to clamp.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.sample_rate.is_finite() && self.sample_rate >= 1.0) {
            return Err(invalid("sampleRate", format!("must be >= 1 Hz, got {}", self.sample_rate)));
        }
        for (field, ms) in [
            ("releaseMs", self.release_ms),
            ("attackMs", self.attack_ms),
            ("crossfadeMs", self.crossfade_ms),
        ] {
            if !(ms.is_finite() && ms >= 0.0) {
                return Err(invalid(field, format!("must be a non-negative duration, got {ms}")));
            }
        }
        if self.max_polyphony == 0 {
            return Err(invalid("maxPolyphony", "must allow at least one voice".to_string()));
        }
        if !(self.smoothing_alpha > 0.0 && self.smoothing_alpha <= 1.0) {
            return Err(invalid(
                "smoothingAlpha",
                format!("must be in (0, 1], got {}", self.smoothing_alpha),
            ));
        }
        if !(self.headroom.is_finite() && self.headroom > 0.0) {
            return Err(invalid("headroom", format!("must be positive, got {}", self.headroom)));
        }
        if self.table_length < 2 {
            return Err(invalid("tableLength", format!("must be >= 2, got {}", self.table_length)));
        }
        Ok(())
    }

    /// Clamp every field into its safe range, logging each correction.
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();

        if !(self.sample_rate.is_finite() && self.sample_rate >= 1.0) {
            log::warn!("sampleRate {} out of range, clamping to 1 Hz", self.sample_rate);
            self.sample_rate = if self.sample_rate.is_nan() { defaults.sample_rate } else { 1.0 };
        }
        self.release_ms = clamp_ms("releaseMs", self.release_ms);
        self.attack_ms = clamp_ms("attackMs", self.attack_ms);
        self.crossfade_ms = clamp_ms("crossfadeMs", self.crossfade_ms);
        if self.max_polyphony == 0 {
            log::warn!("maxPolyphony 0, clamping to 1");
            self.max_polyphony = 1;
        }
        if !(self.smoothing_alpha > 0.0 && self.smoothing_alpha <= 1.0) {
            let alpha = if self.smoothing_alpha > 1.0 { 1.0 } else { defaults.smoothing_alpha };
            log::warn!("smoothingAlpha {} out of (0, 1], using {alpha}", self.smoothing_alpha);
            self.smoothing_alpha = alpha;
        }
        if !(self.headroom.is_finite() && self.headroom > 0.0) {
            log::warn!("headroom {} invalid, using {}", self.headroom, defaults.headroom);
            self.headroom = defaults.headroom;
        }
        if self.table_length < 2 {
            log::warn!("tableLength {} too short, clamping to 2", self.table_length);
            self.table_length = 2;
        }
        self
    }

    /// Convert milliseconds to a whole number of samples at this sample rate.
    pub fn ms_to_samples(&self, ms: f64) -> usize {
        let samples = (ms / 1000.0 * self.sample_rate).round();
        if samples.is_finite() && samples > 0.0 { samples as usize } else { 0 }
    }

    pub fn release_samples(&self) -> usize {
        self.ms_to_samples(self.release_ms)
    }

    pub fn attack_samples(&self) -> usize {
        self.ms_to_samples(self.attack_ms)
    }

    pub fn crossfade_samples(&self) -> usize {
        self.ms_to_samples(self.crossfade_ms)
    }
}

fn invalid(field: &'static str, reason: String) -> ConfigError {
    ConfigError::Invalid { field, reason }
}

fn clamp_ms(field: &str, ms: f64) -> f64 {
    if ms.is_finite() && ms >= 0.0 {
        ms
    } else {
        log::warn!("{field} {ms} invalid, clamping to 0 ms");
        0.0
    }
}
