//! DSP — wavetable authoring and real-time voice mixing.
//!
//! Tables are built off the audio thread (curve sampling, harmonic mixing,
//! per-note resampling) and handed to the [`mixer::VoiceMixer`], which the
//! audio driver calls once per buffer.

pub mod curve;
pub mod curve_sampler;
pub mod envelope;
pub mod harmonics;
pub mod instrument;
pub mod mixer;
pub mod tone;
pub mod voice;
pub mod wavetable;
