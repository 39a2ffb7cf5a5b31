pub mod config;
pub mod dsp;
pub mod error;

use crate::config::EngineConfig;
use crate::dsp::curve::CurveNode;
use crate::dsp::instrument::Instrument;
use crate::dsp::mixer::VoiceMixer;
use crate::dsp::{curve_sampler, harmonics, tone};
use crate::error::EngineError;
use std::sync::Arc;
use wasm_bindgen::prelude::*;

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// WASM-exposed: return the wavesketch-core version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}

/// WASM-exposed: one sine cycle sized to `frequency` at `sample_rate`.
#[wasm_bindgen]
pub fn sine_table(frequency: f64, sample_rate: f64, amplitude: f64) -> Vec<f32> {
    tone::generate(frequency, sample_rate, amplitude).to_f32()
}

/// Decode curve nodes handed over from JavaScript.
pub fn nodes_from_js(nodes: JsValue) -> Result<Vec<CurveNode>, EngineError> {
    serde_wasm_bindgen::from_value(nodes).map_err(|e| EngineError::InvalidNodes(format!("{e}")))
}

/// WASM-exposed: sample an array of `{x, y, handleIn, handleOut}` nodes into
/// a cycle of `length` samples.
#[wasm_bindgen]
pub fn sample_curve(nodes: JsValue, length: usize) -> Result<Vec<f32>, JsValue> {
    let nodes = nodes_from_js(nodes).map_err(|e| JsValue::from_str(&format!("{e}")))?;
    Ok(curve_sampler::sample(&nodes, length).to_f32())
}

/// WASM-exposed: mix up to 12 harmonic levels over a base cycle.
#[wasm_bindgen]
pub fn mix_harmonics(base: &[f32], levels: &[f32], length: usize) -> Vec<f32> {
    let base: Vec<f64> = base.iter().map(|&s| s as f64).collect();
    let levels: Vec<f64> = levels.iter().map(|&l| l as f64).collect();
    harmonics::mix(&base, &levels, length).to_f32()
}

/// WASM-exposed instrument for an AudioWorklet: the worklet calls `process`
/// once per render quantum, the UI thread edits and plays notes.
#[wasm_bindgen]
pub struct WaveSynth {
    instrument: Instrument,
    mixer: Arc<VoiceMixer>,
}

#[wasm_bindgen]
impl WaveSynth {
    /// Create from a JSON settings object (may be empty: `"{}"`).
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: &str) -> Result<WaveSynth, JsValue> {
        let config =
            EngineConfig::from_json(config_json).map_err(|e| JsValue::from_str(&format!("{e}")))?;
        Ok(WaveSynth::with_config(&config))
    }

    #[wasm_bindgen(js_name = setNodes)]
    pub fn set_nodes(&mut self, nodes: JsValue) -> Result<(), JsValue> {
        let nodes = nodes_from_js(nodes).map_err(|e| JsValue::from_str(&format!("{e}")))?;
        self.instrument.set_nodes(&nodes);
        Ok(())
    }

    #[wasm_bindgen(js_name = setHarmonics)]
    pub fn set_harmonics(&mut self, levels: &[f32]) {
        let levels: Vec<f64> = levels.iter().map(|&l| l as f64).collect();
        self.instrument.set_harmonics(&levels);
    }

    #[wasm_bindgen(js_name = resetToSine)]
    pub fn reset_to_sine(&mut self) {
        self.instrument.reset_to_sine();
    }

    /// Start a note; returns its voice handle.
    #[wasm_bindgen(js_name = noteOn)]
    pub fn note_on(&mut self, frequency: f64) -> u64 {
        self.instrument.note_on(frequency).0
    }

    #[wasm_bindgen(js_name = noteOff)]
    pub fn note_off(&mut self, frequency: f64) {
        self.instrument.note_off(frequency);
    }

    #[wasm_bindgen(js_name = allNotesOff)]
    pub fn all_notes_off(&mut self) {
        self.instrument.all_notes_off();
    }

    /// The current cycle, for drawing.
    #[wasm_bindgen(js_name = currentTable)]
    pub fn current_table(&self) -> Vec<f32> {
        self.instrument.table().to_f32()
    }

    /// Fill one output buffer.
    pub fn process(&self, output: &mut [f32]) {
        self.mixer.mix(output);
    }

    #[wasm_bindgen(js_name = activeVoices)]
    pub fn active_voices(&self) -> usize {
        self.mixer.active_voice_count()
    }
}

impl WaveSynth {
    pub fn with_config(config: &EngineConfig) -> Self {
        let instrument = Instrument::new(config);
        let mixer = instrument.mixer();
        WaveSynth { instrument, mixer }
    }
}
