//! Instrument — ties the authoring pipeline to the voice mixer.
//!
//! Curve nodes are sampled into a base cycle, overtones are mixed in, and
//! every played note gets that cycle resampled to its own period. Edits
//! rebuild the cycle and swap it into every held note in place.

use std::sync::Arc;

use crate::config::EngineConfig;

use super::curve::{CurveNode, MAX_AMPLITUDE, sine_curve};
use super::curve_sampler;
use super::harmonics::{self, HarmonicLevels};
use super::mixer::VoiceMixer;
use super::tone;
use super::voice::{VoiceId, same_frequency};
use super::wavetable::WaveTable;

/// A held note: its mixer handle and pitch.
#[derive(Debug, Clone, Copy)]
struct HeldNote {
    id: VoiceId,
    frequency: f64,
}

/// Editable wavetable instrument driving a shared [`VoiceMixer`].
#[derive(Debug)]
pub struct Instrument {
    mixer: Arc<VoiceMixer>,
    sample_rate: f64,
    table_length: usize,
    nodes: Vec<CurveNode>,
    levels: HarmonicLevels,
    curve_table: WaveTable,
    mixed_table: WaveTable,
    held: Vec<HeldNote>,
}

impl Instrument {
    /// A new instrument starting from the sine curve and the fundamental only.
    pub fn new(config: &EngineConfig) -> Self {
        let config = config.sanitized();
        let mixer = Arc::new(VoiceMixer::new(&config));
        let mut instrument = Instrument {
            mixer,
            sample_rate: config.sample_rate,
            table_length: config.table_length,
            nodes: sine_curve(),
            levels: HarmonicLevels::fundamental(),
            curve_table: WaveTable::silence(config.table_length),
            mixed_table: WaveTable::silence(config.table_length),
            held: Vec::new(),
        };
        instrument.rebuild_curve();
        instrument
    }

    /// Shared handle for the audio thread.
    pub fn mixer(&self) -> Arc<VoiceMixer> {
        Arc::clone(&self.mixer)
    }

    pub fn nodes(&self) -> &[CurveNode] {
        &self.nodes
    }

    /// The current base cycle, curve plus overtones.
    pub fn table(&self) -> &WaveTable {
        &self.mixed_table
    }

    /// Replace the curve with a copy of `nodes`.
    pub fn set_nodes(&mut self, nodes: &[CurveNode]) {
        self.nodes = nodes.to_vec();
        self.rebuild_curve();
    }

    pub fn set_harmonics(&mut self, levels: &[f64]) {
        self.levels = HarmonicLevels::from_slice(levels);
        self.rebuild_harmonics();
    }

    pub fn reset_to_sine(&mut self) {
        self.set_nodes(&sine_curve());
    }

    /// Start a note with the current cycle.
    pub fn note_on(&mut self, frequency: f64) -> VoiceId {
        let table = self.note_table(frequency);
        let id = self.mixer.add_voice(frequency, &table);
        self.held.push(HeldNote { id, frequency });
        id
    }

    /// Start a note playing a pure sine, ignoring the curve and harmonics.
    pub fn tone_on(&mut self, frequency: f64) -> VoiceId {
        let table = tone::generate(frequency, self.sample_rate, MAX_AMPLITUDE);
        self.mixer.add_voice(frequency, &table)
    }

    /// Release every voice at `frequency`.
    pub fn note_off(&mut self, frequency: f64) {
        self.held.retain(|n| !same_frequency(n.frequency, frequency));
        self.mixer.release_voice(frequency);
    }

    pub fn all_notes_off(&mut self) {
        self.held.clear();
        self.mixer.release_all();
    }

    /// Number of notes held down (not yet released).
    pub fn held_count(&self) -> usize {
        self.held.len()
    }

    /// The current cycle resampled to one period of `frequency`.
    pub fn note_table(&self, frequency: f64) -> WaveTable {
        self.mixed_table
            .resample(tone::cycle_length(frequency, self.sample_rate))
    }

    /// Resample the curve into the base cycle.
    ///
    /// The sampler includes both ends (sample `i` at `x = i / (n - 1)`) but
    /// playback wraps every `n` samples, so the first value is effectively
    /// played twice per period. The pitch error this adds is `n / (n - 1)`,
    /// under one cent at the default length of 2048.
    fn rebuild_curve(&mut self) {
        self.curve_table = curve_sampler::sample(&self.nodes, self.table_length);
        self.rebuild_harmonics();
    }

    fn rebuild_harmonics(&mut self) {
        self.mixed_table = harmonics::mix(&self.curve_table, self.levels.as_slice(), self.table_length);
        self.refresh_held();
    }

    /// Push the rebuilt cycle into every held note; notes evicted by the
    /// mixer are forgotten.
    fn refresh_held(&mut self) {
        let mut refreshed = 0;
        let held = std::mem::take(&mut self.held);
        for note in held {
            let table = self.note_table(note.frequency);
            if self.mixer.update_voice_by_id(note.id, &table) {
                self.held.push(note);
                refreshed += 1;
            }
        }
        log::debug!(
            "Instrument: rebuilt {}-sample cycle (peak {:.3}), refreshed {refreshed} held note(s)",
            self.mixed_table.len(),
            self.mixed_table.peak()
        );
    }
}
