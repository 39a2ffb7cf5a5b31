//! Voice mixer — the real-time polyphonic core.
//!
//! One audio thread calls [`VoiceMixer::mix`] once per buffer period while any
//! number of control threads add, update and release voices. The active-voice
//! list is locked only to mutate it or to copy out a snapshot of voice
//! references; per-sample work runs on the snapshot with the list unlocked.
//!
//! Per output sample the summed voices are scaled by
//! `headroom / sqrt(voices)`, soft-limited with `tanh`, crossfaded against the
//! previous buffer's tail when the voice count changed, and finally passed
//! through a one-pole smoother.

use std::f64::consts::PI;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::config::EngineConfig;

use super::voice::{Voice, VoiceId, phase_increment, same_frequency};
use super::wavetable::WaveTable;

/// State owned by the audio thread between calls to `mix`.
#[derive(Debug, Default)]
struct RenderState {
    snapshot: Vec<Arc<Voice>>,
    acc: Vec<f64>,
    /// Last sample written by the previous call.
    prev_output: f64,
    prev_voice_count: usize,
    crossfade_from: f64,
    crossfade_remaining: usize,
}

/// Polyphonic wavetable mixer. Share it between threads with `Arc`.
#[derive(Debug)]
pub struct VoiceMixer {
    voices: Mutex<Vec<Arc<Voice>>>,
    /// Voices taken out of the active list. Control calls drop them once the
    /// audio thread's snapshot no longer holds them.
    retired: Mutex<Vec<Arc<Voice>>>,
    render: Mutex<RenderState>,
    next_id: AtomicU64,
    sample_rate: f64,
    attack_samples: usize,
    release_samples: usize,
    max_polyphony: usize,
    crossfade_samples: usize,
    smoothing_alpha: f64,
    headroom: f64,
}

impl VoiceMixer {
    pub fn new(config: &EngineConfig) -> Self {
        let config = config.sanitized();
        log::debug!(
            "VoiceMixer: {} Hz, polyphony {}, attack {} / release {} samples",
            config.sample_rate,
            config.max_polyphony,
            config.attack_samples(),
            config.release_samples()
        );
        VoiceMixer {
            voices: Mutex::new(Vec::with_capacity(config.max_polyphony)),
            retired: Mutex::new(Vec::with_capacity(config.max_polyphony * 2)),
            render: Mutex::new(RenderState {
                snapshot: Vec::with_capacity(config.max_polyphony),
                ..RenderState::default()
            }),
            next_id: AtomicU64::new(1),
            sample_rate: config.sample_rate,
            attack_samples: config.attack_samples(),
            release_samples: config.release_samples(),
            max_polyphony: config.max_polyphony,
            crossfade_samples: config.crossfade_samples(),
            smoothing_alpha: config.smoothing_alpha,
            headroom: config.headroom,
        }
    }

    /// Start a note reading a private copy of `table`.
    ///
    /// At full polyphony the oldest voice is dropped first, without a fade.
    pub fn add_voice(&self, frequency: f64, table: &[f64]) -> VoiceId {
        self.collect_retired();
        let id = VoiceId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let voice = Arc::new(Voice::new(
            id,
            frequency,
            WaveTable::from_slice(table),
            self.sample_rate,
            self.attack_samples,
        ));

        let (evicted, active) = {
            let mut voices = self.voices.lock();
            let evicted = if voices.len() >= self.max_polyphony && !voices.is_empty() {
                Some(voices.remove(0))
            } else {
                None
            };
            voices.push(voice);
            (evicted, voices.len())
        };

        if let Some(evicted) = evicted {
            log::debug!(
                "VoiceMixer: polyphony {} reached, evicting voice {:?} ({} Hz)",
                self.max_polyphony,
                evicted.id(),
                evicted.frequency()
            );
            self.retired.lock().push(evicted);
        }
        log::trace!("VoiceMixer: added {id:?} at {frequency} Hz, {active} active");
        id
    }

    /// Swap the table of every voice sounding at `frequency`.
    pub fn update_voice(&self, frequency: f64, table: &[f64]) {
        let table = WaveTable::from_slice(table);
        let increment = phase_increment(table.len(), frequency, self.sample_rate);
        let matched = self.select(|v| same_frequency(v.frequency(), frequency));
        for v in &matched {
            v.set_table(table.clone(), increment);
        }
        log::trace!("VoiceMixer: updated {} voice(s) at {frequency} Hz", matched.len());
    }

    /// Swap the table of one voice. Returns false if it is no longer active.
    pub fn update_voice_by_id(&self, id: VoiceId, table: &[f64]) -> bool {
        let table = WaveTable::from_slice(table);
        match self.find(id) {
            Some(v) => {
                let increment = phase_increment(table.len(), v.frequency(), self.sample_rate);
                v.set_table(table, increment);
                true
            }
            None => false,
        }
    }

    /// Start (or restart) the release of every voice at `frequency`.
    pub fn release_voice(&self, frequency: f64) {
        for v in self.select(|v| same_frequency(v.frequency(), frequency)) {
            v.release(self.release_samples);
        }
    }

    /// Start (or restart) the release of one voice. Returns false if it is
    /// no longer active.
    pub fn release_voice_by_id(&self, id: VoiceId) -> bool {
        match self.find(id) {
            Some(v) => {
                v.release(self.release_samples);
                true
            }
            None => false,
        }
    }

    pub fn release_all(&self) {
        let voices = self.select(|_| true);
        log::debug!("VoiceMixer: releasing all {} voice(s)", voices.len());
        for v in &voices {
            v.release(self.release_samples);
        }
    }

    pub fn active_voice_count(&self) -> usize {
        self.voices.lock().len()
    }

    /// Ids of the active voices, oldest first.
    pub fn active_voice_ids(&self) -> Vec<VoiceId> {
        let mut ids = Vec::with_capacity(self.max_polyphony);
        ids.extend(self.voices.lock().iter().map(|v| v.id()));
        ids
    }

    pub fn is_active(&self, id: VoiceId) -> bool {
        self.voices.lock().iter().any(|v| v.id() == id)
    }

    /// Clone out the active voices matching `keep`. The list never outgrows
    /// the polyphony limit, so nothing is allocated while it is locked.
    fn select(&self, keep: impl Fn(&Voice) -> bool) -> Vec<Arc<Voice>> {
        self.collect_retired();
        let mut picked = Vec::with_capacity(self.max_polyphony);
        picked.extend(self.voices.lock().iter().filter(|v| keep(v)).cloned());
        picked
    }

    fn find(&self, id: VoiceId) -> Option<Arc<Voice>> {
        self.collect_retired();
        self.voices.lock().iter().find(|v| v.id() == id).cloned()
    }

    /// Drop retired voices that only this list still references.
    fn collect_retired(&self) {
        self.retired.lock().retain(|v| Arc::strong_count(v) > 1);
    }

    /// Fill `buffer` with the next block of output. Real-time safe apart from
    /// growing internal scratch space the first time a larger buffer or more
    /// voices are seen. Voices and tables are never freed here; finished
    /// voices move to the retired list for the control side to drop.
    pub fn mix(&self, buffer: &mut [f32]) {
        let mut guard = self.render.lock();
        let state = &mut *guard;

        state.snapshot.clear();
        state.snapshot.extend(self.voices.lock().iter().cloned());

        state.acc.clear();
        state.acc.resize(buffer.len(), 0.0);
        for voice in &state.snapshot {
            voice.render_into(&mut state.acc);
        }

        let voice_count = state.snapshot.len();
        if voice_count != state.prev_voice_count && self.crossfade_samples > 0 {
            state.crossfade_from = state.prev_output;
            state.crossfade_remaining = self.crossfade_samples;
        }
        state.prev_voice_count = voice_count;

        let scale = self.headroom / (voice_count.max(1) as f64).sqrt();
        let mut prev = state.prev_output;
        for (out, &sum) in buffer.iter_mut().zip(state.acc.iter()) {
            let mut limited = (sum * scale).tanh();
            if state.crossfade_remaining > 0 {
                let progress = 1.0 - state.crossfade_remaining as f64 / self.crossfade_samples as f64;
                let w = 0.5 * (1.0 - (PI * progress).cos());
                limited = state.crossfade_from * (1.0 - w) + limited * w;
                state.crossfade_remaining -= 1;
            }
            prev += self.smoothing_alpha * (limited - prev);
            *out = prev as f32;
        }
        state.prev_output = prev;

        if state.snapshot.iter().any(|v| v.is_finished()) {
            let mut voices = self.voices.lock();
            let mut retired = self.retired.lock();
            voices.retain(|v| {
                if v.is_finished() {
                    retired.push(Arc::clone(v));
                    false
                } else {
                    true
                }
            });
        }
        state.snapshot.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::tone;
    use std::thread;

    fn raw_config(sample_rate: f64) -> EngineConfig {
        EngineConfig {
            sample_rate,
            crossfade_ms: 0.0,
            smoothing_alpha: 1.0,
            ..EngineConfig::default()
        }
    }

    fn max_step(samples: &[f32]) -> f32 {
        samples
            .windows(2)
            .map(|w| (w[1] - w[0]).abs())
            .fold(0.0, f32::max)
    }

    fn peak(samples: &[f32]) -> f32 {
        samples.iter().fold(0.0_f32, |m, s| m.max(s.abs()))
    }

    #[test]
    fn empty_mixer_outputs_silence() {
        let mixer = VoiceMixer::new(&EngineConfig::default());
        let mut buf = [1.0_f32; 64];
        mixer.mix(&mut buf);
        assert!(buf.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn four_sample_table_repeats_under_attack() {
        // 8 kHz, 1 ms attack = 8 samples; 2 kHz over a 4-sample table is one
        // table step per output sample.
        let config = EngineConfig {
            attack_ms: 1.0,
            ..raw_config(8000.0)
        };
        let mixer = VoiceMixer::new(&config);
        mixer.add_voice(2000.0, &[0.0, 0.5, 0.0, -0.5]);

        let mut buf = [0.0_f32; 8];
        mixer.mix(&mut buf);

        for i in [0, 2, 4, 6] {
            assert_eq!(buf[i], 0.0, "zero crossing at {i}");
        }
        assert!(buf[1] > 0.0 && buf[5] > buf[1], "positive peaks grow: {buf:?}");
        assert!(buf[3] < 0.0 && buf[7] < buf[3], "negative peaks grow: {buf:?}");
        assert!(buf.iter().all(|s| (-1.0..=1.0).contains(s)));
    }

    #[test]
    fn output_stays_in_range_with_defaults() {
        let mixer = VoiceMixer::new(&EngineConfig::default());
        let table = vec![0.5; 100];
        for f in [220.0, 330.0, 440.0, 550.0, 660.0, 770.0, 880.0, 990.0] {
            mixer.add_voice(f, &table);
        }
        let mut buf = [0.0_f32; 512];
        for _ in 0..20 {
            mixer.mix(&mut buf);
            assert!(buf.iter().all(|s| s.is_finite() && (-1.0..=1.0).contains(s)));
        }
    }

    #[test]
    fn release_fades_out_and_removes_voice() {
        let config = EngineConfig {
            attack_ms: 0.0,
            release_ms: 10.0, // 441 samples
            ..EngineConfig::default()
        };
        let mixer = VoiceMixer::new(&config);
        let table = tone::generate(441.0, 44100.0, 0.5);
        mixer.add_voice(441.0, &table);

        let mut buf = [0.0_f32; 512];
        mixer.mix(&mut buf);
        let sustained = peak(&buf);
        assert!(sustained > 0.2, "sustained peak {sustained}");

        mixer.release_voice(441.0);
        let mut block = [0.0_f32; 128];
        let mut peaks = Vec::new();
        for _ in 0..4 {
            mixer.mix(&mut block);
            peaks.push(peak(&block));
        }
        assert!(peaks[0] <= sustained + 1e-3);
        for w in peaks.windows(2) {
            assert!(w[1] < w[0], "release should trend to zero: {peaks:?}");
        }
        assert_eq!(mixer.active_voice_count(), 0);

        mixer.mix(&mut block);
        assert!(peak(&block) < 1e-3, "released voice still audible");
    }

    #[test]
    fn release_is_noop_for_unknown_frequency() {
        let table = tone::generate(441.0, 44100.0, 0.5);
        let touched = VoiceMixer::new(&EngineConfig::default());
        let untouched = VoiceMixer::new(&EngineConfig::default());
        let id = touched.add_voice(441.0, &table);
        untouched.add_voice(441.0, &table);

        touched.release_voice(880.0);
        touched.update_voice(880.0, &[0.0; 4]);
        touched.release_voice(441.01);

        let mut a = [0.0_f32; 256];
        let mut b = [0.0_f32; 256];
        for _ in 0..4 {
            touched.mix(&mut a);
            untouched.mix(&mut b);
            assert_eq!(a, b);
        }
        assert!(touched.is_active(id));
        assert!(peak(&a) > 0.1);
    }

    #[test]
    fn release_before_first_mix_still_sounds() {
        let mixer = VoiceMixer::new(&EngineConfig::default());
        let table = tone::generate(441.0, 44100.0, 0.5);
        mixer.add_voice(441.0, &table);
        mixer.release_voice(441.0);

        let mut buf = [0.0_f32; 512];
        mixer.mix(&mut buf);
        assert!(peak(&buf) > 0.05, "tapped note is silent: peak {}", peak(&buf));

        for _ in 0..30 {
            mixer.mix(&mut buf);
        }
        assert_eq!(mixer.active_voice_count(), 0);
    }

    #[test]
    fn adding_voice_does_not_pop() {
        let mixer = VoiceMixer::new(&EngineConfig::default());
        let table = tone::generate(441.0, 44100.0, 0.5);
        mixer.add_voice(441.0, &table);

        let mut buf = [0.0_f32; 256];
        let mut tail = 0.0;
        let mut steady_step = 0.0_f32;
        for _ in 0..8 {
            mixer.mix(&mut buf);
            steady_step = steady_step.max(max_step(&buf)).max((buf[0] - tail).abs());
            tail = buf[255];
        }

        mixer.add_voice(441.0, &table);
        let mut worst = 0.0_f32;
        for _ in 0..4 {
            mixer.mix(&mut buf);
            worst = worst.max(max_step(&buf)).max((buf[0] - tail).abs());
            tail = buf[255];
        }
        assert!(worst < 0.05, "step {worst} after adding a voice (steady {steady_step})");
    }

    #[test]
    fn eviction_drops_oldest() {
        let config = EngineConfig {
            max_polyphony: 2,
            ..EngineConfig::default()
        };
        let mixer = VoiceMixer::new(&config);
        let a = mixer.add_voice(220.0, &[0.1; 8]);
        let b = mixer.add_voice(330.0, &[0.1; 8]);
        let c = mixer.add_voice(440.0, &[0.1; 8]);
        assert_eq!(mixer.active_voice_count(), 2);
        assert!(!mixer.is_active(a));
        assert_eq!(mixer.active_voice_ids(), vec![b, c]);
    }

    #[test]
    fn finished_voice_is_freed_by_next_control_call() {
        let config = EngineConfig {
            release_ms: 1.0,
            ..EngineConfig::default()
        };
        let mixer = VoiceMixer::new(&config);
        mixer.add_voice(440.0, &[0.1; 8]);
        let voice = Arc::downgrade(&mixer.voices.lock()[0]);

        mixer.release_all();
        let mut buf = [0.0_f32; 128];
        mixer.mix(&mut buf);
        assert_eq!(mixer.active_voice_count(), 0);
        assert!(voice.upgrade().is_some(), "mix dropped the last reference");
        assert_eq!(mixer.retired.lock().len(), 1);

        mixer.release_voice(440.0);
        assert!(voice.upgrade().is_none());
        assert!(mixer.retired.lock().is_empty());
    }

    #[test]
    fn evicted_voice_is_retired_then_freed() {
        let config = EngineConfig {
            max_polyphony: 1,
            ..EngineConfig::default()
        };
        let mixer = VoiceMixer::new(&config);
        mixer.add_voice(220.0, &[0.1; 8]);
        let first = Arc::downgrade(&mixer.voices.lock()[0]);

        let second = mixer.add_voice(330.0, &[0.1; 8]);
        assert_eq!(mixer.active_voice_ids(), vec![second]);
        assert!(first.upgrade().is_some());

        assert!(!mixer.update_voice_by_id(VoiceId(999), &[0.0; 8]));
        assert!(first.upgrade().is_none());
    }

    #[test]
    fn update_twice_matches_update_once() {
        let table = tone::generate(441.0, 44100.0, 0.5);
        let edited: Vec<f64> = table.iter().map(|s| s * 0.5).collect();

        let once = VoiceMixer::new(&EngineConfig::default());
        let twice = VoiceMixer::new(&EngineConfig::default());
        once.add_voice(441.0, &table);
        twice.add_voice(441.0, &table);

        let mut a = [0.0_f32; 300];
        let mut b = [0.0_f32; 300];
        once.mix(&mut a);
        twice.mix(&mut b);
        assert_eq!(a, b);

        once.update_voice(441.0, &edited);
        twice.update_voice(441.0, &edited);
        twice.update_voice(441.0, &edited);
        once.mix(&mut a);
        twice.mix(&mut b);
        assert_eq!(a, b);
    }

    #[test]
    fn update_by_id_changes_only_that_voice() {
        let edited = VoiceMixer::new(&raw_config(44100.0));
        let a = edited.add_voice(440.0, &[0.1; 4]);
        let b = edited.add_voice(440.0, &[0.1; 4]);
        assert!(edited.update_voice_by_id(b, &[0.0; 4]));

        let reference = VoiceMixer::new(&raw_config(44100.0));
        reference.add_voice(440.0, &[0.1; 4]);
        reference.add_voice(440.0, &[0.0; 4]);

        let mut x = [0.0_f32; 256];
        let mut y = [0.0_f32; 256];
        edited.mix(&mut x);
        reference.mix(&mut y);
        assert_eq!(x, y);

        assert!(edited.release_voice_by_id(a));
        assert!(!edited.release_voice_by_id(VoiceId(999)));
        assert!(!edited.update_voice_by_id(VoiceId(999), &[0.0; 8]));
    }

    #[test]
    fn release_all_empties_mixer() {
        let config = EngineConfig {
            release_ms: 1.0,
            ..EngineConfig::default()
        };
        let mixer = VoiceMixer::new(&config);
        for f in [200.0, 300.0, 400.0] {
            mixer.add_voice(f, &[0.2, -0.2]);
        }
        mixer.release_all();
        let mut buf = [0.0_f32; 128];
        mixer.mix(&mut buf);
        assert_eq!(mixer.active_voice_count(), 0);
    }

    #[test]
    fn empty_table_contributes_nothing() {
        let mixer = VoiceMixer::new(&raw_config(44100.0));
        mixer.add_voice(440.0, &[]);
        let mut buf = [0.0_f32; 64];
        mixer.mix(&mut buf);
        assert!(buf.iter().all(|&s| s == 0.0));
        assert_eq!(mixer.active_voice_count(), 1);
    }

    #[test]
    fn concurrent_mutation_while_mixing() {
        let config = EngineConfig {
            release_ms: 2.0,
            max_polyphony: 6,
            ..EngineConfig::default()
        };
        let mixer = Arc::new(VoiceMixer::new(&config));
        let table = tone::generate(220.0, 44100.0, 0.5);

        let control = {
            let mixer = Arc::clone(&mixer);
            let table = table.clone();
            thread::spawn(move || {
                for i in 0..500 {
                    let f = 220.0 + (i % 7) as f64 * 55.0;
                    mixer.add_voice(f, &table);
                    mixer.update_voice(f, &table);
                    if i % 3 == 0 {
                        mixer.release_voice(f);
                    }
                }
                mixer.release_all();
            })
        };

        let mut buf = [0.0_f32; 128];
        for _ in 0..200 {
            mixer.mix(&mut buf);
            assert!(buf.iter().all(|s| s.is_finite() && s.abs() <= 1.0));
        }
        control.join().expect("control thread panicked");

        for _ in 0..20 {
            mixer.mix(&mut buf);
        }
        assert_eq!(mixer.active_voice_count(), 0);
    }
}
