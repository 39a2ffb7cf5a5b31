//! Voice — a single sounding note reading its own copy of a wavetable.
//!
//! A voice is split in two halves. The control block is written by
//! note/edit callers and only holds pending changes; the playback block
//! (phase, envelope) is touched by the mixer alone. The mixer folds pending
//! changes into playback once per buffer, so edits never wait on the
//! per-sample loop.
//!
//! The mixer never frees a table: a table it swaps out is parked in the
//! control block and dropped by the next `set_table` caller.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::envelope::Envelope;
use super::wavetable::WaveTable;

/// Opaque handle returned when a voice is started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VoiceId(pub u64);

/// Frequencies within this many Hz of each other address the same voice.
pub const FREQUENCY_EPSILON: f64 = 1e-3;

pub fn same_frequency(a: f64, b: f64) -> bool {
    (a - b).abs() < FREQUENCY_EPSILON
}

/// Phase increment per output sample for one cycle of `table_len` samples.
pub fn phase_increment(table_len: usize, frequency: f64, sample_rate: f64) -> f64 {
    let inc = table_len as f64 * frequency / sample_rate;
    if inc.is_finite() && inc > 0.0 { inc } else { 0.0 }
}

/// Changes requested since the mixer last looked.
#[derive(Debug, Default)]
struct Pending {
    table: Option<(WaveTable, f64)>,
    release: Option<usize>,
    /// Table the mixer swapped out, waiting to be dropped off the audio thread.
    retired: Option<WaveTable>,
}

#[derive(Debug)]
struct Playback {
    table: WaveTable,
    phase: f64,
    increment: f64,
    envelope: Envelope,
}

/// One note in the mixer's active set.
#[derive(Debug)]
pub struct Voice {
    id: VoiceId,
    frequency: f64,
    control: Mutex<Pending>,
    playback: Mutex<Playback>,
    finished: AtomicBool,
}

impl Voice {
    /// Start a note. Playback begins at the table's quietest sample.
    pub fn new(
        id: VoiceId,
        frequency: f64,
        table: WaveTable,
        sample_rate: f64,
        attack_samples: usize,
    ) -> Self {
        let increment = phase_increment(table.len(), frequency, sample_rate);
        let phase = table.quietest_index() as f64;
        Voice {
            id,
            frequency,
            control: Mutex::new(Pending::default()),
            playback: Mutex::new(Playback {
                table,
                phase,
                increment,
                envelope: Envelope::new(attack_samples),
            }),
            finished: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> VoiceId {
        self.id
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    /// True once the release countdown has reached zero.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Queue a table swap; the mixer applies it before its next buffer.
    /// Tables displaced by earlier swaps are dropped here, after unlocking.
    pub fn set_table(&self, table: WaveTable, increment: f64) {
        let displaced = {
            let mut control = self.control.lock();
            (control.table.replace((table, increment)), control.retired.take())
        };
        drop(displaced);
    }

    /// Queue a (re)start of the release countdown.
    pub fn release(&self, release_samples: usize) {
        self.control.lock().release = Some(release_samples);
    }

    /// Render this voice into `acc`, adding to what is already there.
    /// Called by the mixer only.
    pub(crate) fn render_into(&self, acc: &mut [f64]) {
        let (swap, release) = {
            let mut control = self.control.lock();
            (control.table.take(), control.release.take())
        };
        let mut play = self.playback.lock();

        if let Some((table, increment)) = swap {
            if !table.is_empty() && play.phase >= table.len() as f64 {
                play.phase %= table.len() as f64;
            }
            let old = std::mem::replace(&mut play.table, table);
            play.increment = increment;
            // set_table emptied the slot when it queued this swap
            self.control.lock().retired = Some(old);
        }
        if let Some(release_samples) = release {
            play.envelope.release(release_samples);
        }

        let Playback {
            table,
            phase,
            increment,
            envelope,
        } = &mut *play;
        let len = table.len() as f64;

        for out in acc.iter_mut() {
            if envelope.is_finished() {
                break;
            }
            let gain = envelope.next_gain();
            if len > 0.0 {
                *out += table.read_interpolated(*phase) * gain;
                *phase += *increment;
                if *phase >= len {
                    *phase %= len;
                }
            }
        }

        if envelope.is_finished() {
            self.finished.store(true, Ordering::Release);
        }
    }

    /// Current fractional read position.
    #[cfg(test)]
    pub fn phase(&self) -> f64 {
        self.playback.lock().phase
    }
}
