//! Attack/release gain stage with raised-cosine (Hann) ramps.
//!
//! There is no decay or sustain level. The attack and release countdowns run
//! independently and their ramps multiply, so a release that lands before the
//! attack has finished still lets the note through.

use std::f64::consts::PI;

/// Per-voice gain envelope driven by sample countdowns.
#[derive(Debug, Clone)]
pub struct Envelope {
    attack_len: usize,
    attack_remaining: usize,
    release_len: usize,
    release_remaining: usize,
    releasing: bool,
    finished: bool,
    /// Release gain when the countdown was last (re)started.
    release_from: f64,
}

/// Raised-cosine ramp from 0 (progress 0) to 1 (progress 1).
fn hann_rise(progress: f64) -> f64 {
    0.5 * (1.0 - (PI * progress.clamp(0.0, 1.0)).cos())
}

impl Envelope {
    /// Start ramping in over `attack_samples`. Zero starts at unity.
    pub fn new(attack_samples: usize) -> Self {
        Envelope {
            attack_len: attack_samples,
            attack_remaining: attack_samples,
            release_len: 0,
            release_remaining: 0,
            releasing: false,
            finished: false,
            release_from: 1.0,
        }
    }

    fn attack_gain(&self) -> f64 {
        if self.attack_remaining == 0 {
            1.0
        } else {
            hann_rise(1.0 - self.attack_remaining as f64 / self.attack_len as f64)
        }
    }

    fn release_gain(&self) -> f64 {
        if !self.releasing {
            1.0
        } else {
            self.release_from * hann_rise(self.release_remaining as f64 / self.release_len as f64)
        }
    }

    /// Gain for the current sample, in [0, 1].
    pub fn gain(&self) -> f64 {
        if self.finished {
            return 0.0;
        }
        (self.attack_gain() * self.release_gain()).clamp(0.0, 1.0)
    }

    /// Advance one sample, decrementing every active countdown.
    pub fn advance(&mut self) {
        if self.finished {
            return;
        }
        self.attack_remaining = self.attack_remaining.saturating_sub(1);
        if self.releasing {
            self.release_remaining = self.release_remaining.saturating_sub(1);
            if self.release_remaining == 0 {
                self.finished = true;
            }
        }
    }

    /// Gain for this sample, then advance.
    pub fn next_gain(&mut self) -> f64 {
        let g = self.gain();
        self.advance();
        g
    }

    /// (Re)start the release countdown. A restart ramps down from the release
    /// gain reached so far; the attack ramp keeps running underneath.
    pub fn release(&mut self, release_samples: usize) {
        if self.finished {
            return;
        }
        if release_samples == 0 {
            self.finished = true;
            return;
        }
        self.release_from = self.release_gain();
        self.release_len = release_samples;
        self.release_remaining = release_samples;
        self.releasing = true;
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}
