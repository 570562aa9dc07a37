//! Gap-based utterance detection over per-chunk voice activity.
//!
//! Speech opens an utterance; a run of silence at least `silence_threshold`
//! long closes it. Timing is counted in chunk durations, not wall-clock time.

use crate::stt::Utterance;
use chrono::Utc;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct TurnConfig {
    /// Silence after speech that ends an utterance (default 800ms).
    pub silence_threshold: Duration,
    /// Shorter utterances are dropped as noise (default 200ms).
    pub min_speech_duration: Duration,
    /// Force a cut after this long (default 30s).
    pub max_turn_duration: Duration,
    pub sample_rate: u32,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            silence_threshold: Duration::from_millis(800),
            min_speech_duration: Duration::from_millis(200),
            max_turn_duration: Duration::from_secs(30),
            sample_rate: 16_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnState {
    Idle,
    Speaking,
    TrailingSilence,
}

/// Collects speech chunks into [`Utterance`]s.
#[derive(Debug)]
pub struct TurnDetector {
    config: TurnConfig,
    state: TurnState,
    samples: Vec<f32>,
    speech: Duration,
    silence: Duration,
}

impl TurnDetector {
    pub fn new(config: TurnConfig) -> Self {
        Self {
            config,
            state: TurnState::Idle,
            samples: Vec::new(),
            speech: Duration::ZERO,
            silence: Duration::ZERO,
        }
    }

    fn chunk_duration(&self, chunk: &[f32]) -> Duration {
        let rate = self.config.sample_rate.max(1) as u64;
        Duration::from_micros(chunk.len() as u64 * 1_000_000 / rate)
    }

    /// Feed one chunk with its VAD verdict. Returns an utterance when one closes.
    pub fn push(&mut self, is_speech: bool, chunk: &[f32]) -> Option<Utterance> {
        let len = self.chunk_duration(chunk);
        match (self.state, is_speech) {
            (TurnState::Idle, false) => None,
            (TurnState::Idle, true) => {
                self.state = TurnState::Speaking;
                self.samples.clear();
                self.samples.extend_from_slice(chunk);
                self.speech = len;
                self.silence = Duration::ZERO;
                None
            }
            (TurnState::Speaking | TurnState::TrailingSilence, true) => {
                self.state = TurnState::Speaking;
                self.samples.extend_from_slice(chunk);
                self.speech += self.silence + len;
                self.silence = Duration::ZERO;
                if self.speech >= self.config.max_turn_duration {
                    debug!(duration = ?self.speech, "max utterance length reached");
                    return self.commit();
                }
                None
            }
            (TurnState::Speaking | TurnState::TrailingSilence, false) => {
                self.state = TurnState::TrailingSilence;
                self.samples.extend_from_slice(chunk);
                self.silence += len;
                if self.silence >= self.config.silence_threshold {
                    return self.commit();
                }
                None
            }
        }
    }

    /// Close whatever is open (e.g. when capture stops).
    pub fn flush(&mut self) -> Option<Utterance> {
        if self.state == TurnState::Idle {
            return None;
        }
        self.commit()
    }

    pub fn is_speaking(&self) -> bool {
        self.state != TurnState::Idle
    }

    fn commit(&mut self) -> Option<Utterance> {
        let duration = self.speech;
        let samples = std::mem::take(&mut self.samples);
        self.state = TurnState::Idle;
        self.speech = Duration::ZERO;
        self.silence = Duration::ZERO;
        if duration < self.config.min_speech_duration {
            debug!(?duration, "utterance too short; dropped");
            return None;
        }
        debug!(?duration, samples = samples.len(), "utterance committed");
        Some(Utterance {
            samples,
            sample_rate: self.config.sample_rate,
            started_at: Utc::now()
                - chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero()),
            duration,
        })
    }
}
