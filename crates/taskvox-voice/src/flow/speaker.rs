//! Session audio policy on top of the synthesis gateway.

use crate::error::SynthesisError;
use crate::synthesis::SpeechSynthesisGateway;
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of one [`Speaker::say`].
#[derive(Debug, Clone, PartialEq)]
pub enum SpeakOutcome {
    Played,
    /// Audio was already off for this session.
    Muted,
    /// Synthesis failed; the prompt is text-only this time.
    Skipped(SynthesisError),
    /// This failure switched audio off for the rest of the session.
    AudioDisabled(SynthesisError),
}

/// Speaks prompts for one session and absorbs every synthesis failure.
///
/// | failure             | effect                                      |
/// |---------------------|---------------------------------------------|
/// | ProviderUnavailable | silent this time                            |
/// | RateLimited / Auth  | audio off for the session                   |
/// | Network             | retry `network_retries` times, then silent  |
pub struct Speaker {
    gateway: Arc<SpeechSynthesisGateway>,
    network_retries: u32,
    audio_enabled: bool,
    /// Tag for this speaker's utterances on the shared coordinator.
    owner: u64,
}

impl Speaker {
    pub fn new(gateway: Arc<SpeechSynthesisGateway>, network_retries: u32) -> Self {
        let owner = gateway.playback().new_owner();
        Self {
            gateway,
            network_retries,
            audio_enabled: true,
            owner,
        }
    }

    pub fn audio_enabled(&self) -> bool {
        self.audio_enabled
    }

    pub async fn say(&mut self, text: &str) -> SpeakOutcome {
        if !self.audio_enabled {
            return SpeakOutcome::Muted;
        }
        let mut retries = 0;
        loop {
            match self.gateway.speak_as(self.owner, text).await {
                Ok(()) => return SpeakOutcome::Played,
                Err(e) if e.disables_audio() => {
                    warn!(error = %e, "speech synthesis disabled for this session");
                    self.audio_enabled = false;
                    return SpeakOutcome::AudioDisabled(e);
                }
                Err(e) if e.is_transient() && retries < self.network_retries => {
                    retries += 1;
                    debug!(error = %e, retries, "retrying speech synthesis");
                }
                Err(e) => {
                    debug!(error = %e, "speaking text-only");
                    return SpeakOutcome::Skipped(e);
                }
            }
        }
    }

    /// Cut off this speaker's utterance. Audio started by anyone else sharing
    /// the coordinator keeps playing.
    pub fn stop(&self) {
        self.gateway.playback().stop_owned_by(self.owner);
    }
}
