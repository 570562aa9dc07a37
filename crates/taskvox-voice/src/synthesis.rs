//! **SpeechSynthesisGateway**: text to audio bytes, then out through the playback coordinator.
//!
//! Providers report typed [`SynthesisError`]s; deciding what to do about them
//! (stay silent, switch audio off, retry once) is the caller's job. See
//! `flow::Speaker` for the policy the voice flows apply.

use crate::error::SynthesisError;
use crate::playback::AudioPlaybackCoordinator;
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use taskvox_core::SpeechConfig;
use tracing::{debug, info};

/// Backend that turns text into audio bytes (WAV/MP3).
#[async_trait::async_trait]
pub trait TtsProvider: Send + Sync {
    /// Synthesize `text`. An empty result means "nothing to play".
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SynthesisError>;
}

/// Provider used when synthesis is switched off or no credentials exist.
#[derive(Debug, Clone)]
pub struct DisabledTts {
    reason: String,
}

impl DisabledTts {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait::async_trait]
impl TtsProvider for DisabledTts {
    async fn synthesize(&self, _text: &str) -> Result<Vec<u8>, SynthesisError> {
        Err(SynthesisError::ProviderUnavailable(self.reason.clone()))
    }
}

/// Placeholder TTS: returns empty audio so nothing plays.
#[derive(Debug, Default)]
pub struct PlaceholderTts;

#[async_trait::async_trait]
impl TtsProvider for PlaceholderTts {
    async fn synthesize(&self, _text: &str) -> Result<Vec<u8>, SynthesisError> {
        Ok(Vec::new())
    }
}

/// OpenAI-compatible `/audio/speech` backend (OpenAI, OpenRouter, local gateways).
#[derive(Debug, Clone)]
pub struct OpenAiTts {
    /// Base URL without trailing slash (e.g. https://api.openai.com/v1).
    pub base_url: String,
    /// Bearer API key.
    pub api_key: String,
    /// TTS model: tts-1 (fast) or tts-1-hd (higher quality).
    pub model: String,
    /// Voice id (alloy, echo, fable, onyx, nova, shimmer, ...).
    pub voice: String,
    client: reqwest::Client,
}

impl OpenAiTts {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        voice: impl Into<String>,
    ) -> Result<Self, SynthesisError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SynthesisError::ProviderUnavailable(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            voice: voice.into(),
            client,
        })
    }

    /// Map an HTTP status to the failure taxonomy.
    pub fn classify_status(status: StatusCode, body: &str) -> SynthesisError {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SynthesisError::AuthFailure,
            StatusCode::TOO_MANY_REQUESTS => SynthesisError::RateLimited,
            s if s.is_server_error() => SynthesisError::Network(format!("TTS API error {}", s)),
            s => SynthesisError::ProviderUnavailable(format!("TTS API error {}: {}", s, body)),
        }
    }
}

#[async_trait::async_trait]
impl TtsProvider for OpenAiTts {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SynthesisError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/audio/speech", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
            "voice": self.voice,
        });
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| SynthesisError::Network(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(Self::classify_status(status, &body));
        }
        let bytes = res
            .bytes()
            .await
            .map_err(|e| SynthesisError::Network(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// Fetches audio from a [`TtsProvider`] and plays it through the shared coordinator.
pub struct SpeechSynthesisGateway {
    provider: Arc<dyn TtsProvider>,
    playback: Arc<AudioPlaybackCoordinator>,
}

impl SpeechSynthesisGateway {
    pub fn new(provider: Arc<dyn TtsProvider>, playback: Arc<AudioPlaybackCoordinator>) -> Self {
        Self { provider, playback }
    }

    /// Pick the provider from config: OpenAI-compatible when enabled and a key
    /// resolves, otherwise [`DisabledTts`].
    pub fn from_config(config: &SpeechConfig, playback: Arc<AudioPlaybackCoordinator>) -> Self {
        let provider: Arc<dyn TtsProvider> = if !config.tts_enabled {
            Arc::new(DisabledTts::new("speech synthesis disabled"))
        } else {
            match config.resolve_tts_api_key() {
                Some(key) => match OpenAiTts::new(
                    config.tts_api_url.clone(),
                    key,
                    config.tts_model.clone(),
                    config.tts_voice.clone(),
                ) {
                    Ok(tts) => {
                        info!(model = %config.tts_model, voice = %config.tts_voice, "speech synthesis ready");
                        Arc::new(tts)
                    }
                    Err(e) => Arc::new(DisabledTts::new(e.to_string())),
                },
                None => Arc::new(DisabledTts::new("no TTS credentials configured")),
            }
        };
        Self::new(provider, playback)
    }

    /// Synthesize and play `text`. Resolves once playback ends (or is preempted).
    pub async fn speak(&self, text: &str) -> Result<(), SynthesisError> {
        if let Some(audio) = self.fetch(text).await? {
            self.playback.play(audio).await;
        }
        Ok(())
    }

    /// [`speak`](Self::speak), with the utterance tagged as `owner`'s on the coordinator.
    pub async fn speak_as(&self, owner: u64, text: &str) -> Result<(), SynthesisError> {
        if let Some(audio) = self.fetch(text).await? {
            self.playback.play_as(owner, audio).await;
        }
        Ok(())
    }

    async fn fetch(&self, text: &str) -> Result<Option<Vec<u8>>, SynthesisError> {
        let audio = self.provider.synthesize(text).await?;
        if audio.is_empty() {
            debug!("synthesis returned no audio; skipping playback");
            return Ok(None);
        }
        Ok(Some(audio))
    }

    /// The coordinator this gateway plays through.
    pub fn playback(&self) -> &Arc<AudioPlaybackCoordinator> {
        &self.playback
    }
}
