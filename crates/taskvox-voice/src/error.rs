//! Error types for the taskvox voice engine

use thiserror::Error;

/// Result type alias for voice adapter operations
pub type VoiceResult<T> = Result<T, VoiceError>;

/// Errors from audio/transcription plumbing (device adapters, HTTP STT, config).
///
/// Flow-facing failures have their own narrower types: [`CaptureError`] and
/// [`SynthesisError`].
#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("Audio stream error: {0}")]
    AudioStream(String),

    #[error("VAD initialization failed: {0}")]
    VadInit(String),

    #[error("VAD processing error: {0}")]
    VadProcessing(String),

    #[error("Audio playback error: {0}")]
    Playback(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("STT error: {0}")]
    Stt(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Speech capture failures.
///
/// Only `Unsupported` is fatal for a capture session; everything else is
/// transient and reported without tearing the session down.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("speech recognition is not supported on this platform")]
    Unsupported,

    #[error("no speech detected")]
    NoSpeech,

    #[error("audio capture failed: {0}")]
    AudioCapture(String),

    #[error("microphone access denied")]
    Denied,

    #[error("recognition error: {0}")]
    Other(String),
}

impl CaptureError {
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Unsupported)
    }
}

/// Typed text-to-speech provider failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SynthesisError {
    #[error("speech synthesis unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("speech synthesis rate limited")]
    RateLimited,

    #[error("speech synthesis authentication failed")]
    AuthFailure,

    #[error("speech synthesis network error: {0}")]
    Network(String),
}

impl SynthesisError {
    /// Rate limits and auth failures switch audio off for the rest of the session.
    pub fn disables_audio(&self) -> bool {
        matches!(self, Self::RateLimited | Self::AuthFailure)
    }

    /// Network failures may be retried for the same utterance.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

#[cfg(feature = "device")]
impl From<cpal::DevicesError> for VoiceError {
    fn from(err: cpal::DevicesError) -> Self {
        VoiceError::AudioDevice(err.to_string())
    }
}

#[cfg(feature = "device")]
impl From<cpal::DefaultStreamConfigError> for VoiceError {
    fn from(err: cpal::DefaultStreamConfigError) -> Self {
        VoiceError::AudioDevice(err.to_string())
    }
}

#[cfg(feature = "device")]
impl From<cpal::BuildStreamError> for VoiceError {
    fn from(err: cpal::BuildStreamError) -> Self {
        VoiceError::AudioStream(err.to_string())
    }
}

#[cfg(feature = "device")]
impl From<cpal::PlayStreamError> for VoiceError {
    fn from(err: cpal::PlayStreamError) -> Self {
        VoiceError::AudioStream(err.to_string())
    }
}
