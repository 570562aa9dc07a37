//! Bare-metal audio adapters: microphone recognizer (cpal + WebRTC VAD + HTTP
//! transcription) and a rodio playback sink. Enabled with `--features device`.

mod microphone;
mod rodio_sink;
mod vad;

pub use microphone::{MicrophoneConfig, MicrophoneRecognizer};
pub use rodio_sink::RodioSink;
pub use vad::VadDetector;
