//! Microphone-backed [`SpeechRecognizer`].
//!
//! A capture thread owns the cpal stream (it is `!Send` on some platforms),
//! runs VAD on 30ms chunks and cuts utterances on an 800ms gap. Each utterance
//! is transcribed on the runtime and delivered as a final result.

use super::vad::VadDetector;
use crate::capture::{RecognizerEvent, SpeechRecognizer};
use crate::error::{CaptureError, VoiceError, VoiceResult};
use crate::stt::{Transcriber, Utterance};
use crate::turn::{TurnConfig, TurnDetector};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct MicrophoneConfig {
    pub sample_rate: u32,
    /// WebRTC VAD aggressiveness, 0-3.
    pub vad_mode: u8,
    pub turn: TurnConfig,
}

impl Default for MicrophoneConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            vad_mode: 2,
            turn: TurnConfig::default(),
        }
    }
}

pub struct MicrophoneRecognizer {
    config: MicrophoneConfig,
    transcriber: Arc<dyn Transcriber>,
    running: Mutex<Option<Arc<AtomicBool>>>,
}

impl MicrophoneRecognizer {
    pub fn new(config: MicrophoneConfig, transcriber: Arc<dyn Transcriber>) -> Self {
        Self {
            config,
            transcriber,
            running: Mutex::new(None),
        }
    }
}

#[async_trait::async_trait]
impl SpeechRecognizer for MicrophoneRecognizer {
    fn is_supported(&self) -> bool {
        cpal::default_host().default_input_device().is_some()
    }

    async fn start(&self, events: mpsc::UnboundedSender<RecognizerEvent>) -> Result<(), CaptureError> {
        let running = Arc::new(AtomicBool::new(true));
        if let Some(previous) = self.running.lock().replace(Arc::clone(&running)) {
            previous.store(false, Ordering::SeqCst);
        }

        let (utterance_tx, mut utterance_rx) = mpsc::unbounded_channel::<Utterance>();
        let (ready_tx, ready_rx) = oneshot::channel();
        let config = self.config.clone();
        let flag = Arc::clone(&running);
        std::thread::Builder::new()
            .name("taskvox-mic".into())
            .spawn(move || capture_loop(config, flag, utterance_tx, ready_tx))
            .map_err(|e| CaptureError::AudioCapture(e.to_string()))?;

        match ready_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(CaptureError::AudioCapture(e.to_string())),
            Err(_) => return Err(CaptureError::AudioCapture("capture thread exited".into())),
        }

        let transcriber = Arc::clone(&self.transcriber);
        tokio::spawn(async move {
            while let Some(utterance) = utterance_rx.recv().await {
                let event = match transcriber.transcribe(&utterance).await {
                    Ok(text) if text.trim().is_empty() => RecognizerEvent::Error(CaptureError::NoSpeech),
                    Ok(text) => RecognizerEvent::Result { text, is_final: true },
                    Err(e) => {
                        warn!(error = %e, "transcription failed");
                        RecognizerEvent::Error(CaptureError::Other(e.to_string()))
                    }
                };
                if events.send(event).is_err() {
                    break;
                }
            }
            let _ = events.send(RecognizerEvent::End);
        });
        Ok(())
    }

    fn stop(&self) {
        if let Some(flag) = self.running.lock().take() {
            flag.store(false, Ordering::SeqCst);
        }
    }
}

fn open_input(sample_rate: u32, chunk_size: usize, chunks: std_mpsc::Sender<Vec<f32>>) -> VoiceResult<Stream> {
    let device = cpal::default_host()
        .default_input_device()
        .ok_or_else(|| VoiceError::AudioDevice("no input device available".to_string()))?;
    info!(device = %device.name().unwrap_or_else(|_| "unknown".into()), sample_rate, "opening microphone");

    let config = StreamConfig {
        channels: 1,
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };
    let mut pending = Vec::with_capacity(chunk_size);
    let stream = device.build_input_stream(
        &config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            for &sample in data {
                pending.push(sample);
                if pending.len() >= chunk_size {
                    let _ = chunks.send(std::mem::replace(&mut pending, Vec::with_capacity(chunk_size)));
                }
            }
        },
        |err| warn!(error = %err, "microphone stream error"),
        None,
    )?;
    stream.play()?;
    Ok(stream)
}

fn capture_loop(
    config: MicrophoneConfig,
    running: Arc<AtomicBool>,
    utterances: mpsc::UnboundedSender<Utterance>,
    ready: oneshot::Sender<VoiceResult<()>>,
) {
    let mut vad = match VadDetector::new(config.sample_rate, config.vad_mode) {
        Ok(vad) => vad,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    let (chunk_tx, chunk_rx) = std_mpsc::channel();
    let stream = match open_input(config.sample_rate, vad.chunk_size(), chunk_tx) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    let _ = ready.send(Ok(()));

    let mut turns = TurnDetector::new(TurnConfig {
        sample_rate: config.sample_rate,
        ..config.turn
    });
    while running.load(Ordering::SeqCst) {
        match chunk_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(chunk) => {
                let speech = match vad.is_speech(&chunk) {
                    Ok(speech) => speech,
                    Err(e) => {
                        debug!(error = %e, "chunk skipped");
                        continue;
                    }
                };
                if let Some(utterance) = turns.push(speech, &chunk) {
                    if utterances.send(utterance).is_err() {
                        break;
                    }
                }
            }
            Err(std_mpsc::RecvTimeoutError::Timeout) => {}
            Err(std_mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
    if let Some(utterance) = turns.flush() {
        let _ = utterances.send(utterance);
    }
    drop(stream);
    info!("microphone closed");
}
