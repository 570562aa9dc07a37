//! Voice activity detection using WebRTC VAD.

use crate::error::{VoiceError, VoiceResult};
use tracing::info;
use webrtc_vad::{SampleRate, Vad, VadMode};

/// Per-chunk speech/silence verdicts. Not `Send`; build it on the thread that uses it.
pub struct VadDetector {
    vad: Vad,
    chunk_size: usize,
}

impl VadDetector {
    /// `mode` 0 (quality) to 3 (very aggressive). Chunks are 30ms.
    pub fn new(sample_rate: u32, mode: u8) -> VoiceResult<Self> {
        let rate = match sample_rate {
            8000 => SampleRate::Rate8kHz,
            16000 => SampleRate::Rate16kHz,
            32000 => SampleRate::Rate32kHz,
            48000 => SampleRate::Rate48kHz,
            other => {
                return Err(VoiceError::VadInit(format!(
                    "WebRTC VAD supports 8000, 16000, 32000 or 48000 Hz, got {other}"
                )))
            }
        };
        let mode = match mode {
            0 => VadMode::Quality,
            1 => VadMode::LowBitrate,
            2 => VadMode::Aggressive,
            3 => VadMode::VeryAggressive,
            other => return Err(VoiceError::VadInit(format!("VAD mode must be 0-3, got {other}"))),
        };
        let chunk_size = (sample_rate as usize * 30) / 1000;
        info!(sample_rate, chunk_size, "VAD initialized");
        Ok(Self {
            vad: Vad::new_with_rate_and_mode(rate, mode),
            chunk_size,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn is_speech(&mut self, chunk: &[f32]) -> VoiceResult<bool> {
        if chunk.len() != self.chunk_size {
            return Err(VoiceError::VadProcessing(format!(
                "expected {} samples, got {}",
                self.chunk_size,
                chunk.len()
            )));
        }
        let pcm: Vec<i16> = chunk
            .iter()
            .map(|&s| (s.clamp(-1.0, 1.0) * 32767.0) as i16)
            .collect();
        self.vad
            .is_voice_segment(&pcm)
            .map_err(|_| VoiceError::VadProcessing("invalid frame length".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unsupported_rates() {
        assert!(matches!(VadDetector::new(44_100, 2), Err(VoiceError::VadInit(_))));
        assert!(matches!(VadDetector::new(16_000, 7), Err(VoiceError::VadInit(_))));
    }

    #[test]
    fn silence_is_not_speech() {
        let mut vad = VadDetector::new(16_000, 2).unwrap();
        assert_eq!(vad.chunk_size(), 480);
        assert!(!vad.is_speech(&[0.0; 480]).unwrap());
        assert!(vad.is_speech(&[0.0; 100]).is_err());
    }
}
