//! Typed input as a speech recognizer: every line is one final transcript.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use taskvox_voice::{CaptureError, RecognizerEvent, SpeechRecognizer};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

#[derive(Default)]
pub struct StdinRecognizer {
    sink: Arc<Mutex<Option<mpsc::UnboundedSender<RecognizerEvent>>>>,
    reader_started: AtomicBool,
    closed: Arc<AtomicBool>,
}

impl StdinRecognizer {
    /// One reader for the whole process; each recognizer run borrows its output.
    fn spawn_reader(&self) {
        if self.reader_started.swap(true, Ordering::SeqCst) {
            return;
        }
        let sink = Arc::clone(&self.sink);
        let closed = Arc::clone(&self.closed);
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                let event = match lines.next_line().await {
                    Ok(Some(line)) if line.trim().is_empty() => continue,
                    Ok(Some(line)) => RecognizerEvent::Result {
                        text: line,
                        is_final: true,
                    },
                    Ok(None) => break,
                    Err(e) => RecognizerEvent::Error(CaptureError::AudioCapture(e.to_string())),
                };
                if let Some(tx) = sink.lock().as_ref() {
                    let _ = tx.send(event);
                }
            }
            closed.store(true, Ordering::SeqCst);
            if let Some(tx) = sink.lock().take() {
                let _ = tx.send(RecognizerEvent::End);
            }
        });
    }
}

#[async_trait::async_trait]
impl SpeechRecognizer for StdinRecognizer {
    async fn start(&self, events: mpsc::UnboundedSender<RecognizerEvent>) -> Result<(), CaptureError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CaptureError::AudioCapture("stdin closed".into()));
        }
        *self.sink.lock() = Some(events);
        self.spawn_reader();
        Ok(())
    }

    fn stop(&self) {
        self.sink.lock().take();
    }
}
