//! Speaker output through rodio.
//!
//! `rodio::OutputStream` is `!Send`, so a dedicated thread owns it and takes
//! play/stop commands over a channel.

use crate::error::{VoiceError, VoiceResult};
use crate::playback::AudioSink;
use rodio::{Decoder, OutputStream, Sink};
use std::io::Cursor;
use std::sync::mpsc as std_mpsc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{info, warn};

type Source = Decoder<Cursor<Vec<u8>>>;

enum Command {
    Play(Source, oneshot::Sender<()>),
    Stop,
}

pub struct RodioSink {
    commands: std_mpsc::Sender<Command>,
}

impl RodioSink {
    /// Open the default output device on a dedicated thread.
    pub fn open() -> VoiceResult<Self> {
        let (commands, rx) = std_mpsc::channel();
        let (ready_tx, ready_rx) = std_mpsc::channel();
        std::thread::Builder::new()
            .name("taskvox-playback".into())
            .spawn(move || output_loop(rx, ready_tx))?;
        ready_rx
            .recv()
            .map_err(|_| VoiceError::Playback("output thread exited".into()))??;
        info!("audio output ready");
        Ok(Self { commands })
    }
}

impl AudioSink for RodioSink {
    fn start(&self, audio: Vec<u8>) -> VoiceResult<oneshot::Receiver<()>> {
        let source = Decoder::new(Cursor::new(audio)).map_err(|e| VoiceError::Playback(e.to_string()))?;
        let (done_tx, done_rx) = oneshot::channel();
        self.commands
            .send(Command::Play(source, done_tx))
            .map_err(|_| VoiceError::Playback("output thread gone".into()))?;
        Ok(done_rx)
    }

    fn stop(&self) {
        let _ = self.commands.send(Command::Stop);
    }
}

fn output_loop(commands: std_mpsc::Receiver<Command>, ready: std_mpsc::Sender<VoiceResult<()>>) {
    let (_stream, handle) = match OutputStream::try_default() {
        Ok(pair) => pair,
        Err(e) => {
            let _ = ready.send(Err(VoiceError::Playback(e.to_string())));
            return;
        }
    };
    let _ = ready.send(Ok(()));

    let mut current: Option<(Sink, oneshot::Sender<()>)> = None;
    loop {
        match commands.recv_timeout(Duration::from_millis(20)) {
            Ok(Command::Play(source, done)) => {
                if let Some((sink, previous)) = current.take() {
                    sink.stop();
                    let _ = previous.send(());
                }
                match Sink::try_new(&handle) {
                    Ok(sink) => {
                        sink.append(source);
                        current = Some((sink, done));
                    }
                    Err(e) => {
                        warn!(error = %e, "could not open output sink");
                        let _ = done.send(());
                    }
                }
            }
            Ok(Command::Stop) => {
                if let Some((sink, done)) = current.take() {
                    sink.stop();
                    let _ = done.send(());
                }
            }
            Err(std_mpsc::RecvTimeoutError::Timeout) => {
                if current.as_ref().is_some_and(|(sink, _)| sink.empty()) {
                    if let Some((_, done)) = current.take() {
                        let _ = done.send(());
                    }
                }
            }
            Err(std_mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
}
