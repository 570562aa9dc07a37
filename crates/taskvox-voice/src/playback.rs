//! **AudioPlaybackCoordinator**: one spoken utterance at a time, newest wins.
//!
//! Build one coordinator per process and hand the same `Arc` to everything that
//! speaks. `play` stops whatever is live before starting the new audio, so two
//! flows (or two rapid prompts from one flow) can never talk over each other.
//! There is no queue: a newer request preempts an older one.

use crate::error::VoiceResult;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Output device abstraction.
pub trait AudioSink: Send + Sync {
    /// Begin playing `audio` without blocking. The returned receiver fires (or
    /// is dropped) once playback has ended, naturally or after [`AudioSink::stop`].
    fn start(&self, audio: Vec<u8>) -> VoiceResult<oneshot::Receiver<()>>;

    /// Halt current output immediately. Must be synchronous and idempotent.
    fn stop(&self);
}

/// Sink for hosts without an output device: every utterance finishes at once.
#[derive(Debug, Default)]
pub struct NullSink;

impl AudioSink for NullSink {
    fn start(&self, _audio: Vec<u8>) -> VoiceResult<oneshot::Receiver<()>> {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(());
        Ok(rx)
    }

    fn stop(&self) {}
}

/// The single live playback. Dropping `preempt` wakes the `play` call that owns it.
struct PlaybackHandle {
    id: u64,
    /// Speaker that started it, when it came through [`AudioPlaybackCoordinator::play_as`].
    owner: Option<u64>,
    preempt: oneshot::Sender<()>,
}

/// Exclusive playback over an [`AudioSink`].
pub struct AudioPlaybackCoordinator {
    sink: Arc<dyn AudioSink>,
    live: Mutex<Option<PlaybackHandle>>,
    next_id: AtomicU64,
    next_owner: AtomicU64,
}

impl AudioPlaybackCoordinator {
    pub fn new(sink: Arc<dyn AudioSink>) -> Self {
        Self {
            sink,
            live: Mutex::new(None),
            next_id: AtomicU64::new(1),
            next_owner: AtomicU64::new(1),
        }
    }

    /// Coordinator over a [`NullSink`].
    pub fn silent() -> Self {
        Self::new(Arc::new(NullSink))
    }

    /// Play `audio`, preempting anything already playing.
    ///
    /// Completes when this audio ends or is preempted. Playback errors are
    /// logged and swallowed; this never fails.
    pub async fn play(&self, audio: Vec<u8>) {
        self.play_owned(None, audio).await;
    }

    /// [`play`](Self::play) on behalf of `owner`, so that [`stop_owned_by`](Self::stop_owned_by)
    /// can later cut off this utterance and nobody else's.
    pub async fn play_as(&self, owner: u64, audio: Vec<u8>) {
        self.play_owned(Some(owner), audio).await;
    }

    /// A fresh owner id for [`play_as`](Self::play_as).
    pub fn new_owner(&self) -> u64 {
        self.next_owner.fetch_add(1, Ordering::Relaxed)
    }

    async fn play_owned(&self, owner: Option<u64>, audio: Vec<u8>) {
        if audio.is_empty() {
            return;
        }

        let (id, ended, preempted) = {
            let mut live = self.live.lock();
            if let Some(previous) = live.take() {
                self.sink.stop();
                debug!(handle = previous.id, "playback preempted");
                drop(previous);
            }

            let ended = match self.sink.start(audio) {
                Ok(rx) => rx,
                Err(e) => {
                    warn!(error = %e, "playback failed to start");
                    return;
                }
            };
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let (preempt, preempted) = oneshot::channel();
            *live = Some(PlaybackHandle { id, owner, preempt });
            (id, ended, preempted)
        };

        tokio::select! {
            _ = ended => debug!(handle = id, "playback finished"),
            _ = preempted => debug!(handle = id, "playback stopped"),
        }

        let mut live = self.live.lock();
        if live.as_ref().map(|h| h.id) == Some(id) {
            *live = None;
        }
    }

    /// Stop the live utterance, if any. Safe to call at any time.
    pub fn stop(&self) {
        let previous = self.live.lock().take();
        if let Some(handle) = previous {
            self.sink.stop();
            let _ = handle.preempt.send(());
            info!(handle = handle.id, "playback stopped");
        }
    }

    /// Stop the live utterance only if `owner` started it. Returns whether it did.
    pub fn stop_owned_by(&self, owner: u64) -> bool {
        let mut live = self.live.lock();
        if live.as_ref().and_then(|h| h.owner) != Some(owner) {
            return false;
        }
        if let Some(handle) = live.take() {
            self.sink.stop();
            let _ = handle.preempt.send(());
            info!(handle = handle.id, owner, "playback stopped by owner");
        }
        true
    }

    /// Whether an utterance is currently live.
    pub fn is_playing(&self) -> bool {
        self.live.lock().is_some()
    }

    /// Id of the live handle, for diagnostics.
    pub fn current_handle(&self) -> Option<u64> {
        self.live.lock().as_ref().map(|h| h.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VoiceError;

    struct BrokenSink;

    impl AudioSink for BrokenSink {
        fn start(&self, _audio: Vec<u8>) -> VoiceResult<oneshot::Receiver<()>> {
            Err(VoiceError::Playback("no device".into()))
        }
        fn stop(&self) {}
    }

    #[tokio::test]
    async fn null_sink_completes_immediately() {
        let coordinator = AudioPlaybackCoordinator::silent();
        coordinator.play(vec![1, 2, 3]).await;
        assert!(!coordinator.is_playing());
    }

    #[tokio::test]
    async fn sink_errors_do_not_propagate() {
        let coordinator = AudioPlaybackCoordinator::new(Arc::new(BrokenSink));
        coordinator.play(vec![1]).await;
        assert!(!coordinator.is_playing());
    }

    #[test]
    fn stop_without_playback_is_a_no_op() {
        let coordinator = AudioPlaybackCoordinator::silent();
        coordinator.stop();
        coordinator.stop();
        assert!(coordinator.current_handle().is_none());
    }
}
