//! Entry point for the dialog client: turns audio-bearing activities into
//! playback sessions and tears them down on disconnect.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::Config;
use crate::error::Result;
use crate::playback::{
    CpalFactory, DeviceFactory, PlaybackHandle, PlaybackReport, PlaybackSession, PullSource,
};

/// An activity delivered by the dialog service.
pub struct ActivityEvent {
    /// Activity payload (JSON text from the service)
    pub activity: String,
    /// Attached speech audio, if any
    pub audio: Option<Box<dyn PullSource>>,
}

impl ActivityEvent {
    pub fn new(activity: impl Into<String>) -> Self {
        Self {
            activity: activity.into(),
            audio: None,
        }
    }

    pub fn with_audio(mut self, audio: impl PullSource + 'static) -> Self {
        self.audio = Some(Box::new(audio));
        self
    }

    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }
}

impl std::fmt::Debug for ActivityEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityEvent")
            .field("activity", &self.activity)
            .field("has_audio", &self.has_audio())
            .finish()
    }
}

/// Plays speech responses and keeps track of live sessions.
///
/// Dropping the speaker cancels every live session.
pub struct Speaker {
    session: PlaybackSession,
    active: Mutex<Vec<PlaybackHandle>>,
    interaction_start: Arc<Mutex<Option<Instant>>>,
    last_turn_latency: Arc<Mutex<Option<Duration>>>,
}

impl Speaker {
    pub fn new(config: &Config, factory: Arc<dyn DeviceFactory>) -> Self {
        let session = PlaybackSession::new(factory, config.audio.format())
            .buffer_size(config.audio.buffer_size)
            .queue_capacity(config.playback.capacity())
            .drain_on_stop(config.playback.drain_on_stop);

        Self {
            session,
            active: Mutex::new(Vec::new()),
            interaction_start: Arc::new(Mutex::new(None)),
            last_turn_latency: Arc::new(Mutex::new(None)),
        }
    }

    /// Speaker on the configured cpal output device.
    pub fn with_default_output(config: &Config) -> Self {
        Self::new(config, Arc::new(CpalFactory::new(config.audio.device_name())))
    }

    /// Record that the user started a turn. Playback completions report the
    /// latency from this mark.
    pub fn mark_interaction_start(&self) {
        *self.interaction_start.lock() = Some(Instant::now());
    }

    /// Latency from the interaction mark to the end of the most recent
    /// playback.
    pub fn last_turn_latency(&self) -> Option<Duration> {
        *self.last_turn_latency.lock()
    }

    /// Start playing `source`.
    pub fn play<S, F>(&self, source: S, on_done: Option<F>) -> Result<PlaybackHandle>
    where
        S: PullSource + 'static,
        F: FnOnce() + Send + 'static,
    {
        self.prune();

        let mark = Arc::clone(&self.interaction_start);
        let latency = Arc::clone(&self.last_turn_latency);
        let done = move || {
            if let Some(started) = *mark.lock() {
                let elapsed = started.elapsed();
                tracing::info!("Turn finished in {} ms", elapsed.as_millis());
                *latency.lock() = Some(elapsed);
            }
            if let Some(f) = on_done {
                f();
            }
        };

        let handle = self.session.start(source, Some(done))?;
        self.active.lock().push(handle.clone());
        Ok(handle)
    }

    /// Handle an activity. Starts playback only when audio is attached;
    /// `on_done` is not called for activities without audio.
    pub fn on_activity<F>(&self, event: ActivityEvent, on_done: Option<F>) -> Option<PlaybackHandle>
    where
        F: FnOnce() + Send + 'static,
    {
        tracing::info!(has_audio = event.has_audio(), "Activity: {}", event.activity);
        let audio = event.audio?;
        match self.play(audio, on_done) {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::error!("Failed to start activity playback: {}", e);
                None
            }
        }
    }

    /// Sessions that have not yet finished.
    pub fn active_sessions(&self) -> usize {
        self.prune();
        self.active.lock().len()
    }

    /// Cancel every live session without waiting.
    pub fn cancel_all(&self) {
        for handle in self.active.lock().iter() {
            handle.cancel();
        }
    }

    /// Disconnect: cancel every live session and wait for each to release
    /// its device. Clears the interaction mark.
    pub fn shutdown(&self) -> Vec<PlaybackReport> {
        let handles = std::mem::take(&mut *self.active.lock());
        for handle in &handles {
            handle.cancel();
        }
        let reports = handles.iter().map(PlaybackHandle::wait).collect();
        *self.interaction_start.lock() = None;
        reports
    }

    fn prune(&self) {
        self.active.lock().retain(|h| !h.is_finished());
    }
}

impl Drop for Speaker {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
