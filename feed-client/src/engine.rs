//! The feed engine: transport orchestration, merging, persistence,
//! notification.
//!
//! The engine owns the pure pieces from feed-core and drives them with real
//! I/O. It attempts the streaming transport once; if the stream fails to
//! open, errors mid-stream or is closed by the remote, it degrades to
//! polling the fallback endpoint and stays there. No transport failure is
//! fatal: the engine keeps serving whatever window it has and keeps
//! retrying the fallback with capped backoff.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use feed_core::{backoff_delay, Action, ConnectionState, EngineEvent, Event, RetryDelay, Window};
use feed_types::{FeedMessage, Listing};

use crate::audio::{AlertPlayer, AudioError, AudioUnlocker};
use crate::config::EngineConfig;
use crate::fetch::FeedFetcher;
use crate::gate::NotificationGate;
use crate::store::SnapshotStore;
use crate::transport::{FeedTransport, TransportError};

/// User-facing error text while the fallback is taking over.
const ERR_RETRYING: &str = "connection problem, retrying";
/// User-facing error text when a fallback poll fails too.
const ERR_FETCH: &str = "cannot fetch data";

/// Engine errors surfaced to the caller.
///
/// Only user-initiated operations (enabling sound) return errors; the feed
/// loop itself swallows everything and retries.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The audio pipeline could not be unlocked.
    #[error("audio error: {0}")]
    Audio(#[from] AudioError),

    /// The notification sound could not be fetched.
    #[error("sound fetch failed: {0}")]
    SoundFetch(String),
}

/// Point-in-time view of the engine for rendering.
#[derive(Debug, Clone)]
pub struct EngineSnapshot {
    /// The current window, newest first.
    pub listings: Vec<Listing>,
    /// True until the first batch (from either transport) has been applied.
    pub loading: bool,
    /// Current user-facing error text, if any.
    pub error: Option<String>,
    /// Whether the notification sound is enabled.
    pub sound_enabled: bool,
}

struct Shared {
    window: tokio::sync::Mutex<Window>,
    state: tokio::sync::Mutex<ConnectionState>,
    error: std::sync::Mutex<Option<String>>,
    loading: AtomicBool,
    sound_enabled: AtomicBool,
    alive: AtomicBool,
    shutdown: Notify,
}

/// The feed sync engine.
///
/// Generic over its transport and fetcher so tests can drive it with the
/// mock implementations. See the crate docs for the wiring.
pub struct FeedEngine<T: FeedTransport, F: FeedFetcher> {
    config: EngineConfig,
    transport: T,
    fetcher: F,
    store: Arc<dyn SnapshotStore>,
    unlocker: Arc<AudioUnlocker>,
    gate: NotificationGate,
    http: reqwest::Client,
    shared: Shared,
}

impl<T: FeedTransport, F: FeedFetcher> FeedEngine<T, F> {
    /// Create a new engine from its parts.
    pub fn new(
        config: EngineConfig,
        transport: T,
        fetcher: F,
        store: Arc<dyn SnapshotStore>,
        player: Arc<dyn AlertPlayer>,
    ) -> Self {
        let unlocker = Arc::new(AudioUnlocker::new(player));
        let gate = NotificationGate::new(Arc::clone(&unlocker));

        Self {
            config,
            transport,
            fetcher,
            store,
            unlocker,
            gate,
            http: reqwest::Client::new(),
            shared: Shared {
                window: tokio::sync::Mutex::new(Window::new()),
                state: tokio::sync::Mutex::new(ConnectionState::new()),
                error: std::sync::Mutex::new(None),
                loading: AtomicBool::new(true),
                sound_enabled: AtomicBool::new(false),
                alive: AtomicBool::new(true),
                shutdown: Notify::new(),
            },
        }
    }

    /// Pre-fill the window from the persisted snapshot.
    ///
    /// A missing, expired or unreadable snapshot is not an error; the
    /// engine just starts empty. Restoring does not clear the loading flag,
    /// only live data does.
    pub async fn restore_saved(&self) {
        match self.store.load().await {
            Ok(Some(listings)) if !listings.is_empty() => {
                let mut window = self.shared.window.lock().await;
                if window.is_empty() {
                    *window = Window::from_listings(listings);
                    info!(count = window.len(), "restored listings from snapshot");
                }
            }
            Ok(_) => {}
            Err(e) => debug!(error = %e, "snapshot load failed, starting empty"),
        }
    }

    /// Drive the feed until shutdown.
    ///
    /// Opens the stream, consumes frames, degrades to polling when the
    /// stream dies, and polls until [`FeedEngine::shutdown`] is called.
    /// Returns when the connection state reaches `Closed`.
    pub async fn run(&self) {
        info!(url = %self.config.feed.stream_url, "opening feed stream");

        let state = ConnectionState::new();
        let event = match self.transport.open(&self.config.feed.stream_url).await {
            Ok(()) => Event::StreamOpened,
            Err(e) => Event::StreamFailed {
                error: e.to_string(),
            },
        };
        let (mut state, mut pending) = self.dispatch(state, event).await;

        if state.is_open() {
            let (s, p) = self.stream_loop(state).await;
            state = s;
            pending = p;
        }

        while state.is_degraded() && self.alive() {
            if let Some(delay) = pending.take() {
                if !delay.is_zero() {
                    tokio::select! {
                        _ = self.shared.shutdown.notified() => {
                            let (s, _) = self.dispatch(state, Event::CloseRequested).await;
                            state = s;
                            break;
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
            if !self.alive() {
                break;
            }

            match self.fetcher.fetch().await {
                Ok(batch) => {
                    self.apply_batch(&batch).await;
                    // The fallback is delivering; the user sees data, not an error
                    self.set_error(None);
                    let (s, p) = self.dispatch(state, Event::PollSucceeded).await;
                    state = s;
                    pending = p;
                }
                Err(e) => {
                    let (s, p) = self
                        .dispatch(
                            state,
                            Event::PollFailed {
                                error: e.to_string(),
                            },
                        )
                        .await;
                    state = s;
                    pending = p;
                }
            }
        }

        if !state.is_closed() {
            self.dispatch(state, Event::CloseRequested).await;
        }
        info!("feed engine stopped");
    }

    /// Stop the engine. Idempotent; `run()` returns shortly after.
    pub fn shutdown(&self) {
        self.shared.alive.store(false, Ordering::SeqCst);
        self.shared.shutdown.notify_one();
    }

    /// Fetch the notification sound and unlock the audio pipeline.
    ///
    /// Must be called from a user-originated interaction. On success the
    /// sound is enabled for all later merges.
    pub async fn enable_sound(&self) -> Result<(), EngineError> {
        let bytes = self
            .http
            .get(&self.config.feed.sound_url)
            .send()
            .await
            .map_err(|e| EngineError::SoundFetch(e.to_string()))?
            .error_for_status()
            .map_err(|e| EngineError::SoundFetch(e.to_string()))?
            .bytes()
            .await
            .map_err(|e| EngineError::SoundFetch(e.to_string()))?;

        self.enable_sound_with(&bytes)
    }

    /// Unlock the audio pipeline with sound bytes the caller already has.
    pub fn enable_sound_with(&self, sound: &[u8]) -> Result<(), EngineError> {
        self.unlocker.unlock(sound)?;
        self.shared.sound_enabled.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Whether the notification sound is currently enabled.
    pub fn sound_enabled(&self) -> bool {
        self.shared.sound_enabled.load(Ordering::SeqCst)
    }

    /// Point-in-time view of the engine for rendering.
    pub async fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            listings: self.shared.window.lock().await.listings().to_vec(),
            loading: self.shared.loading.load(Ordering::SeqCst),
            error: self.error(),
            sound_enabled: self.sound_enabled(),
        }
    }

    /// Current transport lifecycle state.
    pub async fn connection_state(&self) -> ConnectionState {
        self.shared.state.lock().await.clone()
    }

    fn alive(&self) -> bool {
        self.shared.alive.load(Ordering::SeqCst)
    }

    fn error(&self) -> Option<String> {
        self.shared.error.lock().unwrap().clone()
    }

    fn set_error(&self, error: Option<&str>) {
        *self.shared.error.lock().unwrap() = error.map(str::to_string);
    }

    /// Consume stream frames until the stream dies or shutdown is requested.
    async fn stream_loop(
        &self,
        mut state: ConnectionState,
    ) -> (ConnectionState, Option<Duration>) {
        let mut pending = None;

        while state.is_open() {
            tokio::select! {
                _ = self.shared.shutdown.notified() => {
                    return self.dispatch(state, Event::CloseRequested).await;
                }
                frame = self.transport.next_frame() => match frame {
                    Ok(text) => match FeedMessage::from_json(&text) {
                        Ok(FeedMessage::Update { data }) => self.apply_batch(&data).await,
                        Ok(FeedMessage::Other) => debug!("ignoring non-update frame"),
                        // One bad frame does not take the stream down
                        Err(e) => warn!(error = %e, "dropping malformed frame"),
                    },
                    Err(TransportError::ConnectionClosed) => {
                        let (s, p) = self
                            .dispatch(state, Event::StreamClosed {
                                reason: "connection closed".to_string(),
                            })
                            .await;
                        state = s;
                        pending = p;
                    }
                    Err(e) => {
                        let (s, p) = self
                            .dispatch(state, Event::StreamFailed {
                                error: e.to_string(),
                            })
                            .await;
                        state = s;
                        pending = p;
                    }
                }
            }
        }

        (state, pending)
    }

    /// Feed an event through the state machine and execute its actions.
    ///
    /// Returns the new state and the delay before the next poll, if one was
    /// scheduled.
    async fn dispatch(
        &self,
        state: ConnectionState,
        event: Event,
    ) -> (ConnectionState, Option<Duration>) {
        let (next, actions) = state.on_event(event);
        *self.shared.state.lock().await = next.clone();

        let mut delay = None;
        for action in actions {
            match action {
                Action::SchedulePoll { delay: d } => delay = Some(self.resolve_delay(d)),
                Action::CancelPoll => delay = None,
                Action::CloseStream => {
                    self.transport.close().await.ok();
                }
                Action::EmitEvent(event) => self.handle_engine_event(event),
            }
        }

        (next, delay)
    }

    fn handle_engine_event(&self, event: EngineEvent) {
        match event {
            EngineEvent::StreamLive => {
                info!("feed stream live");
                self.set_error(None);
            }
            EngineEvent::TransportDown { error } => {
                warn!(error = %error, "stream lost, degrading to polling");
                self.set_error(Some(ERR_RETRYING));
            }
            EngineEvent::PollFailed { attempt, error } => {
                warn!(attempt, error = %error, "fallback poll failed");
                self.set_error(Some(ERR_FETCH));
            }
            EngineEvent::Closed => info!("feed connection closed"),
        }
    }

    fn resolve_delay(&self, delay: RetryDelay) -> Duration {
        match delay {
            RetryDelay::Immediate => Duration::ZERO,
            RetryDelay::Interval => self.config.poll.interval(),
            RetryDelay::Backoff { failures } => backoff_delay(
                self.config.poll.interval(),
                failures,
                self.config.poll.max_backoff(),
            ),
        }
    }

    /// Merge a batch into the window, persist the prefix and gate the sound.
    async fn apply_batch(&self, batch: &[Listing]) {
        if !self.alive() {
            return;
        }

        let (newly_added, persist) = {
            let mut window = self.shared.window.lock().await;
            let outcome = window.merge(batch);
            *window = outcome.window;
            (outcome.newly_added, window.persist_slice().to_vec())
        };
        self.shared.loading.store(false, Ordering::SeqCst);

        if !newly_added.is_empty() {
            info!(added = newly_added.len(), "window updated");
        }

        // Persistence is best-effort; memory is the source of truth
        if let Err(e) = self.store.save(&persist).await {
            debug!(error = %e, "snapshot save failed, continuing from memory");
        }

        self.gate.evaluate(&newly_added, self.sound_enabled());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::MockPlayer;
    use crate::fetch::MockFetcher;
    use crate::store::MemoryStore;
    use crate::transport::MockTransport;

    type TestEngine = FeedEngine<MockTransport, MockFetcher>;

    struct Harness {
        engine: Arc<TestEngine>,
        transport: MockTransport,
        fetcher: MockFetcher,
        store: MemoryStore,
        player: Arc<MockPlayer>,
    }

    fn harness() -> Harness {
        let transport = MockTransport::new();
        let fetcher = MockFetcher::new();
        let store = MemoryStore::new();
        let player = Arc::new(MockPlayer::new());

        // Keep test polls snappy, but leave a real interval between them so
        // post-success states stay observable to wait_for
        let config = EngineConfig {
            poll: crate::config::PollConfig {
                interval_secs: 1,
                max_backoff_secs: 0,
            },
            ..EngineConfig::default()
        };

        let engine = Arc::new(FeedEngine::new(
            config,
            transport.clone(),
            fetcher.clone(),
            Arc::new(store.clone()),
            Arc::clone(&player) as Arc<dyn AlertPlayer>,
        ));

        Harness {
            engine,
            transport,
            fetcher,
            store,
            player,
        }
    }

    fn update_frame(ids: &[&str]) -> String {
        FeedMessage::Update {
            data: ids.iter().map(|id| Listing::minimal(id)).collect(),
        }
        .to_json()
        .unwrap()
    }

    fn spawn_run(engine: &Arc<TestEngine>) -> tokio::task::JoinHandle<()> {
        let runner = Arc::clone(engine);
        tokio::spawn(async move { runner.run().await })
    }

    /// Poll the engine until the condition holds or two seconds pass.
    async fn wait_for<C>(engine: &TestEngine, condition: C)
    where
        C: Fn(&EngineSnapshot) -> bool,
    {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            if condition(&engine.snapshot().await) {
                return;
            }
            if tokio::time::Instant::now() > deadline {
                panic!("condition not met within deadline");
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    // ===========================================
    // Streaming path
    // ===========================================

    #[tokio::test]
    async fn stream_update_fills_window_and_clears_loading() {
        let h = harness();
        h.transport.queue_frame(update_frame(&["1", "2"]));

        let task = spawn_run(&h.engine);
        wait_for(&h.engine, |s| !s.loading).await;

        let snapshot = h.engine.snapshot().await;
        assert_eq!(snapshot.listings.len(), 2);
        assert_eq!(snapshot.listings[0].id, "1");

        h.engine.shutdown();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn live_stream_clears_the_error_banner() {
        let h = harness();
        h.engine.set_error(Some(ERR_RETRYING));

        let (state, _) = h
            .engine
            .dispatch(ConnectionState::Connecting, Event::StreamOpened)
            .await;

        assert!(state.is_open());
        assert!(h.engine.snapshot().await.error.is_none());
    }

    #[tokio::test]
    async fn malformed_frame_is_dropped_without_killing_the_stream() {
        let h = harness();
        h.transport.queue_frame("{ this is not json");
        h.transport.queue_frame(update_frame(&["7"]));

        let task = spawn_run(&h.engine);
        wait_for(&h.engine, |s| !s.listings.is_empty()).await;

        assert_eq!(h.engine.snapshot().await.listings[0].id, "7");

        h.engine.shutdown();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn non_update_frames_are_ignored() {
        let h = harness();
        h.transport
            .queue_frame(r#"{"type":"heartbeat","data":[]}"#);
        h.transport.queue_frame(update_frame(&["1"]));

        let task = spawn_run(&h.engine);
        wait_for(&h.engine, |s| !s.listings.is_empty()).await;

        assert_eq!(h.engine.snapshot().await.listings.len(), 1);

        h.engine.shutdown();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn repeated_updates_merge_through_the_window() {
        let h = harness();
        h.transport.queue_frame(update_frame(&["1", "2"]));
        h.transport.queue_frame(update_frame(&["2", "3"]));

        let task = spawn_run(&h.engine);
        wait_for(&h.engine, |s| s.listings.len() == 3).await;

        let ids: Vec<String> = h
            .engine
            .snapshot()
            .await
            .listings
            .iter()
            .map(|l| l.id.clone())
            .collect();
        assert_eq!(ids, vec!["3", "1", "2"]);

        h.engine.shutdown();
        task.await.unwrap();
    }

    // ===========================================
    // Degradation to polling
    // ===========================================

    #[tokio::test]
    async fn failed_open_degrades_to_polling() {
        let h = harness();
        h.transport.fail_next_open("refused");
        h.fetcher.queue_batch(vec![Listing::minimal("5")]);

        let task = spawn_run(&h.engine);
        wait_for(&h.engine, |s| !s.loading).await;

        let snapshot = h.engine.snapshot().await;
        assert_eq!(snapshot.listings[0].id, "5");
        // Successful fallback clears the transient error
        assert!(snapshot.error.is_none());
        assert!(h.engine.connection_state().await.is_degraded());

        h.engine.shutdown();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn closed_stream_degrades_and_keeps_window() {
        let h = harness();
        // One frame, then the queue runs dry and reports closed
        h.transport.queue_frame(update_frame(&["1"]));
        h.fetcher.queue_batch(vec![Listing::minimal("2")]);

        let task = spawn_run(&h.engine);
        wait_for(&h.engine, |s| s.listings.len() == 2).await;

        assert!(h.engine.connection_state().await.is_degraded());
        // The stream's listing survived the degradation
        let ids: Vec<String> = h
            .engine
            .snapshot()
            .await
            .listings
            .iter()
            .map(|l| l.id.clone())
            .collect();
        assert_eq!(ids, vec!["2", "1"]);

        h.engine.shutdown();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn poll_failure_sets_fetch_error_until_a_poll_succeeds() {
        let h = harness();
        h.transport.fail_next_open("refused");
        h.fetcher.queue_failure("503");

        let task = spawn_run(&h.engine);
        wait_for(&h.engine, |s| s.error.as_deref() == Some(ERR_FETCH)).await;

        h.fetcher.queue_batch(vec![Listing::minimal("1")]);
        wait_for(&h.engine, |s| s.error.is_none() && !s.loading).await;

        h.engine.shutdown();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn degraded_engine_never_reopens_the_stream() {
        let h = harness();
        h.transport.fail_next_open("refused");
        h.fetcher.queue_batch(vec![Listing::minimal("1")]);
        h.fetcher.queue_batch(vec![Listing::minimal("2")]);

        let task = spawn_run(&h.engine);
        wait_for(&h.engine, |s| s.listings.len() == 2).await;

        // The one failed attempt is the only one ever made
        assert!(!h.transport.is_open());
        assert!(h.engine.connection_state().await.is_degraded());

        h.engine.shutdown();
        task.await.unwrap();
    }

    // ===========================================
    // Persistence
    // ===========================================

    #[tokio::test]
    async fn snapshot_holds_at_most_ten_newest_listings() {
        let h = harness();
        let ids: Vec<String> = (1..=15).map(|i| i.to_string()).collect();
        let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        h.transport.queue_frame(update_frame(&id_refs));

        let task = spawn_run(&h.engine);
        wait_for(&h.engine, |s| s.listings.len() == 15).await;

        let saved = h.store.saved().unwrap();
        assert_eq!(saved.len(), 10);
        assert_eq!(saved[0].id, "1");

        h.engine.shutdown();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn save_failure_does_not_disturb_the_window() {
        let h = harness();
        h.store.fail_next_save();
        h.transport.queue_frame(update_frame(&["1"]));

        let task = spawn_run(&h.engine);
        wait_for(&h.engine, |s| !s.listings.is_empty()).await;

        assert_eq!(h.engine.snapshot().await.listings[0].id, "1");

        h.engine.shutdown();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn restore_saved_seeds_the_window_but_not_loading() {
        let h = harness();
        let seeded = MemoryStore::seeded(vec![
            Listing::minimal("a"),
            Listing::minimal("b"),
            Listing::minimal("c"),
        ]);
        let engine = FeedEngine::new(
            EngineConfig::default(),
            h.transport.clone(),
            h.fetcher.clone(),
            Arc::new(seeded),
            Arc::new(MockPlayer::new()) as Arc<dyn AlertPlayer>,
        );

        engine.restore_saved().await;

        let snapshot = engine.snapshot().await;
        assert_eq!(snapshot.listings.len(), 3);
        // Restored data is stale data; loading holds until live data lands
        assert!(snapshot.loading);
    }

    #[tokio::test]
    async fn restore_from_empty_store_is_a_no_op() {
        let h = harness();
        h.engine.restore_saved().await;
        assert!(h.engine.snapshot().await.listings.is_empty());
    }

    // ===========================================
    // Sound
    // ===========================================

    #[tokio::test]
    async fn no_sound_while_disabled() {
        let h = harness();
        h.transport.queue_frame(update_frame(&["1"]));

        let task = spawn_run(&h.engine);
        wait_for(&h.engine, |s| !s.listings.is_empty()).await;

        assert_eq!(h.player.play_count(), 0);

        h.engine.shutdown();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn sound_plays_for_new_listings_once_enabled() {
        let h = harness();
        h.engine.enable_sound_with(b"wav bytes").unwrap();
        assert!(h.engine.sound_enabled());
        let priming = h.player.play_count();

        h.transport.queue_frame(update_frame(&["1"]));

        let task = spawn_run(&h.engine);
        wait_for(&h.engine, |s| !s.listings.is_empty()).await;

        assert_eq!(h.player.play_count(), priming + 1);

        h.engine.shutdown();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_batch_stays_silent() {
        let h = harness();
        h.engine.enable_sound_with(b"wav bytes").unwrap();

        h.transport.queue_frame(update_frame(&["1", "2"]));
        h.transport.queue_frame(update_frame(&["1", "2"]));

        let task = spawn_run(&h.engine);
        wait_for(&h.engine, |s| s.listings.len() == 2).await;
        // Let the duplicate frame get consumed too
        tokio::time::sleep(Duration::from_millis(50)).await;

        // One priming play plus one for the first batch, none for the echo
        assert_eq!(h.player.play_count(), 2);

        h.engine.shutdown();
        task.await.unwrap();
    }

    // ===========================================
    // Shutdown
    // ===========================================

    #[tokio::test]
    async fn shutdown_closes_and_run_returns() {
        let h = harness();
        h.transport.fail_next_open("refused");
        h.fetcher.queue_batch(vec![]);

        let task = spawn_run(&h.engine);
        wait_for(&h.engine, |s| !s.loading).await;

        h.engine.shutdown();
        task.await.unwrap();

        assert!(h.engine.connection_state().await.is_closed());
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let h = harness();
        h.engine.shutdown();
        h.engine.shutdown();
        assert!(!h.engine.alive());
    }
}
