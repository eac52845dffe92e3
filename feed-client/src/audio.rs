//! Gesture-gated notification audio.
//!
//! Platform audio policies forbid autonomous audio start, so the decoded
//! notification sound is produced exactly once, inside a user-originated
//! `unlock()`, and reused for every later `play()`. Each play creates a new
//! one-shot source from the shared immutable decoded buffer - sources are
//! single-use, the buffer lives for the session.
//!
//! The concrete backend sits behind [`AlertPlayer`]: [`RodioPlayer`] drives
//! a real output device on a dedicated thread (rodio output streams are not
//! `Send`), [`MockPlayer`] counts calls for tests.

use std::sync::mpsc;
use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc, Mutex,
};
use thiserror::Error;

/// Audio errors.
#[derive(Debug, Error)]
pub enum AudioError {
    /// Decoding the notification sound failed.
    #[error("decode failed: {0}")]
    Decode(String),

    /// Starting playback failed.
    #[error("playback failed: {0}")]
    Playback(String),

    /// play() was called before a successful unlock().
    #[error("audio not unlocked")]
    NotUnlocked,

    /// A previous unlock attempt failed; sound stays disabled.
    #[error("audio unlock previously failed")]
    UnlockFailed,
}

/// Backend trait for the notification sound.
pub trait AlertPlayer: Send + Sync {
    /// Decode the sound bytes into the reusable buffer.
    fn prepare(&self, sound: &[u8]) -> Result<(), AudioError>;

    /// Play one shot from the prepared buffer.
    fn play(&self) -> Result<(), AudioError>;
}

/// Unlock lifecycle of the notification sound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockState {
    /// No unlock attempted yet.
    Locked,
    /// Unlock in progress (decoding / priming).
    Unlocking,
    /// Sound decoded and primed; play() is valid.
    Unlocked,
    /// Unlock failed; terminal, sound stays disabled.
    Failed,
}

/// One-time unlocker for the notification sound.
///
/// State machine: `Locked → Unlocking → Unlocked | Failed`.
pub struct AudioUnlocker {
    player: Arc<dyn AlertPlayer>,
    state: Mutex<UnlockState>,
}

impl AudioUnlocker {
    /// Create a new unlocker in the `Locked` state.
    pub fn new(player: Arc<dyn AlertPlayer>) -> Self {
        Self {
            player,
            state: Mutex::new(UnlockState::Locked),
        }
    }

    /// Current unlock state.
    pub fn state(&self) -> UnlockState {
        *self.state.lock().unwrap()
    }

    /// Decode the sound and perform one priming playback.
    ///
    /// Must be driven by a user-originated interaction. Decodes exactly
    /// once: calling again after a successful unlock is a no-op, calling
    /// after a failed one returns [`AudioError::UnlockFailed`].
    pub fn unlock(&self, sound: &[u8]) -> Result<(), AudioError> {
        {
            let mut state = self.state.lock().unwrap();
            match *state {
                UnlockState::Locked => *state = UnlockState::Unlocking,
                UnlockState::Unlocked | UnlockState::Unlocking => return Ok(()),
                UnlockState::Failed => return Err(AudioError::UnlockFailed),
            }
        }

        let result = self
            .player
            .prepare(sound)
            .and_then(|()| self.player.play());

        let mut state = self.state.lock().unwrap();
        match result {
            Ok(()) => {
                *state = UnlockState::Unlocked;
                Ok(())
            }
            Err(e) => {
                *state = UnlockState::Failed;
                Err(e)
            }
        }
    }

    /// Play one shot of the notification sound.
    ///
    /// Valid only from `Unlocked`.
    pub fn play(&self) -> Result<(), AudioError> {
        if self.state() != UnlockState::Unlocked {
            return Err(AudioError::NotUnlocked);
        }
        self.player.play()
    }
}

// ===========================================
// Rodio backend
// ===========================================

enum AudioCmd {
    Prepare(Vec<u8>, mpsc::Sender<Result<(), AudioError>>),
    Play(mpsc::Sender<Result<(), AudioError>>),
}

/// Decoded sound, shared between plays.
struct DecodedSound {
    channels: u16,
    sample_rate: u32,
    samples: Arc<Vec<f32>>,
}

/// Real audio backend on a dedicated thread.
///
/// rodio's output stream is not `Send`, so a worker thread owns it and the
/// handle talks to it over a channel. Spawning never fails; a missing
/// output device surfaces as a playback error on the first prepare/play.
pub struct RodioPlayer {
    tx: mpsc::Sender<AudioCmd>,
}

impl Default for RodioPlayer {
    fn default() -> Self {
        Self::spawn()
    }
}

impl RodioPlayer {
    /// Spawn the audio worker thread and return a handle to it.
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::channel();
        std::thread::Builder::new()
            .name("adwatch-audio".to_string())
            .spawn(move || audio_thread(rx))
            .expect("failed to spawn audio thread");
        Self { tx }
    }

    fn request(&self, build: impl FnOnce(mpsc::Sender<Result<(), AudioError>>) -> AudioCmd) -> Result<(), AudioError> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(build(reply_tx))
            .map_err(|_| AudioError::Playback("audio thread gone".to_string()))?;
        reply_rx
            .recv()
            .map_err(|_| AudioError::Playback("audio thread gone".to_string()))?
    }
}

impl AlertPlayer for RodioPlayer {
    fn prepare(&self, sound: &[u8]) -> Result<(), AudioError> {
        let bytes = sound.to_vec();
        self.request(|reply| AudioCmd::Prepare(bytes, reply))
    }

    fn play(&self) -> Result<(), AudioError> {
        self.request(AudioCmd::Play)
    }
}

fn audio_thread(rx: mpsc::Receiver<AudioCmd>) {
    // Keep the stream alive for the lifetime of the thread
    let output = rodio::OutputStream::try_default();
    let mut decoded: Option<DecodedSound> = None;

    for cmd in rx {
        match cmd {
            AudioCmd::Prepare(bytes, reply) => {
                let result = decode_sound(&bytes).map(|sound| {
                    decoded = Some(sound);
                });
                reply.send(result).ok();
            }
            AudioCmd::Play(reply) => {
                let result = match (&output, &decoded) {
                    (Ok((_stream, handle)), Some(sound)) => {
                        let source = rodio::buffer::SamplesBuffer::new(
                            sound.channels,
                            sound.sample_rate,
                            sound.samples.as_ref().clone(),
                        );
                        handle
                            .play_raw(source)
                            .map_err(|e| AudioError::Playback(e.to_string()))
                    }
                    (Err(e), _) => Err(AudioError::Playback(format!("no output device: {e}"))),
                    (_, None) => Err(AudioError::NotUnlocked),
                };
                reply.send(result).ok();
            }
        }
    }
}

fn decode_sound(bytes: &[u8]) -> Result<DecodedSound, AudioError> {
    use rodio::Source;

    let decoder = rodio::Decoder::new(std::io::Cursor::new(bytes.to_vec()))
        .map_err(|e| AudioError::Decode(e.to_string()))?;

    let channels = decoder.channels();
    let sample_rate = decoder.sample_rate();
    let samples: Vec<f32> = decoder.convert_samples().collect();

    if samples.is_empty() {
        return Err(AudioError::Decode("empty sound".to_string()));
    }

    Ok(DecodedSound {
        channels,
        sample_rate,
        samples: Arc::new(samples),
    })
}

// ===========================================
// Mock backend
// ===========================================

/// Mock audio backend for testing.
///
/// Counts prepare/play calls and can be forced to fail.
#[derive(Debug, Default)]
pub struct MockPlayer {
    prepare_count: AtomicU32,
    play_count: AtomicU32,
    fail_prepare: Mutex<Option<String>>,
    fail_play: Mutex<Option<String>>,
}

impl MockPlayer {
    /// Create a new mock player.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of prepare() calls so far.
    pub fn prepare_count(&self) -> u32 {
        self.prepare_count.load(Ordering::SeqCst)
    }

    /// Number of play() calls so far.
    pub fn play_count(&self) -> u32 {
        self.play_count.load(Ordering::SeqCst)
    }

    /// Cause every prepare() to fail with the given error.
    pub fn fail_prepare(&self, error: &str) {
        *self.fail_prepare.lock().unwrap() = Some(error.to_string());
    }

    /// Cause every play() to fail with the given error.
    pub fn fail_play(&self, error: &str) {
        *self.fail_play.lock().unwrap() = Some(error.to_string());
    }
}

impl AlertPlayer for MockPlayer {
    fn prepare(&self, _sound: &[u8]) -> Result<(), AudioError> {
        self.prepare_count.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.fail_prepare.lock().unwrap().clone() {
            return Err(AudioError::Decode(error));
        }
        Ok(())
    }

    fn play(&self) -> Result<(), AudioError> {
        self.play_count.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.fail_play.lock().unwrap().clone() {
            return Err(AudioError::Playback(error));
        }
        Ok(())
    }
}
