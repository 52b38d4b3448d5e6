//! Macro replay
//!
//! Synchronous and worker-thread playback with recorded pacing. Stopping is
//! cooperative: the stop flag is checked before every action and
//! [`Player::stop`] joins the worker, so nothing executes after it returns.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::{Action, MacroConfig, MacroError};
use crate::session::Session;

/// Runs one playback at a time
#[derive(Default)]
pub struct Player {
    playing: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

/// A claim on the player. Clears the playing flag when dropped, so playback
/// ending by any path (including a panic) frees the player.
pub(crate) struct PlayingGuard(Arc<AtomicBool>);

impl Drop for PlayingGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Player {
    /// Idle player
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a playback holds the player
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    /// Claim the player for `actions`
    pub(crate) fn begin(&self, actions: &[Action]) -> Result<PlayingGuard, MacroError> {
        if actions.is_empty() {
            return Err(MacroError::Empty);
        }
        self.playing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| MacroError::AlreadyPlaying)?;
        self.stop.store(false, Ordering::Release);
        Ok(PlayingGuard(Arc::clone(&self.playing)))
    }

    /// Replay `actions` `repeat` times on the calling thread
    pub fn play(
        &self,
        session: &Session,
        actions: &[Action],
        config: MacroConfig,
        repeat: u32,
    ) -> Result<(), MacroError> {
        let guard = self.begin(actions)?;
        self.run(guard, session, actions, config, repeat);
        Ok(())
    }

    pub(crate) fn run(
        &self,
        _guard: PlayingGuard,
        session: &Session,
        actions: &[Action],
        config: MacroConfig,
        repeat: u32,
    ) {
        run_playback(session, actions, config, repeat, &self.stop);
    }

    /// Replay on a worker thread. Returns once the worker is started.
    pub fn play_async(
        &self,
        session: Arc<Session>,
        actions: Vec<Action>,
        config: MacroConfig,
        repeat: u32,
    ) -> Result<(), MacroError> {
        let guard = self.begin(&actions)?;
        self.spawn(guard, session, actions, config, repeat)
    }

    /// Start the worker for an already claimed playback
    pub(crate) fn spawn(
        &self,
        guard: PlayingGuard,
        session: Arc<Session>,
        actions: Vec<Action>,
        config: MacroConfig,
        repeat: u32,
    ) -> Result<(), MacroError> {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);

        // reap the previous run, which has already finished
        if let Some(previous) = worker.take() {
            let _ = previous.join();
        }

        let stop = Arc::clone(&self.stop);
        let handle = thread::Builder::new()
            .name("makcu-playback".into())
            .spawn(move || {
                let _guard = guard;
                let result = panic::catch_unwind(AssertUnwindSafe(|| {
                    run_playback(&session, &actions, config, repeat, &stop)
                }));
                if result.is_err() {
                    tracing::error!("Macro playback worker panicked");
                }
            })?;

        *worker = Some(handle);
        Ok(())
    }

    /// Request a stop and wait for any worker to exit
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::error!("Macro playback worker could not be joined");
            }
        }
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Pacing loop. Each repetition starts its clock at zero; a gap between
/// consecutive timestamps is slept only when it reaches the minimum delay.
pub(crate) fn run_playback(
    session: &Session,
    actions: &[Action],
    config: MacroConfig,
    repeat: u32,
    stop: &AtomicBool,
) {
    let minimum_delay = config.minimum_delay();
    tracing::info!(
        "Playing macro: {} actions x {} repetitions",
        actions.len(),
        repeat
    );

    for repetition in 0..repeat {
        let mut previous = Duration::ZERO;

        for action in actions {
            if stop.load(Ordering::Acquire) {
                tracing::info!("Macro playback stopped during repetition {}", repetition + 1);
                return;
            }

            if config.use_timestamps && action.timestamp > previous {
                let gap = action.timestamp - previous;
                if gap >= minimum_delay {
                    thread::sleep(gap);
                }
            }

            if let Err(e) = action.execute(session) {
                tracing::warn!("Macro action {:?} failed: {}", action.kind, e);
            }
            previous = action.timestamp;
        }
    }

    tracing::info!("Macro playback finished");
}
