//! Macro recorder
//!
//! Owns one action list. Actions arrive from event hooks while recording or
//! from the `add_*` authoring calls, and the list is replayed through an
//! internal [`Player`].
//!
//! Hooks take `&self`, so a recorder behind an `Arc` can be fed from the
//! session's button poller thread while the foreground keeps authoring:
//!
//! ```no_run
//! use std::sync::Arc;
//! use makcu_core::macros::MacroRecorder;
//! use makcu_core::session::Session;
//!
//! let session = Session::new();
//! let recorder = Arc::new(MacroRecorder::new());
//! recorder.attach_button_recording(&session);
//! recorder.start_recording().unwrap();
//! ```

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::format;
use super::playback::PlayingGuard;
use super::{Action, ActionKind, Macro, MacroConfig, MacroError, Player};
use crate::protocol::{KeyCode, MouseButton};
use crate::session::Session;

struct RecorderState {
    actions: Vec<Action>,
    config: MacroConfig,
    started: Option<Instant>,
}

impl RecorderState {
    /// Elapsed time since recording started, never earlier than the last
    /// action. Outside a recording this is the last action's timestamp.
    fn next_timestamp(&self) -> Duration {
        let last = self
            .actions
            .last()
            .map(|a| a.timestamp)
            .unwrap_or_default();
        let elapsed = self
            .started
            .map(|started| started.elapsed())
            .unwrap_or_default();
        elapsed.max(last)
    }

    fn push(&mut self, kind: ActionKind) {
        let timestamp = self.next_timestamp();
        self.actions.push(Action::new(timestamp, kind));
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Records, authors, stores and replays one macro
pub struct MacroRecorder {
    state: Mutex<RecorderState>,
    recording: AtomicBool,
    player: Player,
}

impl Default for MacroRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl MacroRecorder {
    /// Empty recorder with default settings
    pub fn new() -> Self {
        Self::with_config(MacroConfig::default())
    }

    /// Empty recorder with `config`
    pub fn with_config(config: MacroConfig) -> Self {
        Self {
            state: Mutex::new(RecorderState {
                actions: Vec::new(),
                config,
                started: None,
            }),
            recording: AtomicBool::new(false),
            player: Player::new(),
        }
    }

    // ------------------------------------------------------------------
    // Recording
    // ------------------------------------------------------------------

    /// Discard the current actions and start capturing events
    pub fn start_recording(&self) -> Result<(), MacroError> {
        // Both flags are decided under the state lock; see `claim_playback`
        let mut state = lock(&self.state);
        if self.player.is_playing() {
            return Err(MacroError::AlreadyPlaying);
        }
        if self.recording.load(Ordering::Acquire) {
            return Err(MacroError::AlreadyRecording);
        }
        state.actions.clear();
        state.started = Some(Instant::now());
        self.recording.store(true, Ordering::Release);
        tracing::info!("Macro recording started");
        Ok(())
    }

    /// Stop capturing. Recorded actions are kept as-is.
    pub fn stop_recording(&self) -> Result<(), MacroError> {
        let state = lock(&self.state);
        if !self.recording.swap(false, Ordering::AcqRel) {
            return Err(MacroError::NotRecording);
        }
        tracing::info!("Macro recording stopped: {} actions", state.actions.len());
        Ok(())
    }

    /// Whether events are being captured
    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Acquire)
    }

    /// Append an event if recording. The flag is read under the state lock
    /// so nothing lands after `stop_recording` returns.
    fn record(&self, kind: ActionKind) {
        if !self.is_recording() {
            return;
        }
        let mut state = lock(&self.state);
        if self.is_recording() {
            tracing::trace!("recorded {:?}", kind);
            state.push(kind);
        }
    }

    /// Key event hook
    pub fn on_keyboard(&self, key: KeyCode, pressed: bool) {
        self.record(if pressed {
            ActionKind::KeyDown(key)
        } else {
            ActionKind::KeyUp(key)
        });
    }

    /// Mouse button event hook
    pub fn on_mouse_button(&self, button: MouseButton, pressed: bool) {
        self.record(if pressed {
            ActionKind::MouseDown(button)
        } else {
            ActionKind::MouseUp(button)
        });
    }

    /// Ignored unless mouse movement recording is enabled
    pub fn on_mouse_move(&self, dx: i32, dy: i32) {
        if self.config().record_mouse_movement {
            self.record(ActionKind::MouseMove { dx, dy });
        }
    }

    /// Wheel event hook
    pub fn on_mouse_wheel(&self, delta: i32) {
        self.record(ActionKind::MouseWheel(delta));
    }

    /// Route the session's button events into this recorder.
    ///
    /// The poller reports all five buttons on every change; only buttons
    /// whose state differs from the last report are recorded. Replaces any
    /// handler already registered on the session.
    pub fn attach_button_recording(self: &Arc<Self>, session: &Session) {
        let recorder = Arc::downgrade(self);
        let seen = Mutex::new(session.mouse_button_states());

        session.set_button_handler(move |button, pressed| {
            {
                let mut seen = lock(&seen);
                if seen.get(button) == pressed {
                    return;
                }
                seen.set(button, pressed);
            }
            if let Some(recorder) = recorder.upgrade() {
                recorder.on_mouse_button(button, pressed);
            }
        });
    }

    // ------------------------------------------------------------------
    // Authoring
    // ------------------------------------------------------------------

    fn author(&self, kind: ActionKind) -> Result<(), MacroError> {
        let mut state = lock(&self.state);
        if self.player.is_playing() {
            return Err(MacroError::AlreadyPlaying);
        }
        state.push(kind);
        Ok(())
    }

    /// Append a key press
    pub fn add_key_press(&self, key: KeyCode, duration_ms: u32) -> Result<(), MacroError> {
        self.author(ActionKind::KeyPress { key, duration_ms })
    }

    /// Append a chord
    pub fn add_multi_key_press(&self, keys: &[KeyCode], duration_ms: u32) -> Result<(), MacroError> {
        self.author(ActionKind::MultiKeyPress {
            keys: keys.to_vec(),
            duration_ms,
        })
    }

    /// Append typed text
    pub fn add_type_string(&self, text: &str) -> Result<(), MacroError> {
        self.author(ActionKind::TypeString(text.to_string()))
    }

    /// Append a click
    pub fn add_mouse_click(&self, button: MouseButton, count: u32) -> Result<(), MacroError> {
        self.author(ActionKind::MouseClick { button, count })
    }

    /// Relative move, or an absolute move when `absolute` is set
    pub fn add_mouse_move(&self, x: i32, y: i32, absolute: bool) -> Result<(), MacroError> {
        self.author(if absolute {
            ActionKind::MouseMoveTo { x, y }
        } else {
            ActionKind::MouseMove { dx: x, dy: y }
        })
    }

    /// Append a scroll
    pub fn add_mouse_wheel(&self, delta: i32) -> Result<(), MacroError> {
        self.author(ActionKind::MouseWheel(delta))
    }

    /// Explicit pause, slept by the player when reached
    pub fn add_delay(&self, milliseconds: u32) -> Result<(), MacroError> {
        self.author(ActionKind::Delay(milliseconds))
    }

    // ------------------------------------------------------------------
    // Playback
    // ------------------------------------------------------------------

    /// Claim the player and snapshot the actions.
    ///
    /// The recording check and the claim happen under the state lock, as
    /// does `start_recording`'s playing check, so a recording and a
    /// playback can never both be live.
    fn claim_playback(&self) -> Result<(PlayingGuard, Vec<Action>, MacroConfig), MacroError> {
        let state = lock(&self.state);
        if self.is_recording() {
            return Err(MacroError::Recording);
        }
        let guard = self.player.begin(&state.actions)?;
        Ok((guard, state.actions.clone(), state.config))
    }

    /// Replay `repeat` times, blocking until done or stopped
    pub fn playback(&self, session: &Session, repeat: u32) -> Result<(), MacroError> {
        let (guard, actions, config) = self.claim_playback()?;
        self.player.run(guard, session, &actions, config, repeat);
        Ok(())
    }

    /// Replay on a worker thread
    pub fn playback_async(&self, session: Arc<Session>, repeat: u32) -> Result<(), MacroError> {
        let (guard, actions, config) = self.claim_playback()?;
        self.player.spawn(guard, session, actions, config, repeat)
    }

    /// Stop playback; returns after the worker has exited
    pub fn stop_playback(&self) {
        self.player.stop();
    }

    /// Whether a playback is running
    pub fn is_playing(&self) -> bool {
        self.player.is_playing()
    }

    // ------------------------------------------------------------------
    // Management
    // ------------------------------------------------------------------

    fn ensure_idle(&self) -> Result<(), MacroError> {
        if self.is_recording() {
            Err(MacroError::Recording)
        } else if self.is_playing() {
            Err(MacroError::AlreadyPlaying)
        } else {
            Ok(())
        }
    }

    /// Remove all actions
    pub fn clear(&self) -> Result<(), MacroError> {
        let mut state = lock(&self.state);
        self.ensure_idle()?;
        state.actions.clear();
        state.started = None;
        Ok(())
    }

    /// Number of actions held
    pub fn action_count(&self) -> usize {
        lock(&self.state).actions.len()
    }

    /// Copy of the action list
    pub fn actions(&self) -> Vec<Action> {
        lock(&self.state).actions.clone()
    }

    /// See [`Macro::total_duration`]
    pub fn total_duration(&self) -> Duration {
        super::total_duration(&lock(&self.state).actions)
    }

    /// Snapshot of actions and settings
    pub fn to_macro(&self) -> Macro {
        let state = lock(&self.state);
        Macro::new(state.actions.clone(), state.config)
    }

    /// Replace the action list with a parsed macro's actions
    pub fn load_macro(&self, m: Macro) -> Result<(), MacroError> {
        let mut state = lock(&self.state);
        self.ensure_idle()?;
        state.actions = m.actions;
        state.started = None;
        Ok(())
    }

    /// Write the actions as a macro file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), MacroError> {
        let path = path.as_ref();
        let actions = self.actions();
        format::write_macro_file(path, &actions)?;
        tracing::info!("Saved {} macro actions to {}", actions.len(), path.display());
        Ok(())
    }

    /// Load a macro file. On any error the current actions are untouched.
    pub fn load_from_file<P: AsRef<Path>>(&self, path: P) -> Result<(), MacroError> {
        let path = path.as_ref();
        self.ensure_idle()?;
        let actions = format::read_macro_file(path).map_err(|e| {
            tracing::warn!("Failed to load macro {}: {}", path.display(), e);
            e
        })?;
        tracing::info!("Loaded {} macro actions from {}", actions.len(), path.display());
        self.load_macro(Macro::new(actions, self.config()))
    }

    // ------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------

    /// Current settings
    pub fn config(&self) -> MacroConfig {
        lock(&self.state).config
    }

    /// Capture pointer motion while recording
    pub fn set_record_mouse_movement(&self, enabled: bool) {
        lock(&self.state).config.record_mouse_movement = enabled;
    }

    /// Shortest gap slept during replay
    pub fn set_minimum_delay(&self, milliseconds: u32) {
        lock(&self.state).config.minimum_delay_ms = milliseconds;
    }

    /// Whether playback follows recorded timestamps
    pub fn set_timestamp_mode(&self, use_timestamps: bool) {
        lock(&self.state).config.use_timestamps = use_timestamps;
    }
}
