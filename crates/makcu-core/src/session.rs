//! Device session
//!
//! A [`Session`] owns one [`Channel`] and the connection lifecycle of one
//! device: the rate-switch handshake, the background button poller and the
//! command surface used by callers and by macro playback.
//!
//! ## Connect sequence
//!
//! 1. open the port at 115200 baud
//! 2. send the 9-byte rate-switch frame and flush
//! 3. close, settle, reopen at 4 Mbaud (the firmware has already re-clocked
//!    its UART and ignores traffic at the old rate)
//! 4. settle, then enable button reporting with `km.buttons(1)`
//! 5. mark connected and start the poller
//!
//! Any failure closes the channel and leaves the status at
//! [`ConnectionStatus::ConnectionError`].

use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::config::SessionConfig;
use crate::protocol::commands::{decode_response, parse_key_state};
use crate::protocol::{
    ButtonMask, Channel, Command, KeyCode, MouseButton, MouseButtonStates, PortDiscovery,
    ProtocolError, SerialChannel, SerialPortDiscovery, BAUD_CHANGE_COMMAND, MAKCU_DESCRIPTION,
    MAKCU_PID, MAKCU_VID,
};

/// Connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionStatus {
    /// Not connected
    Disconnected,
    /// Handshake in progress
    Connecting,
    /// Connected and polling
    Connected,
    /// Last connect attempt failed
    ConnectionError,
}

/// Snapshot of the connected device
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Port name
    pub port: String,
    /// Human-readable device name
    pub description: String,
    /// USB vendor id of the bridge chip
    pub vid: u16,
    /// USB product id of the bridge chip
    pub pid: u16,
    /// Whether the session is connected to this port
    pub is_connected: bool,
}

impl DeviceInfo {
    fn for_port(port: &str) -> Self {
        Self {
            port: port.to_string(),
            description: MAKCU_DESCRIPTION.to_string(),
            vid: MAKCU_VID,
            pid: MAKCU_PID,
            is_connected: false,
        }
    }
}

/// Receives `(button, pressed)` for every button whenever the status byte
/// changes.
///
/// Runs on the poller thread with no session lock held. Keep it short: the
/// next sample is not taken until it returns.
pub type ButtonHandler = Arc<dyn Fn(MouseButton, bool) + Send + Sync>;

/// Everything guarded by the session lock
struct SessionState {
    channel: Box<dyn Channel>,
    status: ConnectionStatus,
    device_info: DeviceInfo,
}

/// Connection to one MAKCU device
pub struct Session {
    state: Arc<Mutex<SessionState>>,
    config: SessionConfig,
    discovery: Box<dyn PortDiscovery>,
    /// Serializes connect/disconnect
    lifecycle: Mutex<()>,
    monitor: Mutex<Option<Monitor>>,
    button_handler: Arc<Mutex<Option<ButtonHandler>>>,
    last_mask: Arc<AtomicU8>,
}

/// A running poller thread. Each start gets a fresh stop flag so a poller
/// that outlives its session generation never sees it set again.
struct Monitor {
    handle: JoinHandle<()>,
    running: Arc<AtomicBool>,
}

thread_local! {
    /// Address of the session state this thread polls, 0 off poller threads
    static POLLING: Cell<usize> = const { Cell::new(0) };
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Session {
    /// Session over a real serial port, discovering the device by USB id
    pub fn new() -> Self {
        Self::with_config(SessionConfig::default())
    }

    /// Serial session with custom timing
    pub fn with_config(config: SessionConfig) -> Self {
        Self::with_channel(Box::new(SerialChannel::new()), SerialPortDiscovery, config)
    }

    /// Session over any channel and discovery source
    pub fn with_channel(
        channel: Box<dyn Channel>,
        discovery: impl PortDiscovery + 'static,
        config: SessionConfig,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState {
                channel,
                status: ConnectionStatus::Disconnected,
                device_info: DeviceInfo::default(),
            })),
            config,
            discovery: Box::new(discovery),
            lifecycle: Mutex::new(()),
            monitor: Mutex::new(None),
            button_handler: Arc::new(Mutex::new(None)),
            last_mask: Arc::new(AtomicU8::new(0)),
        }
    }

    /// Get the session configuration
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Devices the discovery source currently reports
    pub fn find_devices(&self) -> Vec<DeviceInfo> {
        self.discovery
            .candidate_ports()
            .iter()
            .map(|port| DeviceInfo::for_port(port))
            .collect()
    }

    /// First discovered device port, if any
    pub fn find_first_device(&self) -> Option<String> {
        self.discovery.candidate_ports().into_iter().next()
    }

    // ------------------------------------------------------------------
    // Connection lifecycle
    // ------------------------------------------------------------------

    /// Connect to the device.
    ///
    /// `port` overrides discovery. Calling this while connected returns `Ok`
    /// without touching the channel. The session lock is only taken around
    /// channel operations, so [`Session::status`] reports
    /// [`ConnectionStatus::Connecting`] while the handshake settles.
    pub fn connect(&self, port: Option<&str>) -> Result<(), ProtocolError> {
        let _lifecycle = lock(&self.lifecycle);

        {
            let state = lock(&self.state);
            if state.status == ConnectionStatus::Connected {
                tracing::debug!("connect: already connected to {}", state.device_info.port);
                return Ok(());
            }
        }

        let port = match port.filter(|p| !p.is_empty()) {
            Some(p) => p.to_string(),
            None => match self.find_first_device() {
                Some(p) => p,
                None => {
                    tracing::warn!("connect: no MAKCU device found");
                    lock(&self.state).status = ConnectionStatus::ConnectionError;
                    return Err(ProtocolError::NoDeviceFound);
                }
            },
        };

        tracing::info!("Connecting to {}", port);
        lock(&self.state).status = ConnectionStatus::Connecting;

        let handshake = self.handshake(&port);

        // The poller blocks on the state lock until the status is settled
        let mut state = lock(&self.state);
        match handshake.and_then(|()| self.start_monitoring()) {
            Ok(()) => {
                state.device_info = DeviceInfo {
                    is_connected: true,
                    ..DeviceInfo::for_port(&port)
                };
                state.status = ConnectionStatus::Connected;
                tracing::info!(
                    "Connected to {} at {} baud",
                    port,
                    self.config.high_speed_baud_rate
                );
                Ok(())
            }
            Err(e) => {
                tracing::warn!("connect: {} failed: {}", port, e);
                state.channel.close();
                state.status = ConnectionStatus::ConnectionError;
                state.device_info.is_connected = false;
                Err(e)
            }
        }
    }

    /// Run `f` on the channel under the session lock
    fn on_channel<R>(&self, f: impl FnOnce(&mut dyn Channel) -> R) -> R {
        let mut state = lock(&self.state);
        f(state.channel.as_mut())
    }

    /// Open, switch rate and initialize. Leaves the channel open on success.
    ///
    /// Only called with `lifecycle` held; no command or poller touches the
    /// channel until the status becomes `Connected`.
    fn handshake(&self, port: &str) -> Result<(), ProtocolError> {
        let timeout = self.config.timeout();
        let baud_rate = self.config.initial_baud_rate;
        tracing::debug!("handshake: opening {} at {} baud", port, baud_rate);
        self.on_channel(|channel| {
            channel.set_timeout(timeout);
            channel.open(port, baud_rate)
        })?;

        self.switch_to_high_speed(port)?;
        self.initialize()
    }

    fn switch_to_high_speed(&self, port: &str) -> Result<(), ProtocolError> {
        tracing::debug!("handshake: sending rate-switch frame {:02x?}", BAUD_CHANGE_COMMAND);
        self.on_channel(|channel| {
            let sent = channel
                .write(&BAUD_CHANGE_COMMAND)
                .and_then(|()| channel.flush());
            channel.close();
            sent
        })
        .map_err(|e| ProtocolError::HandshakeFailed(e.to_string()))?;

        thread::sleep(self.config.rate_switch_settle());

        let baud_rate = self.config.high_speed_baud_rate;
        tracing::debug!("handshake: reopening {} at {} baud", port, baud_rate);
        self.on_channel(|channel| channel.open(port, baud_rate))
            .map_err(|e| ProtocolError::RateSwitchFailed {
                baud_rate,
                reason: e.to_string(),
            })
    }

    fn initialize(&self) -> Result<(), ProtocolError> {
        thread::sleep(self.config.init_settle());

        let line = Command::ButtonReporting(true).encode();
        tracing::debug!("handshake: initializing with {:?}", line);
        self.on_channel(|channel| channel.write(line.as_bytes()).and_then(|()| channel.flush()))
            .map_err(|e| ProtocolError::InitializationFailed(e.to_string()))?;

        thread::sleep(self.config.init_post_delay());
        Ok(())
    }

    /// Disconnect from the device.
    ///
    /// Safe in any state, including from inside the button handler. Called
    /// from any other thread, the poller has been joined when this returns,
    /// so no button handler call can follow it. Called from the handler, the
    /// poller exits as soon as the handler returns.
    pub fn disconnect(&self) {
        let _lifecycle = if self.on_poller_thread() {
            match self.lock_lifecycle_from_monitor() {
                Some(guard) => guard,
                // another thread is already tearing the session down
                None => return,
            }
        } else {
            lock(&self.lifecycle)
        };
        self.stop_monitoring();

        let mut state = lock(&self.state);
        state.channel.close();
        if state.status == ConnectionStatus::Connected {
            tracing::info!("Disconnected from {}", state.device_info.port);
        }
        state.status = ConnectionStatus::Disconnected;
        state.device_info.is_connected = false;
    }

    /// Get current connection status
    pub fn status(&self) -> ConnectionStatus {
        lock(&self.state).status
    }

    /// Whether the status is [`ConnectionStatus::Connected`]
    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    /// Copy of the device info
    pub fn device_info(&self) -> DeviceInfo {
        lock(&self.state).device_info.clone()
    }

    // ------------------------------------------------------------------
    // Button monitoring
    // ------------------------------------------------------------------

    /// Register the handler that receives button edge events
    pub fn set_button_handler<F>(&self, handler: F)
    where
        F: Fn(MouseButton, bool) + Send + Sync + 'static,
    {
        *lock(&self.button_handler) = Some(Arc::new(handler));
    }

    /// Remove the button handler; the poller keeps tracking state
    pub fn clear_button_handler(&self) {
        *lock(&self.button_handler) = None;
    }

    /// Button states from the last status byte the poller saw
    pub fn mouse_button_states(&self) -> MouseButtonStates {
        MouseButtonStates::from(ButtonMask(self.last_mask.load(Ordering::Acquire)))
    }

    /// Whether the poller thread is alive
    pub fn is_monitoring(&self) -> bool {
        lock(&self.monitor)
            .as_ref()
            .is_some_and(|monitor| monitor.running.load(Ordering::Acquire))
    }

    fn start_monitoring(&self) -> Result<(), ProtocolError> {
        let mut monitor = lock(&self.monitor);
        if monitor.is_some() {
            return Ok(());
        }

        self.last_mask.store(0, Ordering::Release);
        let running = Arc::new(AtomicBool::new(true));

        let poller = ButtonPoller {
            state: Arc::clone(&self.state),
            running: Arc::clone(&running),
            handler: Arc::clone(&self.button_handler),
            last_mask: Arc::clone(&self.last_mask),
            interval: self.config.poll_interval(),
        };

        let handle = thread::Builder::new()
            .name("makcu-buttons".into())
            .spawn(move || poller.run())
            .map_err(ProtocolError::IoError)?;
        *monitor = Some(Monitor { handle, running });
        Ok(())
    }

    fn stop_monitoring(&self) {
        let Some(monitor) = lock(&self.monitor).take() else {
            return;
        };
        monitor.running.store(false, Ordering::Release);

        if monitor.handle.thread().id() == thread::current().id() {
            // Joining ourselves would deadlock; the loop sees the cleared
            // flag once the handler returns.
            tracing::debug!("Button monitor stopping from its own handler");
            return;
        }
        if monitor.handle.join().is_err() {
            tracing::error!("Button monitor thread panicked");
        }
        tracing::debug!("Button monitor stopped");
    }

    fn state_id(&self) -> usize {
        Arc::as_ptr(&self.state) as usize
    }

    /// Whether the caller is one of this session's poller threads
    fn on_poller_thread(&self) -> bool {
        POLLING.with(|polling| polling.get() == self.state_id())
    }

    /// Whether the calling poller is the live one, not one being stopped
    fn owns_monitor(&self) -> bool {
        lock(&self.monitor)
            .as_ref()
            .is_some_and(|monitor| monitor.handle.thread().id() == thread::current().id())
    }

    /// Take `lifecycle` from a poller thread.
    ///
    /// A plain lock could deadlock against a `disconnect` on another thread
    /// that holds `lifecycle` while joining this one. Returns `None` once
    /// such a teardown has claimed the poller.
    fn lock_lifecycle_from_monitor(&self) -> Option<MutexGuard<'_, ()>> {
        loop {
            if !self.owns_monitor() {
                return None;
            }
            match self.lifecycle.try_lock() {
                Ok(guard) => return Some(guard),
                Err(TryLockError::Poisoned(poisoned)) => return Some(poisoned.into_inner()),
                Err(TryLockError::WouldBlock) => thread::sleep(Duration::from_millis(1)),
            }
        }
    }

    // ------------------------------------------------------------------
    // Command channel
    // ------------------------------------------------------------------

    /// Send a fire-and-forget command.
    ///
    /// Success means the bytes were written, not that the device acted on
    /// them.
    pub fn send_command(&self, command: &Command) -> Result<(), ProtocolError> {
        let mut state = lock(&self.state);
        Self::ensure_connected(&state)?;
        command.validate().map_err(ProtocolError::InvalidArgument)?;
        Self::write_line(&mut state, &command.encode())
    }

    /// Send a query and return the decoded reply.
    ///
    /// The session lock is held across the write, the response wait and
    /// the read so the poller cannot consume reply bytes.
    pub fn query(&self, command: &Command) -> Result<String, ProtocolError> {
        let mut state = lock(&self.state);
        Self::ensure_connected(&state)?;
        let line = command.encode();
        Self::write_line(&mut state, &line)?;

        thread::sleep(self.config.response_wait());
        let raw = state.channel.read(self.config.response_max_bytes);
        tracing::trace!("<- {:?}", String::from_utf8_lossy(&raw));
        Ok(decode_response(&raw, Some(&line)))
    }

    /// Write a raw command string as-is
    pub fn send_raw_command(&self, command: &str) -> Result<(), ProtocolError> {
        let mut state = lock(&self.state);
        Self::ensure_connected(&state)?;
        Self::write_line(&mut state, command)
    }

    /// Wait the response interval and return whatever is buffered
    pub fn receive_raw_response(&self) -> Result<String, ProtocolError> {
        let mut state = lock(&self.state);
        Self::ensure_connected(&state)?;
        thread::sleep(self.config.response_wait());
        Ok(state.channel.read_string(self.config.response_max_bytes))
    }

    fn ensure_connected(state: &SessionState) -> Result<(), ProtocolError> {
        if state.status == ConnectionStatus::Connected {
            Ok(())
        } else {
            Err(ProtocolError::NotConnected)
        }
    }

    fn write_line(state: &mut SessionState, line: &str) -> Result<(), ProtocolError> {
        tracing::trace!("-> {:?}", line);
        state
            .channel
            .write(line.as_bytes())
            .map_err(|e| ProtocolError::WriteFailed {
                command: line.trim_end().to_string(),
                reason: e.to_string(),
            })
    }

    /// Change the rate of the open channel
    pub fn set_baud_rate(&self, baud_rate: u32) -> Result<(), ProtocolError> {
        let mut state = lock(&self.state);
        Self::ensure_connected(&state)?;
        state.channel.set_baud_rate(baud_rate)
    }

    // Keyboard

    /// Hold `key` until [`Session::key_up`]
    pub fn key_down(&self, key: KeyCode) -> Result<(), ProtocolError> {
        self.send_command(&Command::KeyDown(key))
    }

    /// Release `key`
    pub fn key_up(&self, key: KeyCode) -> Result<(), ProtocolError> {
        self.send_command(&Command::KeyUp(key))
    }

    /// Press and release; `duration_ms` 0 uses the firmware default
    pub fn key_press(&self, key: KeyCode, duration_ms: u32) -> Result<(), ProtocolError> {
        self.send_command(&Command::KeyPress { key, duration_ms })
    }

    /// Hold several keys at once
    pub fn multi_key_down(&self, keys: &[KeyCode]) -> Result<(), ProtocolError> {
        self.send_command(&Command::MultiKeyDown(keys.to_vec()))
    }

    /// Release several keys at once
    pub fn multi_key_up(&self, keys: &[KeyCode]) -> Result<(), ProtocolError> {
        self.send_command(&Command::MultiKeyUp(keys.to_vec()))
    }

    /// Press a chord. `keys` must not be empty.
    pub fn multi_key_press(&self, keys: &[KeyCode], duration_ms: u32) -> Result<(), ProtocolError> {
        self.send_command(&Command::MultiKeyPress {
            keys: keys.to_vec(),
            duration_ms,
        })
    }

    /// Type `text` on the device. Empty text and double quotes are rejected.
    pub fn type_string(&self, text: &str) -> Result<(), ProtocolError> {
        self.send_command(&Command::TypeString(text.to_string()))
    }

    /// Ask the device whether `key` is held
    pub fn is_key_down(&self, key: KeyCode) -> Result<bool, ProtocolError> {
        self.query(&Command::IsKeyDown(key))
            .map(|reply| parse_key_state(&reply))
    }

    // Mouse

    /// Hold `button`
    pub fn mouse_down(&self, button: MouseButton) -> Result<(), ProtocolError> {
        self.send_command(&Command::MouseDown(button))
    }

    /// Release `button`
    pub fn mouse_up(&self, button: MouseButton) -> Result<(), ProtocolError> {
        self.send_command(&Command::MouseUp(button))
    }

    /// Click `count` times
    pub fn mouse_click(&self, button: MouseButton, count: u32) -> Result<(), ProtocolError> {
        self.send_command(&Command::MouseClick { button, count })
    }

    /// Relative move
    pub fn mouse_move(&self, dx: i32, dy: i32) -> Result<(), ProtocolError> {
        self.send_command(&Command::MouseMove { dx, dy })
    }

    /// Absolute move (requires screen bounds set on the device)
    pub fn mouse_move_to(&self, x: i32, y: i32) -> Result<(), ProtocolError> {
        self.send_command(&Command::MouseMoveTo { x, y })
    }

    /// Scroll; negative is down
    pub fn mouse_wheel(&self, delta: i32) -> Result<(), ProtocolError> {
        self.send_command(&Command::MouseWheel(delta))
    }

    /// Reset the device's absolute position origin
    pub fn mouse_calibrate(&self) -> Result<(), ProtocolError> {
        self.send_command(&Command::Calibrate)
    }

    /// Screen size used by absolute moves
    pub fn mouse_set_screen_bounds(&self, width: i32, height: i32) -> Result<(), ProtocolError> {
        self.send_command(&Command::SetScreenBounds { width, height })
    }

    // Device

    /// Turn the device's button status stream on or off
    pub fn enable_button_monitoring(&self, enable: bool) -> Result<(), ProtocolError> {
        self.send_command(&Command::ButtonReporting(enable))
    }

    /// Re-run the firmware's init routine
    pub fn reset(&self) -> Result<(), ProtocolError> {
        self.send_command(&Command::Reset)
    }

    /// Device-side delay
    pub fn delay(&self, milliseconds: u32) -> Result<(), ProtocolError> {
        self.send_command(&Command::Delay(milliseconds))
    }

    /// Firmware version string
    pub fn version(&self) -> Result<String, ProtocolError> {
        self.query(&Command::Version)
    }

    /// Device serial number (MAC)
    pub fn serial_number(&self) -> Result<String, ProtocolError> {
        self.query(&Command::SerialNumber)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// State moved onto the poller thread
struct ButtonPoller {
    state: Arc<Mutex<SessionState>>,
    running: Arc<AtomicBool>,
    handler: Arc<Mutex<Option<ButtonHandler>>>,
    last_mask: Arc<AtomicU8>,
    interval: Duration,
}

impl ButtonPoller {
    fn run(self) {
        POLLING.with(|polling| polling.set(Arc::as_ptr(&self.state) as usize));
        tracing::debug!("Button monitor started");
        let mut last = ButtonMask::default();

        while self.running.load(Ordering::Acquire) {
            if let Some(current) = self.sample() {
                if let Some(edges) = ButtonMask::edges(last, current) {
                    last = current;
                    self.last_mask.store(current.0, Ordering::Release);
                    self.dispatch(edges);
                }
            }
            thread::sleep(self.interval);
        }

        tracing::debug!("Button monitor exiting");
    }

    /// Take one status byte, holding the session lock only for the read
    fn sample(&self) -> Option<ButtonMask> {
        let mut state = lock(&self.state);
        if state.channel.available() > 0 {
            state.channel.read_byte().map(ButtonMask)
        } else {
            None
        }
    }

    fn dispatch(&self, edges: [(MouseButton, bool); 5]) {
        let Some(handler) = lock(&self.handler).clone() else {
            return;
        };

        for (button, pressed) in edges {
            // the handler may have disconnected the session
            if !self.running.load(Ordering::Acquire) {
                break;
            }
            let result = panic::catch_unwind(AssertUnwindSafe(|| handler(button, pressed)));
            if result.is_err() {
                tracing::error!("Button handler panicked on {} (pressed={})", button, pressed);
            }
        }
    }
}
