//! Shared test fixtures: a scripted in-memory channel and session helpers
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use makcu_core::config::SessionConfig;
use makcu_core::protocol::{Channel, ProtocolError};
use makcu_core::session::Session;

pub const MOCK_PORT: &str = "MOCK0";

/// Everything the mock records or is scripted with
#[derive(Default)]
pub struct MockState {
    pub open: bool,
    pub port: Option<String>,
    pub baud_rate: u32,
    /// Every successful open as (port, baud)
    pub opens: Vec<(String, u32)>,
    pub closes: usize,
    /// Every successful write with the time it happened
    pub writes: Vec<(Instant, Vec<u8>)>,
    /// Bytes the device "sent"
    pub rx: VecDeque<u8>,
    /// Writes starting with this prefix fail
    pub fail_write_prefix: Option<Vec<u8>>,
    /// Opening at this rate fails
    pub fail_open_at_rate: Option<u32>,
    /// Reply bytes queued when the exact line is written
    pub replies: HashMap<String, Vec<u8>>,
}

/// Handle the test keeps after the channel moves into a session
#[derive(Clone, Default)]
pub struct MockHandle(Arc<Mutex<MockState>>);

impl MockHandle {
    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.0.lock().unwrap()
    }

    pub fn push_rx(&self, bytes: &[u8]) {
        self.state().rx.extend(bytes.iter().copied());
    }

    pub fn reply_to(&self, line: &str, reply: &[u8]) {
        self.state().replies.insert(line.to_string(), reply.to_vec());
    }

    pub fn fail_writes_starting_with(&self, prefix: &[u8]) {
        self.state().fail_write_prefix = Some(prefix.to_vec());
    }

    pub fn fail_open_at_rate(&self, baud_rate: u32) {
        self.state().fail_open_at_rate = Some(baud_rate);
    }

    pub fn opens(&self) -> Vec<(String, u32)> {
        self.state().opens.clone()
    }

    pub fn is_open(&self) -> bool {
        self.state().open
    }

    pub fn write_count(&self) -> usize {
        self.state().writes.len()
    }

    /// All writes as lossy text, in order
    pub fn written_lines(&self) -> Vec<String> {
        self.state()
            .writes
            .iter()
            .map(|(_, bytes)| String::from_utf8_lossy(bytes).into_owned())
            .collect()
    }

    /// Writes that start with `prefix`, with their timestamps
    pub fn writes_starting_with(&self, prefix: &str) -> Vec<(Instant, String)> {
        self.state()
            .writes
            .iter()
            .filter(|(_, bytes)| bytes.starts_with(prefix.as_bytes()))
            .map(|(at, bytes)| (*at, String::from_utf8_lossy(bytes).into_owned()))
            .collect()
    }

    /// Forget writes so far (e.g. the handshake)
    pub fn clear_writes(&self) {
        self.state().writes.clear();
    }
}

pub struct MockChannel {
    handle: MockHandle,
}

impl MockChannel {
    pub fn new() -> (Self, MockHandle) {
        let handle = MockHandle::default();
        (
            Self {
                handle: handle.clone(),
            },
            handle,
        )
    }
}

impl Channel for MockChannel {
    fn open(&mut self, port: &str, baud_rate: u32) -> Result<(), ProtocolError> {
        let mut state = self.handle.state();
        if state.fail_open_at_rate == Some(baud_rate) {
            return Err(ProtocolError::SerialError(format!(
                "scripted open failure at {}",
                baud_rate
            )));
        }
        state.open = true;
        state.port = Some(port.to_string());
        state.baud_rate = baud_rate;
        state.opens.push((port.to_string(), baud_rate));
        Ok(())
    }

    fn close(&mut self) {
        let mut state = self.handle.state();
        if state.open {
            state.open = false;
            state.closes += 1;
        }
    }

    fn is_open(&self) -> bool {
        self.handle.state().open
    }

    fn port_name(&self) -> Option<&str> {
        None
    }

    fn baud_rate(&self) -> u32 {
        self.handle.state().baud_rate
    }

    fn write(&mut self, data: &[u8]) -> Result<(), ProtocolError> {
        let mut state = self.handle.state();
        if !state.open {
            return Err(ProtocolError::ChannelClosed);
        }
        if let Some(prefix) = &state.fail_write_prefix {
            if data.starts_with(prefix) {
                return Err(ProtocolError::SerialError("scripted write failure".into()));
            }
        }
        state.writes.push((Instant::now(), data.to_vec()));

        let line = String::from_utf8_lossy(data).into_owned();
        if let Some(reply) = state.replies.get(&line).cloned() {
            state.rx.extend(reply);
        }
        Ok(())
    }

    fn read(&mut self, max_bytes: usize) -> Vec<u8> {
        let mut state = self.handle.state();
        if !state.open {
            return Vec::new();
        }
        let n = max_bytes.min(state.rx.len());
        state.rx.drain(..n).collect()
    }

    fn flush(&mut self) -> Result<(), ProtocolError> {
        if self.handle.state().open {
            Ok(())
        } else {
            Err(ProtocolError::ChannelClosed)
        }
    }

    fn available(&mut self) -> usize {
        let state = self.handle.state();
        if state.open {
            state.rx.len()
        } else {
            0
        }
    }

    fn set_timeout(&mut self, _timeout: Duration) {}

    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<(), ProtocolError> {
        self.handle.state().baud_rate = baud_rate;
        Ok(())
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Session over a mock channel that discovers [`MOCK_PORT`]
pub fn mock_session() -> (Session, MockHandle) {
    mock_session_with(SessionConfig::fast())
}

/// [`mock_session`] with custom timing
pub fn mock_session_with(config: SessionConfig) -> (Session, MockHandle) {
    init_tracing();
    let (channel, handle) = MockChannel::new();
    let session = Session::with_channel(Box::new(channel), || vec![MOCK_PORT.to_string()], config);
    (session, handle)
}

/// Connected mock session with the handshake writes cleared
pub fn connected_session() -> (Session, MockHandle) {
    let (session, handle) = mock_session();
    session.connect(None).expect("mock connect");
    handle.clear_writes();
    (session, handle)
}

/// Poll `condition` until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}
