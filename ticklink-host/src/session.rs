//! Request/reply session with one device
//!
//! One command is in flight at a time. [`Session::call`] writes the
//! command and blocks until the device answers `rdy` or `err-…`; a second
//! caller waits for its turn. Commands with a tagged result register a
//! transient matcher before the command is written so the result line is
//! taken out of the inbound stream for that caller alone.

use std::io::{Read, Write};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use ticklink_protocol::response::{
    split_tag, BANNER, PROTOCOL_VERSION, TAG_COUNTS, TAG_HELLO, TAG_MOTOR, TAG_POLARITY,
    TAG_PONG, TAG_SET, TAG_TIME, TAG_VERSION,
};
use ticklink_protocol::{
    Command, Counts, DriveAction, Event, MotorReport, MotorSetup, OutputEcho, OutputSymbol,
    PolarityReport, ResponseError, AUX_OUTPUTS,
};

use crate::config::SessionConfig;
use crate::dispatcher::{read_lines, MatchKind, Outcome, Shared, State};
use crate::error::{HostError, Result};
use crate::link;

/// How a command's tagged result is collected
#[derive(Debug, Clone, Copy)]
pub(crate) enum Expect {
    /// First line with this tag
    One(&'static str),
    /// Every line with this tag until the call resolves
    All(&'static str),
}

/// Session with one device
pub struct Session {
    pub(crate) shared: Arc<Shared>,
    /// Held for a whole exchange; serializes callers
    writer: Mutex<Box<dyn Write + Send>>,
    pub(crate) config: SessionConfig,
    _reader: JoinHandle<()>,
}

impl Session {
    /// Start a session over a byte link
    ///
    /// Spawns the reader thread; call [`connect`](Self::connect) before
    /// issuing other commands.
    pub fn new<R, W>(reader: R, writer: W, config: SessionConfig) -> Result<Self>
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        let shared = Arc::new(Shared::new(config.inbox_limit));
        let reader_shared = shared.clone();
        let handle = thread::Builder::new()
            .name("ticklink-reader".into())
            .spawn(move || read_lines(reader, reader_shared))?;

        Ok(Self {
            shared,
            writer: Mutex::new(Box::new(writer)),
            config,
            _reader: handle,
        })
    }

    /// Open the configured serial port and connect
    pub fn open(config: SessionConfig) -> Result<Self> {
        let (reader, writer) = link::open_serial(&config)?;
        let session = Self::new(reader, writer, config)?;
        session.connect()?;
        Ok(session)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Reset the device and check its banner
    ///
    /// Queued inbound lines and stale failures are discarded first. Returns
    /// the protocol version the device announced.
    pub fn connect(&self) -> Result<u16> {
        {
            let mut state = self.shared.state.lock();
            state.inbox.clear();
            state.latched = None;
            state.servo.reset();
        }

        let replies = match self.exchange(
            &Command::Reset,
            &[Expect::One(TAG_HELLO), Expect::One(TAG_VERSION)],
        ) {
            Ok(replies) => replies,
            Err(HostError::Device(e)) => return Err(HostError::InitFailed(e.to_string())),
            Err(e) => return Err(e),
        };

        let [hello, version] = replies.as_slice() else {
            return Err(HostError::InitFailed("reply count".into()));
        };
        let banner = hello.first().map(|l| payload(l)).unwrap_or_default();
        if banner != BANNER {
            return Err(HostError::InitFailed(format!("banner `{}`", banner)));
        }
        let version = version
            .first()
            .and_then(|l| u16::from_str_radix(payload(l), 16).ok())
            .ok_or_else(|| HostError::InitFailed("no version".into()))?;
        if version != PROTOCOL_VERSION {
            warn!(version, "device speaks another protocol version");
        }

        info!(version, "device connected");
        Ok(version)
    }

    /// Send one command and wait for `rdy`
    pub fn call(&self, command: &Command<'_>) -> Result<()> {
        self.exchange(command, &[]).map(|_| ())
    }

    /// Send one command and return the payload of its tagged result
    pub fn query(&self, command: &Command<'_>, tag: &'static str) -> Result<String> {
        let mut replies = self.exchange(command, &[Expect::One(tag)])?;
        let line = replies
            .pop()
            .and_then(|mut lines| lines.pop())
            .ok_or_else(|| {
                HostError::protocol(&command.to_string(), format!("no `{}` reply", tag))
            })?;
        Ok(payload(&line).to_string())
    }

    /// Register a handler for device events
    ///
    /// Handlers run on the reader thread after the session state has been
    /// updated; they must not issue commands.
    pub fn subscribe(&self, handler: impl Fn(Event) + Send + Sync + 'static) {
        self.shared.subscribe(Box::new(handler));
    }

    /// Next data line no caller claimed, waiting up to `timeout`
    pub fn next_line(&self, timeout: Duration) -> Result<Option<String>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        loop {
            if let Some(line) = state.inbox.pop_front() {
                return Ok(Some(line));
            }
            if state.disconnected {
                return Err(HostError::Disconnected);
            }
            if self.shared.changed.wait_until(&mut state, deadline).timed_out() {
                return Ok(state.inbox.pop_front());
            }
        }
    }

    /// Run one command exchange
    ///
    /// Returns the lines taken by each expectation, in order.
    pub(crate) fn exchange(
        &self,
        command: &Command<'_>,
        expect: &[Expect],
    ) -> Result<Vec<Vec<String>>> {
        match self.transact(command, expect)? {
            (Outcome::Ready, replies) => Ok(replies),
            (Outcome::Failed(e), _) => Err(HostError::Device(e)),
        }
    }

    /// Run one command exchange, keeping the lines taken before a device
    /// error
    pub(crate) fn transact(
        &self,
        command: &Command<'_>,
        expect: &[Expect],
    ) -> Result<(Outcome, Vec<Vec<String>>)> {
        let mut writer = self.writer.lock();
        let line = command.to_string();

        let ids = {
            let mut state = self.shared.state.lock();
            if let Some(err) = state.latched.take() {
                return Err(err);
            }
            if state.disconnected {
                return Err(HostError::Disconnected);
            }
            let ids: Vec<u64> = expect
                .iter()
                .map(|e| match *e {
                    Expect::One(tag) => state.add_matcher(tag, MatchKind::OneShot(None)),
                    Expect::All(tag) => state.add_matcher(tag, MatchKind::Collect(Vec::new())),
                })
                .collect();
            state.pending = Some(None);
            ids
        };

        debug!(">> {}", line);
        if let Err(e) = writeln!(writer, "{}", line).and_then(|_| writer.flush()) {
            self.abandon(&ids);
            return Err(e.into());
        }

        let timeout = self.config.call_timeout();
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        let outcome = loop {
            if let Some(Some(outcome)) = state.pending {
                break outcome;
            }
            if state.disconnected {
                release(&mut state, &ids);
                return Err(HostError::Disconnected);
            }
            if self.shared.changed.wait_until(&mut state, deadline).timed_out() {
                release(&mut state, &ids);
                warn!("`{}` timed out", line);
                return Err(HostError::Timeout(timeout));
            }
        };

        let replies = release(&mut state, &ids);
        if outcome == Outcome::Ready {
            committed(&mut state, command);
        }
        drop(state);
        drop(writer);
        Ok((outcome, replies))
    }

    fn abandon(&self, ids: &[u64]) {
        let mut state = self.shared.state.lock();
        release(&mut state, ids);
    }

    /// Enter free-run mode
    pub fn free(&self) -> Result<()> {
        self.call(&Command::Free)
    }

    /// Leave free-run mode, stopping every motor
    pub fn init(&self) -> Result<()> {
        self.call(&Command::Init)
    }

    /// Round-trip check; returns the echoed message
    pub fn ping(&self, message: Option<&str>) -> Result<Option<String>> {
        let mut replies = self.exchange(&Command::Ping(message), &[Expect::One(TAG_PONG)])?;
        let line = replies.pop().and_then(|mut lines| lines.pop());
        Ok(line.and_then(|l| split_tag(&l).1.map(String::from)))
    }

    /// Device uptime in milliseconds
    pub fn time(&self) -> Result<u32> {
        let text = self.query(&Command::Time, TAG_TIME)?;
        u32::from_str_radix(&text, 16).map_err(|e| HostError::protocol(&text, e))
    }

    /// Configure motor channels; an empty list restores the defaults
    pub fn configure(&self, setups: &[MotorSetup]) -> Result<()> {
        self.call(&Command::Motors(setups))
    }

    /// Drive, or stop, one motor open-loop
    pub fn drive(&self, motor: u8, action: DriveAction, percent: Option<u8>) -> Result<()> {
        self.call(&Command::Drive {
            motor,
            action,
            percent,
        })
    }

    /// Live state of one motor
    pub fn motor_status(&self, motor: u8) -> Result<MotorReport> {
        let text = self.query(&Command::MotorStatus(motor), TAG_MOTOR)?;
        parse_reply(&text, MotorReport::parse)
    }

    /// Read and reset tick counters
    pub fn query_counts(&self, input: Option<u8>) -> Result<Counts> {
        let text = self.query(&Command::QueryCounts(input), TAG_COUNTS)?;
        parse_reply(&text, Counts::parse)
    }

    /// Update the aux outputs; returns the resulting state
    pub fn set_outputs(&self, symbols: [OutputSymbol; AUX_OUTPUTS]) -> Result<OutputEcho> {
        let text = self.query(&Command::Set(symbols), TAG_SET)?;
        parse_reply(&text, OutputEcho::parse)
    }

    /// Ticks counted at full duty in each direction
    pub fn check_polarity(&self, channel: u8) -> Result<PolarityReport> {
        let text = self.query(&Command::CheckPolarity(channel), TAG_POLARITY)?;
        parse_reply(&text, PolarityReport::parse)
    }
}

/// Track device-side effects of a successful command
fn committed(state: &mut State, command: &Command<'_>) {
    match command {
        Command::Reset | Command::Init => state.servo.reset(),
        Command::Motors([]) => state.servo.mapped = Default::default(),
        Command::Motors(setups) => {
            for setup in setups.iter() {
                if let Some(mapped) = state.servo.mapped.get_mut(setup.channel as usize) {
                    *mapped = setup.input.is_some();
                }
            }
        }
        _ => {}
    }
}

/// Drop the pending call and its matchers, returning what they took
fn release(state: &mut State, ids: &[u64]) -> Vec<Vec<String>> {
    state.pending = None;
    ids.iter()
        .map(|&id| {
            state
                .take_matcher(id)
                .map(|m| m.into_lines())
                .unwrap_or_default()
        })
        .collect()
}

/// Text after the tag
fn payload(line: &str) -> &str {
    split_tag(line).1.unwrap_or("")
}

fn parse_reply<T>(
    text: &str,
    parse: fn(&str) -> std::result::Result<T, ResponseError>,
) -> Result<T> {
    parse(text).map_err(|e| HostError::protocol(text, e))
}
