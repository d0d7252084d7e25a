//! Inbound line dispatcher
//!
//! The reader thread hands every received line to [`Shared::dispatch`].
//! Lines are classified in priority order and routed to exactly one
//! consumer:
//! - `rdy` / `err-…` resolve the pending call
//! - `trap:<m>` clears the servo flag and is returned for the subscribers
//! - tagged data goes to the first matcher registered for its tag, or to
//!   the inbox
//!
//! Everything lives behind one mutex; the condvar is notified on every
//! change so waiters re-check their own condition.

use std::collections::VecDeque;
use std::io::{ErrorKind, Read};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace, warn};

use ticklink_protocol::{classify, DeviceError, Event, LineAssembler, Response, MOTOR_CHANNELS};

use crate::error::HostError;

/// Result of the in-flight command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Ready,
    Failed(DeviceError),
}

#[derive(Debug)]
pub(crate) enum MatchKind {
    /// Takes the first matching line
    OneShot(Option<String>),
    /// Takes every matching line
    Collect(Vec<String>),
}

/// Transient consumer of lines with one tag
#[derive(Debug)]
pub(crate) struct Matcher {
    pub id: u64,
    pub tag: &'static str,
    pub kind: MatchKind,
}

impl Matcher {
    /// Offer a line; true if consumed
    fn offer(&mut self, tag: &str, line: &str) -> bool {
        if tag != self.tag {
            return false;
        }
        match &mut self.kind {
            MatchKind::OneShot(slot @ None) => {
                *slot = Some(line.to_string());
                true
            }
            MatchKind::OneShot(Some(_)) => false,
            MatchKind::Collect(lines) => {
                lines.push(line.to_string());
                true
            }
        }
    }

    /// Lines taken by this matcher
    pub fn into_lines(self) -> Vec<String> {
        match self.kind {
            MatchKind::OneShot(line) => line.into_iter().collect(),
            MatchKind::Collect(lines) => lines,
        }
    }
}

/// Per-channel servo bookkeeping
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ServoTracker {
    /// Trap armed and not yet reported complete
    pub moving: [bool; MOTOR_CHANNELS],
    /// Channel has a tick input; only these can complete a trap
    pub mapped: [bool; MOTOR_CHANNELS],
}

impl ServoTracker {
    /// Requested channels that are still moving
    pub fn busy(&self, channels: &[u8]) -> Vec<u8> {
        channels
            .iter()
            .copied()
            .filter(|&m| {
                let m = m as usize;
                m < MOTOR_CHANNELS && self.mapped[m] && self.moving[m]
            })
            .collect()
    }

    pub fn clear(&mut self, motor: u8) {
        if let Some(flag) = self.moving.get_mut(motor as usize) {
            *flag = false;
        }
    }

    /// Forget every armed trap and mapping
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Unclaimed lines kept when the session sets no limit
pub(crate) const DEFAULT_INBOX_LIMIT: usize = 256;

/// State shared between the reader thread and callers
#[derive(Debug)]
pub(crate) struct State {
    /// `Some` while a command is in flight; filled when it resolves
    pub pending: Option<Option<Outcome>>,
    pub matchers: Vec<Matcher>,
    next_matcher: u64,
    /// Data lines nobody matched, oldest first
    pub inbox: VecDeque<String>,
    inbox_limit: usize,
    /// Failure to raise at the next synchronization point
    pub latched: Option<HostError>,
    pub servo: ServoTracker,
    pub disconnected: bool,
}

impl Default for State {
    fn default() -> Self {
        Self {
            pending: None,
            matchers: Vec::new(),
            next_matcher: 0,
            inbox: VecDeque::new(),
            inbox_limit: DEFAULT_INBOX_LIMIT,
            latched: None,
            servo: ServoTracker::default(),
            disconnected: false,
        }
    }
}

impl State {
    pub fn add_matcher(&mut self, tag: &'static str, kind: MatchKind) -> u64 {
        self.next_matcher += 1;
        let id = self.next_matcher;
        self.matchers.push(Matcher { id, tag, kind });
        id
    }

    pub fn take_matcher(&mut self, id: u64) -> Option<Matcher> {
        let idx = self.matchers.iter().position(|m| m.id == id)?;
        Some(self.matchers.remove(idx))
    }

    /// Queue an unclaimed line, dropping the oldest once full
    fn queue(&mut self, line: &str) {
        if self.inbox.len() >= self.inbox_limit {
            if let Some(dropped) = self.inbox.pop_front() {
                warn!("inbox full, dropped `{}`", dropped);
            }
        }
        if self.inbox_limit > 0 {
            self.inbox.push_back(line.to_string());
        }
    }

    /// Keep the first failure; later ones are logged only
    fn latch(&mut self, err: HostError) {
        warn!("latched: {}", err);
        if self.latched.is_none() {
            self.latched = Some(err);
        }
    }
}

type Subscriber = Box<dyn Fn(Event) + Send + Sync>;

/// Dispatcher state and its wake-up signal
#[derive(Default)]
pub(crate) struct Shared {
    pub state: Mutex<State>,
    pub changed: Condvar,
    subscribers: Mutex<Vec<Subscriber>>,
}

impl Shared {
    /// Dispatcher keeping at most `inbox_limit` unclaimed lines
    pub fn new(inbox_limit: usize) -> Self {
        let shared = Self::default();
        shared.state.lock().inbox_limit = inbox_limit;
        shared
    }

    pub fn subscribe(&self, subscriber: Subscriber) {
        self.subscribers.lock().push(subscriber);
    }

    /// Route one received line
    pub fn dispatch(&self, line: &str) {
        debug!("<< {}", line);
        let event = {
            let mut state = self.state.lock();
            let event = route(&mut state, line);
            self.changed.notify_all();
            event
        };

        if let Some(event) = event {
            for subscriber in self.subscribers.lock().iter() {
                subscriber(event);
            }
        }
    }

    /// Record a failure seen outside any line
    pub fn fault(&self, err: HostError) {
        let mut state = self.state.lock();
        state.latch(err);
        self.changed.notify_all();
    }

    pub fn disconnect(&self) {
        let mut state = self.state.lock();
        state.disconnected = true;
        self.changed.notify_all();
    }
}

fn route(state: &mut State, line: &str) -> Option<Event> {
    let response = match classify(line) {
        Ok(response) => response,
        Err(e) => {
            state.latch(HostError::protocol(line, e));
            return None;
        }
    };

    match response {
        Response::Prompt => {
            if state.pending == Some(None) {
                state.pending = Some(Some(Outcome::Ready));
            } else {
                warn!("prompt with no command pending");
            }
        }
        Response::Error(e) => {
            if state.pending == Some(None) {
                state.pending = Some(Some(Outcome::Failed(e)));
            } else {
                state.latch(HostError::Device(e));
            }
        }
        Response::Event(event) => {
            state.servo.clear(event.motor());
            return Some(event);
        }
        Response::Data(data) => {
            let consumed = state
                .matchers
                .iter_mut()
                .any(|m| m.offer(data.tag, line));
            if !consumed {
                trace!("inbox: {}", line);
                state.queue(line);
            }
        }
    }
    None
}

/// Reader thread body: assemble lines until the link closes
pub(crate) fn read_lines(mut reader: impl Read, shared: Arc<Shared>) {
    let mut assembler = LineAssembler::new();
    let mut buf = [0u8; 64];

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if is_idle(e.kind()) => {
                if Arc::strong_count(&shared) == 1 {
                    break;
                }
                continue;
            }
            Err(e) => {
                shared.fault(HostError::Transport(e));
                break;
            }
        };

        let mut bytes = &buf[..n];
        while !bytes.is_empty() {
            let (used, received) = assembler.feed_bytes(bytes);
            bytes = &bytes[used..];
            match received {
                Some(Ok(line)) => shared.dispatch(&line),
                Some(Err(e)) => shared.fault(HostError::protocol("", format!("{:?}", e))),
                None => {}
            }
        }
    }

    debug!("reader stopped");
    shared.disconnect();
}

fn is_idle(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
    )
}
