//! Response lines sent from the device to the host
//!
//! Every line is classified by prefix, in priority order:
//!
//! | line | class |
//! |------|-------|
//! | `rdy` | [`Response::Prompt`] |
//! | `err-<code>[-<n>]` | [`Response::Error`] |
//! | `trap:<m>` | [`Response::Event`] |
//! | `<tag>[:<fields>]` | [`Response::Data`] |
//!
//! Typed payloads ([`MotorReport`], [`Counts`], [`CalibrationLine`],
//! [`PolarityReport`]) format the full line including their tag and parse
//! the text following the tag.

use core::fmt;

use heapless::Vec;

use crate::calibration::CALIBRATION_LADDER;
use crate::command::{Direction, OutputSymbol, AUX_OUTPUTS, INPUT_CHANNELS, MOTOR_CHANNELS};
use crate::events::Event;
use crate::fields::{parse_hex, Fields, FIELD_SEP};

/// Ready prompt
pub const PROMPT: &str = "rdy";
/// Prefix of error lines
pub const ERROR_PREFIX: &str = "err-";

pub const TAG_HELLO: &str = "hello";
pub const TAG_VERSION: &str = "ver";
pub const TAG_PONG: &str = "pong";
pub const TAG_TIME: &str = "tck";
pub const TAG_CAL: &str = "cal";
pub const TAG_MOTOR: &str = "mot";
pub const TAG_SET: &str = "set";
pub const TAG_COUNTS: &str = "cnt";
pub const TAG_POLARITY: &str = "pol";

/// Banner payload sent after `reset`
pub const BANNER: &str = "ticklink";

/// Protocol version reported in `ver:<n>`
pub const PROTOCOL_VERSION: u16 = 0x0100;

/// Errors for lines that do not follow the response grammar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResponseError {
    /// Unknown error code in an `err-` line
    UnknownErrorCode,
    /// Event tag with malformed fields
    MalformedEvent,
    /// Typed payload does not match its grammar
    MalformedPayload,
}

impl fmt::Display for ResponseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResponseError::UnknownErrorCode => "unknown error code",
            ResponseError::MalformedEvent => "malformed event",
            ResponseError::MalformedPayload => "malformed payload",
        })
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ResponseError {}

/// Device error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ErrorCode {
    /// Malformed command; detail is the parse offset
    Syntax,
    /// Command illegal in the current mode
    Mode,
    /// Referenced channel unconfigured or lacking a counter
    Mapping,
    /// Line too long or field out of range
    Overflow,
    /// UART framing or parity fault
    Framing,
    /// Calibration or setup probe failed; detail is the direction
    Calibration,
}

impl ErrorCode {
    /// Wire spelling
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Syntax => "syn",
            ErrorCode::Mode => "mode",
            ErrorCode::Mapping => "map",
            ErrorCode::Overflow => "ovf",
            ErrorCode::Framing => "frm",
            ErrorCode::Calibration => "cal",
        }
    }

    /// Parse the wire spelling
    pub fn from_name(name: &str) -> Option<Self> {
        [
            ErrorCode::Syntax,
            ErrorCode::Mode,
            ErrorCode::Mapping,
            ErrorCode::Overflow,
            ErrorCode::Framing,
            ErrorCode::Calibration,
        ]
        .into_iter()
        .find(|c| c.as_str() == name)
    }
}

/// An `err-<code>[-<n>]` line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceError {
    pub code: ErrorCode,
    pub detail: Option<u16>,
}

impl DeviceError {
    pub const fn new(code: ErrorCode) -> Self {
        Self { code, detail: None }
    }

    pub const fn with_detail(code: ErrorCode, detail: u16) -> Self {
        Self {
            code,
            detail: Some(detail),
        }
    }

    fn parse(body: &str) -> Result<Self, ResponseError> {
        let (name, detail) = match body.split_once('-') {
            Some((name, n)) => {
                let n = parse_hex(n, 4).map_err(|_| ResponseError::UnknownErrorCode)?;
                (name, Some(n as u16))
            }
            None => (body, None),
        };
        let code = ErrorCode::from_name(name).ok_or(ResponseError::UnknownErrorCode)?;
        Ok(Self { code, detail })
    }
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", ERROR_PREFIX, self.code.as_str())?;
        if let Some(n) = self.detail {
            write!(f, "-{:x}", n)?;
        }
        Ok(())
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DeviceError {}

/// A tagged data line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Data<'a> {
    /// Text before the first `:` (the whole line if there is none)
    pub tag: &'a str,
    /// Text after the first `:`
    pub fields: Option<&'a str>,
}

/// A classified response line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response<'a> {
    Prompt,
    Error(DeviceError),
    Event(Event),
    Data(Data<'a>),
}

/// Split a line into its tag and the text after the first `:`
pub fn split_tag(line: &str) -> (&str, Option<&str>) {
    match line.split_once(FIELD_SEP) {
        Some((tag, rest)) => (tag, Some(rest)),
        None => (line, None),
    }
}

/// Classify one received line
pub fn classify(line: &str) -> Result<Response<'_>, ResponseError> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line == PROMPT {
        return Ok(Response::Prompt);
    }
    if let Some(body) = line.strip_prefix(ERROR_PREFIX) {
        return DeviceError::parse(body).map(Response::Error);
    }
    let (tag, fields) = split_tag(line);
    if Event::is_event_tag(tag) {
        return Event::parse(tag, fields)
            .map(Response::Event)
            .ok_or(ResponseError::MalformedEvent);
    }
    Ok(Response::Data(Data { tag, fields }))
}

fn hex_field(fields: &mut Fields<'_>, max_digits: usize) -> Result<u32, ResponseError> {
    let field = fields.next().ok_or(ResponseError::MalformedPayload)?;
    parse_hex(field.text, max_digits).map_err(|_| ResponseError::MalformedPayload)
}

fn index_field(fields: &mut Fields<'_>, limit: usize) -> Result<u8, ResponseError> {
    fields
        .next()
        .ok_or(ResponseError::MalformedPayload)?
        .index(limit as u8)
        .map_err(|_| ResponseError::MalformedPayload)
}

fn end_of_fields(fields: &mut Fields<'_>) -> Result<(), ResponseError> {
    match fields.next() {
        Some(_) => Err(ResponseError::MalformedPayload),
        None => Ok(()),
    }
}

/// Motor state shown by `mstat`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MotorState {
    Running(Direction),
    Stopped,
    /// Not driven since the channel was last configured
    Unknown,
}

impl MotorState {
    pub fn as_char(self) -> char {
        match self {
            MotorState::Running(Direction::Forward) => 'F',
            MotorState::Running(Direction::Reverse) => 'R',
            MotorState::Stopped => 'S',
            MotorState::Unknown => '?',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'F' => Some(MotorState::Running(Direction::Forward)),
            'R' => Some(MotorState::Running(Direction::Reverse)),
            'S' => Some(MotorState::Stopped),
            '?' => Some(MotorState::Unknown),
            _ => None,
        }
    }

    pub fn is_running(self) -> bool {
        matches!(self, MotorState::Running(_))
    }
}

/// Counter details of a mapped motor channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CounterInfo {
    /// Mapped input channel
    pub input: u8,
    /// Live tick count (not reset by the query)
    pub count: u32,
    /// Armed trap target, if any
    pub trap: Option<u16>,
}

/// `mot:<idx>:<F|R|S|?>:<duty>[:<input>:<count>:<trap|->]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MotorReport {
    pub motor: u8,
    pub state: MotorState,
    /// Duty currently applied to the output
    pub duty: u8,
    pub counter: Option<CounterInfo>,
}

impl MotorReport {
    /// True if a trap target is armed on this channel
    pub fn trap_armed(&self) -> bool {
        self.counter.map(|c| c.trap.is_some()).unwrap_or(false)
    }

    /// True while a servo move is still in progress
    pub fn is_servoing(&self) -> bool {
        self.state.is_running() && self.trap_armed()
    }

    /// Parse the text after `mot:`
    pub fn parse(text: &str) -> Result<Self, ResponseError> {
        let mut fields = Fields::new(text);
        let motor = index_field(&mut fields, MOTOR_CHANNELS)?;
        let state = fields
            .next()
            .and_then(|f| {
                let mut chars = f.text.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => MotorState::from_char(c),
                    _ => None,
                }
            })
            .ok_or(ResponseError::MalformedPayload)?;
        let duty = hex_field(&mut fields, 2)? as u8;

        let counter = match fields.next() {
            None => None,
            Some(input_field) => {
                let input = input_field
                    .index(INPUT_CHANNELS as u8)
                    .map_err(|_| ResponseError::MalformedPayload)?;
                let count = hex_field(&mut fields, 8)?;
                let trap_field = fields.next().ok_or(ResponseError::MalformedPayload)?;
                let trap = if trap_field.text == "-" {
                    None
                } else {
                    Some(
                        parse_hex(trap_field.text, 4)
                            .map_err(|_| ResponseError::MalformedPayload)?
                            as u16,
                    )
                };
                end_of_fields(&mut fields)?;
                Some(CounterInfo { input, count, trap })
            }
        };

        Ok(Self {
            motor,
            state,
            duty,
            counter,
        })
    }
}

impl fmt::Display for MotorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{:x}",
            TAG_MOTOR,
            self.motor,
            self.state.as_char(),
            self.duty
        )?;
        if let Some(counter) = self.counter {
            write!(f, ":{}:{:x}:", counter.input, counter.count)?;
            match counter.trap {
                Some(target) => write!(f, "{:x}", target)?,
                None => f.write_str("-")?,
            }
        }
        Ok(())
    }
}

/// `cnt:<n>[:<n>]`
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Counts(pub Vec<u32, INPUT_CHANNELS>);

impl Counts {
    pub fn parse(text: &str) -> Result<Self, ResponseError> {
        let mut counts = Vec::new();
        for field in Fields::new(text) {
            let n = parse_hex(field.text, 8).map_err(|_| ResponseError::MalformedPayload)?;
            counts.push(n).map_err(|_| ResponseError::MalformedPayload)?;
        }
        Ok(Self(counts))
    }
}

impl fmt::Display for Counts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(TAG_COUNTS)?;
        for n in &self.0 {
            write!(f, ":{:x}", n)?;
        }
        Ok(())
    }
}

/// `pol:<fwd>:<rev>`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PolarityReport {
    pub forward: u32,
    pub reverse: u32,
}

impl PolarityReport {
    pub fn parse(text: &str) -> Result<Self, ResponseError> {
        let mut fields = Fields::new(text);
        let forward = hex_field(&mut fields, 8)?;
        let reverse = hex_field(&mut fields, 8)?;
        end_of_fields(&mut fields)?;
        Ok(Self { forward, reverse })
    }
}

impl fmt::Display for PolarityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:x}:{:x}", TAG_POLARITY, self.forward, self.reverse)
    }
}

/// `set:<symbols>` echoing the state of every aux output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OutputEcho(pub [OutputSymbol; AUX_OUTPUTS]);

impl OutputEcho {
    pub fn parse(text: &str) -> Result<Self, ResponseError> {
        let mut symbols = [OutputSymbol::Off; AUX_OUTPUTS];
        let mut chars = text.chars();
        for slot in symbols.iter_mut() {
            *slot = chars
                .next()
                .and_then(OutputSymbol::from_char)
                .ok_or(ResponseError::MalformedPayload)?;
        }
        match chars.next() {
            Some(_) => Err(ResponseError::MalformedPayload),
            None => Ok(Self(symbols)),
        }
    }
}

impl fmt::Display for OutputEcho {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", TAG_SET)?;
        for symbol in self.0 {
            write!(f, "{}", symbol.as_char())?;
        }
        Ok(())
    }
}

/// Progress of a `cal` command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CalibrationStep {
    /// Calibration started
    Run,
    /// Minimum working duty per direction
    Min { forward: u8, reverse: u8 },
    /// Ticks counted at one ladder percentage
    Sample {
        percent: u8,
        forward: u32,
        reverse: u32,
    },
    /// A ladder step produced too few ticks
    Fail { direction: Direction, step: u8 },
    /// Calibration finished
    End,
}

/// `cal:<ch>:<step>`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CalibrationLine {
    pub channel: u8,
    pub step: CalibrationStep,
}

impl CalibrationLine {
    pub fn parse(text: &str) -> Result<Self, ResponseError> {
        let mut fields = Fields::new(text);
        let channel = index_field(&mut fields, MOTOR_CHANNELS)?;
        let kind = fields.next().ok_or(ResponseError::MalformedPayload)?;
        let step = match kind.text {
            "run" => CalibrationStep::Run,
            "min" => CalibrationStep::Min {
                forward: hex_field(&mut fields, 2)? as u8,
                reverse: hex_field(&mut fields, 2)? as u8,
            },
            "dat" => CalibrationStep::Sample {
                percent: hex_field(&mut fields, 2)? as u8,
                forward: hex_field(&mut fields, 8)?,
                reverse: hex_field(&mut fields, 8)?,
            },
            "fail" => {
                let direction = fields
                    .next()
                    .and_then(|f| f.single_char().ok())
                    .and_then(Direction::from_char)
                    .ok_or(ResponseError::MalformedPayload)?;
                let step = hex_field(&mut fields, 2)? as u8;
                if step as usize >= CALIBRATION_LADDER.len() {
                    return Err(ResponseError::MalformedPayload);
                }
                CalibrationStep::Fail { direction, step }
            }
            "end" => CalibrationStep::End,
            _ => return Err(ResponseError::MalformedPayload),
        };
        end_of_fields(&mut fields)?;
        Ok(Self { channel, step })
    }
}

impl fmt::Display for CalibrationLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:", TAG_CAL, self.channel)?;
        match self.step {
            CalibrationStep::Run => f.write_str("run"),
            CalibrationStep::Min { forward, reverse } => {
                write!(f, "min:{:x}:{:x}", forward, reverse)
            }
            CalibrationStep::Sample {
                percent,
                forward,
                reverse,
            } => write!(f, "dat:{:x}:{:x}:{:x}", percent, forward, reverse),
            CalibrationStep::Fail { direction, step } => {
                write!(f, "fail:{}:{:x}", direction.as_char(), step)
            }
            CalibrationStep::End => f.write_str("end"),
        }
    }
}
