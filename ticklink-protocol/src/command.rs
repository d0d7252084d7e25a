//! Command lines sent from the host to the device
//!
//! Commands are a name followed by `:`-separated fields:
//!
//! ```text
//! reset | init | free | ping[:msg] | time | cal:<ch> | cpol:<ch>
//! mot[:<ch>:<fwdCal>:<revCal>:<input|->]*
//! drv:<m>:<f|r|s>[:<pct>] | srv:<m>:<f|r>:<ticks>[:<pct>]
//! set:<6 symbols> | qcnt[:<input>] | mstat:<m>
//! ```

use core::fmt;

use crate::calibration::DirectionCalibration;

/// Number of motor channels on the device
pub const MOTOR_CHANNELS: usize = 3;

/// Number of tick input channels on the device
pub const INPUT_CHANNELS: usize = 2;

/// Number of auxiliary outputs driven by `set`
pub const AUX_OUTPUTS: usize = 6;

/// Placeholder for "no input channel" in `mot`
pub const NO_INPUT: &str = "-";

/// Command names understood by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandName {
    Reset,
    Init,
    Free,
    Ping,
    Time,
    Calibrate,
    CheckPolarity,
    Motors,
    Drive,
    Servo,
    Set,
    QueryCounts,
    MotorStatus,
}

impl CommandName {
    /// All command names, in wire order
    pub const ALL: [CommandName; 13] = [
        CommandName::Reset,
        CommandName::Init,
        CommandName::Free,
        CommandName::Ping,
        CommandName::Time,
        CommandName::Calibrate,
        CommandName::CheckPolarity,
        CommandName::Motors,
        CommandName::Drive,
        CommandName::Servo,
        CommandName::Set,
        CommandName::QueryCounts,
        CommandName::MotorStatus,
    ];

    /// Wire spelling
    pub fn as_str(self) -> &'static str {
        match self {
            CommandName::Reset => "reset",
            CommandName::Init => "init",
            CommandName::Free => "free",
            CommandName::Ping => "ping",
            CommandName::Time => "time",
            CommandName::Calibrate => "cal",
            CommandName::CheckPolarity => "cpol",
            CommandName::Motors => "mot",
            CommandName::Drive => "drv",
            CommandName::Servo => "srv",
            CommandName::Set => "set",
            CommandName::QueryCounts => "qcnt",
            CommandName::MotorStatus => "mstat",
        }
    }

    /// Look up a command by its wire spelling
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.as_str() == name)
    }
}

/// Motor rotation direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    Forward,
    Reverse,
}

impl Direction {
    /// Lowercase wire character
    pub fn as_char(self) -> char {
        match self {
            Direction::Forward => 'f',
            Direction::Reverse => 'r',
        }
    }

    /// Parse a case-insensitive `f` / `r`
    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_lowercase() {
            'f' => Some(Direction::Forward),
            'r' => Some(Direction::Reverse),
            _ => None,
        }
    }

    /// Index used for per-direction arrays and `err-cal-<n>`
    pub fn index(self) -> usize {
        match self {
            Direction::Forward => 0,
            Direction::Reverse => 1,
        }
    }
}

/// Action requested by `drv`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DriveAction {
    Run(Direction),
    Stop,
}

impl DriveAction {
    /// Wire character
    pub fn as_char(self) -> char {
        match self {
            DriveAction::Run(dir) => dir.as_char(),
            DriveAction::Stop => 's',
        }
    }

    /// Parse a case-insensitive `f` / `r` / `s`
    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_lowercase() {
            's' => Some(DriveAction::Stop),
            other => Direction::from_char(other).map(DriveAction::Run),
        }
    }
}

/// One symbol of the `set` command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OutputSymbol {
    /// `+`: output fully on
    On,
    /// `-`: output fully off
    Off,
    /// `*`: leave the output unchanged
    Keep,
    /// `0`..`4`: output at n/4 duty
    Level(u8),
}

/// Highest `set` level digit
pub const MAX_OUTPUT_LEVEL: u8 = 4;

impl OutputSymbol {
    /// Parse one symbol
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '+' => Some(OutputSymbol::On),
            '-' => Some(OutputSymbol::Off),
            '*' => Some(OutputSymbol::Keep),
            '0'..='4' => Some(OutputSymbol::Level(c as u8 - b'0')),
            _ => None,
        }
    }

    /// Wire character
    pub fn as_char(self) -> char {
        match self {
            OutputSymbol::On => '+',
            OutputSymbol::Off => '-',
            OutputSymbol::Keep => '*',
            OutputSymbol::Level(n) => (b'0' + n.min(MAX_OUTPUT_LEVEL)) as char,
        }
    }
}

/// Setup of one motor channel inside a `mot` command
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MotorSetup {
    /// Motor channel index
    pub channel: u8,
    /// Forward calibration
    pub forward: DirectionCalibration,
    /// Reverse calibration
    pub reverse: DirectionCalibration,
    /// Mapped tick input, if any
    pub input: Option<u8>,
}

impl MotorSetup {
    /// Uncalibrated setup for `channel`
    pub fn new(channel: u8, input: Option<u8>) -> Self {
        Self {
            channel,
            forward: DirectionCalibration::default(),
            reverse: DirectionCalibration::default(),
            input,
        }
    }
}

impl fmt::Display for MotorSetup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}:", self.channel, self.forward, self.reverse)?;
        match self.input {
            Some(input) => write!(f, "{}", input),
            None => f.write_str(NO_INPUT),
        }
    }
}

/// A command ready to be encoded on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    Reset,
    Init,
    Free,
    Ping(Option<&'a str>),
    Time,
    Calibrate(u8),
    CheckPolarity(u8),
    Motors(&'a [MotorSetup]),
    Drive {
        motor: u8,
        action: DriveAction,
        percent: Option<u8>,
    },
    Servo {
        motor: u8,
        direction: Direction,
        ticks: u16,
        percent: Option<u8>,
    },
    Set([OutputSymbol; AUX_OUTPUTS]),
    QueryCounts(Option<u8>),
    MotorStatus(u8),
}

impl<'a> Command<'a> {
    /// Command name
    pub fn name(&self) -> CommandName {
        match self {
            Command::Reset => CommandName::Reset,
            Command::Init => CommandName::Init,
            Command::Free => CommandName::Free,
            Command::Ping(_) => CommandName::Ping,
            Command::Time => CommandName::Time,
            Command::Calibrate(_) => CommandName::Calibrate,
            Command::CheckPolarity(_) => CommandName::CheckPolarity,
            Command::Motors(_) => CommandName::Motors,
            Command::Drive { .. } => CommandName::Drive,
            Command::Servo { .. } => CommandName::Servo,
            Command::Set(_) => CommandName::Set,
            Command::QueryCounts(_) => CommandName::QueryCounts,
            Command::MotorStatus(_) => CommandName::MotorStatus,
        }
    }
}

/// Encodes the line without its terminator
impl<'a> fmt::Display for Command<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name().as_str())?;
        match self {
            Command::Reset | Command::Init | Command::Free | Command::Time => Ok(()),
            Command::Ping(None) => Ok(()),
            Command::Ping(Some(msg)) => write!(f, ":{}", msg),
            Command::Calibrate(ch) | Command::CheckPolarity(ch) => write!(f, ":{}", ch),
            Command::Motors(setups) => {
                for setup in setups.iter() {
                    write!(f, ":{}", setup)?;
                }
                Ok(())
            }
            Command::Drive {
                motor,
                action,
                percent,
            } => {
                write!(f, ":{}:{}", motor, action.as_char())?;
                if let Some(pct) = percent {
                    write!(f, ":{:x}", pct)?;
                }
                Ok(())
            }
            Command::Servo {
                motor,
                direction,
                ticks,
                percent,
            } => {
                write!(f, ":{}:{}:{:04x}", motor, direction.as_char(), ticks)?;
                if let Some(pct) = percent {
                    write!(f, ":{:x}", pct)?;
                }
                Ok(())
            }
            Command::Set(symbols) => {
                f.write_str(":")?;
                for symbol in symbols {
                    write!(f, "{}", symbol.as_char())?;
                }
                Ok(())
            }
            Command::QueryCounts(None) => Ok(()),
            Command::QueryCounts(Some(input)) => write!(f, ":{}", input),
            Command::MotorStatus(motor) => write!(f, ":{}", motor),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heapless::String;

    fn encode(cmd: &Command<'_>) -> String<128> {
        let mut out = String::new();
        core::fmt::write(&mut out, format_args!("{}", cmd)).unwrap();
        out
    }

    #[test]
    fn test_name_lookup() {
        for name in CommandName::ALL {
            assert_eq!(CommandName::from_name(name.as_str()), Some(name));
        }
        assert_eq!(CommandName::from_name("drive"), None);
    }

    #[test]
    fn test_encode_simple() {
        assert_eq!(encode(&Command::Reset).as_str(), "reset");
        assert_eq!(encode(&Command::Ping(Some("hi"))).as_str(), "ping:hi");
        assert_eq!(encode(&Command::QueryCounts(None)).as_str(), "qcnt");
        assert_eq!(encode(&Command::QueryCounts(Some(1))).as_str(), "qcnt:1");
        assert_eq!(encode(&Command::MotorStatus(2)).as_str(), "mstat:2");
    }

    #[test]
    fn test_encode_drive() {
        let cmd = Command::Drive {
            motor: 0,
            action: DriveAction::Run(Direction::Forward),
            percent: Some(50),
        };
        assert_eq!(encode(&cmd).as_str(), "drv:0:f:32");

        let stop = Command::Drive {
            motor: 1,
            action: DriveAction::Stop,
            percent: None,
        };
        assert_eq!(encode(&stop).as_str(), "drv:1:s");
    }

    #[test]
    fn test_encode_servo() {
        let cmd = Command::Servo {
            motor: 0,
            direction: Direction::Reverse,
            ticks: 100,
            percent: Some(100),
        };
        assert_eq!(encode(&cmd).as_str(), "srv:0:r:0064:64");
    }

    #[test]
    fn test_encode_motors() {
        let mut first = MotorSetup::new(0, Some(1));
        first.forward = DirectionCalibration::parse("3c~40", 0).unwrap();
        first.reverse = DirectionCalibration::uncorrected(0x20);
        let second = MotorSetup::new(2, None);
        let setups = [first, second];
        assert_eq!(
            encode(&Command::Motors(&setups)).as_str(),
            "mot:0:3c~40:20:1:2:0:0:-"
        );
        assert_eq!(encode(&Command::Motors(&[])).as_str(), "mot");
    }

    #[test]
    fn test_encode_set() {
        let cmd = Command::Set([
            OutputSymbol::On,
            OutputSymbol::Off,
            OutputSymbol::Keep,
            OutputSymbol::Level(0),
            OutputSymbol::Level(2),
            OutputSymbol::Level(4),
        ]);
        assert_eq!(encode(&cmd).as_str(), "set:+-*024");
    }

    #[test]
    fn test_direction_chars() {
        assert_eq!(Direction::from_char('F'), Some(Direction::Forward));
        assert_eq!(Direction::from_char('r'), Some(Direction::Reverse));
        assert_eq!(Direction::from_char('s'), None);
        assert_eq!(DriveAction::from_char('S'), Some(DriveAction::Stop));
    }

    #[test]
    fn test_output_symbols() {
        for c in ['+', '-', '*', '0', '1', '2', '3', '4'] {
            assert_eq!(OutputSymbol::from_char(c).unwrap().as_char(), c);
        }
        assert_eq!(OutputSymbol::from_char('5'), None);
    }
}
