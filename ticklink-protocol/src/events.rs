//! Unsolicited events sent by the device
//!
//! Events may appear between any two lines of a command exchange and are
//! never answered by the host.

use core::fmt;

use crate::command::MOTOR_CHANNELS;
use crate::fields::Fields;

/// Tag of the trap completion event
pub const TAG_TRAP: &str = "trap";

/// Unsolicited device event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    /// A servo trap reached its target; the motor has been stopped
    Trap { motor: u8 },
}

impl Event {
    /// Check whether a response tag names an event
    pub fn is_event_tag(tag: &str) -> bool {
        tag == TAG_TRAP
    }

    /// Parse the event with `tag` from the text following it
    pub fn parse(tag: &str, fields: Option<&str>) -> Option<Self> {
        match tag {
            TAG_TRAP => {
                let mut fields = Fields::new(fields?);
                let motor = fields.next()?.index(MOTOR_CHANNELS as u8).ok()?;
                if fields.next().is_some() {
                    return None;
                }
                Some(Event::Trap { motor })
            }
            _ => None,
        }
    }

    /// Motor channel the event refers to
    pub fn motor(&self) -> u8 {
        match *self {
            Event::Trap { motor } => motor,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Trap { motor } => write!(f, "{}:{}", TAG_TRAP, motor),
        }
    }
}
