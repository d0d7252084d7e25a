//! Interpreter mode state machine
//!
//! The mode gates which commands the device accepts. It changes only in
//! response to explicit commands; errors never move it.

use super::events::ModeEvent;

/// Interpreter modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    /// Power-on state until the host sends `reset`
    #[default]
    Disconnected,
    /// Configuration mode: channels are set up and calibrated here
    Init,
    /// Manual drive mode
    Free,
    /// Automatic operation; gated like [`Mode::Free`]
    Auto,
}

impl Mode {
    /// Process an event and return the next mode
    pub fn transition(self, event: ModeEvent) -> Self {
        use Mode::*;
        use ModeEvent::*;

        match (self, event) {
            (_, Reset) => Init,

            (Init, EnterFree) => Free,

            (Free, EnterInit) | (Auto, EnterInit) => Init,

            // Default: stay in current mode
            _ => self,
        }
    }
}
