//! Command gating by mode

use ticklink_protocol::CommandName;

use super::machine::Mode;

/// Set of modes in which a command is legal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ModeSet(u8);

impl ModeSet {
    pub const DISCONNECTED: Self = Self(1 << 0);
    pub const INIT: Self = Self(1 << 1);
    pub const FREE: Self = Self(1 << 2);
    pub const AUTO: Self = Self(1 << 3);

    /// Every mode
    pub const ALL: Self = Self(0b1111);
    /// Every mode once a host has connected
    pub const CONNECTED: Self = Self::INIT.union(Self::FREE).union(Self::AUTO);
    /// Modes in which motors run
    pub const RUNNING: Self = Self::FREE.union(Self::AUTO);

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn of(mode: Mode) -> Self {
        match mode {
            Mode::Disconnected => Self::DISCONNECTED,
            Mode::Init => Self::INIT,
            Mode::Free => Self::FREE,
            Mode::Auto => Self::AUTO,
        }
    }

    pub const fn contains(self, mode: Mode) -> bool {
        self.0 & Self::of(mode).0 != 0
    }
}

/// Modes in which `command` is accepted
pub const fn legal_modes(command: CommandName) -> ModeSet {
    use CommandName::*;

    match command {
        Reset | Ping => ModeSet::ALL,
        Time | QueryCounts => ModeSet::CONNECTED,
        Init => ModeSet::RUNNING,
        Free | Motors | Calibrate | CheckPolarity => ModeSet::INIT,
        Drive | Servo | Set | MotorStatus => ModeSet::RUNNING,
    }
}

/// Check whether `command` is accepted in `mode`
pub const fn is_allowed(command: CommandName, mode: Mode) -> bool {
    legal_modes(command).contains(mode)
}
