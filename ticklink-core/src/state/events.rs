//! Events that trigger mode transitions

/// Events that can change the interpreter mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ModeEvent {
    /// `reset` received
    Reset,
    /// `init` received
    EnterInit,
    /// `free` received
    EnterFree,
}
