//! Interpreter mode state machine
//!
//! The mode is explicit, finite and deterministic; see [`gate`] for the
//! per-command legality table.

pub mod events;
pub mod gate;
pub mod machine;

pub use events::ModeEvent;
pub use gate::{is_allowed, legal_modes, ModeSet};
pub use machine::Mode;
