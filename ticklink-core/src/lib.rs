//! Board-agnostic core logic for the ticklink motor controller
//!
//! This crate contains the device logic that does not depend on specific
//! hardware:
//!
//! - Interpreter mode state machine and command gating
//! - Motor channel configuration and duty correction tables
//! - Tick counters and servo traps shared with the input interrupts
//! - Hardware abstraction traits (motor driver, force-stop, clock)

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

pub mod config;
pub mod state;
pub mod ticks;
pub mod traits;

pub use ticks::{ArmOutcome, TickShared, Trap};
