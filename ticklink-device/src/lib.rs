//! Device side of the ticklink protocol
//!
//! The [`Interpreter`] owns the board peripherals through `embedded-hal`
//! traits and talks to the host through `embedded-io`. The board crate
//! wires its UART, PWM outputs, direction pins and encoder interrupts to
//! it; the encoder interrupts call [`TickShared::on_tick`].
//!
//! ```ignore
//! static TICKS: TickShared = TickShared::new();
//!
//! let mut interpreter = Interpreter::new(board, &TICKS);
//! loop {
//!     interpreter.poll(&mut uart_rx, &mut uart_tx)?;
//! }
//! ```
//!
//! [`TickShared::on_tick`]: ticklink_core::TickShared::on_tick

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

pub mod aux;
mod handlers;
pub mod interpreter;
pub mod reply;
#[cfg(any(test, feature = "sim"))]
pub mod sim;
#[cfg(test)]
mod testing;

pub use aux::AuxOutputs;
pub use interpreter::{Board, Interpreter};
