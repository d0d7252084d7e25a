//! Host side of the ticklink protocol
//!
//! A [`Session`] owns one link to a device. A reader thread assembles
//! inbound lines and hands them to a dispatcher that resolves the command
//! in flight, feeds transient matchers, clears servo flags on `trap:`
//! events and queues everything else for [`Session::next_line`].
//!
//! ```no_run
//! use ticklink_host::{Session, SessionConfig};
//! use ticklink_protocol::Direction;
//!
//! let session = Session::open(SessionConfig::load("ticklink.toml")?)?;
//! session.free()?;
//! session.servo(0, Direction::Forward, 0x200, Some(60))?;
//! session.servo(1, Direction::Reverse, 0x180, None)?;
//! session.wait_servo(&[0, 1])?;
//! # Ok::<(), ticklink_host::HostError>(())
//! ```

pub mod calibration;
pub mod config;
mod dispatcher;
pub mod error;
pub mod link;
mod servo;
pub mod session;

pub use calibration::{stored_setup, CalibrationReport, Sample};
pub use config::SessionConfig;
pub use error::{HostError, Result};
pub use session::Session;
