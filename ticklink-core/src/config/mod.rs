//! Channel configuration types
//!
//! Configuration lives in RAM only; the host re-sends it with `mot` after
//! every reset.

pub mod channel;
pub mod table;

pub use channel::{ChannelConfigs, DirectionProfile, MotorChannelConfig};
pub use table::{CalibrationTable, TableError, TablePoint};
