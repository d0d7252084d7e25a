//! Ticklink line protocol
//!
//! This crate defines the text protocol spoken over the UART between a
//! host and the motor controller board. It is shared by the device
//! interpreter and the host session client.
//!
//! # Protocol Overview
//!
//! Every message is one line of ASCII text ending in `\n`. Fields are
//! separated by `:` and numbers are lowercase hexadecimal:
//! ```text
//! host   → device   drv:0:f:32
//! device → host     rdy
//! device → host     trap:1        (unsolicited, any time)
//! ```
//!
//! A command is complete once the device prints `rdy` or an
//! `err-<code>[-<n>]` line. Data lines (`<tag>:<fields>`) may precede the
//! terminator.

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![deny(unsafe_code)]

pub mod calibration;
pub mod command;
pub mod events;
pub mod fields;
pub mod line;
pub mod response;

pub use calibration::{
    ladder_level, percent_to_duty, DirectionCalibration, CALIBRATION_LADDER, CAL_SEP, FULL_DUTY,
    MAX_CAL_POINTS,
};
pub use command::{
    Command, CommandName, Direction, DriveAction, MotorSetup, OutputSymbol, AUX_OUTPUTS,
    INPUT_CHANNELS, MAX_OUTPUT_LEVEL, MOTOR_CHANNELS,
};
pub use events::Event;
pub use fields::{Field, FieldError, Fields, FIELD_SEP};
pub use line::{Line, LineAssembler, LineError, LINE_END, MAX_LINE_LEN};
pub use response::{
    classify, CalibrationLine, CalibrationStep, CounterInfo, Counts, Data, DeviceError,
    ErrorCode, MotorReport, MotorState, OutputEcho, PolarityReport, Response, ResponseError, BANNER,
    PROTOCOL_VERSION,
};

/// Serial line rate
pub const BAUD_RATE: u32 = 57_600;
