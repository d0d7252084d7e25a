//! Hardware driver implementations
//!
//! This crate provides concrete implementations of the traits defined
//! in ticklink-core:
//!
//! - DC motor driver over `embedded-hal` PWM and GPIO
//! - Calibration engine for the minimum duty and speed ladder
//! - Servo moves bounded by encoder ticks

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

pub mod motor;
