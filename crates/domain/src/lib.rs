//! # rocwire-domain
//!
//! Pure domain model for the rocwire control-board driver core.
//!
//! ## Responsibilities
//! - Foundational types: board-number identifiers, error conventions
//! - Encode driver actions (pulse, enable, hold, schedule, disable) into **driver state records**
//! - Classify raw switch telemetry into logical transitions (**switch table**)
//! - Model **automation rules** and their expansion into per-edge record lists
//! - Define the board's **command vocabulary** and register writes
//! - Sequence **stepper** moves and map **accelerometer**, **servo**, and light values
//! - Describe the board (**board info**)
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;

pub mod accelerometer;
pub mod board_info;
pub mod command;
pub mod driver;
pub mod event;
pub mod output;
pub mod pwm;
pub mod rule;
pub mod servo;
pub mod stepper;
pub mod switch;
