//! User-space driver for eBeam interactive whiteboard receivers.
//!
//! Reports are read from the receiver's hidraw node, decoded, calibrated to
//! screen coordinates, debounced and handed to an [`output::OutputSink`].

pub mod calibration;
pub mod catalog;
pub mod config;
pub mod discovery;
pub mod driver;
pub mod filter;
pub mod input;
pub mod output;
pub mod protocol;
pub mod session;
