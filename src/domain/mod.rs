//! Domain layer - pure calibration logic independent of infrastructure
//!
//! This module contains the calibration model. It performs no I/O and knows
//! nothing about where records are stored or how the HMI talks to it.

pub mod calibration;

pub use calibration::{CalibrationError, ReferencePoints, TwoPointCalibration};
