//! Ports (interfaces) defining the boundaries of the application
//!
//! Ports are traits that define how the calibration service interacts with
//! external systems, so the domain stays independent of specific hardware.
//!
//! - **CalibrationStorage**: where the calibration record lives (NOR flash,
//!   EEPROM, RAM, mock)

pub mod storage;

pub use storage::{CalibrationStorage, StorageError, StoreConfig};
