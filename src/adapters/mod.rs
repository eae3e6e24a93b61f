//! Adapters - concrete implementations of ports
//!
//! Adapters connect the calibration service to real storage by implementing
//! the port traits.
//!
//! # Available Adapters
//!
//! - **ram**: fixed in-memory region (host, tests, battery-backed SRAM)
//! - **nor_flash**: one sector of any `embedded-storage` NOR flash driver

pub mod nor_flash;
pub mod ram;

pub use nor_flash::NorFlashStorage;
pub use ram::RamStorage;
