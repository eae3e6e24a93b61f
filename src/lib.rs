//! Two-point sensor calibration for HMI controllers
//!
//! This library converts raw measured values into engineering values with a
//! gain/offset model fitted from two reference points, and keeps that model in
//! non-volatile storage so it survives power loss.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Domain Layer                                 │
//! │  - TwoPointCalibration model                                     │
//! │  - CalibrationRecord codec (24-byte legacy, framed + CRC32)      │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Ports (Traits)                               │
//! │  - CalibrationStorage: non-volatile record region                │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Adapters                                     │
//! │  - RamStorage: in-memory region                                  │
//! │  - NorFlashStorage: embedded-storage NOR flash sector            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `CalibrationService` ties the three together and answers the HMI's
//! `hmi_protocol` requests.
//!
//! # Features
//!
//! - `std`: `std::error::Error` impls and the `calrec` host tool
//! - `defmt`: log through defmt and derive `defmt::Format`
//! - `log`: log through the `log` facade

#![cfg_attr(not(any(test, feature = "std")), no_std)]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

// ============================================================================
// Protocol (shared between the HMI and the calibration service)
// ============================================================================

pub mod hmi_protocol;

pub use hmi_protocol::{
    CalibrationReport, ErrorCode, HmiCommand, HmiResponse, LoadStatus, ProtocolError,
    MAX_MESSAGE_SIZE,
};

// ============================================================================
// Hexagonal Architecture
// ============================================================================

/// Domain layer - pure calibration logic
pub mod domain;

/// Record format for non-volatile storage
pub mod record;

/// Ports - traits defining boundaries
pub mod ports;

/// Adapters - concrete implementations
pub mod adapters;

/// Service - model plus injected storage
pub mod service;

// Re-export key domain types
pub use domain::{CalibrationError, ReferencePoints, TwoPointCalibration};

// Re-export record codec
pub use record::{CalibrationRecord, RecordError, RecordFormat};

// Re-export key port traits
pub use ports::{CalibrationStorage, StorageError, StoreConfig};

// Re-export adapters
pub use adapters::{NorFlashStorage, RamStorage};

pub use service::{CalibrationService, LoadOutcome, ServiceError};
