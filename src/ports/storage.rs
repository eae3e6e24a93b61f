//! Storage port - abstraction for persisting the calibration record
//!
//! This trait allows the service to keep its record in non-volatile memory
//! without knowing the specific medium (NOR flash, EEPROM, battery-backed RAM,
//! mock, etc.)

use crate::record::RecordFormat;

/// Error type for storage operations
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StorageError {
    /// Access reaches past the end of the storage region
    OutOfBounds,
    /// Address or length violates the medium's alignment rules
    Misaligned,
    /// Read operation failed
    ReadFailed,
    /// Write operation failed
    WriteFailed,
    /// Erase operation failed
    EraseFailed,
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            StorageError::OutOfBounds => write!(f, "storage access out of bounds"),
            StorageError::Misaligned => write!(f, "storage access misaligned"),
            StorageError::ReadFailed => write!(f, "storage read failed"),
            StorageError::WriteFailed => write!(f, "storage write failed"),
            StorageError::EraseFailed => write!(f, "storage erase failed"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for StorageError {}

/// Configuration for how the calibration is persisted
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StoreConfig {
    /// Record codec
    pub format: RecordFormat,
    /// Byte offset of the record inside the storage region
    pub offset: u32,
    /// Write the record after every calibrate or clear
    pub persist_on_change: bool,
    /// Reject reference points that cannot give a usable model
    pub validate_points: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::framed()
    }
}

impl StoreConfig {
    /// Framed record with CRC, persisted and validated on every change
    pub const fn framed() -> Self {
        Self {
            format: RecordFormat::Framed,
            offset: 0,
            persist_on_change: true,
            validate_points: true,
        }
    }

    /// Bare 24-byte record, for controllers that already hold one
    ///
    /// Points are not validated, matching the unchecked legacy behavior.
    pub const fn legacy() -> Self {
        Self {
            format: RecordFormat::Legacy,
            offset: 0,
            persist_on_change: true,
            validate_points: false,
        }
    }

    /// Same configuration at a different offset
    pub const fn at_offset(self, offset: u32) -> Self {
        Self { offset, ..self }
    }
}

/// Port for the non-volatile region holding the calibration record
///
/// # Example Implementation
///
/// ```ignore
/// struct EepromStorage<I: I2c> {
///     eeprom: At24c<I>,
/// }
///
/// impl<I: I2c> CalibrationStorage for EepromStorage<I> {
///     fn capacity(&self) -> usize { 256 }
///
///     fn read(&mut self, offset: u32, buf: &mut [u8]) -> Result<(), StorageError> {
///         self.eeprom.read(offset, buf).map_err(|_| StorageError::ReadFailed)
///     }
///
///     fn write(&mut self, offset: u32, data: &[u8]) -> Result<(), StorageError> {
///         self.eeprom.write(offset, data).map_err(|_| StorageError::WriteFailed)
///     }
/// }
/// ```
pub trait CalibrationStorage {
    /// Size of the region in bytes
    fn capacity(&self) -> usize;

    /// Read `buf.len()` bytes starting at `offset`
    fn read(&mut self, offset: u32, buf: &mut [u8]) -> Result<(), StorageError>;

    /// Replace the bytes starting at `offset` with `data`
    ///
    /// Media that need an erase before programming handle it here.
    fn write(&mut self, offset: u32, data: &[u8]) -> Result<(), StorageError>;
}

impl<T: CalibrationStorage + ?Sized> CalibrationStorage for &mut T {
    fn capacity(&self) -> usize {
        (**self).capacity()
    }

    fn read(&mut self, offset: u32, buf: &mut [u8]) -> Result<(), StorageError> {
        (**self).read(offset, buf)
    }

    fn write(&mut self, offset: u32, data: &[u8]) -> Result<(), StorageError> {
        (**self).write(offset, data)
    }
}

/// Check that `len` bytes at `offset` fit in a region of `capacity` bytes
pub fn check_bounds(capacity: usize, offset: u32, len: usize) -> Result<(), StorageError> {
    let end = (offset as usize)
        .checked_add(len)
        .ok_or(StorageError::OutOfBounds)?;
    if end > capacity {
        return Err(StorageError::OutOfBounds);
    }
    Ok(())
}
