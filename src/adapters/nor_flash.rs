//! NOR flash storage adapter
//!
//! Implements the CalibrationStorage port on top of any `embedded-storage`
//! NOR flash driver. One erase sector is reserved for the record; the adapter
//! manages the first [`REGION_LEN`] bytes of it.
//!
//! Writes are read-modify-write: the region is read, patched, the sector is
//! erased and the region is programmed again. Bytes outside the patch keep
//! their previous value.

use embedded_storage::nor_flash::{NorFlash, NorFlashError, NorFlashErrorKind};

use crate::ports::storage::{check_bounds, CalibrationStorage, StorageError};
use crate::record::ERASED_BYTE;

/// Bytes of the sector exposed as the storage region
pub const REGION_LEN: usize = 64;

/// Calibration region in one NOR flash sector
pub struct NorFlashStorage<F: NorFlash> {
    flash: F,
    /// Sector start address
    base: u32,
}

impl<F: NorFlash> NorFlashStorage<F> {
    /// Reserve the sector starting at `base`
    ///
    /// `base` must be aligned to the erase size and the sector must lie
    /// inside the flash. The region length must be compatible with the
    /// driver's read and write granularity.
    pub fn new(flash: F, base: u32) -> Result<Self, StorageError> {
        if F::ERASE_SIZE < REGION_LEN
            || REGION_LEN % F::WRITE_SIZE != 0
            || REGION_LEN % F::READ_SIZE != 0
            || base as usize % F::ERASE_SIZE != 0
        {
            return Err(StorageError::Misaligned);
        }
        check_bounds(flash.capacity(), base, F::ERASE_SIZE)?;

        Ok(Self { flash, base })
    }

    /// Sector start address
    pub fn base(&self) -> u32 {
        self.base
    }

    /// Get the underlying flash driver
    pub fn flash(&self) -> &F {
        &self.flash
    }

    /// Release the flash driver
    pub fn into_inner(self) -> F {
        self.flash
    }

    fn read_region(&mut self, region: &mut [u8; REGION_LEN]) -> Result<(), StorageError> {
        self.flash
            .read(self.base, region)
            .map_err(|e| map_error(e, StorageError::ReadFailed))
    }
}

impl<F: NorFlash> CalibrationStorage for NorFlashStorage<F> {
    fn capacity(&self) -> usize {
        REGION_LEN
    }

    fn read(&mut self, offset: u32, buf: &mut [u8]) -> Result<(), StorageError> {
        check_bounds(REGION_LEN, offset, buf.len())?;

        let mut region = [ERASED_BYTE; REGION_LEN];
        self.read_region(&mut region)?;

        let start = offset as usize;
        buf.copy_from_slice(&region[start..start + buf.len()]);
        Ok(())
    }

    fn write(&mut self, offset: u32, data: &[u8]) -> Result<(), StorageError> {
        check_bounds(REGION_LEN, offset, data.len())?;

        let mut region = [ERASED_BYTE; REGION_LEN];
        self.read_region(&mut region)?;

        let start = offset as usize;
        region[start..start + data.len()].copy_from_slice(data);

        let sector_end = self.base + F::ERASE_SIZE as u32;
        debug!("erasing calibration sector at {}", self.base);
        self.flash
            .erase(self.base, sector_end)
            .map_err(|e| map_error(e, StorageError::EraseFailed))?;

        self.flash
            .write(self.base, &region)
            .map_err(|e| map_error(e, StorageError::WriteFailed))
    }
}

fn map_error<E: NorFlashError>(error: E, other: StorageError) -> StorageError {
    match error.kind() {
        NorFlashErrorKind::NotAligned => StorageError::Misaligned,
        NorFlashErrorKind::OutOfBounds => StorageError::OutOfBounds,
        _ => other,
    }
}
