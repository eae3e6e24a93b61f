//! RAM storage adapter
//!
//! Implements the CalibrationStorage port over a fixed byte array. Used on
//! host, in tests, and for battery-backed SRAM regions.

use crate::ports::storage::{check_bounds, CalibrationStorage, StorageError};
use crate::record::ERASED_BYTE;

/// In-memory storage region of `N` bytes
///
/// Starts in the erased state (all 0xFF), like fresh flash.
#[derive(Clone, Debug)]
pub struct RamStorage<const N: usize> {
    bytes: [u8; N],
    writes: u32,
}

impl<const N: usize> RamStorage<N> {
    /// Create an erased region
    pub const fn new() -> Self {
        Self {
            bytes: [ERASED_BYTE; N],
            writes: 0,
        }
    }

    /// Create a region holding existing contents
    pub const fn from_bytes(bytes: [u8; N]) -> Self {
        Self { bytes, writes: 0 }
    }

    /// Raw contents (for test verification)
    pub fn as_bytes(&self) -> &[u8; N] {
        &self.bytes
    }

    /// Mutable raw contents (for corruption injection)
    pub fn as_bytes_mut(&mut self) -> &mut [u8; N] {
        &mut self.bytes
    }

    /// Number of successful writes
    pub fn write_count(&self) -> u32 {
        self.writes
    }

    /// Return the whole region to the erased state
    pub fn erase(&mut self) {
        self.bytes = [ERASED_BYTE; N];
    }
}

impl<const N: usize> Default for RamStorage<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> CalibrationStorage for RamStorage<N> {
    fn capacity(&self) -> usize {
        N
    }

    fn read(&mut self, offset: u32, buf: &mut [u8]) -> Result<(), StorageError> {
        check_bounds(N, offset, buf.len())?;
        let start = offset as usize;
        buf.copy_from_slice(&self.bytes[start..start + buf.len()]);
        Ok(())
    }

    fn write(&mut self, offset: u32, data: &[u8]) -> Result<(), StorageError> {
        check_bounds(N, offset, data.len())?;
        let start = offset as usize;
        self.bytes[start..start + data.len()].copy_from_slice(data);
        self.writes += 1;
        Ok(())
    }
}
