//! Calibration record format for non-volatile storage
//!
//! Two codecs share one payload:
//!
//! - **Legacy** (24 bytes): the payload alone. No header, no checksum.
//! - **Framed** (36 bytes): header, payload and CRC32.
//!
//! All multi-byte fields are little-endian.
//!
//! # Payload layout
//!
//! ```text
//! offset  size  field
//!      0     4  gain (f32)
//!      4     4  offset (f32)
//!      8     8  reference inputs x0, x1 (2 x f32)
//!     16     8  reference outputs y0, y1 (2 x f32)
//! ```
//!
//! Unknown reference points are stored as sixteen 0xFF bytes, the erased
//! state of flash and EEPROM.
//!
//! # Framed layout
//!
//! ```text
//! offset  size  field
//!      0     4  magic (RECORD_MAGIC)
//!      4     1  version (RECORD_VERSION)
//!      5     1  flags (RecordFlags)
//!      6     2  reserved, zero
//!      8    24  payload
//!     32     4  CRC-32/ISO-HDLC over bytes 0..32
//! ```

use bitflags::bitflags;
use crc::{Crc, CRC_32_ISO_HDLC};

use crate::domain::{ReferencePoints, TwoPointCalibration};

/// Length of the legacy record in bytes
pub const LEGACY_RECORD_LEN: usize = 24;

/// Length of the framed record header in bytes
pub const FRAME_HEADER_LEN: usize = 8;

/// Length of the framed record in bytes
pub const FRAMED_RECORD_LEN: usize = FRAME_HEADER_LEN + LEGACY_RECORD_LEN + 4;

/// Framed record magic number
pub const RECORD_MAGIC: u32 = 0x4C41_4354;

/// Framed record format version
pub const RECORD_VERSION: u8 = 1;

/// Byte value of erased non-volatile memory
pub const ERASED_BYTE: u8 = 0xFF;

const REFERENCE_OFFSET: usize = 8;
const REFERENCE_LEN: usize = LEGACY_RECORD_LEN - REFERENCE_OFFSET;

/// CRC32 algorithm (ISO HDLC / Ethernet / ZIP)
const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

bitflags! {
    /// Framed record flags
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct RecordFlags: u8 {
        /// The stored model was calibrated
        const CALIBRATED = 0x01;
        /// The reference points hold real values
        const HAS_REFERENCE = 0x02;
    }
}

/// Error type for record encoding and decoding
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RecordError {
    /// Buffer shorter than the record
    BufferTooSmall,
    /// Region is still in the erased state
    Erased,
    /// Magic number does not match
    BadMagic,
    /// Record was written by an unknown format version
    UnsupportedVersion,
    /// Unknown flag bits or non-zero reserved field
    InvalidFlags,
    /// CRC32 does not match the record contents
    ChecksumMismatch,
    /// Uncalibrated record with non-identity coefficients
    InconsistentState,
}

impl core::fmt::Display for RecordError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            RecordError::BufferTooSmall => write!(f, "buffer too small for record"),
            RecordError::Erased => write!(f, "record region is erased"),
            RecordError::BadMagic => write!(f, "bad record magic"),
            RecordError::UnsupportedVersion => write!(f, "unsupported record version"),
            RecordError::InvalidFlags => write!(f, "invalid record flags"),
            RecordError::ChecksumMismatch => write!(f, "record checksum mismatch"),
            RecordError::InconsistentState => write!(f, "inconsistent calibration state"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for RecordError {}

/// Record codec selection
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RecordFormat {
    /// Bare 24-byte payload
    Legacy,
    /// Header + payload + CRC32
    Framed,
}

impl RecordFormat {
    /// Encoded length in bytes
    pub const fn len(self) -> usize {
        match self {
            RecordFormat::Legacy => LEGACY_RECORD_LEN,
            RecordFormat::Framed => FRAMED_RECORD_LEN,
        }
    }
}

/// Persisted fields of a calibration
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CalibrationRecord {
    /// Multiplicative coefficient
    pub gain: f32,
    /// Additive coefficient
    pub offset: f32,
    /// Reference points of the last calibration
    pub reference: Option<ReferencePoints>,
}

impl CalibrationRecord {
    /// Serialize the 24-byte payload
    pub fn to_legacy_bytes(&self) -> [u8; LEGACY_RECORD_LEN] {
        let mut buf = [ERASED_BYTE; LEGACY_RECORD_LEN];
        buf[0..4].copy_from_slice(&self.gain.to_le_bytes());
        buf[4..8].copy_from_slice(&self.offset.to_le_bytes());

        if let Some(reference) = &self.reference {
            let values = [
                reference.inputs[0],
                reference.inputs[1],
                reference.outputs[0],
                reference.outputs[1],
            ];
            for (chunk, value) in buf[REFERENCE_OFFSET..REFERENCE_OFFSET + REFERENCE_LEN]
                .chunks_exact_mut(4)
                .zip(values)
            {
                chunk.copy_from_slice(&value.to_le_bytes());
            }
        }

        buf
    }

    /// Deserialize the 24-byte payload
    ///
    /// A reference region of sixteen 0xFF bytes decodes to `None`, even when
    /// it was written from `Some` points that are all the 0xFFFF_FFFF NaN.
    pub fn from_legacy_bytes(buf: &[u8; LEGACY_RECORD_LEN]) -> Self {
        let gain = read_f32(buf, 0);
        let offset = read_f32(buf, 4);

        let reference = if is_erased(&buf[REFERENCE_OFFSET..REFERENCE_OFFSET + REFERENCE_LEN]) {
            None
        } else {
            Some(ReferencePoints::new(
                [read_f32(buf, 8), read_f32(buf, 12)],
                [read_f32(buf, 16), read_f32(buf, 20)],
            ))
        };

        Self {
            gain,
            offset,
            reference,
        }
    }

    /// Write the legacy record into the front of `buf`
    ///
    /// Returns the number of bytes written.
    pub fn encode_legacy(&self, buf: &mut [u8]) -> Result<usize, RecordError> {
        let dst = buf
            .get_mut(..LEGACY_RECORD_LEN)
            .ok_or(RecordError::BufferTooSmall)?;
        dst.copy_from_slice(&self.to_legacy_bytes());
        Ok(LEGACY_RECORD_LEN)
    }

    /// Read a legacy record from the front of `buf`
    ///
    /// The payload carries no integrity information, so any 24 bytes decode.
    pub fn decode_legacy(buf: &[u8]) -> Result<Self, RecordError> {
        let src: &[u8; LEGACY_RECORD_LEN] = buf
            .get(..LEGACY_RECORD_LEN)
            .and_then(|s| s.try_into().ok())
            .ok_or(RecordError::BufferTooSmall)?;
        Ok(Self::from_legacy_bytes(src))
    }

    /// Write a framed record into the front of `buf`
    pub fn encode_framed(&self, calibrated: bool, buf: &mut [u8]) -> Result<usize, RecordError> {
        let dst = buf
            .get_mut(..FRAMED_RECORD_LEN)
            .ok_or(RecordError::BufferTooSmall)?;

        let mut flags = RecordFlags::empty();
        flags.set(RecordFlags::CALIBRATED, calibrated);
        flags.set(RecordFlags::HAS_REFERENCE, self.reference.is_some());

        dst[0..4].copy_from_slice(&RECORD_MAGIC.to_le_bytes());
        dst[4] = RECORD_VERSION;
        dst[5] = flags.bits();
        dst[6..8].copy_from_slice(&0u16.to_le_bytes());
        dst[FRAME_HEADER_LEN..FRAME_HEADER_LEN + LEGACY_RECORD_LEN]
            .copy_from_slice(&self.to_legacy_bytes());

        let crc_offset = FRAME_HEADER_LEN + LEGACY_RECORD_LEN;
        let crc = CRC32.checksum(&dst[..crc_offset]);
        dst[crc_offset..].copy_from_slice(&crc.to_le_bytes());

        Ok(FRAMED_RECORD_LEN)
    }

    /// Read and validate a framed record from the front of `buf`
    ///
    /// Returns the record and its calibrated flag.
    pub fn decode_framed(buf: &[u8]) -> Result<(Self, bool), RecordError> {
        let src = buf
            .get(..FRAMED_RECORD_LEN)
            .ok_or(RecordError::BufferTooSmall)?;

        if is_erased(src) {
            return Err(RecordError::Erased);
        }

        let magic = u32::from_le_bytes([src[0], src[1], src[2], src[3]]);
        if magic != RECORD_MAGIC {
            return Err(RecordError::BadMagic);
        }
        if src[4] != RECORD_VERSION {
            return Err(RecordError::UnsupportedVersion);
        }

        let crc_offset = FRAME_HEADER_LEN + LEGACY_RECORD_LEN;
        let stored_crc = u32::from_le_bytes([
            src[crc_offset],
            src[crc_offset + 1],
            src[crc_offset + 2],
            src[crc_offset + 3],
        ]);
        if CRC32.checksum(&src[..crc_offset]) != stored_crc {
            return Err(RecordError::ChecksumMismatch);
        }

        let flags = RecordFlags::from_bits(src[5]).ok_or(RecordError::InvalidFlags)?;
        if u16::from_le_bytes([src[6], src[7]]) != 0 {
            return Err(RecordError::InvalidFlags);
        }

        let mut payload = [0u8; LEGACY_RECORD_LEN];
        payload.copy_from_slice(&src[FRAME_HEADER_LEN..crc_offset]);
        let mut record = Self::from_legacy_bytes(&payload);

        // The flag is authoritative, not the byte pattern
        record.reference = if flags.contains(RecordFlags::HAS_REFERENCE) {
            Some(ReferencePoints::new(
                [read_f32(&payload, 8), read_f32(&payload, 12)],
                [read_f32(&payload, 16), read_f32(&payload, 20)],
            ))
        } else {
            None
        };

        let calibrated = flags.contains(RecordFlags::CALIBRATED);
        if !calibrated && (record.gain != 1.0 || record.offset != 0.0) {
            return Err(RecordError::InconsistentState);
        }

        Ok((record, calibrated))
    }
}

impl From<&TwoPointCalibration> for CalibrationRecord {
    fn from(calibration: &TwoPointCalibration) -> Self {
        calibration.to_record()
    }
}

/// Encode a model in the given format
pub fn encode(
    calibration: &TwoPointCalibration,
    format: RecordFormat,
    buf: &mut [u8],
) -> Result<usize, RecordError> {
    let record = calibration.to_record();
    match format {
        RecordFormat::Legacy => record.encode_legacy(buf),
        RecordFormat::Framed => record.encode_framed(calibration.is_calibrated(), buf),
    }
}

/// Decode a record in the given format into `calibration`
///
/// Legacy records always mark the model calibrated. Framed records restore
/// the stored flag. On error the model is left unchanged.
pub fn decode(
    calibration: &mut TwoPointCalibration,
    format: RecordFormat,
    buf: &[u8],
) -> Result<(), RecordError> {
    let (record, calibrated) = match format {
        RecordFormat::Legacy => (CalibrationRecord::decode_legacy(buf)?, true),
        RecordFormat::Framed => CalibrationRecord::decode_framed(buf)?,
    };
    calibration.restore(&record, calibrated);
    Ok(())
}

/// Whether every byte is in the erased state
pub fn is_erased(bytes: &[u8]) -> bool {
    bytes.iter().all(|&b| b == ERASED_BYTE)
}

fn read_f32(buf: &[u8; LEGACY_RECORD_LEN], at: usize) -> f32 {
    f32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}
