//! Message protocol between the HMI front-end and the calibration service
//!
//! The HMI acquires reference points from the operator, asks for live values
//! to be translated and triggers resets. These messages carry those requests.
//!
//! Messages are serialized using `postcard` with COBS encoding for framing,
//! so a zero byte always marks the end of a message on the link.

use heapless::Vec;
use serde::{Deserialize, Serialize};

use crate::domain::{ReferencePoints, TwoPointCalibration};

/// Maximum encoded message size, COBS overhead and sentinel included
pub const MAX_MESSAGE_SIZE: usize = 64;

/// Encoded message buffer
pub type MessageBuffer = Vec<u8, MAX_MESSAGE_SIZE>;

/// Error type for message encoding and decoding
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolError {
    /// Message does not fit in `MAX_MESSAGE_SIZE`
    MessageTooLarge,
    /// Serialization failed
    EncodeFailed,
    /// Bytes are not a valid COBS frame or message
    InvalidFormat,
}

impl core::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ProtocolError::MessageTooLarge => write!(f, "message too large"),
            ProtocolError::EncodeFailed => write!(f, "message encoding failed"),
            ProtocolError::InvalidFormat => write!(f, "invalid message format"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ProtocolError {}

/// Command sent from the HMI to the calibration service
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum HmiCommand {
    /// Fit the model from two (input, output) pairs
    Calibrate { inputs: [f32; 2], outputs: [f32; 2] },

    /// Convert one raw sample
    Translate { raw: f32 },

    /// Operator reset: back to the identity model
    Clear,

    /// Write the current model to non-volatile storage
    Save,

    /// Reload the model from non-volatile storage
    Load,

    /// Ask for the current model and reference points
    Report,
}

impl HmiCommand {
    /// Create calibrate command
    pub fn calibrate(inputs: [f32; 2], outputs: [f32; 2]) -> Self {
        Self::Calibrate { inputs, outputs }
    }

    /// Create translate command
    pub fn translate(raw: f32) -> Self {
        Self::Translate { raw }
    }
}

/// Current model state, for diagnostics and re-display
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReport {
    /// Multiplicative coefficient
    pub gain: f32,
    /// Additive coefficient
    pub offset: f32,
    /// Whether the model is calibrated
    pub calibrated: bool,
    /// Reference points of the last calibration
    pub reference: Option<ReferencePoints>,
}

impl From<&TwoPointCalibration> for CalibrationReport {
    fn from(calibration: &TwoPointCalibration) -> Self {
        Self {
            gain: calibration.gain(),
            offset: calibration.offset(),
            calibrated: calibration.is_calibrated(),
            reference: calibration.reference().copied(),
        }
    }
}

/// Result of a load request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LoadStatus {
    /// A stored model was restored
    Restored,
    /// Storage held no record, the current model is kept
    Blank,
    /// A record was found but failed validation, identity is in use
    Rejected,
}

/// Error categories reported back to the HMI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ErrorCode {
    /// Reference points rejected
    InvalidPoints,
    /// Non-volatile storage failed
    Storage,
    /// Record could not be encoded or decoded
    Record,
}

/// Response sent from the calibration service to the HMI
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum HmiResponse {
    /// Success
    Ok,

    /// Translated value
    Translated { value: f32 },

    /// Model state
    Report(CalibrationReport),

    /// Load result
    Loaded { status: LoadStatus },

    /// Request failed
    Error { code: ErrorCode },
}

/// COBS-encode a command
pub fn encode_command(command: &HmiCommand) -> Result<MessageBuffer, ProtocolError> {
    encode(command)
}

/// Decode a COBS frame into a command
///
/// The frame is decoded in place, `frame` is clobbered.
pub fn decode_command(frame: &mut [u8]) -> Result<HmiCommand, ProtocolError> {
    postcard::from_bytes_cobs(frame).map_err(|_| ProtocolError::InvalidFormat)
}

/// COBS-encode a response
pub fn encode_response(response: &HmiResponse) -> Result<MessageBuffer, ProtocolError> {
    encode(response)
}

/// Decode a COBS frame into a response
///
/// The frame is decoded in place, `frame` is clobbered.
pub fn decode_response(frame: &mut [u8]) -> Result<HmiResponse, ProtocolError> {
    postcard::from_bytes_cobs(frame).map_err(|_| ProtocolError::InvalidFormat)
}

fn encode<T: Serialize>(message: &T) -> Result<MessageBuffer, ProtocolError> {
    let mut buf = [0u8; MAX_MESSAGE_SIZE];
    let used = postcard::to_slice_cobs(message, &mut buf).map_err(|e| match e {
        postcard::Error::SerializeBufferFull => ProtocolError::MessageTooLarge,
        _ => ProtocolError::EncodeFailed,
    })?;
    Vec::from_slice(used).map_err(|_| ProtocolError::MessageTooLarge)
}
