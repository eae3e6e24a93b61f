//! Two-point calibration domain service
//!
//! This module provides the linear calibration model that converts raw
//! measured values into engineering values.

use serde::{Deserialize, Serialize};

use crate::record::{CalibrationRecord, RecordError};

/// Errors from the checked calibration path
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CalibrationError {
    /// Both reference inputs are equal, the slope is undefined
    DegenerateInputs,
    /// Both reference outputs are equal, the model would have zero gain
    ZeroGain,
    /// A reference value or the resulting coefficients are NaN or infinite
    NonFinite,
}

impl core::fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            CalibrationError::DegenerateInputs => write!(f, "reference inputs must differ"),
            CalibrationError::ZeroGain => write!(f, "calibration would yield zero gain"),
            CalibrationError::NonFinite => write!(f, "non-finite calibration value"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for CalibrationError {}

/// The two (input, output) pairs used for the last calibration
///
/// Kept for diagnostics and re-display only. `translate` never reads them.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ReferencePoints {
    /// Raw inputs `x0`, `x1`
    pub inputs: [f32; 2],
    /// Measured or target outputs `y0`, `y1`
    pub outputs: [f32; 2],
}

impl ReferencePoints {
    /// Create a reference set from two input and two output values
    pub const fn new(inputs: [f32; 2], outputs: [f32; 2]) -> Self {
        Self { inputs, outputs }
    }
}

/// Linear two-point calibration
///
/// The model is fitted as `y = gain * x + offset` from two reference pairs.
/// Live values are converted through the inverse of that model:
///
/// ```text
/// output = (input - offset) / gain
/// ```
///
/// A default instance is the uncalibrated identity (`gain = 1`,
/// `offset = 0`).
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TwoPointCalibration {
    gain: f32,
    offset: f32,
    reference: Option<ReferencePoints>,
    calibrated: bool,
}

impl TwoPointCalibration {
    /// Uncalibrated identity model
    pub const IDENTITY: Self = Self {
        gain: 1.0,
        offset: 0.0,
        reference: None,
        calibrated: false,
    };

    /// Create an uncalibrated identity model
    pub const fn new() -> Self {
        Self::IDENTITY
    }

    /// Create a calibrated model from a known gain and offset
    ///
    /// No reference points are known for an externally supplied model, so
    /// `reference()` returns `None`. `gain` must be non-zero.
    pub const fn with_gain_offset(gain: f32, offset: f32) -> Self {
        Self {
            gain,
            offset,
            reference: None,
            calibrated: true,
        }
    }

    /// Fit gain and offset from two (input, output) pairs
    ///
    /// ```text
    /// gain   = (y0 - y1) / (x0 - x1)
    /// offset = y0 - gain * x0
    /// ```
    ///
    /// The caller guarantees `inputs[0] != inputs[1]`. This is not checked:
    /// equal inputs produce an infinite or NaN gain that propagates into every
    /// later `translate`. Use [`try_calibrate`](Self::try_calibrate) for the
    /// checked variant.
    pub fn calibrate(&mut self, inputs: [f32; 2], outputs: [f32; 2]) {
        let (gain, offset) = fit(inputs, outputs);

        self.gain = gain;
        self.offset = offset;
        self.reference = Some(ReferencePoints::new(inputs, outputs));
        self.calibrated = true;
    }

    /// Fit gain and offset, rejecting points that cannot give a usable model
    ///
    /// On error the model is left unchanged.
    pub fn try_calibrate(
        &mut self,
        inputs: [f32; 2],
        outputs: [f32; 2],
    ) -> Result<(), CalibrationError> {
        if inputs.iter().chain(outputs.iter()).any(|v| !v.is_finite()) {
            return Err(CalibrationError::NonFinite);
        }
        if inputs[0] == inputs[1] {
            return Err(CalibrationError::DegenerateInputs);
        }

        let (gain, offset) = fit(inputs, outputs);
        if gain == 0.0 {
            return Err(CalibrationError::ZeroGain);
        }
        if !gain.is_finite() || !offset.is_finite() {
            return Err(CalibrationError::NonFinite);
        }

        self.calibrate(inputs, outputs);
        Ok(())
    }

    /// Convert a raw value through the inverse of the fitted model
    ///
    /// Division by a zero gain is a precondition violation, not an error: the
    /// result is whatever IEEE-754 produces.
    #[inline]
    pub fn translate(&self, input: f32) -> f32 {
        (input - self.offset) / self.gain
    }

    /// Evaluate the fitted model `gain * x + offset`
    #[inline]
    pub fn forward(&self, x: f32) -> f32 {
        self.gain * x + self.offset
    }

    /// Reset to the identity model and clear the calibrated flag
    ///
    /// Reference points are left as they are.
    pub fn clear_calibration_data(&mut self) {
        self.gain = 1.0;
        self.offset = 0.0;
        self.calibrated = false;
    }

    /// Multiplicative coefficient
    pub const fn gain(&self) -> f32 {
        self.gain
    }

    /// Additive coefficient, in output units
    pub const fn offset(&self) -> f32 {
        self.offset
    }

    /// Whether gain and offset were derived or restored
    pub const fn is_calibrated(&self) -> bool {
        self.calibrated
    }

    /// Reference points of the last calibration, if known
    pub const fn reference(&self) -> Option<&ReferencePoints> {
        self.reference.as_ref()
    }

    /// Snapshot of the persisted fields
    pub fn to_record(&self) -> CalibrationRecord {
        CalibrationRecord {
            gain: self.gain,
            offset: self.offset,
            reference: self.reference,
        }
    }

    /// Overwrite gain, offset and reference from a record
    ///
    /// `calibrated` decides the flag. For an uncalibrated record the identity
    /// coefficients are kept so the flag never contradicts the model.
    pub(crate) fn restore(&mut self, record: &CalibrationRecord, calibrated: bool) {
        self.reference = record.reference;
        if calibrated {
            self.gain = record.gain;
            self.offset = record.offset;
            self.calibrated = true;
        } else {
            self.clear_calibration_data();
        }
    }

    /// Write the 24-byte legacy record into `buf`
    ///
    /// Returns the number of bytes written. The calibrated flag is not part of
    /// the record.
    ///
    /// Missing reference points are stored as sixteen 0xFF bytes. Points whose
    /// bits are all 0xFFFF_FFFF (a NaN pattern) encode to the same bytes and
    /// decode back as missing.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize, RecordError> {
        self.to_record().encode_legacy(buf)
    }

    /// Read a 24-byte legacy record from `buf`
    ///
    /// Gain, offset and reference are overwritten and the model is marked
    /// calibrated whatever the bytes contain. The caller must know the region
    /// was written by [`encode`](Self::encode); erased flash decodes to a NaN
    /// gain.
    pub fn decode(&mut self, buf: &[u8]) -> Result<(), RecordError> {
        let record = CalibrationRecord::decode_legacy(buf)?;
        self.restore(&record, true);
        Ok(())
    }
}

impl Default for TwoPointCalibration {
    fn default() -> Self {
        Self::IDENTITY
    }
}

fn fit(inputs: [f32; 2], outputs: [f32; 2]) -> (f32, f32) {
    let gain = (outputs[0] - outputs[1]) / (inputs[0] - inputs[1]);
    let offset = outputs[0] - gain * inputs[0];
    (gain, offset)
}
