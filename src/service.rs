//! Calibration service
//!
//! Ties the calibration model to its non-volatile record. The control loop
//! constructs one service with the storage adapter of its board and owns it;
//! there is no global calibration state.
//!
//! ```ignore
//! let storage = NorFlashStorage::new(flash, CALIBRATION_SECTOR)?;
//! let mut service = CalibrationService::new(storage, StoreConfig::default());
//! service.load()?;
//!
//! loop {
//!     let raw = adc.read();
//!     display.show(service.translate(raw));
//! }
//! ```

use crate::domain::{CalibrationError, TwoPointCalibration};
use crate::hmi_protocol::{CalibrationReport, ErrorCode, HmiCommand, HmiResponse, LoadStatus};
use crate::ports::storage::{CalibrationStorage, StorageError, StoreConfig};
use crate::record::{self, RecordError, RecordFormat, FRAMED_RECORD_LEN};

/// Error type for service operations
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ServiceError {
    /// Reference points rejected
    Calibration(CalibrationError),
    /// Record could not be encoded or decoded
    Record(RecordError),
    /// Non-volatile storage failed
    Storage(StorageError),
}

impl core::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ServiceError::Calibration(e) => write!(f, "calibration: {}", e),
            ServiceError::Record(e) => write!(f, "record: {}", e),
            ServiceError::Storage(e) => write!(f, "storage: {}", e),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ServiceError {}

impl From<CalibrationError> for ServiceError {
    fn from(e: CalibrationError) -> Self {
        ServiceError::Calibration(e)
    }
}

impl From<RecordError> for ServiceError {
    fn from(e: RecordError) -> Self {
        ServiceError::Record(e)
    }
}

impl From<StorageError> for ServiceError {
    fn from(e: StorageError) -> Self {
        ServiceError::Storage(e)
    }
}

impl ServiceError {
    /// Category reported to the HMI
    pub fn code(&self) -> ErrorCode {
        match self {
            ServiceError::Calibration(_) => ErrorCode::InvalidPoints,
            ServiceError::Record(_) => ErrorCode::Record,
            ServiceError::Storage(_) => ErrorCode::Storage,
        }
    }
}

/// What `load` found in storage
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LoadOutcome {
    /// A stored model was restored
    Restored,
    /// The region is erased, the current model is kept
    Blank,
    /// A framed record failed validation, defaults are in use
    Rejected(RecordError),
}

impl From<LoadOutcome> for LoadStatus {
    fn from(outcome: LoadOutcome) -> Self {
        match outcome {
            LoadOutcome::Restored => LoadStatus::Restored,
            LoadOutcome::Blank => LoadStatus::Blank,
            LoadOutcome::Rejected(_) => LoadStatus::Rejected,
        }
    }
}

/// Calibration model plus the storage that persists it
pub struct CalibrationService<S: CalibrationStorage> {
    model: TwoPointCalibration,
    storage: S,
    config: StoreConfig,
}

impl<S: CalibrationStorage> CalibrationService<S> {
    /// Create a service with an uncalibrated model
    ///
    /// Call [`load`](Self::load) before the first `translate` to restore a
    /// stored calibration.
    pub fn new(storage: S, config: StoreConfig) -> Self {
        Self::with_model(TwoPointCalibration::new(), storage, config)
    }

    /// Create a service around an existing model
    ///
    /// The model acts as a factory default: [`load`](Self::load) keeps it when
    /// storage is blank and replaces it when a record is found.
    pub fn with_model(model: TwoPointCalibration, storage: S, config: StoreConfig) -> Self {
        Self {
            model,
            storage,
            config,
        }
    }

    /// Current model
    pub fn model(&self) -> &TwoPointCalibration {
        &self.model
    }

    /// Storage adapter
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Active configuration
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Record format in use
    pub fn format(&self) -> RecordFormat {
        self.config.format
    }

    /// Split into model, storage and configuration
    pub fn into_parts(self) -> (TwoPointCalibration, S, StoreConfig) {
        (self.model, self.storage, self.config)
    }

    /// Restore the model from storage
    ///
    /// An erased region is never decoded: the legacy record would turn it
    /// into a NaN model. A blank region keeps the current model, a rejected
    /// record resets it to identity.
    pub fn load(&mut self) -> Result<LoadOutcome, ServiceError> {
        let format = self.config.format;
        let mut buf = [0u8; FRAMED_RECORD_LEN];
        let buf = &mut buf[..format.len()];
        self.storage.read(self.config.offset, buf)?;

        if record::is_erased(buf) {
            info!("no stored calibration, keeping current model");
            return Ok(LoadOutcome::Blank);
        }

        let mut restored = TwoPointCalibration::new();
        match record::decode(&mut restored, format, buf) {
            Ok(()) => {
                self.model = restored;
                info!(
                    "restored calibration gain={} offset={}",
                    self.model.gain(),
                    self.model.offset()
                );
                Ok(LoadOutcome::Restored)
            }
            Err(e) => {
                warn!("stored calibration rejected: {:?}", e);
                self.model = TwoPointCalibration::new();
                Ok(LoadOutcome::Rejected(e))
            }
        }
    }

    /// Write the model to storage in the configured format
    pub fn persist(&mut self) -> Result<(), ServiceError> {
        let model = self.model;
        self.write_record(&model)
    }

    /// Fit the model from two (input, output) pairs
    ///
    /// With `validate_points` the points are checked first and a rejected pair
    /// leaves the model unchanged. Without it the unchecked fit runs and
    /// degenerate points propagate into the model.
    ///
    /// The new model only goes live once it is persisted: a failed write
    /// leaves the previous model in place.
    pub fn calibrate(&mut self, inputs: [f32; 2], outputs: [f32; 2]) -> Result<(), ServiceError> {
        let mut next = self.model;
        if self.config.validate_points {
            if let Err(e) = next.try_calibrate(inputs, outputs) {
                warn!("calibration points rejected: {:?}", e);
                return Err(e.into());
            }
        } else {
            next.calibrate(inputs, outputs);
        }

        self.commit(next)?;
        info!(
            "calibrated gain={} offset={}",
            self.model.gain(),
            self.model.offset()
        );
        Ok(())
    }

    /// Convert a raw sample to an engineering value
    #[inline]
    pub fn translate(&self, raw: f32) -> f32 {
        self.model.translate(raw)
    }

    /// Operator reset: back to the identity model
    ///
    /// Like [`calibrate`](Self::calibrate), the model is unchanged when the
    /// write fails.
    pub fn clear(&mut self) -> Result<(), ServiceError> {
        let mut next = self.model;
        next.clear_calibration_data();
        self.commit(next)?;
        info!("calibration cleared");
        Ok(())
    }

    /// Answer one HMI request
    pub fn handle(&mut self, command: HmiCommand) -> HmiResponse {
        let result = match command {
            HmiCommand::Calibrate { inputs, outputs } => self.calibrate(inputs, outputs),
            HmiCommand::Translate { raw } => {
                return HmiResponse::Translated {
                    value: self.translate(raw),
                }
            }
            HmiCommand::Clear => self.clear(),
            HmiCommand::Save => self.persist(),
            HmiCommand::Load => {
                return match self.load() {
                    Ok(outcome) => HmiResponse::Loaded {
                        status: outcome.into(),
                    },
                    Err(e) => HmiResponse::Error { code: e.code() },
                }
            }
            HmiCommand::Report => return HmiResponse::Report(CalibrationReport::from(&self.model)),
        };

        match result {
            Ok(()) => HmiResponse::Ok,
            Err(e) => {
                error!("hmi request failed: {:?}", e);
                HmiResponse::Error { code: e.code() }
            }
        }
    }

    /// Persist `next` when configured, then make it the live model
    fn commit(&mut self, next: TwoPointCalibration) -> Result<(), ServiceError> {
        if self.config.persist_on_change {
            self.write_record(&next)?;
        }
        self.model = next;
        Ok(())
    }

    fn write_record(&mut self, model: &TwoPointCalibration) -> Result<(), ServiceError> {
        let mut buf = [0u8; FRAMED_RECORD_LEN];
        let len = record::encode(model, self.config.format, &mut buf)?;
        self.storage.write(self.config.offset, &buf[..len])?;
        debug!("persisted {} byte calibration record", len);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::RamStorage;
    use crate::record::{CalibrationRecord, LEGACY_RECORD_LEN};

    type Ram = RamStorage<64>;

    fn service(config: StoreConfig) -> CalibrationService<Ram> {
        CalibrationService::new(Ram::new(), config)
    }

    #[test]
    fn test_load_blank_storage() {
        for config in [StoreConfig::framed(), StoreConfig::legacy()] {
            let mut svc = service(config);

            assert_eq!(svc.load(), Ok(LoadOutcome::Blank));
            assert_eq!(svc.model(), &TwoPointCalibration::IDENTITY);
            assert_eq!(svc.translate(5.0), 5.0);
        }
    }

    #[test]
    fn test_calibrate_persists_and_reloads() {
        let mut svc = service(StoreConfig::default());
        svc.calibrate([0.0, 10.0], [32.0, 212.0]).unwrap();
        assert_eq!(svc.storage().write_count(), 1);

        let (_, storage, config) = svc.into_parts();
        let mut reloaded = CalibrationService::new(storage, config);

        assert_eq!(reloaded.load(), Ok(LoadOutcome::Restored));
        assert_eq!(reloaded.model().gain(), 18.0);
        assert_eq!(reloaded.model().offset(), 32.0);
        assert_eq!(reloaded.translate(212.0), 10.0);
    }

    #[test]
    fn test_legacy_record_location() {
        let config = StoreConfig::legacy().at_offset(16);
        let mut svc = CalibrationService::with_model(
            TwoPointCalibration::with_gain_offset(2.0, 1.0),
            Ram::new(),
            config,
        );
        svc.persist().unwrap();

        let bytes = svc.storage().as_bytes();
        assert!(bytes[..16].iter().all(|&b| b == 0xFF));
        assert_eq!(&bytes[16..20], &2.0f32.to_le_bytes());
        assert_eq!(&bytes[20..24], &1.0f32.to_le_bytes());
        assert!(bytes[16 + LEGACY_RECORD_LEN..].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_clear_persists_uncalibrated() {
        let mut svc = service(StoreConfig::framed());
        svc.calibrate([0.0, 10.0], [32.0, 212.0]).unwrap();
        svc.clear().unwrap();

        let (_, storage, config) = svc.into_parts();
        let mut reloaded = CalibrationService::new(storage, config);

        assert_eq!(reloaded.load(), Ok(LoadOutcome::Restored));
        assert!(!reloaded.model().is_calibrated());
        assert_eq!(reloaded.model().gain(), 1.0);
        assert!(reloaded.model().reference().is_some());
    }

    #[test]
    fn test_legacy_reload_after_clear_is_calibrated() {
        let mut svc = service(StoreConfig::legacy());
        svc.calibrate([0.0, 10.0], [32.0, 212.0]).unwrap();
        svc.clear().unwrap();

        let (_, storage, config) = svc.into_parts();
        let mut reloaded = CalibrationService::new(storage, config);

        assert_eq!(reloaded.load(), Ok(LoadOutcome::Restored));
        assert!(reloaded.model().is_calibrated());
        assert_eq!(reloaded.translate(7.0), 7.0);
    }

    #[test]
    fn test_rejected_points_leave_model() {
        let mut svc = service(StoreConfig::default());
        svc.calibrate([0.0, 10.0], [32.0, 212.0]).unwrap();

        assert_eq!(
            svc.calibrate([3.0, 3.0], [1.0, 2.0]),
            Err(ServiceError::Calibration(CalibrationError::DegenerateInputs))
        );
        assert_eq!(svc.model().gain(), 18.0);
        assert_eq!(svc.storage().write_count(), 1);
    }

    #[test]
    fn test_unvalidated_points_propagate() {
        let mut svc = service(StoreConfig::legacy());

        svc.calibrate([3.0, 3.0], [1.0, 2.0]).unwrap();

        assert!(!svc.translate(1.0).is_finite());
    }

    #[test]
    fn test_no_persist_without_config() {
        let config = StoreConfig {
            persist_on_change: false,
            ..StoreConfig::default()
        };
        let mut svc = service(config);

        svc.calibrate([0.0, 10.0], [32.0, 212.0]).unwrap();
        svc.clear().unwrap();

        assert_eq!(svc.storage().write_count(), 0);
    }

    #[test]
    fn test_corrupted_record_rejected() {
        let mut svc = service(StoreConfig::framed());
        svc.calibrate([0.0, 10.0], [32.0, 212.0]).unwrap();

        let (_, mut storage, config) = svc.into_parts();
        storage.as_bytes_mut()[10] ^= 0x04;
        let mut reloaded = CalibrationService::new(storage, config);

        assert_eq!(
            reloaded.load(),
            Ok(LoadOutcome::Rejected(RecordError::ChecksumMismatch))
        );
        assert_eq!(reloaded.model(), &TwoPointCalibration::IDENTITY);
    }

    #[test]
    fn test_load_keeps_factory_model_on_blank() {
        let factory = TwoPointCalibration::with_gain_offset(3.0, 0.0);
        let mut svc = CalibrationService::with_model(factory, Ram::new(), StoreConfig::framed());

        assert_eq!(svc.load(), Ok(LoadOutcome::Blank));
        assert_eq!(svc.model(), &factory);
        assert_eq!(svc.translate(9.0), 3.0);
    }

    #[test]
    fn test_load_replaces_factory_model_with_record() {
        let mut svc = service(StoreConfig::framed());
        svc.calibrate([0.0, 10.0], [32.0, 212.0]).unwrap();

        let (_, storage, config) = svc.into_parts();
        let factory = TwoPointCalibration::with_gain_offset(3.0, 0.0);
        let mut reloaded = CalibrationService::with_model(factory, storage, config);

        assert_eq!(reloaded.load(), Ok(LoadOutcome::Restored));
        assert_eq!(reloaded.model().gain(), 18.0);
    }

    #[test]
    fn test_failed_write_keeps_previous_model() {
        let mut svc = service(StoreConfig::framed().at_offset(60));

        assert_eq!(
            svc.calibrate([0.0, 10.0], [32.0, 212.0]),
            Err(ServiceError::Storage(StorageError::OutOfBounds))
        );
        assert_eq!(svc.model(), &TwoPointCalibration::IDENTITY);
        assert_eq!(svc.translate(212.0), 212.0);

        assert_eq!(
            svc.handle(HmiCommand::calibrate([0.0, 10.0], [32.0, 212.0])),
            HmiResponse::Error {
                code: ErrorCode::Storage
            }
        );
        assert!(!svc.model().is_calibrated());
    }

    #[test]
    fn test_failed_write_keeps_model_on_clear() {
        let calibrated = {
            let mut cal = TwoPointCalibration::new();
            cal.calibrate([0.0, 10.0], [32.0, 212.0]);
            cal
        };
        let mut svc = CalibrationService::with_model(
            calibrated,
            Ram::new(),
            StoreConfig::framed().at_offset(60),
        );

        assert_eq!(svc.clear(), Err(ServiceError::Storage(StorageError::OutOfBounds)));
        assert_eq!(svc.model(), &calibrated);
        assert_eq!(svc.translate(212.0), 10.0);
    }

    #[test]
    fn test_record_past_storage_end() {
        let mut svc = service(StoreConfig::framed().at_offset(40));

        assert_eq!(
            svc.load(),
            Err(ServiceError::Storage(StorageError::OutOfBounds))
        );
        assert_eq!(
            svc.persist(),
            Err(ServiceError::Storage(StorageError::OutOfBounds))
        );
    }

    #[test]
    fn test_handle_commands() {
        let mut svc = service(StoreConfig::default());

        assert_eq!(
            svc.handle(HmiCommand::calibrate([0.0, 10.0], [32.0, 212.0])),
            HmiResponse::Ok
        );
        assert_eq!(
            svc.handle(HmiCommand::translate(212.0)),
            HmiResponse::Translated { value: 10.0 }
        );

        match svc.handle(HmiCommand::Report) {
            HmiResponse::Report(report) => {
                assert_eq!(report.gain, 18.0);
                assert_eq!(report.offset, 32.0);
                assert!(report.calibrated);
                assert_eq!(report.reference.unwrap().inputs, [0.0, 10.0]);
            }
            other => panic!("unexpected response {:?}", other),
        }

        assert_eq!(svc.handle(HmiCommand::Clear), HmiResponse::Ok);
        assert_eq!(
            svc.handle(HmiCommand::translate(212.0)),
            HmiResponse::Translated { value: 212.0 }
        );

        assert_eq!(
            svc.handle(HmiCommand::Load),
            HmiResponse::Loaded {
                status: LoadStatus::Restored
            }
        );
        assert!(!svc.model().is_calibrated());
    }

    #[test]
    fn test_handle_reports_errors() {
        let mut svc = service(StoreConfig::default());

        assert_eq!(
            svc.handle(HmiCommand::calibrate([1.0, 1.0], [0.0, 5.0])),
            HmiResponse::Error {
                code: ErrorCode::InvalidPoints
            }
        );

        let mut far = service(StoreConfig::framed().at_offset(60));
        assert_eq!(
            far.handle(HmiCommand::Save),
            HmiResponse::Error {
                code: ErrorCode::Storage
            }
        );
        assert_eq!(
            far.handle(HmiCommand::Load),
            HmiResponse::Error {
                code: ErrorCode::Storage
            }
        );
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let mut svc = CalibrationService::with_model(
            TwoPointCalibration::with_gain_offset(2.0, 1.0),
            Ram::new(),
            StoreConfig::default(),
        );

        assert_eq!(svc.handle(HmiCommand::Save), HmiResponse::Ok);

        let stored =
            CalibrationRecord::decode_framed(&svc.storage().as_bytes()[..FRAMED_RECORD_LEN])
                .unwrap();
        assert_eq!(
            stored,
            (
                CalibrationRecord {
                    gain: 2.0,
                    offset: 1.0,
                    reference: None
                },
                true
            )
        );
    }
}
