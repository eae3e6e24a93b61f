//! Power-cycle and HMI round trips through the public API

use embedded_storage::nor_flash::{ErrorType, NorFlash, NorFlashErrorKind, ReadNorFlash};
use hmi_calibration::hmi_protocol::{
    decode_command, decode_response, encode_command, encode_response,
};
use hmi_calibration::record::{LEGACY_RECORD_LEN, RECORD_MAGIC};
use hmi_calibration::{
    CalibrationService, CalibrationStorage, HmiCommand, HmiResponse, LoadOutcome, LoadStatus,
    NorFlashStorage, RamStorage, RecordError, StoreConfig, TwoPointCalibration,
};

const SECTOR: usize = 4096;

/// Two-sector NOR flash: erase to 0xFF, program clears bits
struct SimFlash {
    cells: Vec<u8>,
}

impl SimFlash {
    fn new() -> Self {
        Self {
            cells: vec![0xFF; 2 * SECTOR],
        }
    }
}

impl ErrorType for SimFlash {
    type Error = NorFlashErrorKind;
}

impl ReadNorFlash for SimFlash {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        let start = offset as usize;
        let cells = self
            .cells
            .get(start..start + bytes.len())
            .ok_or(NorFlashErrorKind::OutOfBounds)?;
        bytes.copy_from_slice(cells);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.cells.len()
    }
}

impl NorFlash for SimFlash {
    const WRITE_SIZE: usize = 4;
    const ERASE_SIZE: usize = SECTOR;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        self.cells[from as usize..to as usize].fill(0xFF);
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        let start = offset as usize;
        for (cell, byte) in self.cells[start..start + bytes.len()].iter_mut().zip(bytes) {
            *cell &= *byte;
        }
        Ok(())
    }
}

#[test]
fn survives_power_cycle_on_nor_flash() {
    let storage = NorFlashStorage::new(SimFlash::new(), SECTOR as u32).unwrap();
    let mut service = CalibrationService::new(storage, StoreConfig::default());

    assert_eq!(service.load(), Ok(LoadOutcome::Blank));
    service.calibrate([0.0, 10.0], [32.0, 212.0]).unwrap();

    // Power off: only the flash survives
    let (_, storage, config) = service.into_parts();
    let flash = storage.into_inner();

    let storage = NorFlashStorage::new(flash, SECTOR as u32).unwrap();
    let mut service = CalibrationService::new(storage, config);

    assert_eq!(service.load(), Ok(LoadOutcome::Restored));
    assert_eq!(service.translate(212.0), 10.0);
    assert_eq!(service.translate(32.0), 0.0);

    let magic = &service.storage().flash().cells[SECTOR..SECTOR + 4];
    assert_eq!(magic, &RECORD_MAGIC.to_le_bytes());
}

#[test]
fn reads_record_written_by_older_firmware() {
    // gain 2, offset 1, reference points never captured
    let mut region = [0xFF; 64];
    region[..4].copy_from_slice(&2.0f32.to_le_bytes());
    region[4..8].copy_from_slice(&1.0f32.to_le_bytes());

    let mut service =
        CalibrationService::new(RamStorage::from_bytes(region), StoreConfig::legacy());

    assert_eq!(service.load(), Ok(LoadOutcome::Restored));
    assert!(service.model().is_calibrated());
    assert!(service.model().reference().is_none());
    assert_eq!(service.translate(5.0), 2.0);
}

#[test]
fn legacy_record_is_byte_compatible() {
    let mut cal = TwoPointCalibration::new();
    cal.calibrate([0.0, 10.0], [32.0, 212.0]);

    let mut buf = [0u8; LEGACY_RECORD_LEN];
    assert_eq!(cal.encode(&mut buf), Ok(LEGACY_RECORD_LEN));

    assert_eq!(&buf[0..4], &18.0f32.to_le_bytes());
    assert_eq!(&buf[4..8], &32.0f32.to_le_bytes());
    assert_eq!(&buf[8..12], &0.0f32.to_le_bytes());
    assert_eq!(&buf[12..16], &10.0f32.to_le_bytes());
    assert_eq!(&buf[16..20], &32.0f32.to_le_bytes());
    assert_eq!(&buf[20..24], &212.0f32.to_le_bytes());
}

#[test]
fn torn_write_falls_back_to_identity() {
    let mut service = CalibrationService::new(RamStorage::<64>::new(), StoreConfig::framed());
    service.calibrate([0.0, 10.0], [32.0, 212.0]).unwrap();

    let (_, mut storage, config) = service.into_parts();
    // Tail of the record never made it to the medium
    storage.as_bytes_mut()[20..36].fill(0xFF);

    let mut service = CalibrationService::new(storage, config);
    assert_eq!(
        service.load(),
        Ok(LoadOutcome::Rejected(RecordError::ChecksumMismatch))
    );
    assert_eq!(service.translate(42.0), 42.0);
}

#[test]
fn hmi_session_over_cobs() {
    let mut service = CalibrationService::new(RamStorage::<64>::new(), StoreConfig::default());

    let mut exchange = |command: HmiCommand| -> HmiResponse {
        let mut request = encode_command(&command).unwrap();
        let received = decode_command(&mut request).unwrap();

        let mut reply = encode_response(&service.handle(received)).unwrap();
        decode_response(&mut reply).unwrap()
    };

    assert_eq!(
        exchange(HmiCommand::Load),
        HmiResponse::Loaded {
            status: LoadStatus::Blank
        }
    );
    assert_eq!(
        exchange(HmiCommand::calibrate([0.0, 100.0], [-40.0, 160.0])),
        HmiResponse::Ok
    );

    match exchange(HmiCommand::translate(60.0)) {
        HmiResponse::Translated { value } => assert!((value - 50.0).abs() < 1e-4),
        other => panic!("unexpected response {:?}", other),
    }

    assert_eq!(exchange(HmiCommand::Clear), HmiResponse::Ok);
    assert_eq!(
        exchange(HmiCommand::Load),
        HmiResponse::Loaded {
            status: LoadStatus::Restored
        }
    );
    assert_eq!(
        exchange(HmiCommand::translate(60.0)),
        HmiResponse::Translated { value: 60.0 }
    );
}

#[test]
fn storage_is_usable_through_a_reference() {
    let mut ram = RamStorage::<64>::new();

    {
        let mut service = CalibrationService::new(&mut ram, StoreConfig::default());
        service.calibrate([1.0, 2.0], [10.0, 20.0]).unwrap();
    }

    assert_eq!(ram.write_count(), 1);
    assert_eq!(ram.capacity(), 64);
}
