//! Register decoding and command framing through the public API.

use embedded_sdlock::sdmmc::lock::MAX_PASSWORD_LEN;
use embedded_sdlock::sdmmc_proto::{self, CRC7_TABLE};
use embedded_sdlock::{
    AcquireOpts, CardStatus, ChecksumMode, Cid, Command, Crc7Table, Csd, ErrorKind, LockMode, Ocr,
    Password, SdMmcError,
};

use hex_literal::hex;

#[test]
fn crc7_table_is_a_pure_function() {
    let a = Crc7Table::build();
    let b = Crc7Table::build();
    assert_eq!(a, b);
    assert_eq!(a, CRC7_TABLE);
    assert_eq!(a.get(0x00), 0x00);
    // Every entry is a 7-bit remainder
    assert!((0..=255u8).all(|byte| a.get(byte) & 0x80 == 0));
}

#[test]
fn reset_frame_matches_the_well_known_one() {
    let reset = Command::new(sdmmc_proto::CMD0, 0);
    assert_eq!(
        reset.frame(ChecksumMode::Computed),
        [0x40, 0x00, 0x00, 0x00, 0x00, 0x95]
    );
    let if_cond = Command::new(sdmmc_proto::CMD8, sdmmc_proto::IF_COND_CHECK_PATTERN);
    assert_eq!(
        if_cond.frame(ChecksumMode::Computed),
        [0x48, 0x00, 0x00, 0x01, 0xAA, 0x87]
    );
    assert_eq!(if_cond.frame(ChecksumMode::Fixed), if_cond.frame(ChecksumMode::Computed));
}

#[test]
fn read_frame_carries_address_big_endian() {
    let read = Command::new(sdmmc_proto::CMD17, 0x0000_0600);
    let frame = read.frame(ChecksumMode::Fixed);
    assert_eq!(frame[..5], [0x51, 0x00, 0x00, 0x06, 0x00]);
    assert_eq!(frame[5], sdmmc_proto::PLACEHOLDER_CRC);
    assert_eq!(frame[5] & 0x01, 0x01);
}

#[test]
fn default_opts() {
    let opts = AcquireOpts::default();
    assert_eq!(opts.checksum, ChecksumMode::Computed);
    assert_eq!(opts.reset_attempts, 16);
    assert_eq!(opts.token_polls, 100);
    assert_eq!(opts.busy_polls, 0xFFFF);
}

#[test]
fn csd_version_is_picked_from_the_top_bits() {
    let v1 = Csd::from_bytes(hex!("00 26 00 32 5F 59 83 C8 AD DB CF FF D2 40 40 A5"));
    let v2 = Csd::from_bytes(hex!("40 0E 00 32 5B 59 00 00 1D 69 7F 80 0A 40 00 8B"));
    assert!(matches!(v1, Csd::V1(_)));
    assert!(matches!(v2, Csd::V2(_)));
    assert_eq!(v2.card_capacity_blocks() as u64 * 512, v2.card_capacity_bytes());
}

#[test]
fn cid_fields() {
    let cid = Cid {
        data: hex!("03 53 44 53 55 30 38 47 80 12 34 56 78 01 4A 75"),
    };
    assert_eq!(&cid.product_name(), b"SU08G");
    assert_eq!(cid.serial_number(), 0x1234_5678);
    assert_eq!(cid.manufacturing_year(), 2020);
}

#[test]
fn ocr_fields() {
    let ocr = Ocr {
        data: hex!("C0 FF 80 00"),
    };
    assert!(ocr.power_up_complete());
    assert!(ocr.card_capacity_status());
    assert_eq!(ocr.value(), 0xC0FF_8000);
}

#[test]
fn status_fields() {
    let status = CardStatus { data: [0x00, 0x03] };
    assert!(status.card_is_locked());
    assert!(status.lock_unlock_failed());
    assert!(!status.out_of_range());
    let status = CardStatus { data: [0x01, 0x00] };
    assert!(status.in_idle_state());
    assert!(!status.card_is_locked());
}

#[test]
fn passwords() {
    let longest = [0x5A; MAX_PASSWORD_LEN];
    let password = Password::new(&longest).unwrap();
    assert_eq!(password.len(), MAX_PASSWORD_LEN);
    assert_eq!(password.payload_byte(MAX_PASSWORD_LEN), 0xFF);
    assert_eq!(
        Password::new(b"seventeen bytes!!"),
        Err(SdMmcError::PasswordTooLong(17))
    );
}

#[test]
fn lock_modes() {
    assert_eq!(LockMode::empty().wire_bits(), 0x00);
    assert_eq!((LockMode::SET_PWD | LockMode::LOCK_UNLOCK).wire_bits(), 0x05);
    assert_eq!(LockMode::all().wire_bits(), 0x07);
}

#[test]
fn error_kinds() {
    assert_eq!(SdMmcError::CardNotFound.kind(), ErrorKind::NoCardDetected);
    assert_eq!(SdMmcError::TimeoutReadBuffer.kind(), ErrorKind::Timeout);
    assert_eq!(SdMmcError::TimeoutWaitNotBusy.kind(), ErrorKind::Timeout);
    assert_eq!(SdMmcError::TimeoutACommand(41).kind(), ErrorKind::Timeout);
    assert_eq!(SdMmcError::ReadError.kind(), ErrorKind::ReadWriteFailure);
    assert_eq!(SdMmcError::RegisterReadError.kind(), ErrorKind::ReadWriteFailure);
    assert_eq!(SdMmcError::Transport.kind(), ErrorKind::Hardware);
    assert_eq!(SdMmcError::GpioError.kind(), ErrorKind::Hardware);
    assert_eq!(SdMmcError::BlockOutOfRange.kind(), ErrorKind::InvalidInput);
}
