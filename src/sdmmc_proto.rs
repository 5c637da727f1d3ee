//! embedded-sdlock - Constants and register layouts from the SD Specifications
//!
//! Everything in here is a plain description of what goes over the wire in
//! SPI mode. Nothing in this module talks to hardware.

use core::convert::TryFrom;

//==============================================================================

// SD Card Commands

/// GO_IDLE_STATE - init card in spi mode if CS low
pub const CMD0: u8 = 0x00;
/// SEND_OP_COND - legacy initialization, used for standard capacity cards
pub const CMD1: u8 = 0x01;
/// SEND_IF_COND - verify SD Memory Card interface operating condition
pub const CMD8: u8 = 0x08;
/// SEND_CSD - read the Card Specific Data (CSD register)
pub const CMD9: u8 = 0x09;
/// SEND_CID - read the Card Identification (CID register)
pub const CMD10: u8 = 0x0A;
/// SEND_STATUS - read the card status register
pub const CMD13: u8 = 0x0D;
/// SET_BLOCKLEN - set the block length for standard capacity cards
pub const CMD16: u8 = 0x10;
/// READ_SINGLE_BLOCK - read a single data block from the card
pub const CMD17: u8 = 0x11;
/// LOCK_UNLOCK - set, clear, lock or unlock the card password
pub const CMD42: u8 = 0x2A;
/// APP_CMD - escape for application specific command
pub const CMD55: u8 = 0x37;
/// READ_OCR - read the OCR register of a card
pub const CMD58: u8 = 0x3A;
/// SD_SEND_OP_COMD - Sends host capacity support information and activates
/// the card's initialization process
pub const ACMD41: u8 = 0x29;

//==============================================================================

/// status for card in the ready state
pub const R1_READY_STATE: u8 = 0x00;

/// status for card in the idle state
pub const R1_IDLE_STATE: u8 = 0x01;

/// status bit for illegal command
pub const R1_ILLEGAL_COMMAND: u8 = 0x04;

/// An R1 response with this bit set is not a response yet
pub const R1_NOT_READY: u8 = 0x80;

/// start data token for read or write single block
pub const DATA_START_BLOCK: u8 = 0xFE;

/// What the card drives onto the line when it has nothing to say
pub const IDLE_FILL: u8 = 0xFF;

/// Block length set with CMD16 and used for every data transfer
pub const BLOCK_LEN: u32 = 512;

/// CMD8 argument: 2.7-3.6V supply plus the 0xAA check pattern
pub const IF_COND_CHECK_PATTERN: u32 = 0x1AA;

/// ACMD41 argument bit telling the card we support high capacity
pub const OCR_HCS: u32 = 0x4000_0000;

/// Polynomial for the command CRC7, top bit included
pub const CRC7_POLY: u8 = 0x89;

/// Precomputed checksum byte for CMD0 with a zero argument
pub const CMD0_CRC: u8 = 0x95;

/// Precomputed checksum byte for CMD8 with `IF_COND_CHECK_PATTERN`
pub const CMD8_CRC: u8 = 0x87;

/// Checksum byte sent for every other command when checksums are not computed
pub const PLACEHOLDER_CRC: u8 = 0xFF;

/// The table used for every command frame.
pub static CRC7_TABLE: Crc7Table = Crc7Table::build();

//==============================================================================

/// Lookup table for the 7-bit CRC protecting command frames.
#[derive(Clone, PartialEq, Eq)]
pub struct Crc7Table([u8; 256]);

impl Crc7Table {
    /// Divide every possible byte by `CRC7_POLY`, bit by bit.
    pub const fn build() -> Crc7Table {
        let mut table = [0u8; 256];
        let mut i = 0;
        while i < 256 {
            let byte = i as u8;
            let mut crc = if (byte & 0x80) != 0 {
                byte ^ CRC7_POLY
            } else {
                byte
            };
            let mut bit = 1;
            while bit < 8 {
                crc <<= 1;
                if (crc & 0x80) != 0 {
                    crc ^= CRC7_POLY;
                }
                bit += 1;
            }
            table[i] = crc;
            i += 1;
        }
        Crc7Table(table)
    }

    /// The remainder for a single byte.
    pub fn get(&self, byte: u8) -> u8 {
        self.0[usize::from(byte)]
    }

    /// Checksum `data` and return it the way it goes on the wire: seven CRC
    /// bits followed by the end bit.
    pub fn checksum(&self, data: &[u8]) -> u8 {
        let crc = data
            .iter()
            .fold(0u8, |crc, &byte| self.get((crc << 1) ^ byte));
        (crc << 1) | 1
    }
}

impl core::fmt::Debug for Crc7Table {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("Crc7Table").field(&&self.0[..]).finish()
    }
}

//==============================================================================

/// Operation Conditions Register
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct Ocr {
    /// The 4 bytes of the register, most significant first
    pub data: [u8; 4],
}

impl Ocr {
    /// Create a new, empty, OCR
    pub fn new() -> Ocr {
        Ocr::default()
    }

    fn data(&self) -> &[u8] {
        &self.data
    }

    /// The whole register as one word
    pub fn value(&self) -> u32 {
        u32::from_be_bytes(self.data)
    }

    define_field!(power_up_complete, bool, 0, 7);
    define_field!(card_capacity_status, bool, 0, 6);
    define_field!(voltage_window, u16, [(1, 0, 8), (2, 7, 1)]);
}

/// Whole blocks in `bytes`, saturating at the largest block count a `u32`
/// holds.
fn blocks_in(bytes: u64) -> u32 {
    u32::try_from(bytes / u64::from(BLOCK_LEN)).unwrap_or(u32::MAX)
}

/// Card Specific Data, version 1
#[derive(Default, Copy, Clone, PartialEq, Eq)]
pub struct CsdV1 {
    /// The 16-bytes of data in this Card Specific Data block
    pub data: [u8; 16],
}

/// Card Specific Data, version 2
#[derive(Default, Copy, Clone, PartialEq, Eq)]
pub struct CsdV2 {
    /// The 16-bytes of data in this Card Specific Data block
    pub data: [u8; 16],
}

/// Card Specific Data
#[derive(Copy, Clone, PartialEq, Eq)]
pub enum Csd {
    /// A version 1 CSD
    V1(CsdV1),
    /// A version 2 CSD
    V2(CsdV2),
}

impl Csd {
    /// Pick the layout from the CSD_STRUCTURE bits in the first byte.
    pub fn from_bytes(data: [u8; 16]) -> Csd {
        match data[0] >> 6 {
            0 => Csd::V1(CsdV1 { data }),
            _ => Csd::V2(CsdV2 { data }),
        }
    }

    /// The raw register
    pub fn data(&self) -> &[u8; 16] {
        match self {
            Csd::V1(csd) => &csd.data,
            Csd::V2(csd) => &csd.data,
        }
    }

    /// Returns the card capacity in bytes
    pub fn card_capacity_bytes(&self) -> u64 {
        match self {
            Csd::V1(csd) => csd.card_capacity_bytes(),
            Csd::V2(csd) => csd.card_capacity_bytes(),
        }
    }

    /// Returns the card capacity in 512-byte blocks
    pub fn card_capacity_blocks(&self) -> u32 {
        match self {
            Csd::V1(csd) => csd.card_capacity_blocks(),
            Csd::V2(csd) => csd.card_capacity_blocks(),
        }
    }

    /// Is the card write protected, temporarily or permanently?
    pub fn write_protected(&self) -> bool {
        match self {
            Csd::V1(csd) => {
                csd.temporary_write_protection() || csd.permanent_write_protection()
            }
            Csd::V2(csd) => {
                csd.temporary_write_protection() || csd.permanent_write_protection()
            }
        }
    }
}

impl core::fmt::Debug for Csd {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Csd::V1(_) => f.debug_tuple("Csd::V1").field(self.data()).finish(),
            Csd::V2(_) => f.debug_tuple("Csd::V2").field(self.data()).finish(),
        }
    }
}

impl CsdV1 {
    /// Create a new, empty, CSD
    pub fn new() -> CsdV1 {
        CsdV1::default()
    }

    fn data(&self) -> &[u8] {
        &self.data
    }

    define_field!(csd_ver, u8, 0, 6, 2);
    define_field!(data_read_access_time1, u8, 1, 0, 8);
    define_field!(data_read_access_time2, u8, 2, 0, 8);
    define_field!(max_data_transfer_rate, u8, 3, 0, 8);
    define_field!(card_command_classes, u16, [(4, 0, 8), (5, 4, 4)]);
    define_field!(read_block_length, u8, 5, 0, 4);
    define_field!(read_partial_blocks, bool, 6, 7);
    define_field!(write_block_misalignment, bool, 6, 6);
    define_field!(read_block_misalignment, bool, 6, 5);
    define_field!(dsr_implemented, bool, 6, 4);
    define_field!(device_size, u32, [(6, 0, 2), (7, 0, 8), (8, 6, 2)]);
    define_field!(max_read_current_vdd_max, u8, 8, 0, 3);
    define_field!(max_read_current_vdd_min, u8, 8, 3, 3);
    define_field!(max_write_current_vdd_max, u8, 9, 2, 3);
    define_field!(max_write_current_vdd_min, u8, 9, 5, 3);
    define_field!(device_size_multiplier, u8, [(9, 0, 2), (10, 7, 1)]);
    define_field!(erase_single_block_enabled, bool, 10, 6);
    define_field!(erase_sector_size, u8, [(10, 0, 6), (11, 7, 1)]);
    define_field!(write_protect_group_size, u8, 11, 0, 7);
    define_field!(write_protect_group_enable, bool, 12, 7);
    define_field!(write_speed_factor, u8, 12, 2, 3);
    define_field!(max_write_data_length, u8, [(12, 0, 2), (13, 6, 2)]);
    define_field!(write_partial_blocks, bool, 13, 5);
    define_field!(file_format, u8, 14, 2, 2);
    define_field!(temporary_write_protection, bool, 14, 4);
    define_field!(permanent_write_protection, bool, 14, 5);
    define_field!(copy_flag_set, bool, 14, 6);
    define_field!(file_format_group_set, bool, 14, 7);
    define_field!(crc, u8, 15, 1, 7);

    /// Returns the card capacity in bytes
    pub fn card_capacity_bytes(&self) -> u64 {
        let multiplier = self.device_size_multiplier() + self.read_block_length() + 2;
        (u64::from(self.device_size()) + 1) << multiplier
    }

    /// Returns the card capacity in 512-byte blocks
    pub fn card_capacity_blocks(&self) -> u32 {
        blocks_in(self.card_capacity_bytes())
    }
}

impl CsdV2 {
    /// Create a new, empty, CSD
    pub fn new() -> CsdV2 {
        CsdV2::default()
    }

    fn data(&self) -> &[u8] {
        &self.data
    }

    define_field!(csd_ver, u8, 0, 6, 2);
    define_field!(data_read_access_time1, u8, 1, 0, 8);
    define_field!(data_read_access_time2, u8, 2, 0, 8);
    define_field!(max_data_transfer_rate, u8, 3, 0, 8);
    define_field!(card_command_classes, u16, [(4, 0, 8), (5, 4, 4)]);
    define_field!(read_block_length, u8, 5, 0, 4);
    define_field!(read_partial_blocks, bool, 6, 7);
    define_field!(write_block_misalignment, bool, 6, 6);
    define_field!(read_block_misalignment, bool, 6, 5);
    define_field!(dsr_implemented, bool, 6, 4);
    define_field!(device_size, u32, [(7, 0, 6), (8, 0, 8), (9, 0, 8)]);
    define_field!(erase_single_block_enabled, bool, 10, 6);
    define_field!(erase_sector_size, u8, [(10, 0, 6), (11, 7, 1)]);
    define_field!(write_protect_group_size, u8, 11, 0, 7);
    define_field!(write_protect_group_enable, bool, 12, 7);
    define_field!(write_speed_factor, u8, 12, 2, 3);
    define_field!(max_write_data_length, u8, [(12, 0, 2), (13, 6, 2)]);
    define_field!(write_partial_blocks, bool, 13, 5);
    define_field!(file_format, u8, 14, 2, 2);
    define_field!(temporary_write_protection, bool, 14, 4);
    define_field!(permanent_write_protection, bool, 14, 5);
    define_field!(copy_flag_set, bool, 14, 6);
    define_field!(file_format_group_set, bool, 14, 7);
    define_field!(crc, u8, 15, 1, 7);

    /// Returns the card capacity in bytes
    pub fn card_capacity_bytes(&self) -> u64 {
        (u64::from(self.device_size()) + 1) * 512 * 1024
    }

    /// Returns the card capacity in 512-byte blocks
    pub fn card_capacity_blocks(&self) -> u32 {
        blocks_in(self.card_capacity_bytes())
    }
}

/// Card Identification register
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct Cid {
    /// The 16-bytes of data in this Card Identification block
    pub data: [u8; 16],
}

impl Cid {
    /// Create a new, empty, CID
    pub fn new() -> Cid {
        Cid::default()
    }

    fn data(&self) -> &[u8] {
        &self.data
    }

    define_field!(manufacturer_id, u8, 0, 0, 8);
    define_field!(oem_id, u16, [(1, 0, 8), (2, 0, 8)]);
    define_field!(product_revision, u8, 8, 0, 8);
    define_field!(serial_number, u32, [(9, 0, 8), (10, 0, 8), (11, 0, 8), (12, 0, 8)]);
    define_field!(manufacturing_month, u8, 14, 0, 4);
    define_field!(crc, u8, 15, 1, 7);

    /// Five ASCII characters naming the product
    pub fn product_name(&self) -> [u8; 5] {
        let mut name = [0u8; 5];
        name.copy_from_slice(&self.data[3..8]);
        name
    }

    /// The calendar year the card was made in
    pub fn manufacturing_year(&self) -> u16 {
        let offset = (u16::from(self.data[13] & 0x0F) << 4) | u16::from(self.data[14] >> 4);
        2000 + offset
    }
}

/// The two bytes a SEND_STATUS returns.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct CardStatus {
    /// The R1 byte, then the second status byte
    pub data: [u8; 2],
}

impl CardStatus {
    /// Create a new, empty, status
    pub fn new() -> CardStatus {
        CardStatus::default()
    }

    fn data(&self) -> &[u8] {
        &self.data
    }

    /// The R1 byte the command itself answered with
    pub fn r1(&self) -> u8 {
        self.data[0]
    }

    define_field!(in_idle_state, bool, 0, 0);
    define_field!(illegal_command, bool, 0, 2);
    define_field!(card_is_locked, bool, 1, 0);
    define_field!(lock_unlock_failed, bool, 1, 1);
    define_field!(error, bool, 1, 2);
    define_field!(cc_error, bool, 1, 3);
    define_field!(card_ecc_failed, bool, 1, 4);
    define_field!(wp_violation, bool, 1, 5);
    define_field!(erase_param, bool, 1, 6);
    define_field!(out_of_range, bool, 1, 7);
}


// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
