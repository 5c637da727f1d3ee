//! Command frames and the chip select policy that goes with each command.

use crate::sdmmc_proto::*;

/// How the checksum byte of a command frame is produced.
///
/// In SPI mode the card ignores the checksum of everything except CMD0 and
/// CMD8, so both choices work with real cards.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ChecksumMode {
    /// Run every frame through the CRC7 table.
    Computed,
    /// Send the well-known constants for CMD0 and CMD8 and `PLACEHOLDER_CRC`
    /// for everything else.
    Fixed,
}

impl Default for ChecksumMode {
    fn default() -> Self {
        ChecksumMode::Computed
    }
}

/// Commands that leave chip select asserted once their R1 has arrived, as
/// `(index, is application command)`.
pub const KEEP_SELECTED: [(u8, bool); 5] = [
    (CMD0, false),
    (CMD1, false),
    (CMD16, false),
    (CMD55, false),
    (ACMD41, true),
];

/// One command for the card.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Command {
    /// Command index, 0 to 63
    pub index: u8,
    /// The 32-bit argument
    pub arg: u32,
    /// Must this be sent after a CMD55?
    pub app: bool,
}

impl Command {
    /// A normal command
    pub const fn new(index: u8, arg: u32) -> Command {
        Command {
            index: index & 0x3F,
            arg,
            app: false,
        }
    }

    /// An application-specific command
    pub const fn app(index: u8, arg: u32) -> Command {
        Command {
            index: index & 0x3F,
            arg,
            app: true,
        }
    }

    /// Does the card stay selected after this command has answered?
    pub fn keeps_selected(&self) -> bool {
        KEEP_SELECTED.contains(&(self.index, self.app))
    }

    /// The six bytes that go on the wire.
    pub fn frame(&self, mode: ChecksumMode) -> [u8; 6] {
        let arg = self.arg.to_be_bytes();
        let mut buf = [0x40 | self.index, arg[0], arg[1], arg[2], arg[3], 0];
        buf[5] = match mode {
            ChecksumMode::Computed => CRC7_TABLE.checksum(&buf[0..5]),
            ChecksumMode::Fixed => match (self.index, self.app) {
                (CMD0, false) => CMD0_CRC,
                (CMD8, false) => CMD8_CRC,
                _ => PLACEHOLDER_CRC,
            },
        };
        buf
    }
}
