//! embedded-sdlock - SDMMC Protocol
//!
//! Implements the SD card protocol on some generic SPI interface: card
//! detection and capacity negotiation, register and block reads, and the
//! CMD42 password lock.
//!
//! This is currently optimised for readability and debugability, not
//! performance.

pub(crate) mod busy;
pub mod command;
pub mod lock;

use busy::SdMmcSpiBusy;
pub use command::{ChecksumMode, Command};
pub use lock::{LockMode, Password};

use crate::sdmmc_proto::*;
use crate::{Block, BlockCount, BlockDevice, BlockIdx};

use embedded_hal::blocking::spi::Transfer;
use embedded_hal::digital::v2::OutputPin;
#[cfg(feature = "log")]
use log::{debug, trace, warn};

#[cfg(feature = "defmt-log")]
use defmt::{debug, trace, warn};

/// Represents an SD Card interface.
/// Built from an SPI peripheral and a Chip
/// Select pin. We need Chip Select to be separate so we can clock out some
/// bytes without Chip Select asserted (which puts the card into SPI mode).
///
/// Everything belonging to one card session lives in here: the negotiated
/// card type, the block buffer and the password used for lock commands.
pub struct SdMmcSpi<SPI, CS, State>
where
    SPI: Transfer<u8>,
    CS: OutputPin,
{
    card_type: CardType,
    spi: SPI,
    cs: CS,
    options: AcquireOpts,
    block: Block,
    password: Password,
    state: State,
}

/// The possible errors `SdMmcSpi` can generate.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Error {
    /// We got an error from the SPI peripheral
    Transport,
    /// Couldn't set a GPIO pin
    GpioError,
    /// The card never answered CMD0 with the idle state
    CardNotFound,
    /// We didn't get a response when executing this command
    TimeoutCommand(u8),
    /// We didn't get a response when executing this application-specific command
    TimeoutACommand(u8),
    /// We didn't get a start token when reading data from the card
    TimeoutReadBuffer,
    /// We didn't get a response when waiting for the card to not be busy
    TimeoutWaitNotBusy,
    /// We failed to read a register (OCR, CSD or CID)
    RegisterReadError,
    /// Error reading from the card
    ReadError,
    /// The card refused CMD42 with this R1
    LockError(u8),
    /// Passwords are at most 16 bytes long
    PasswordTooLong(usize),
    /// The block index can't be addressed on this card
    BlockOutOfRange,
}

/// Broad classes of `Error`.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// No card answered the reset
    NoCardDetected,
    /// A bounded wait ran out
    Timeout,
    /// The card answered, but not with what the operation needed
    ReadWriteFailure,
    /// The SPI peripheral or the chip select pin failed
    Hardware,
    /// The caller passed something the card can't take
    InvalidInput,
}

impl Error {
    /// Which class of failure is this?
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::CardNotFound => ErrorKind::NoCardDetected,
            Error::TimeoutCommand(_)
            | Error::TimeoutACommand(_)
            | Error::TimeoutReadBuffer
            | Error::TimeoutWaitNotBusy => ErrorKind::Timeout,
            Error::RegisterReadError | Error::ReadError | Error::LockError(_) => {
                ErrorKind::ReadWriteFailure
            }
            Error::Transport | Error::GpioError => ErrorKind::Hardware,
            Error::PasswordTooLong(_) | Error::BlockOutOfRange => ErrorKind::InvalidInput,
        }
    }
}

/// The state of an SdMmcSpi if it is not initialized
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub struct NotInit;

/// The state of an SdMmcSpi if it is initialized
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub struct Initialized;

/// The different types of card we support.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CardType {
    /// Not negotiated yet
    Unknown,
    /// Standard capacity, byte addressed
    SD,
    /// High capacity, block addressed
    SDHC,
}

/// Counts down the tries left in one of the bounded loops. There is no
/// timer, so the number of iterations is the timeout.
pub(crate) struct Attempts(u32);

impl Attempts {
    pub(crate) fn new(count: u32) -> Attempts {
        Attempts(count)
    }

    /// Use up one try. Fails with `err` once none are left.
    pub(crate) fn spend(&mut self, err: Error) -> Result<(), Error> {
        self.0 = self.0.saturating_sub(1);
        if self.0 == 0 {
            Err(err)
        } else {
            Ok(())
        }
    }
}

/// Options for acquiring the card.
///
/// All limits are iteration counts, so how long they take depends on the
/// SPI clock.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AcquireOpts {
    /// How command checksums are produced.
    pub checksum: ChecksumMode,
    /// CMD0 tries before we decide there is no card.
    pub reset_attempts: u32,
    /// Bytes to clock while waiting for an R1.
    pub response_polls: u32,
    /// ACMD41 or CMD1 tries before the card must have left the idle state.
    pub init_attempts: u32,
    /// Bytes to clock while waiting for a start token.
    pub token_polls: u32,
    /// Bytes to clock while a lock command keeps the card busy.
    pub busy_polls: u32,
}

impl Default for AcquireOpts {
    fn default() -> Self {
        AcquireOpts {
            checksum: ChecksumMode::Computed,
            reset_attempts: 16,
            response_polls: 512,
            init_attempts: 20_000,
            token_polls: 100,
            busy_polls: 0xFFFF,
        }
    }
}

impl<SPI, CS, State> SdMmcSpi<SPI, CS, State>
where
    SPI: Transfer<u8>,
    CS: OutputPin,
{
    /// What the last acquire found. `Unknown` until then.
    pub fn card_type(&self) -> CardType {
        self.card_type
    }

    /// The options this session runs with.
    pub fn options(&self) -> &AcquireOpts {
        &self.options
    }

    /// Replace the password used by `execute_lock_command`. A password
    /// that is too long leaves the old one in place.
    pub fn load_password(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.password = Password::new(bytes)?;
        Ok(())
    }

    /// Go back to the empty password.
    pub fn forget_password(&mut self) {
        self.password = Password::empty();
    }

    /// The password `execute_lock_command` will send.
    pub fn password(&self) -> &Password {
        &self.password
    }

    /// Give back the SPI device and chip select pin.
    pub fn free(self) -> (SPI, CS) {
        (self.spi, self.cs)
    }

    fn into_state<NewState>(
        self,
        card_type: CardType,
        state: NewState,
    ) -> SdMmcSpi<SPI, CS, NewState> {
        SdMmcSpi {
            card_type,
            spi: self.spi,
            cs: self.cs,
            options: self.options,
            block: self.block,
            password: self.password,
            state,
        }
    }
}

impl<SPI, CS> SdMmcSpi<SPI, CS, NotInit>
where
    SPI: Transfer<u8>,
    CS: OutputPin,
{
    /// Create a new SD/MMC controller using a raw SPI interface.
    pub fn new(spi: SPI, cs: CS) -> Self {
        SdMmcSpi {
            card_type: CardType::Unknown,
            spi,
            cs,
            options: AcquireOpts::default(),
            block: Block::new(),
            password: Password::empty(),
            state: NotInit {},
        }
    }

    /// Initializes the card into a known state
    pub fn acquire(self) -> Result<SdMmcSpi<SPI, CS, Initialized>, (Error, Self)> {
        self.acquire_with_opts(Default::default())
    }

    fn discard_byte(&mut self) -> Result<u8, Error> {
        self.spi
            .transfer(&mut [IDLE_FILL])
            .map(|b| b[0])
            .map_err(|_e| Error::Transport)
    }

    /// Initializes the card into a known state
    pub fn acquire_with_opts(
        mut self,
        options: AcquireOpts,
    ) -> Result<SdMmcSpi<SPI, CS, Initialized>, (Error, Self)> {
        debug!("acquiring card with opts: {:?}", options);
        self.card_type = CardType::Unknown;
        self.options = options;
        self.block = Block::new();
        self.password = Password::empty();

        let f = |s: &mut Self| -> Result<CardType, Error> {
            trace!("Reset card..");

            // Supply minimum of 74 clock cycles without CS asserted.
            s.cs.set_high().map_err(|_| Error::GpioError)?;
            for _ in 0..10 {
                s.discard_byte()?;
            }

            let mut busy = SdMmcSpiBusy::new(&mut s.spi, &mut s.cs, options);

            // Enter SPI mode
            let mut attempts = Attempts::new(options.reset_attempts);
            loop {
                match busy.card_command(CMD0, 0) {
                    Ok(R1_IDLE_STATE) => break,
                    Ok(r) => {
                        warn!("Got response: {:x}, trying again..", r);
                    }
                    Err(Error::TimeoutCommand(CMD0)) => {
                        warn!("Timed out, trying again..");
                    }
                    Err(e) => return Err(e),
                }
                attempts.spend(Error::CardNotFound)?;
            }

            busy.card_command(CMD16, BLOCK_LEN)?;

            // Cards older than version 2 may not answer CMD8 at all
            let if_cond = match busy.card_command(CMD8, IF_COND_CHECK_PATTERN) {
                Ok(r1) => r1,
                Err(Error::TimeoutCommand(CMD8)) => {
                    warn!("No answer to CMD8, trying legacy initialization");
                    R1_NOT_READY
                }
                Err(e) => return Err(e),
            };

            let card_type = if if_cond == R1_IDLE_STATE {
                let mut echo = [0u8; 4];
                busy.read_continuation(&mut echo)?;
                if u32::from_be_bytes(echo) & 0xFFF != IF_COND_CHECK_PATTERN {
                    warn!("Interface condition echo mismatch: {:?}", echo);
                }

                trace!("Negotiating high capacity..");
                let mut attempts = Attempts::new(options.init_attempts);
                while busy.card_acmd(ACMD41, OCR_HCS)? != R1_READY_STATE {
                    attempts.spend(Error::TimeoutACommand(ACMD41))?;
                }
                CardType::SDHC
            } else {
                if busy.card_command(CMD58, 0)? == R1_IDLE_STATE {
                    let mut ocr = [0u8; 4];
                    busy.read_continuation(&mut ocr)?;
                }

                trace!("Legacy initialization..");
                let mut attempts = Attempts::new(options.init_attempts);
                while busy.card_command(CMD1, 0)? != R1_READY_STATE {
                    attempts.spend(Error::TimeoutCommand(CMD1))?;
                }
                // Some standard capacity cards forget this when they leave idle
                busy.card_command(CMD16, BLOCK_LEN)?;
                CardType::SD
            };
            Ok(card_type)
        };
        let result = f(&mut self);
        let trailing = self.discard_byte();

        match (result, trailing) {
            (Ok(card_type), Ok(_)) => {
                debug!("Card type: {:?}", card_type);
                Ok(self.into_state(card_type, Initialized {}))
            }
            (Ok(_), Err(e)) | (Err(e), _) => Err((e, self)),
        }
    }
}

impl<SPI, CS> SdMmcSpi<SPI, CS, Initialized>
where
    SPI: Transfer<u8>,
    CS: OutputPin,
{
    /// Mark the card as unused.
    /// This should be kept infallible, because Drop is unable to fail.
    /// See https://github.com/rust-lang/rfcs/issues/814
    pub fn deinit(self) -> SdMmcSpi<SPI, CS, NotInit> {
        self.into_state(CardType::Unknown, NotInit {})
    }

    /// Run the whole initialization again with the same options.
    pub fn reacquire(self) -> Result<Self, (Error, SdMmcSpi<SPI, CS, NotInit>)> {
        let options = self.options;
        self.deinit().acquire_with_opts(options)
    }

    /// Run a command sequence with chip select handled by an
    /// `SdMmcSpiBusy`.
    ///
    /// Chip select is always deasserted, even if an error occured in `f`
    fn with_chip_select<F, R>(&mut self, f: F) -> Result<R, Error>
    where
        F: FnOnce(&mut SdMmcSpiBusy<SPI, CS>) -> Result<R, Error>,
    {
        let mut busy = SdMmcSpiBusy::new(&mut self.spi, &mut self.cs, self.options);
        f(&mut busy)
    }

    /// Read the Operation Conditions Register.
    ///
    /// High capacity cards are asked with SEND_IF_COND and the four bytes
    /// after its R1 are returned.
    pub fn read_ocr(&mut self) -> Result<Ocr, Error> {
        let (command, arg) = match self.card_type {
            CardType::SDHC => (CMD8, IF_COND_CHECK_PATTERN),
            CardType::SD | CardType::Unknown => (CMD58, 0),
        };
        self.with_chip_select(|s| {
            let r1 = s.card_command(command, arg)?;
            if r1 != R1_READY_STATE {
                warn!("OCR read refused with {:x}", r1);
                return Err(Error::RegisterReadError);
            }
            let mut ocr = Ocr::new();
            s.read_continuation(&mut ocr.data)?;
            Ok(ocr)
        })
    }

    /// Read the 'card specific data' block.
    pub fn read_csd(&mut self) -> Result<Csd, Error> {
        self.with_chip_select(|s| {
            if s.card_command(CMD9, 0)? != R1_READY_STATE {
                return Err(Error::RegisterReadError);
            }
            let mut data = [0u8; 16];
            s.read_data(&mut data, 1)?;
            Ok(Csd::from_bytes(data))
        })
    }

    /// Read the 'card identification' block.
    pub fn read_cid(&mut self) -> Result<Cid, Error> {
        self.with_chip_select(|s| {
            if s.card_command(CMD10, 0)? != R1_READY_STATE {
                return Err(Error::RegisterReadError);
            }
            let mut cid = Cid::new();
            s.read_data(&mut cid.data, 1)?;
            Ok(cid)
        })
    }

    /// Read the two status bytes. The R1 of the command is the first of
    /// them, so there is nothing to check here.
    ///
    /// A card that never answers CMD13 still fails with
    /// `Error::TimeoutCommand(CMD13)` rather than handing back 0xFF bytes
    /// that would read as a locked card with every error bit set.
    pub fn read_status(&mut self) -> Result<CardStatus, Error> {
        self.with_chip_select(|s| {
            let mut status = CardStatus::new();
            status.data[0] = s.card_command(CMD13, 0)?;
            s.read_continuation(&mut status.data[1..])?;
            trace!("Status: {:?}", status.data);
            Ok(status)
        })
    }

    /// Is the card password locked right now?
    pub fn is_locked(&mut self) -> Result<bool, Error> {
        Ok(self.read_status()?.card_is_locked())
    }

    /// Return the usable size of this SD card in bytes.
    pub fn card_size_bytes(&mut self) -> Result<u64, Error> {
        Ok(self.read_csd()?.card_capacity_bytes())
    }

    /// What goes in the CMD17 argument for this block. Standard capacity
    /// cards take a byte address, which runs out at 4 GiB.
    fn block_address(&self, block_idx: BlockIdx) -> Result<u32, Error> {
        match self.card_type {
            CardType::SD | CardType::Unknown => block_idx
                .0
                .checked_mul(Block::LEN_U32)
                .ok_or(Error::BlockOutOfRange),
            CardType::SDHC => Ok(block_idx.0),
        }
    }

    /// Read one block into the session's block buffer and return it.
    pub fn read_block(&mut self, block_idx: BlockIdx) -> Result<&Block, Error> {
        let address = self.block_address(block_idx)?;
        trace!("Reading block {} from address {:x}", block_idx.0, address);
        let mut busy = SdMmcSpiBusy::new(&mut self.spi, &mut self.cs, self.options);
        busy.read_single_block(address, &mut self.block.contents)?;
        drop(busy);
        Ok(&self.block)
    }

    /// The block buffer as the last `read_block` left it.
    pub fn block(&self) -> &Block {
        &self.block
    }

    /// Send CMD42 with `mode` and the session password.
    pub fn execute_lock_command(&mut self, mode: LockMode) -> Result<(), Error> {
        let password = self.password;
        self.execute_lock_command_with(mode, &password)
    }

    /// Send CMD42 with `mode` and an explicit password.
    pub fn execute_lock_command_with(
        &mut self,
        mode: LockMode,
        password: &Password,
    ) -> Result<(), Error> {
        debug!(
            "Lock command, mode {:x}, {} byte password",
            mode.wire_bits(),
            password.len()
        );
        self.with_chip_select(|s| s.lock_unlock(mode, password))
    }

    /// Make the session password the card password, optionally locking the
    /// card in the same step.
    pub fn set_card_password(&mut self, lock: bool) -> Result<(), Error> {
        let mut mode = LockMode::SET_PWD;
        mode.set(LockMode::LOCK_UNLOCK, lock);
        self.execute_lock_command(mode)
    }

    /// Remove the card password. The session password must match it.
    pub fn clear_card_password(&mut self) -> Result<(), Error> {
        self.execute_lock_command(LockMode::CLR_PWD)
    }

    /// Lock the card with its current password.
    pub fn lock_card(&mut self) -> Result<(), Error> {
        self.execute_lock_command(LockMode::LOCK_UNLOCK)
    }

    /// Unlock the card for this power cycle.
    pub fn unlock_card(&mut self) -> Result<(), Error> {
        self.execute_lock_command(LockMode::empty())
    }
}

impl<SPI, CS> BlockDevice for SdMmcSpi<SPI, CS, Initialized>
where
    SPI: Transfer<u8>,
    CS: OutputPin,
{
    type Error = Error;

    /// Read one or more blocks, starting at the given block index. Each
    /// block is its own single block read.
    fn read(
        &mut self,
        blocks: &mut [Block],
        start_block_idx: BlockIdx,
        reason: &str,
    ) -> Result<(), Self::Error> {
        trace!(
            "Read {} blocks @ {} for {}",
            blocks.len(),
            start_block_idx.0,
            reason
        );
        let mut next = Some(start_block_idx);
        for block in blocks.iter_mut() {
            let idx = next.ok_or(Error::BlockOutOfRange)?;
            let address = self.block_address(idx)?;
            self.with_chip_select(|s| s.read_single_block(address, &mut block.contents))?;
            next = idx.checked_offset(1);
        }
        Ok(())
    }

    /// Determine how many blocks this device can hold.
    fn num_blocks(&mut self) -> Result<BlockCount, Self::Error> {
        Ok(BlockCount(self.read_csd()?.card_capacity_blocks()))
    }
}

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
