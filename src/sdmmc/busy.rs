use embedded_hal::{blocking::spi::Transfer, digital::v2::OutputPin};

#[cfg(feature = "log")]
use log::{trace, warn};

#[cfg(feature = "defmt-log")]
use defmt::{trace, warn};

use crate::sdmmc_proto::*;

use super::command::Command;
use super::lock::{LockMode, Password, LOCK_PAYLOAD_LEN};
use super::{AcquireOpts, Attempts, Error};

/// A struct used to ensure that communication only occurs
/// when CS is low.
///
/// It owns the chip select discipline: every command starts with a
/// deselect/select resync, commands outside `KEEP_SELECTED` release the card
/// once they have answered, and dropping the struct always deasserts CS.
pub struct SdMmcSpiBusy<'spi, 'cs, SPI, CS>
where
    SPI: Transfer<u8>,
    CS: OutputPin,
{
    spi: &'spi mut SPI,
    cs: &'cs mut CS,
    opts: AcquireOpts,
}

impl<'spi, 'cs, SPI, CS> Drop for SdMmcSpiBusy<'spi, 'cs, SPI, CS>
where
    SPI: Transfer<u8>,
    CS: OutputPin,
{
    fn drop(&mut self) {
        self.cs_high().ok();
    }
}

impl<'spi, 'cs, SPI, CS> SdMmcSpiBusy<'spi, 'cs, SPI, CS>
where
    SPI: Transfer<u8>,
    CS: OutputPin,
{
    pub fn new(spi: &'spi mut SPI, cs: &'cs mut CS, opts: AcquireOpts) -> Self {
        Self { spi, cs, opts }
    }

    fn cs_high(&mut self) -> Result<(), Error> {
        self.cs.set_high().map_err(|_| Error::GpioError)
    }

    fn cs_low(&mut self) -> Result<(), Error> {
        self.cs.set_low().map_err(|_| Error::GpioError)
    }

    /// Send one byte and receive one byte.
    fn transfer(&mut self, out: u8) -> Result<u8, Error> {
        self.spi
            .transfer(&mut [out])
            .map(|b| b[0])
            .map_err(|_e| Error::Transport)
    }

    /// Receive a byte from the SD card by clocking in an 0xFF byte.
    pub fn receive(&mut self) -> Result<u8, Error> {
        self.transfer(IDLE_FILL)
    }

    /// Send a byte to the SD card.
    pub fn send(&mut self, out: u8) -> Result<(), Error> {
        let _ = self.transfer(out)?;
        Ok(())
    }

    /// Deassert, clock, assert, clock. The card sees at least eight clocks
    /// with CS high before it is selected.
    pub fn select(&mut self) -> Result<(), Error> {
        self.cs_high()?;
        self.receive()?;
        self.cs_low()?;
        self.receive()?;
        Ok(())
    }

    /// Deassert chip select. No clocks.
    pub fn deselect(&mut self) -> Result<(), Error> {
        self.cs_high()
    }

    /// Reassert chip select without clocking, to pick up the data phase of
    /// a command that released the card.
    pub fn resume(&mut self) -> Result<(), Error> {
        self.cs_low()
    }

    /// Deassert and clock one byte so the card can finish its reply.
    pub fn release(&mut self) -> Result<(), Error> {
        self.deselect()?;
        self.receive()?;
        Ok(())
    }

    /// Frame and send one command, then poll for its R1.
    fn issue(&mut self, command: Command) -> Result<u8, Error> {
        trace!("CMD{} arg={:x} app={}", command.index, command.arg, command.app);
        self.select()?;
        for b in command.frame(self.opts.checksum).iter() {
            self.send(*b)?;
        }

        let timeout = if command.app {
            Error::TimeoutACommand(command.index)
        } else {
            Error::TimeoutCommand(command.index)
        };
        let mut attempts = Attempts::new(self.opts.response_polls);
        let result = loop {
            let result = self.receive()?;
            if (result & R1_NOT_READY) == 0 {
                break result;
            }
            attempts.spend(timeout)?;
        };

        if !command.keeps_selected() {
            self.release()?;
        }
        Ok(result)
    }

    /// Perform a command.
    pub fn card_command(&mut self, command: u8, arg: u32) -> Result<u8, Error> {
        self.issue(Command::new(command, arg))
    }

    /// Perform an application-specific command.
    ///
    /// If the CMD55 in front of it reports anything beyond idle, that
    /// response is returned and the command itself is never sent.
    pub fn card_acmd(&mut self, command: u8, arg: u32) -> Result<u8, Error> {
        let preface = self.card_command(CMD55, 0)?;
        if preface > R1_IDLE_STATE {
            warn!("CMD55 refused with {:x}", preface);
            return Ok(preface);
        }
        self.issue(Command::app(command, arg))
    }

    /// Clock out bytes until something other than 0xFF shows up.
    ///
    /// Running out of polls is an error, never a token.
    pub fn wait_for_token(&mut self) -> Result<u8, Error> {
        for _ in 0..self.opts.token_polls {
            let token = self.receive()?;
            if token != IDLE_FILL {
                return Ok(token);
            }
        }
        Err(Error::TimeoutReadBuffer)
    }

    /// Pick the card back up after a command and read a fixed number of
    /// bytes that follow its R1 directly.
    pub fn read_continuation(&mut self, buffer: &mut [u8]) -> Result<(), Error> {
        self.resume()?;
        for b in buffer.iter_mut() {
            *b = self.receive()?;
        }
        self.release()
    }

    /// Pick the card back up after a command and read a data block behind a
    /// start token, then clock `trailing` checksum bytes we don't check.
    pub fn read_data(&mut self, buffer: &mut [u8], trailing: usize) -> Result<(), Error> {
        self.resume()?;
        let token = self.wait_for_token()?;
        if token != DATA_START_BLOCK {
            warn!("Expected start token, got {:x}", token);
            return Err(Error::ReadError);
        }

        for b in buffer.iter_mut() {
            *b = self.receive()?;
        }
        for _ in 0..trailing {
            self.receive()?;
        }
        self.release()
    }

    /// Read one block from `address`, which the caller has already turned
    /// into bytes or blocks to suit the card.
    pub fn read_single_block(&mut self, address: u32, buffer: &mut [u8]) -> Result<(), Error> {
        let r1 = self.card_command(CMD17, address)?;
        if r1 != R1_READY_STATE {
            warn!("CMD17 failed with {:x}", r1);
            return Err(Error::ReadError);
        }
        self.read_data(buffer, 2)
    }

    /// Spin until the card stops holding the line low, or we spin too many
    /// times and timeout.
    pub fn wait_not_busy(&mut self) -> Result<(), Error> {
        for _ in 0..self.opts.busy_polls {
            if self.receive()? != 0 {
                return Ok(());
            }
        }
        Err(Error::TimeoutWaitNotBusy)
    }

    /// Run CMD42 with `mode` and `password`.
    pub fn lock_unlock(&mut self, mode: LockMode, password: &Password) -> Result<(), Error> {
        let mask = mode.wire_bits();
        self.deselect()?;
        self.select()?;

        let r1 = self.card_command(CMD42, 0)?;
        if r1 != R1_READY_STATE {
            warn!("CMD42 refused with {:x}", r1);
            return Err(Error::LockError(r1));
        }

        self.resume()?;
        self.send(DATA_START_BLOCK)?;
        self.send(mask)?;
        self.send(password.len() as u8)?;
        for idx in 0..LOCK_PAYLOAD_LEN {
            self.send(password.payload_byte(idx))?;
        }
        self.send(IDLE_FILL)?;
        self.send(IDLE_FILL)?;

        let result = self.wait_not_busy();
        self.release()?;
        result
    }
}

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
