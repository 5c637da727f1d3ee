//! # embedded-sdlock
//!
//! > SD card initialization, register access and password locking, written
//! > in Embedded Rust
//!
//! This crate talks to an SD or SDHC card over SPI. It brings the card up
//! (telling standard capacity cards from high capacity ones), reads the OCR,
//! CSD, CID and status registers, reads raw 512-byte blocks, and drives the
//! CMD42 password lock: set, clear, lock and unlock. It is `#![no_std]` and
//! does not use `alloc`.
//!
//! ## Using the crate
//!
//! ```rust,ignore
//! # struct DummySpi;
//! # struct DummyCsPin;
//! # impl embedded_hal::blocking::spi::Transfer<u8> for DummySpi {
//! #   type Error = ();
//! #   fn transfer<'w>(&mut self, data: &'w mut [u8]) -> Result<&'w [u8], ()> { Ok(&[0]) }
//! # }
//! # impl embedded_hal::digital::v2::OutputPin for DummyCsPin {
//! #   type Error = ();
//! #   fn set_low(&mut self) -> Result<(), ()> { Ok(()) }
//! #   fn set_high(&mut self) -> Result<(), ()> { Ok(()) }
//! # }
//! # let sdmmc_spi = DummySpi;
//! # let sdmmc_cs = DummyCsPin;
//! let spi_dev = embedded_sdlock::SdMmcSpi::new(sdmmc_spi, sdmmc_cs);
//! match spi_dev.acquire() {
//!     Ok(mut card) => {
//!         println!("{:?} card, locked: {:?}", card.card_type(), card.is_locked());
//!         card.load_password(b"hunter2").unwrap();
//!         match card.unlock_card() {
//!             Ok(()) => println!("block 0: {:?}", card.read_block(embedded_sdlock::BlockIdx(0))),
//!             Err(e) => println!("unlock failed: {:?}", e),
//!         }
//!     }
//!     Err((e, _card)) => println!("{:?}!", e),
//! };
//! ```
//!
//! ## Features
//!
//! * `defmt-log`: By turning off the default features and enabling the `defmt-log` feature you can
//! configure this crate to log messages over defmt instead.
//! * `refcell-blockdevice`: implement `BlockDevice` for `RefCell`s of block devices.
//!
//! Make sure that either the `log` feature or the `defmt-log` feature is enabled.

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

// ****************************************************************************
//
// Imports
//
// ****************************************************************************


#[macro_use]
mod structure;

pub mod block_device;
pub mod sdmmc;
pub mod sdmmc_proto;

pub use crate::block_device::{Block, BlockCount, BlockDevice, BlockIdx};
pub use crate::sdmmc::Error as SdMmcError;
pub use crate::sdmmc::{
    AcquireOpts, CardType, ChecksumMode, Command, ErrorKind, Initialized, LockMode, NotInit,
    Password, SdMmcSpi,
};
pub use crate::sdmmc_proto::{CardStatus, Cid, Crc7Table, Csd, CsdV1, CsdV2, Ocr};

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
