//! The CMD42 lock/unlock data structure.
//!
//! The card takes a 512 byte data block after CMD42: a mode byte, the
//! password length and the password itself. Only the first `2 + len` bytes
//! mean anything to the card, the rest is padding.

use super::Error;
use crate::sdmmc_proto::IDLE_FILL;

/// Longest password a card accepts.
pub const MAX_PASSWORD_LEN: usize = 16;

/// Bytes after the mode and length bytes in a lock payload.
pub const LOCK_PAYLOAD_LEN: usize = 512;

/// Only these mode bits ever reach the card.
pub const LOCK_MODE_WIRE_MASK: u8 = 0b111;

bitflags::bitflags! {
    /// The mode byte at the start of the lock/unlock data block.
    ///
    /// An empty mode together with the right password unlocks the card.
    pub struct LockMode: u8 {
        /// Set a new password
        const SET_PWD = 0x01;
        /// Remove the password
        const CLR_PWD = 0x02;
        /// Lock the card (unlock when clear)
        const LOCK_UNLOCK = 0x04;
        /// Forced erase. Never sent by this driver.
        const ERASE = 0x08;
    }
}

impl LockMode {
    /// The mode byte as transmitted.
    pub fn wire_bits(self) -> u8 {
        self.bits() & LOCK_MODE_WIRE_MASK
    }
}

/// A card password of up to 16 bytes.
#[derive(Copy, Clone, Default, PartialEq, Eq)]
pub struct Password {
    bytes: [u8; MAX_PASSWORD_LEN],
    len: u8,
}

impl Password {
    /// No password at all.
    pub const fn empty() -> Password {
        Password {
            bytes: [0u8; MAX_PASSWORD_LEN],
            len: 0,
        }
    }

    /// Copy `bytes` into a new password.
    pub fn new(bytes: &[u8]) -> Result<Password, Error> {
        if bytes.len() > MAX_PASSWORD_LEN {
            return Err(Error::PasswordTooLong(bytes.len()));
        }
        let mut password = Password::empty();
        password.bytes[..bytes.len()].copy_from_slice(bytes);
        password.len = bytes.len() as u8;
        Ok(password)
    }

    /// The significant bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..usize::from(self.len)]
    }

    /// Number of significant bytes.
    pub fn len(&self) -> usize {
        usize::from(self.len)
    }

    /// Is this the empty password?
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Byte `idx` of the 512 byte payload body: the password, then padding.
    pub fn payload_byte(&self, idx: usize) -> u8 {
        if idx < self.len() {
            self.bytes[idx]
        } else {
            IDLE_FILL
        }
    }
}

impl core::fmt::Debug for Password {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Password").field("len", &self.len).finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn mode_is_cut_to_three_bits() {
        assert_eq!(LockMode::all().wire_bits(), 0x07);
        assert_eq!(LockMode::ERASE.wire_bits(), 0x00);
        assert_eq!((LockMode::SET_PWD | LockMode::LOCK_UNLOCK).wire_bits(), 0x05);
        for raw in 0..=255u8 {
            assert_eq!(LockMode::from_bits_truncate(raw).wire_bits(), raw & 0x07);
        }
    }

    #[test]
    fn password_limits() {
        assert!(Password::new(&[0x41; 16]).is_ok());
        assert!(matches!(
            Password::new(&[0x41; 17]),
            Err(Error::PasswordTooLong(17))
        ));
        assert!(Password::empty().is_empty());
        assert_eq!(Password::new(b"").unwrap(), Password::empty());
    }

    #[test]
    fn payload_pads_with_ff() {
        let password = Password::new(b"hello").unwrap();
        let body: std::vec::Vec<u8> = (0..LOCK_PAYLOAD_LEN)
            .map(|idx| password.payload_byte(idx))
            .collect();
        assert_eq!(&body[..5], b"hello");
        assert!(body[5..].iter().all(|&b| b == 0xFF));
        assert_eq!(body.len() - 5, 507);
    }

    #[test]
    fn debug_hides_password() {
        let password = Password::new(b"secret").unwrap();
        let text = std::format!("{:?}", password);
        assert!(!text.contains("secret"));
        assert!(text.contains("len"));
    }
}
