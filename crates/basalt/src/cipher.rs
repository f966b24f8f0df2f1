//! Stream encryption for an authenticated connection.
//!
//! After the encryption handshake both directions are encrypted with
//! AES-128 in CFB8 mode, keyed and IV'd by the 16-byte shared secret. Each
//! direction keeps its own [`Cipher`] because the CFB8 state diverges.

use aes::Aes128;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit};

/// Error type for cipher operations.
#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("Encryption is already enabled")]
    AlreadyEnabled,
}

/// AES-128 in 8-bit cipher feedback mode.
///
/// The register holds the last 16 ciphertext bytes; its first byte after
/// AES is the keystream for the next data byte.
pub struct Cfb8Cipher {
    aes: Aes128,
    register: [u8; 16],
}

impl Cfb8Cipher {
    /// Key and seed the register. Minecraft passes the shared secret as both.
    #[must_use]
    pub fn new(key: &[u8; 16], iv: &[u8; 16]) -> Self {
        Self {
            aes: Aes128::new(GenericArray::from_slice(key)),
            register: *iv,
        }
    }

    fn keystream_byte(&self) -> u8 {
        let mut block = GenericArray::clone_from_slice(&self.register);
        self.aes.encrypt_block(&mut block);
        block[0]
    }

    fn feed(&mut self, ciphertext: u8) {
        self.register.rotate_left(1);
        self.register[15] = ciphertext;
    }

    /// Encrypt `data` in place.
    pub fn encrypt(&mut self, data: &mut [u8]) {
        for byte in data {
            *byte ^= self.keystream_byte();
            self.feed(*byte);
        }
    }

    /// Decrypt `data` in place.
    pub fn decrypt(&mut self, data: &mut [u8]) {
        for byte in data {
            let ciphertext = *byte;
            *byte ^= self.keystream_byte();
            self.feed(ciphertext);
        }
    }
}

/// One direction of a connection's stream cipher.
///
/// Starts inert (bytes pass through untouched) and can be switched on once.
/// Switching on only affects bytes processed afterwards.
#[derive(Default)]
pub enum Cipher {
    #[default]
    Inert,
    Enabled(Box<Cfb8Cipher>),
}

impl Cipher {
    /// Create an inert cipher.
    #[must_use]
    pub const fn new() -> Self {
        Self::Inert
    }

    /// Switch encryption on with the shared secret.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::AlreadyEnabled`] on a second call; the running
    /// cipher state is left untouched.
    pub fn enable(&mut self, secret: &[u8; 16]) -> Result<(), CipherError> {
        if self.is_enabled() {
            return Err(CipherError::AlreadyEnabled);
        }
        *self = Self::Enabled(Box::new(Cfb8Cipher::new(secret, secret)));
        Ok(())
    }

    /// Whether encryption has been switched on.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled(_))
    }

    /// Encrypt outgoing bytes in place.
    pub fn encrypt(&mut self, data: &mut [u8]) {
        if let Self::Enabled(cipher) = self {
            cipher.encrypt(data);
        }
    }

    /// Decrypt incoming bytes in place.
    pub fn decrypt(&mut self, data: &mut [u8]) {
        if let Self::Enabled(cipher) = self {
            cipher.decrypt(data);
        }
    }
}

impl std::fmt::Debug for Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inert => f.write_str("Cipher::Inert"),
            Self::Enabled(_) => f.write_str("Cipher::Enabled"),
        }
    }
}
