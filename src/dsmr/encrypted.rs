//! # Encrypted P1 Frames
//!
//! Some meters (Luxembourg "Smarty", DSMR 5 with encryption) wrap the plain
//! telegram in an AES-128-GCM envelope:
//!
//! ```text
//! offset  size  content
//! 0       1     0xDB start marker
//! 1       1     0x08 type marker
//! 2       8     system title          ┐ nonce
//! 10      1     (unused)              │
//! 11      2     content length N (BE) │
//! 13      1     security byte         │
//! 14      4     frame counter         ┘
//! 18      N     ciphertext
//! 18+N    12    GCM tag
//! ```
//!
//! The nonce is the system title followed by the frame counter. No
//! additional authenticated data is used. Decryption authenticates before it
//! releases any plaintext; on failure the output buffer is wiped.

use crate::constants::{
    DECRYPTION_KEY_HEX_LEN, DECRYPTION_KEY_LEN, ENCRYPTED_FRAME_COUNTER_LEN,
    ENCRYPTED_HEADER_LEN, ENCRYPTED_START, ENCRYPTED_SYSTEM_TITLE_LEN, ENCRYPTED_TYPE,
    GCM_NONCE_LEN, GCM_TAG_LEN,
};
use crate::util::hex;
use aes::Aes128;
use aes_gcm::aead::consts::U12;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::AesGcm;
use bytes::BytesMut;
use nom::bytes::complete::take;
use nom::number::complete::{be_u16, be_u8};
use nom::IResult;
use std::fmt;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// AES-128-GCM with the 12 byte nonce and 12 byte tag DSMR meters use.
type P1Cipher = AesGcm<Aes128, U12, U12>;

/// Security byte written by [`encrypt_frame`]
pub const SECURITY_BYTE: u8 = 0x30;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecryptError {
    #[error("Frame too short: need {needed} bytes, got {actual}")]
    FrameTooShort { needed: usize, actual: usize },

    #[error("Invalid frame header: start 0x{start:02X}, type 0x{kind:02X}")]
    InvalidHeader { start: u8, kind: u8 },

    #[error("Encrypted frame has an empty payload")]
    EmptyPayload,

    #[error("Frame length mismatch: header says {expected} bytes, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("Decryption failed: authentication tag mismatch")]
    AuthenticationFailed,

    #[error("Invalid decryption key: {reason}")]
    InvalidKey { reason: String },
}

/// The fixed 18 byte envelope header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncryptedFrameHeader {
    pub start: u8,
    pub frame_type: u8,
    pub system_title: [u8; ENCRYPTED_SYSTEM_TITLE_LEN],
    pub content_length: u16,
    pub security_byte: u8,
    pub frame_counter: [u8; ENCRYPTED_FRAME_COUNTER_LEN],
}

fn parse_header_fields(input: &[u8]) -> IResult<&[u8], EncryptedFrameHeader> {
    let (input, start) = be_u8(input)?;
    let (input, frame_type) = be_u8(input)?;
    let (input, title) = take(ENCRYPTED_SYSTEM_TITLE_LEN)(input)?;
    let (input, _unused) = be_u8(input)?;
    let (input, content_length) = be_u16(input)?;
    let (input, security_byte) = be_u8(input)?;
    let (input, counter) = take(ENCRYPTED_FRAME_COUNTER_LEN)(input)?;

    let mut system_title = [0u8; ENCRYPTED_SYSTEM_TITLE_LEN];
    system_title.copy_from_slice(title);
    let mut frame_counter = [0u8; ENCRYPTED_FRAME_COUNTER_LEN];
    frame_counter.copy_from_slice(counter);

    Ok((
        input,
        EncryptedFrameHeader {
            start,
            frame_type,
            system_title,
            content_length,
            security_byte,
            frame_counter,
        },
    ))
}

impl EncryptedFrameHeader {
    /// Parse and validate the header at the start of `frame`.
    pub fn parse(frame: &[u8]) -> Result<Self, DecryptError> {
        let (_, header) = parse_header_fields(frame).map_err(|_| DecryptError::FrameTooShort {
            needed: ENCRYPTED_HEADER_LEN,
            actual: frame.len(),
        })?;
        if header.start != ENCRYPTED_START || header.frame_type != ENCRYPTED_TYPE {
            return Err(DecryptError::InvalidHeader {
                start: header.start,
                kind: header.frame_type,
            });
        }
        if header.content_length == 0 {
            return Err(DecryptError::EmptyPayload);
        }
        Ok(header)
    }

    /// Header + ciphertext + tag.
    pub fn total_length(&self) -> usize {
        ENCRYPTED_HEADER_LEN + self.content_length as usize + GCM_TAG_LEN
    }

    pub fn nonce(&self) -> [u8; GCM_NONCE_LEN] {
        let mut nonce = [0u8; GCM_NONCE_LEN];
        nonce[..ENCRYPTED_SYSTEM_TITLE_LEN].copy_from_slice(&self.system_title);
        nonce[ENCRYPTED_SYSTEM_TITLE_LEN..].copy_from_slice(&self.frame_counter);
        nonce
    }

    pub fn frame_counter(&self) -> u32 {
        u32::from_be_bytes(self.frame_counter)
    }
}

/// AES-128 key used to open encrypted frames.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct DecryptionKey([u8; DECRYPTION_KEY_LEN]);

impl DecryptionKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecryptError> {
        if bytes.len() != DECRYPTION_KEY_LEN {
            return Err(DecryptError::InvalidKey {
                reason: format!("expected {DECRYPTION_KEY_LEN} bytes, got {}", bytes.len()),
            });
        }
        let mut key = [0u8; DECRYPTION_KEY_LEN];
        key.copy_from_slice(bytes);
        Ok(Self(key))
    }

    /// Parse a 32 character hex string.
    pub fn from_hex(text: &str) -> Result<Self, DecryptError> {
        let text = text.trim();
        if text.len() != DECRYPTION_KEY_HEX_LEN {
            return Err(DecryptError::InvalidKey {
                reason: format!(
                    "expected {DECRYPTION_KEY_HEX_LEN} hex characters, got {}",
                    text.len()
                ),
            });
        }
        let mut bytes = hex::decode_hex(text).map_err(|e| DecryptError::InvalidKey {
            reason: e.to_string(),
        })?;
        let key = Self::from_bytes(&bytes);
        bytes.zeroize();
        key
    }

    pub fn as_bytes(&self) -> &[u8; DECRYPTION_KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for DecryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DecryptionKey(<redacted>)")
    }
}

/// Opens encrypted frames with one key.
#[derive(Clone)]
pub struct TelegramDecryptor {
    cipher: P1Cipher,
}

impl fmt::Debug for TelegramDecryptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramDecryptor").finish_non_exhaustive()
    }
}

impl TelegramDecryptor {
    pub fn new(key: &DecryptionKey) -> Self {
        Self {
            cipher: P1Cipher::new(GenericArray::from_slice(key.as_bytes())),
        }
    }

    /// Decrypt a complete frame into `out`, replacing its contents.
    ///
    /// `frame` must be exactly as long as its header says. On any failure
    /// `out` is left empty.
    pub fn decrypt_into(&self, frame: &[u8], out: &mut BytesMut) -> Result<EncryptedFrameHeader, DecryptError> {
        out.clear();
        let header = EncryptedFrameHeader::parse(frame)?;
        let total = header.total_length();
        if frame.len() != total {
            return Err(DecryptError::LengthMismatch {
                expected: total,
                actual: frame.len(),
            });
        }

        let tag_start = total - GCM_TAG_LEN;
        out.extend_from_slice(&frame[ENCRYPTED_HEADER_LEN..tag_start]);
        let nonce = header.nonce();
        let result = self.cipher.decrypt_in_place_detached(
            GenericArray::from_slice(&nonce),
            &[],
            &mut out[..],
            GenericArray::from_slice(&frame[tag_start..]),
        );

        if result.is_err() {
            out.as_mut().zeroize();
            out.clear();
            return Err(DecryptError::AuthenticationFailed);
        }
        Ok(header)
    }

    /// Decrypt a complete frame into a new buffer.
    pub fn decrypt(&self, frame: &[u8]) -> Result<Vec<u8>, DecryptError> {
        let mut out = BytesMut::with_capacity(frame.len());
        self.decrypt_into(frame, &mut out)?;
        Ok(out.to_vec())
    }
}

/// Build an encrypted frame around `plaintext`, the way a meter would.
///
/// Used by the CLI and by tests to produce frames for the decryptor.
pub fn encrypt_frame(
    key: &DecryptionKey,
    system_title: [u8; ENCRYPTED_SYSTEM_TITLE_LEN],
    frame_counter: u32,
    plaintext: &[u8],
) -> Result<Vec<u8>, DecryptError> {
    if plaintext.is_empty() {
        return Err(DecryptError::EmptyPayload);
    }
    let content_length = u16::try_from(plaintext.len()).map_err(|_| DecryptError::LengthMismatch {
        expected: u16::MAX as usize,
        actual: plaintext.len(),
    })?;

    let mut frame = Vec::with_capacity(ENCRYPTED_HEADER_LEN + plaintext.len() + GCM_TAG_LEN);
    frame.push(ENCRYPTED_START);
    frame.push(ENCRYPTED_TYPE);
    frame.extend_from_slice(&system_title);
    frame.push(0x82);
    frame.extend_from_slice(&content_length.to_be_bytes());
    frame.push(SECURITY_BYTE);
    frame.extend_from_slice(&frame_counter.to_be_bytes());

    let mut nonce = [0u8; GCM_NONCE_LEN];
    nonce[..ENCRYPTED_SYSTEM_TITLE_LEN].copy_from_slice(&system_title);
    nonce[ENCRYPTED_SYSTEM_TITLE_LEN..].copy_from_slice(&frame_counter.to_be_bytes());

    let body_start = frame.len();
    frame.extend_from_slice(plaintext);
    let cipher = P1Cipher::new(GenericArray::from_slice(key.as_bytes()));
    let tag = cipher
        .encrypt_in_place_detached(GenericArray::from_slice(&nonce), &[], &mut frame[body_start..])
        .map_err(|_| DecryptError::AuthenticationFailed)?;
    frame.extend_from_slice(tag.as_slice());
    Ok(frame)
}
