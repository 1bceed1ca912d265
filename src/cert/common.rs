// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::errors::Error;
use serde::Serialize;

pub const KEY_CERT_MAGIC_NUMBER: u32 = 0x5342_6b63;
pub const CONTENT_CERT_MAGIC_NUMBER: u32 = 0x5342_6363;
pub const ENABLER_CERT_MAGIC_NUMBER: u32 = 0x5364_656E;
pub const DEVELOPER_CERT_MAGIC_NUMBER: u32 = 0x5364_6465;

pub const CERT_VERSION_PROJ_PRD: u32 = 0x7;
pub const CERT_VERSION_MAJOR: u32 = 1;
pub const CERT_VERSION_MINOR: u32 = 0;
pub const CERT_VERSION: u32 = (CERT_VERSION_PROJ_PRD << 24) | (CERT_VERSION_MAJOR << 16) | CERT_VERSION_MINOR;

pub const CERT_LEN_SIGNATURE_OFFSET_MASK: u32 = 0xFFFF;

pub const WORD_SIZE: usize = 4;
pub const HASH_SIZE: usize = 32;
pub const HEADER_SIZE: usize = 16;
pub const RSA_MOD_SIZE: usize = 384;
pub const NP_SIZE: usize = 20;
pub const PUB_KEY_SIZE: usize = RSA_MOD_SIZE + NP_SIZE;
pub const SIGNATURE_SIZE: usize = RSA_MOD_SIZE;
pub const NONCE_SIZE: usize = 8;
pub const SOC_ID_SIZE: usize = 32;
pub const DCU_SIZE_IN_WORDS: usize = 4;

pub const MAX_SW_COMPS: usize = 16;
pub const SW_REC_SIGNED_SIZE: usize = HASH_SIZE + 8 + 4 + 4;
pub const SW_REC_NON_SIGNED_SIZE: usize = 8;

pub const KEY_CERT_BODY_SIZE: usize = 4 + HASH_SIZE;
pub const CONTENT_CERT_BODY_FIXED_SIZE: usize = 4 + NONCE_SIZE;
pub const ENABLER_CERT_BODY_SIZE: usize = 2 * DCU_SIZE_IN_WORDS * WORD_SIZE + HASH_SIZE;
pub const DEVELOPER_CERT_BODY_SIZE: usize = DCU_SIZE_IN_WORDS * WORD_SIZE + SOC_ID_SIZE;

pub const MAX_KEY_CERT_SIZE: usize = HEADER_SIZE + PUB_KEY_SIZE + KEY_CERT_BODY_SIZE + SIGNATURE_SIZE;
pub const MAX_CONTENT_CERT_SIZE: usize = HEADER_SIZE
    + PUB_KEY_SIZE
    + CONTENT_CERT_BODY_FIXED_SIZE
    + MAX_SW_COMPS * SW_REC_SIGNED_SIZE
    + SIGNATURE_SIZE;
pub const MAX_CONTENT_PKG_SIZE: usize = MAX_CONTENT_CERT_SIZE + MAX_SW_COMPS * SW_REC_NON_SIGNED_SIZE;
pub const MAX_ENABLER_CERT_SIZE: usize =
    HEADER_SIZE + PUB_KEY_SIZE + ENABLER_CERT_BODY_SIZE + SIGNATURE_SIZE;
pub const MAX_DEVELOPER_CERT_SIZE: usize =
    HEADER_SIZE + PUB_KEY_SIZE + DEVELOPER_CERT_BODY_SIZE + SIGNATURE_SIZE;
pub const MAX_CERT_SIZE: usize = 0x700;

/// Marks an image that is not copied to (or not read from) memory
pub const NO_MEM_LOAD: u64 = u64::MAX;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum CertType {
    #[serde(rename = "key")]
    Key = 1,
    #[serde(rename = "content")]
    Content = 2,
    /// Only ever used as an expectation
    #[serde(rename = "key-or-content")]
    KeyOrContent = 3,
    #[serde(rename = "enabler")]
    Enabler = 4,
    #[serde(rename = "developer")]
    Developer = 5,
}

impl CertType {
    pub fn from_magic(magic: u32) -> Option<CertType> {
        match magic {
            KEY_CERT_MAGIC_NUMBER => Some(CertType::Key),
            CONTENT_CERT_MAGIC_NUMBER => Some(CertType::Content),
            ENABLER_CERT_MAGIC_NUMBER => Some(CertType::Enabler),
            DEVELOPER_CERT_MAGIC_NUMBER => Some(CertType::Developer),
            _ => None,
        }
    }

    pub fn magic(&self) -> u32 {
        match self {
            CertType::Key => KEY_CERT_MAGIC_NUMBER,
            CertType::Content => CONTENT_CERT_MAGIC_NUMBER,
            CertType::Enabler => ENABLER_CERT_MAGIC_NUMBER,
            CertType::Developer => DEVELOPER_CERT_MAGIC_NUMBER,
            CertType::KeyOrContent => 0,
        }
    }

    /// Does a certificate of type `self` satisfy the `expected` type?
    pub fn satisfies(&self, expected: CertType) -> bool {
        *self == expected
            || (expected == CertType::KeyOrContent
                && matches!(self, CertType::Key | CertType::Content))
    }

    /// Upper bound of the signed part (header, public key and body)
    pub fn max_signed_size(&self) -> usize {
        match self {
            CertType::Key => MAX_KEY_CERT_SIZE - SIGNATURE_SIZE,
            CertType::Content | CertType::KeyOrContent => MAX_CONTENT_CERT_SIZE - SIGNATURE_SIZE,
            CertType::Enabler => MAX_ENABLER_CERT_SIZE - SIGNATURE_SIZE,
            CertType::Developer => MAX_DEVELOPER_CERT_SIZE - SIGNATURE_SIZE,
        }
    }
}

/// How the images of a content certificate are brought in
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum LoadVerifyScheme {
    #[serde(rename = "load-and-verify")]
    LoadAndVerify = 0,
    #[serde(rename = "verify-in-flash")]
    VerifyInFlash = 1,
    #[serde(rename = "verify-in-memory")]
    VerifyInMemory = 2,
    #[serde(rename = "load-only")]
    LoadOnly = 3,
}

impl TryFrom<u32> for LoadVerifyScheme {
    type Error = Error;

    fn try_from(v: u32) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(LoadVerifyScheme::LoadAndVerify),
            1 => Ok(LoadVerifyScheme::VerifyInFlash),
            2 => Ok(LoadVerifyScheme::VerifyInMemory),
            3 => Ok(LoadVerifyScheme::LoadOnly),
            x => Err(Error::Syntax(format!("unknown load/verify scheme {x}"))),
        }
    }
}

/// Which OTP key, if any, the images are encrypted with
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum CodeEncType {
    #[serde(rename = "none")]
    None = 0,
    #[serde(rename = "icv")]
    Icv = 1,
    #[serde(rename = "oem")]
    Oem = 2,
}

impl TryFrom<u32> for CodeEncType {
    type Error = Error;

    fn try_from(v: u32) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(CodeEncType::None),
            1 => Ok(CodeEncType::Icv),
            2 => Ok(CodeEncType::Oem),
            x => Err(Error::Syntax(format!("unknown code encryption type {x}"))),
        }
    }
}

/// Whether the image hash covers the plaintext or the ciphertext
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum CryptoType {
    #[serde(rename = "hash-on-decrypted")]
    HashOnDecrypted = 0,
    #[serde(rename = "hash-on-encrypted")]
    HashOnEncrypted = 1,
}

impl TryFrom<u32> for CryptoType {
    type Error = Error;

    fn try_from(v: u32) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(CryptoType::HashOnDecrypted),
            1 => Ok(CryptoType::HashOnEncrypted),
            x => Err(Error::Syntax(format!("unknown crypto type {x}"))),
        }
    }
}

pub fn get_field(word: u32, shift: u32, size: u32) -> u32 {
    (word >> shift) & ((1u32 << size) - 1)
}

fn slice_at<'a>(buf: &'a [u8], off: usize, len: usize, what: &str) -> Result<&'a [u8], Error> {
    buf.get(off..off + len).ok_or(Error::BufferTooSmall(format!(
        "{what}: need {len} bytes at offset {off}, have {}",
        buf.len()
    )))
}

pub fn read_u32(buf: &[u8], off: usize, what: &str) -> Result<u32, Error> {
    let s = slice_at(buf, off, 4, what)?;
    let mut w = [0u8; 4];
    w.copy_from_slice(s);
    Ok(u32::from_le_bytes(w))
}

pub fn read_u64(buf: &[u8], off: usize, what: &str) -> Result<u64, Error> {
    let s = slice_at(buf, off, 8, what)?;
    let mut w = [0u8; 8];
    w.copy_from_slice(s);
    Ok(u64::from_le_bytes(w))
}

pub fn read_array<const N: usize>(buf: &[u8], off: usize, what: &str) -> Result<[u8; N], Error> {
    let s = slice_at(buf, off, N, what)?;
    let mut a = [0u8; N];
    a.copy_from_slice(s);
    Ok(a)
}

pub fn read_dcu(buf: &[u8], off: usize, what: &str) -> Result<[u32; DCU_SIZE_IN_WORDS], Error> {
    let mut dcu = [0u32; DCU_SIZE_IN_WORDS];
    for (i, d) in dcu.iter_mut().enumerate() {
        *d = read_u32(buf, off + i * WORD_SIZE, what)?;
    }
    Ok(dcu)
}
