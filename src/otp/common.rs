// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::errors::Error;
use serde::{Deserialize, Serialize};

pub const OTP_SIZE_IN_WORDS: usize = 0x400;

// word offsets and sizes
pub const OTP_HUK_OFFSET: usize = 0x00;
pub const OTP_HUK_SIZE_IN_WORDS: usize = 8;
pub const OTP_KPICV_OFFSET: usize = 0x08;
pub const OTP_KCEICV_OFFSET: usize = 0x0C;
pub const OTP_KCEICV_SIZE_IN_WORDS: usize = 4;
pub const OTP_FIRST_MANUFACTURE_FLAG_OFFSET: usize = 0x10;
pub const OTP_SECOND_MANUFACTURE_FLAG_OFFSET: usize = 0x11;
pub const OTP_HBK_OFFSET: usize = 0x13;
pub const OTP_HBK_SIZE_IN_WORDS: usize = 8;
pub const OTP_HBK0_OFFSET: usize = 0x13;
pub const OTP_HBK0_SIZE_IN_WORDS: usize = 4;
pub const OTP_HBK1_OFFSET: usize = 0x17;
pub const OTP_HBK1_SIZE_IN_WORDS: usize = 4;
pub const OTP_KCP_OFFSET: usize = 0x1B;
pub const OTP_KCE_OFFSET: usize = 0x1F;
pub const OTP_KCE_SIZE_IN_WORDS: usize = 4;
pub const OTP_OEM_FLAG_OFFSET: usize = 0x23;
pub const OTP_TRUSTED_MIN_SW_VERSION_OFFSET: usize = 0x24;
pub const OTP_TRUSTED_MIN_SW_VERSION_SIZE_IN_WORDS: usize = 1;
pub const OTP_NON_TRUSTED_MIN_SW_VERSION_OFFSET: usize = 0x25;
pub const OTP_NON_TRUSTED_MIN_SW_VERSION_SIZE_IN_WORDS: usize = 7;
pub const OTP_DCU_OFFSET: usize = 0x2C;
pub const OTP_DCU_SIZE_IN_WORDS: usize = 4;
pub const OTP_EKCST_OFFSET: usize = 0x30;
pub const OTP_USER_DEFINED_OFFSET: usize = 0x34;

// first manufacture flags
pub const KCEICV_ZERO_BITS_SHIFT: u32 = 16;
pub const KCEICV_ZERO_BITS_SIZE: u32 = 7;
pub const KCEICV_NOT_IN_USE_BIT: u32 = 0x0080_0000;
pub const HBK0_ZERO_BITS_SHIFT: u32 = 24;
pub const HBK0_ZERO_BITS_SIZE: u32 = 7;
pub const HBK0_NOT_IN_USE_BIT: u32 = 0x8000_0000;

// second manufacture flags
pub const SECURE_DISABLE_BIT: u32 = 0x2000_0000;
pub const ICV_RMA_MODE_BIT: u32 = 0x4000_0000;
pub const OEM_RMA_MODE_BIT: u32 = 0x8000_0000;

// OEM flags
pub const HBK_ZERO_BITS_SHIFT: u32 = 0;
pub const HBK_ZERO_BITS_SIZE: u32 = 8;
pub const KCE_ZERO_BITS_SHIFT: u32 = 16;
pub const KCE_ZERO_BITS_SIZE: u32 = 7;
pub const KCE_NOT_IN_USE_BIT: u32 = 0x0080_0000;

pub const TRUSTED_COUNTER_MAX_VERSION: u32 = 32;
pub const NON_TRUSTED_COUNTER_MAX_VERSION: u32 = 224;

pub const HBK_128_SIZE: usize = 16;
pub const HBK_256_SIZE: usize = 32;

/// Device lifecycle state, as latched by the hardware at power-up
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum Lcs {
    #[default]
    #[serde(rename = "cm")]
    ChipManufacture = 0x0,
    #[serde(rename = "dm")]
    DeviceManufacture = 0x1,
    #[serde(rename = "security-disabled")]
    SecurityDisabled = 0x3,
    #[serde(rename = "secure")]
    Secure = 0x5,
    #[serde(rename = "rma")]
    Rma = 0x7,
}

impl TryFrom<u32> for Lcs {
    type Error = Error;

    fn try_from(v: u32) -> Result<Self, Self::Error> {
        match v {
            0x0 => Ok(Lcs::ChipManufacture),
            0x1 => Ok(Lcs::DeviceManufacture),
            0x3 => Ok(Lcs::SecurityDisabled),
            0x5 => Ok(Lcs::Secure),
            0x7 => Ok(Lcs::Rma),
            x => Err(Error::IllegalLcs(format!("unknown lifecycle state {x:#x}"))),
        }
    }
}

impl std::fmt::Display for Lcs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Lcs::ChipManufacture => "CM",
            Lcs::DeviceManufacture => "DM",
            Lcs::SecurityDisabled => "SD",
            Lcs::Secure => "Secure",
            Lcs::Rma => "RMA",
        };
        write!(f, "{s}")
    }
}

/// Which of the OTP hash-of-boot-key slots a certificate chain is rooted in
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum HbkId {
    /// 128-bit truncated hash, owned by the ICV
    #[serde(rename = "hbk0")]
    Hbk0 = 0,
    /// 128-bit truncated hash, owned by the OEM
    #[serde(rename = "hbk1")]
    Hbk1 = 1,
    /// full 256-bit hash
    #[serde(rename = "hbk")]
    Hbk = 2,
}

impl HbkId {
    pub fn hash_size(&self) -> usize {
        match self {
            HbkId::Hbk0 | HbkId::Hbk1 => HBK_128_SIZE,
            HbkId::Hbk => HBK_256_SIZE,
        }
    }
}

impl TryFrom<u32> for HbkId {
    type Error = u32;

    fn try_from(v: u32) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(HbkId::Hbk0),
            1 => Ok(HbkId::Hbk1),
            2 => Ok(HbkId::Hbk),
            x => Err(x),
        }
    }
}

/// The two anti-rollback counters
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum CounterId {
    #[serde(rename = "trusted")]
    Trusted = 0,
    #[serde(rename = "non-trusted")]
    NonTrusted = 1,
}

impl CounterId {
    pub fn offset(&self) -> usize {
        match self {
            CounterId::Trusted => OTP_TRUSTED_MIN_SW_VERSION_OFFSET,
            CounterId::NonTrusted => OTP_NON_TRUSTED_MIN_SW_VERSION_OFFSET,
        }
    }

    pub fn size_in_words(&self) -> usize {
        match self {
            CounterId::Trusted => OTP_TRUSTED_MIN_SW_VERSION_SIZE_IN_WORDS,
            CounterId::NonTrusted => OTP_NON_TRUSTED_MIN_SW_VERSION_SIZE_IN_WORDS,
        }
    }

    pub fn max_version(&self) -> u32 {
        match self {
            CounterId::Trusted => TRUSTED_COUNTER_MAX_VERSION,
            CounterId::NonTrusted => NON_TRUSTED_COUNTER_MAX_VERSION,
        }
    }
}

impl TryFrom<u32> for CounterId {
    type Error = u32;

    fn try_from(v: u32) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(CounterId::Trusted),
            1 => Ok(CounterId::NonTrusted),
            x => Err(x),
        }
    }
}

/// Code encryption keys held in OTP
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CodeEncKey {
    Kceicv,
    Kce,
}

pub fn get_field(word: u32, shift: u32, size: u32) -> u32 {
    (word >> shift) & ((1u32 << size) - 1)
}

pub fn zero_bits(words: &[u32]) -> u32 {
    words.iter().map(|w| w.count_zeros()).sum()
}

/// Words of a unary (base-1) encoded counter: `version` bits set, filled from
/// bit 0 of the first word onwards
pub fn unary_words(version: u32, size_in_words: usize) -> Vec<u32> {
    (0..size_in_words as u32)
        .map(|i| {
            let n = version.saturating_sub(i * 32).min(32);
            if n == 32 {
                u32::MAX
            } else {
                (1u32 << n) - 1
            }
        })
        .collect()
}

/// Key and hash material is stored so that each word's big-endian encoding
/// yields the next four bytes
pub fn words_to_bytes(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_be_bytes()).collect()
}

pub fn bytes_to_words(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks(4)
        .map(|c| {
            let mut w = [0u8; 4];
            w[..c.len()].copy_from_slice(c);
            u32::from_be_bytes(w)
        })
        .collect()
}
