// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use crate::cert;
use crate::cert::BOOT_IMG_VERIFIER_BASE_ERROR;
use crate::otp;

pub const BOOT_IMG_VERIFIER_OTP_VERSION_FAILURE: u32 = BOOT_IMG_VERIFIER_BASE_ERROR + 0x02;
pub const BOOT_IMG_VERIFIER_SW_VER_SMALLER_THAN_MIN_VER: u32 = BOOT_IMG_VERIFIER_BASE_ERROR + 0x05;
pub const BOOT_IMG_VERIFIER_PUB_KEY_HASH_VALIDATION_FAILURE: u32 =
    BOOT_IMG_VERIFIER_BASE_ERROR + 0x06;
pub const BOOT_IMG_VERIFIER_SW_COMP_FAILED_VERIFICATION: u32 = BOOT_IMG_VERIFIER_BASE_ERROR + 0x09;
pub const BOOT_IMG_VERIFIER_CERT_SW_VER_ILLEGAL: u32 = BOOT_IMG_VERIFIER_BASE_ERROR + 0x0B;
pub const BOOT_IMG_VERIFIER_SW_COMP_SIZE_IS_NULL: u32 = BOOT_IMG_VERIFIER_BASE_ERROR + 0x0C;
pub const BOOT_IMG_VERIFIER_ILLEGAL_LCS_FOR_OPERATION_ERR: u32 =
    BOOT_IMG_VERIFIER_BASE_ERROR + 0x0E;
pub const BOOT_IMG_VERIFIER_ILLEGAL_SOC_ID_VALUE: u32 = BOOT_IMG_VERIFIER_BASE_ERROR + 0x17;
pub const BOOT_IMG_VERIFIER_MAP_ERR: u32 = BOOT_IMG_VERIFIER_BASE_ERROR + 0x1B;

#[derive(thiserror::Error, PartialEq, Eq)]
pub enum Error {
    #[error("certificate error: {0}")]
    Cert(#[from] cert::Error),
    #[error("OTP error: {0}")]
    Otp(#[from] otp::Error),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("OTP version update failed: {0}")]
    OtpVersion(String),
    #[error("SW version smaller than minimum: {0}")]
    SwVersionSmaller(String),
    #[error("Public key hash validation failed: {0}")]
    PubKeyHash(String),
    #[error("SW component verification failed: {0}")]
    SwCompFailed(String),
    #[error("Illegal certificate SW version: {0}")]
    SwVersionIllegal(String),
    #[error("SW component size is zero: {0}")]
    SwCompSizeNull(String),
    #[error("Illegal lifecycle state for operation: {0}")]
    IllegalLcs(String),
    #[error("Illegal HBK index: {0}")]
    HbkIdx(String),
    #[error("Certificate decoding illegal: {0}")]
    Decoding(String),
    #[error("Illegal SoC ID: {0}")]
    SocId(String),
    #[error("Memory access error: {0}")]
    Map(String),
    #[error("Crypto error: {0}")]
    Crypto(String),
}

impl Error {
    /// Numeric error code as reported by the boot image verifier
    pub fn code(&self) -> u32 {
        match self {
            Error::Cert(e) => e.code(),
            Error::Otp(e) => e.code(),
            Error::InvalidInput(_) => cert::BOOT_IMG_VERIFIER_INV_INPUT_PARAM,
            Error::OtpVersion(_) => BOOT_IMG_VERIFIER_OTP_VERSION_FAILURE,
            Error::SwVersionSmaller(_) => BOOT_IMG_VERIFIER_SW_VER_SMALLER_THAN_MIN_VER,
            Error::PubKeyHash(_) => BOOT_IMG_VERIFIER_PUB_KEY_HASH_VALIDATION_FAILURE,
            Error::SwCompFailed(_) => BOOT_IMG_VERIFIER_SW_COMP_FAILED_VERIFICATION,
            Error::SwVersionIllegal(_) => BOOT_IMG_VERIFIER_CERT_SW_VER_ILLEGAL,
            Error::SwCompSizeNull(_) => BOOT_IMG_VERIFIER_SW_COMP_SIZE_IS_NULL,
            Error::IllegalLcs(_) => BOOT_IMG_VERIFIER_ILLEGAL_LCS_FOR_OPERATION_ERR,
            Error::HbkIdx(_) => cert::BOOT_IMG_VERIFIER_ILLEGAL_HBK_IDX,
            Error::Decoding(_) => cert::BOOT_IMG_VERIFIER_CERT_DECODING_ILLEGAL,
            Error::SocId(_) => BOOT_IMG_VERIFIER_ILLEGAL_SOC_ID_VALUE,
            Error::Map(_) => BOOT_IMG_VERIFIER_MAP_ERR,
            Error::Crypto(_) => otp::BSV_HASH_CALC_ERR,
        }
    }
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Cert(e) => write!(f, "{:?}", e),
            Error::Otp(e) => write!(f, "{:?}", e),
            Error::InvalidInput(e)
            | Error::OtpVersion(e)
            | Error::SwVersionSmaller(e)
            | Error::PubKeyHash(e)
            | Error::SwCompFailed(e)
            | Error::SwVersionIllegal(e)
            | Error::SwCompSizeNull(e)
            | Error::IllegalLcs(e)
            | Error::HbkIdx(e)
            | Error::Decoding(e)
            | Error::SocId(e)
            | Error::Map(e)
            | Error::Crypto(e) => {
                write!(f, "{}", e)
            }
        }
    }
}
