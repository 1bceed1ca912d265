// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

/// Base of the boot image verifier error space
pub const BOOT_IMG_VERIFIER_BASE_ERROR: u32 = 0xF100_0000;

pub const BOOT_IMG_VERIFIER_INV_INPUT_PARAM: u32 = BOOT_IMG_VERIFIER_BASE_ERROR + 0x01;
pub const BOOT_IMG_VERIFIER_CERT_MAGIC_NUM_INCORRECT: u32 = BOOT_IMG_VERIFIER_BASE_ERROR + 0x03;
pub const BOOT_IMG_VERIFIER_CERT_VERSION_NUM_INCORRECT: u32 = BOOT_IMG_VERIFIER_BASE_ERROR + 0x04;
pub const BOOT_IMG_VERIFIER_RSA_SIG_VERIFICATION_FAILED: u32 = BOOT_IMG_VERIFIER_BASE_ERROR + 0x07;
pub const BOOT_IMG_VERIFIER_WORKSPACE_SIZE_TOO_SMALL: u32 = BOOT_IMG_VERIFIER_BASE_ERROR + 0x08;
pub const BOOT_IMG_VERIFIER_INCORRECT_CERT_SIZE: u32 = BOOT_IMG_VERIFIER_BASE_ERROR + 0x0A;
pub const BOOT_IMG_VERIFIER_INCORRECT_CERT_TYPE: u32 = BOOT_IMG_VERIFIER_BASE_ERROR + 0x11;
pub const BOOT_IMG_VERIFIER_ILLEGAL_HBK_IDX: u32 = BOOT_IMG_VERIFIER_BASE_ERROR + 0x12;
pub const BOOT_IMG_VERIFIER_CERT_DECODING_ILLEGAL: u32 = BOOT_IMG_VERIFIER_BASE_ERROR + 0x15;
pub const BOOT_IMG_VERIFIER_ILLEGAL_NUM_OF_IMAGES: u32 = BOOT_IMG_VERIFIER_BASE_ERROR + 0x18;

/// Base of the X.509 certificate error space
pub const SB_X509_CERT_BASE_ERROR: u32 = 0xF900_0000;

pub const SB_X509_CERT_PARSE_ILLEGAL_VAL: u32 = SB_X509_CERT_BASE_ERROR + 0x01;

/// Base of the RSA driver error space
pub const RSA_BASE_ERROR: u32 = 0xF700_0000;

#[derive(thiserror::Error, PartialEq, Eq)]
pub enum Error {
    #[error("Syntax error: {0}")]
    Syntax(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Buffer too small: {0}")]
    BufferTooSmall(String),
    #[error("Incorrect magic number: {0}")]
    MagicNumber(String),
    #[error("Incorrect certificate type: {0}")]
    CertType(String),
    #[error("Incorrect certificate version: {0}")]
    Version(String),
    #[error("Incorrect certificate size: {0}")]
    CertSize(String),
    #[error("Illegal HBK index: {0}")]
    HbkIdx(String),
    #[error("Illegal number of images: {0}")]
    NumOfImages(String),
    #[error("Signature verification failed: {0}")]
    Signature(String),
    #[error("Crypto error: {0}")]
    Crypto(String),
    #[error("X.509 certificate error: {0}")]
    X509(String),
    #[error("Certificate outside its validity period: {0}")]
    Validity(String),
}

impl Error {
    /// Numeric error code as reported by the boot image verifier
    pub fn code(&self) -> u32 {
        match self {
            Error::Syntax(_) => BOOT_IMG_VERIFIER_CERT_DECODING_ILLEGAL,
            Error::InvalidInput(_) => BOOT_IMG_VERIFIER_INV_INPUT_PARAM,
            Error::BufferTooSmall(_) => BOOT_IMG_VERIFIER_WORKSPACE_SIZE_TOO_SMALL,
            Error::MagicNumber(_) => BOOT_IMG_VERIFIER_CERT_MAGIC_NUM_INCORRECT,
            Error::CertType(_) => BOOT_IMG_VERIFIER_INCORRECT_CERT_TYPE,
            Error::Version(_) => BOOT_IMG_VERIFIER_CERT_VERSION_NUM_INCORRECT,
            Error::CertSize(_) => BOOT_IMG_VERIFIER_INCORRECT_CERT_SIZE,
            Error::HbkIdx(_) => BOOT_IMG_VERIFIER_ILLEGAL_HBK_IDX,
            Error::NumOfImages(_) => BOOT_IMG_VERIFIER_ILLEGAL_NUM_OF_IMAGES,
            Error::Signature(_) => BOOT_IMG_VERIFIER_RSA_SIG_VERIFICATION_FAILED,
            Error::Crypto(_) => RSA_BASE_ERROR,
            Error::X509(_) | Error::Validity(_) => SB_X509_CERT_PARSE_ILLEGAL_VAL,
        }
    }
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Syntax(e)
            | Error::InvalidInput(e)
            | Error::BufferTooSmall(e)
            | Error::MagicNumber(e)
            | Error::CertType(e)
            | Error::Version(e)
            | Error::CertSize(e)
            | Error::HbkIdx(e)
            | Error::NumOfImages(e)
            | Error::Signature(e)
            | Error::Crypto(e)
            | Error::X509(e)
            | Error::Validity(e) => {
                write!(f, "{}", e)
            }
        }
    }
}
