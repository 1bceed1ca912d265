// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

/// Base of the boot services (BSV) error space
pub const BSV_BASE_ERROR: u32 = 0x0B00_0000;

pub const BSV_ILLEGAL_INPUT_PARAM_ERR: u32 = BSV_BASE_ERROR + 0x01;
pub const BSV_HBK_ZERO_COUNT_ERR: u32 = BSV_BASE_ERROR + 0x03;
pub const BSV_ILLEGAL_LCS_ERR: u32 = BSV_BASE_ERROR + 0x04;
pub const BSV_OTP_WRITE_CMP_FAIL_ERR: u32 = BSV_BASE_ERROR + 0x05;
pub const BSV_ILLEGAL_SW_VERSION_ERR: u32 = BSV_BASE_ERROR + 0x06;
pub const BSV_KEY_NOT_IN_USE_ERR: u32 = BSV_BASE_ERROR + 0x07;
pub const BSV_OTP_ACCESS_ERR: u32 = BSV_BASE_ERROR + 0x08;
pub const BSV_HASH_CALC_ERR: u32 = BSV_BASE_ERROR + 0x09;

#[derive(thiserror::Error, PartialEq, Eq)]
pub enum Error {
    #[error("Syntax error: {0}")]
    Syntax(String),
    #[error("Illegal input: {0}")]
    IllegalInput(String),
    #[error("Zero count mismatch: {0}")]
    ZeroCount(String),
    #[error("Illegal lifecycle state: {0}")]
    IllegalLcs(String),
    #[error("OTP write compare failed: {0}")]
    WriteCompare(String),
    #[error("Illegal SW version: {0}")]
    SwVersion(String),
    #[error("Key not in use: {0}")]
    KeyNotInUse(String),
    #[error("OTP access error: {0}")]
    Access(String),
    #[error("Hash calculation failed: {0}")]
    HashCalculateFail(String),
}

impl Error {
    /// Numeric error code as reported by the boot services
    pub fn code(&self) -> u32 {
        match self {
            Error::Syntax(_) | Error::IllegalInput(_) => BSV_ILLEGAL_INPUT_PARAM_ERR,
            Error::ZeroCount(_) => BSV_HBK_ZERO_COUNT_ERR,
            Error::IllegalLcs(_) => BSV_ILLEGAL_LCS_ERR,
            Error::WriteCompare(_) => BSV_OTP_WRITE_CMP_FAIL_ERR,
            Error::SwVersion(_) => BSV_ILLEGAL_SW_VERSION_ERR,
            Error::KeyNotInUse(_) => BSV_KEY_NOT_IN_USE_ERR,
            Error::Access(_) => BSV_OTP_ACCESS_ERR,
            Error::HashCalculateFail(_) => BSV_HASH_CALC_ERR,
        }
    }
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Syntax(e)
            | Error::IllegalInput(e)
            | Error::ZeroCount(e)
            | Error::IllegalLcs(e)
            | Error::WriteCompare(e)
            | Error::SwVersion(e)
            | Error::KeyNotInUse(e)
            | Error::Access(e)
            | Error::HashCalculateFail(e) => {
                write!(f, "{}", e)
            }
        }
    }
}
