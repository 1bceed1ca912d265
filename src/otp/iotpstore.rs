// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::common::Lcs;
use super::errors::Error;

/// Interface to the device OTP memory and its lifecycle state register.
pub trait IOtpStore {
    /// Read the OTP word at the given word offset
    fn read_word(&self, offset: usize) -> Result<u32, Error>;

    /// Program the given bits into the OTP word at the given word offset.
    /// OTP bits can be set but never cleared.
    fn write_word(&self, offset: usize, value: u32) -> Result<(), Error>;

    /// Lifecycle state latched at power-up
    fn lcs(&self) -> Result<Lcs, Error>;
}
