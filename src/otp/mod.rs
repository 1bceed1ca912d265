// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

//! The OTP module models the one-time-programmable memory of the device and
//! the lifecycle gate built on top of it.
//!
//! # Example
//!
//! ```
//! use ccsecboot::otp::{lifecycle, HbkId, IOtpStore, Lcs, MemoOtpStore};
//!
//! const jotp: &str = include_str!("../../testdata/otp-secure.json");
//! let mut otp = MemoOtpStore::new();
//! otp.load_json(jotp).expect("loading OTP");
//!
//! assert_eq!(otp.lcs().expect("reading LCS"), Lcs::Secure);
//!
//! // the root of trust for the boot certificate chain
//! let hbk = lifecycle::pub_key_hash(&otp, HbkId::Hbk).expect("reading HBK");
//! assert!(hbk.is_some());
//! ```

pub use self::common::*;
pub use self::config::OtpConfig;
pub use self::errors::*;
pub use self::iotpstore::IOtpStore;
pub use self::memo_otpstore::MemoOtpStore;

mod common;
mod config;
mod errors;
mod iotpstore;
pub mod lifecycle;
mod memo_otpstore;
