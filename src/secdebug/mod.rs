// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

//! The secdebug module verifies a secure debug certificate package and
//! derives the debug control unit settings it grants.
//!
//! # Example
//!
//! ```
//! use ccsecboot::cert::{CertBody, CertSigner, EnablerCertBody};
//! use ccsecboot::otp::{HbkId, Lcs, MemoOtpStore};
//! use ccsecboot::secdebug::{secure_debug_set, DebugCertPackage};
//!
//! const jotp: &str = include_str!("../../testdata/otp-secure.json");
//! const pem: &[u8] = include_bytes!("../../testdata/hbk-key.pem");
//!
//! let mut otp = MemoOtpStore::new();
//! otp.load_json(jotp).expect("loading OTP");
//!
//! // an RMA request, signed with the root key
//! let signer = CertSigner::from_pem(pem).expect("loading signing key");
//! let buf = signer
//!     .sign(&CertBody::Enabler(EnablerCertBody {
//!         hbk_id: HbkId::Hbk,
//!         lcs: Lcs::Secure,
//!         is_rma: true,
//!         debug_mask: [0; 4],
//!         debug_lock: [0; 4],
//!         next_pub_key_hash: [0; 32],
//!     }))
//!     .expect("signing enabler certificate");
//!
//! let pkg = DebugCertPackage::parse(&buf).expect("parsing package");
//! let outcome = secure_debug_set(&otp, &pkg).expect("verifying package");
//!
//! assert!(outcome.is_rma);
//! ```

pub use self::dcu::{secure_debug_default, secure_debug_set, DebugOutcome};
pub use self::package::DebugCertPackage;

mod dcu;
mod package;
