// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

//! The cert module decodes the certificates of the secure boot and secure
//! debug chains into a [`Certificate`] object.  Both the proprietary format
//! and its X.509 flavour are understood.
//!
//! # Example
//!
//! ```
//! use ccsecboot::cert::{CertBody, CertSigner, CertType, Certificate, KeyCertBody};
//! use ccsecboot::otp::HbkId;
//!
//! const pem: &[u8] = include_bytes!("../../testdata/hbk-key.pem");
//! let signer = CertSigner::from_pem(pem).expect("loading signing key");
//!
//! let body = CertBody::Key(KeyCertBody {
//!     hbk_id: HbkId::Hbk,
//!     nv_counter: 1,
//!     next_pub_key_hash: [0xab; 32],
//! });
//! let buf = signer.sign(&body).expect("signing key certificate");
//!
//! // decode, then check the signature with the embedded public key
//! let c = Certificate::decode(&buf, CertType::KeyOrContent).expect("decoding certificate");
//! c.verify_signature().expect("verifying signature");
//!
//! assert_eq!(c.cert_type, CertType::Key);
//! ```

pub use self::builder::{CertSigner, X509Params};
pub use self::certificate::{CertBody, Certificate};
pub use self::common::*;
pub use self::content::{num_of_comps_from_flags, ContentCertBody, SwComponentInfo, SwImageRecord};
pub use self::debugcert::{DeveloperCertBody, EnablerCertBody};
pub use self::errors::*;
pub use self::header::CertHeader;
pub use self::key::*;
pub use self::pubkey::PublicKey;
pub use self::x509::{
    is_x509, x509_cert_size, x509_cert_type, CurrentTime, FixedTime, IValidity, X509Info,
    MAX_X509_CERT_SIZE, X509_HEADER_SIZE, X509_ISSUER_NAME,
};

mod builder;
mod certificate;
mod common;
mod content;
mod debugcert;
mod errors;
mod header;
mod key;
mod pubkey;
mod x509;
