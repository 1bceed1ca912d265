// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

//! The sb module walks a secure boot certificate chain stored in flash, from
//! the root key certificate down to the content certificate, and verifies the
//! software images the latter describes.
//!
//! # Example
//!
//! ```
//! use ccsecboot::cert::{CertBody, CertSigner, KeyCertBody};
//! use ccsecboot::otp::{HbkId, MemoOtpStore};
//! use ccsecboot::sb::{CertChain, MemoFlash, MemoRam};
//!
//! const jotp: &str = include_str!("../../testdata/otp-secure.json");
//! const pem: &[u8] = include_bytes!("../../testdata/hbk-key.pem");
//!
//! let mut otp = MemoOtpStore::new();
//! otp.load_json(jotp).expect("loading OTP");
//!
//! // a key certificate signed with the key whose hash is in OTP
//! let signer = CertSigner::from_pem(pem).expect("loading signing key");
//! let cert = signer
//!     .sign(&CertBody::Key(KeyCertBody {
//!         hbk_id: HbkId::Hbk,
//!         nv_counter: 0x0000_0002,
//!         next_pub_key_hash: [0xab; 32],
//!     }))
//!     .expect("signing key certificate");
//!
//! let mut flash = MemoFlash::new(0x1000_0000, 0x1000);
//! flash.program(0x1000_0000, &cert).expect("programming flash");
//! let ram = MemoRam::new(0x8000_0000, 0x1000);
//!
//! let mut chain = CertChain::new();
//! let mut images = vec![];
//! chain
//!     .verify_single(&otp, &flash, &ram, 0x1000_0000, &mut images)
//!     .expect("verifying the root key certificate");
//!
//! assert!(!chain.is_complete());
//! ```

pub use self::api::{get_cert_size, sw_image_store_addr_change, ChainType};
pub use self::chain::{load_certificate, CertChain};
pub use self::errors::*;
pub use self::flash::{IFlashReader, IMemory, MemoFlash, MemoRam};
pub use self::swcomp::{verify_sw_comps, MemoryType, VerifiedImageInfo, SW_IMAGE_CHUNK_SIZE};

pub(crate) use self::chain::{check_nv_counter, verify_root_key_hash};

mod api;
mod chain;
mod errors;
mod flash;
mod swcomp;
