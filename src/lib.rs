// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

//! Arm CryptoCell secure boot and secure debug certificate chain verification.
//!
//! This crate provides an API to decode and verify the proprietary
//! certificates used by a CryptoCell-713 class security engine to establish a
//! chain of trust from a hash of the root public key burned in OTP memory
//! down to the software images loaded at boot.
//!
//! The API allows:
//! * Decoding key, content, enabler and developer certificates
//! * Walking a key → content certificate chain, checking each signature and
//!   public key hash, and enforcing anti-rollback counters
//! * Loading and verifying (and optionally decrypting) the software images
//!   described by a content certificate
//! * Gating all of the above on the device lifecycle state held in OTP
//! * Applying a secure debug certificate package to the debug control unit

pub mod cert;
pub mod otp;
pub mod sb;
pub mod secdebug;
