// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::common::Lcs;
use serde::{Deserialize, Serialize};

/// The manufacturing-time content of the OTP, as burned by the ICV and the
/// OEM.  Hash and key material is hex encoded.
#[serde_with::serde_as]
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct OtpConfig {
    /// Lifecycle state the device boots into
    #[serde(rename = "lcs")]
    pub lcs: Lcs,

    /// Full 256-bit hash of the root public key.  Mutually exclusive with
    /// `hbk0` and `hbk1`.
    #[serde(rename = "hbk")]
    #[serde_as(as = "Option<serde_with::hex::Hex>")]
    pub hbk: Option<[u8; 32]>,

    /// Truncated hash of the ICV root public key
    #[serde(rename = "hbk0")]
    #[serde_as(as = "Option<serde_with::hex::Hex>")]
    pub hbk0: Option<[u8; 16]>,

    /// Truncated hash of the OEM root public key
    #[serde(rename = "hbk1")]
    #[serde_as(as = "Option<serde_with::hex::Hex>")]
    pub hbk1: Option<[u8; 16]>,

    /// ICV code encryption key
    #[serde(rename = "kceicv")]
    #[serde_as(as = "Option<serde_with::hex::Hex>")]
    pub kceicv: Option<[u8; 16]>,

    /// OEM code encryption key
    #[serde(rename = "kce")]
    #[serde_as(as = "Option<serde_with::hex::Hex>")]
    pub kce: Option<[u8; 16]>,

    #[serde(rename = "trusted-min-version", default)]
    pub trusted_min_version: u32,

    #[serde(rename = "non-trusted-min-version", default)]
    pub non_trusted_min_version: u32,

    /// Debug control unit lock applied when no debug certificate is present
    #[serde(rename = "dcu-lock", default)]
    pub dcu_lock: [u32; 4],

    #[serde(rename = "secure-disable", default)]
    pub secure_disable: bool,

    #[serde(rename = "icv-rma", default)]
    pub icv_rma: bool,

    #[serde(rename = "oem-rma", default)]
    pub oem_rma: bool,
}
