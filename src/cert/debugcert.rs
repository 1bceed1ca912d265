// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::common::*;
use super::errors::Error;
use super::key::hbk_id_from_flags;
use crate::otp::{HbkId, Lcs};
use serde::Serialize;

const LCS_SHIFT: u32 = 4;
const IS_RMA_SHIFT: u32 = 8;

/// An enabler certificate is issued by the root key owner and states which
/// debug features may be opened, and which must stay locked, on devices in a
/// given lifecycle state
#[serde_with::serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EnablerCertBody {
    #[serde(rename = "hbk-id")]
    pub hbk_id: HbkId,
    #[serde(rename = "lcs")]
    pub lcs: Lcs,
    #[serde(rename = "is-rma")]
    pub is_rma: bool,
    #[serde(rename = "debug-mask")]
    pub debug_mask: [u32; DCU_SIZE_IN_WORDS],
    #[serde(rename = "debug-lock")]
    pub debug_lock: [u32; DCU_SIZE_IN_WORDS],
    #[serde(rename = "next-pub-key-hash")]
    #[serde_as(as = "serde_with::hex::Hex")]
    pub next_pub_key_hash: [u8; HASH_SIZE],
}

impl EnablerCertBody {
    pub fn parse(flags: u32, buf: &[u8]) -> Result<EnablerCertBody, Error> {
        if buf.len() != ENABLER_CERT_BODY_SIZE {
            return Err(Error::CertSize(format!(
                "enabler certificate body is {} bytes, expecting {ENABLER_CERT_BODY_SIZE}",
                buf.len()
            )));
        }

        let lcs = Lcs::try_from(get_field(flags, LCS_SHIFT, 4))
            .map_err(|e| Error::Syntax(format!("{e:?}")))?;

        let is_rma = match get_field(flags, IS_RMA_SHIFT, 4) {
            0 => false,
            1 => true,
            x => return Err(Error::Syntax(format!("illegal RMA indication {x}"))),
        };

        let dcu_bytes = DCU_SIZE_IN_WORDS * WORD_SIZE;

        Ok(EnablerCertBody {
            hbk_id: hbk_id_from_flags(flags)?,
            lcs,
            is_rma,
            debug_mask: read_dcu(buf, 0, "debug-mask")?,
            debug_lock: read_dcu(buf, dcu_bytes, "debug-lock")?,
            next_pub_key_hash: read_array(buf, 2 * dcu_bytes, "next-pub-key-hash")?,
        })
    }

    pub fn flags(&self) -> u32 {
        (self.hbk_id as u32) | (self.lcs as u32) << LCS_SHIFT | (self.is_rma as u32) << IS_RMA_SHIFT
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut v: Vec<u8> = self
            .debug_mask
            .iter()
            .chain(self.debug_lock.iter())
            .flat_map(|w| w.to_le_bytes())
            .collect();
        v.extend_from_slice(&self.next_pub_key_hash);
        v
    }
}

/// A developer certificate requests debug features for one specific device
#[serde_with::serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeveloperCertBody {
    #[serde(rename = "debug-mask")]
    pub debug_mask: [u32; DCU_SIZE_IN_WORDS],
    #[serde(rename = "soc-id")]
    #[serde_as(as = "serde_with::hex::Hex")]
    pub soc_id: [u8; SOC_ID_SIZE],
}

impl DeveloperCertBody {
    pub fn parse(buf: &[u8]) -> Result<DeveloperCertBody, Error> {
        if buf.len() != DEVELOPER_CERT_BODY_SIZE {
            return Err(Error::CertSize(format!(
                "developer certificate body is {} bytes, expecting {DEVELOPER_CERT_BODY_SIZE}",
                buf.len()
            )));
        }

        Ok(DeveloperCertBody {
            debug_mask: read_dcu(buf, 0, "debug-mask")?,
            soc_id: read_array(buf, DCU_SIZE_IN_WORDS * WORD_SIZE, "soc-id")?,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut v: Vec<u8> = self.debug_mask.iter().flat_map(|w| w.to_le_bytes()).collect();
        v.extend_from_slice(&self.soc_id);
        v
    }
}
