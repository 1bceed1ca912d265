// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::package::DebugCertPackage;
use crate::cert::{CertBody, DeveloperCertBody, EnablerCertBody, DCU_SIZE_IN_WORDS, HASH_SIZE};
use crate::otp::{lifecycle, IOtpStore, Lcs};
use crate::sb::{check_nv_counter, verify_root_key_hash, Error};
use log::{debug, error, info};
use serde::Serialize;

const DCU_ENABLE_ALL: u32 = 0xFFFF_FFFF;
const DCU_DISABLE_ALL: u32 = 0;

/// The values to program into the debug control unit
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct DebugOutcome {
    /// Debug enable bits
    #[serde(rename = "dcu")]
    pub dcu: [u32; DCU_SIZE_IN_WORDS],
    /// Bits of `dcu` that can no longer be changed until the next reset
    #[serde(rename = "lock")]
    pub lock: [u32; DCU_SIZE_IN_WORDS],
    /// The device is to be moved to the RMA lifecycle state
    #[serde(rename = "is-rma")]
    pub is_rma: bool,
}

/// What applies when no secure debug package is presented: debug disabled,
/// and locked as configured in OTP
pub fn secure_debug_default(otp: &impl IOtpStore) -> Result<DebugOutcome, Error> {
    Ok(DebugOutcome {
        dcu: [DCU_DISABLE_ALL; DCU_SIZE_IN_WORDS],
        lock: lifecycle::dcu_default_lock(otp)?,
        is_rma: false,
    })
}

/// Verify a secure debug package against the OTP root of trust and the
/// device lifecycle state, and compute the resulting debug permissions
pub fn secure_debug_set(
    otp: &impl IOtpStore,
    pkg: &DebugCertPackage,
) -> Result<DebugOutcome, Error> {
    let r = verify_package(otp, pkg);

    if let Err(e) = &r {
        error!("secure debug package rejected: {e}");
    }

    r
}

fn verify_package(otp: &impl IOtpStore, pkg: &DebugCertPackage) -> Result<DebugOutcome, Error> {
    let CertBody::Enabler(enabler) = &pkg.enabler.body else {
        return Err(Error::Decoding("no enabler certificate body".to_string()));
    };

    let enabler_hash = pkg.enabler.pub_key.hash()?;

    match &pkg.key {
        Some(key) => {
            let CertBody::Key(kb) = &key.body else {
                return Err(Error::Decoding("no key certificate body".to_string()));
            };

            verify_root_key_hash(otp, kb.hbk_id, &key.pub_key.hash()?)?;
            key.verify_signature()?;
            check_nv_counter(otp, kb.hbk_id, kb.nv_counter)?;

            if enabler.hbk_id != kb.hbk_id {
                return Err(Error::HbkIdx(format!(
                    "enabler names {:?}, key certificate {:?}",
                    enabler.hbk_id, kb.hbk_id
                )));
            }

            check_link(&kb.next_pub_key_hash, &enabler_hash, "enabler")?;
        }
        None => {
            verify_root_key_hash(otp, enabler.hbk_id, &enabler_hash)?;
        }
    }

    pkg.enabler.verify_signature()?;

    let lcs = otp.lcs()?;

    if enabler.lcs != lcs {
        return Err(Error::IllegalLcs(format!(
            "enabler is for {} LCS, device is in {lcs}",
            enabler.lcs
        )));
    }

    if enabler.is_rma {
        return rma_outcome(lcs, pkg);
    }

    let Some(developer) = &pkg.developer else {
        return Err(Error::InvalidInput(
            "developer certificate missing".to_string(),
        ));
    };
    let CertBody::Developer(db) = &developer.body else {
        return Err(Error::Decoding("no developer certificate body".to_string()));
    };

    check_link(
        &enabler.next_pub_key_hash,
        &developer.pub_key.hash()?,
        "developer",
    )?;
    developer.verify_signature()?;

    let soc_id = lifecycle::soc_id(otp)?;
    if db.soc_id != soc_id {
        return Err(Error::SocId(format!(
            "developer certificate is bound to {}, device is {}",
            hex::encode(db.soc_id),
            hex::encode(soc_id)
        )));
    }

    let outcome = DebugOutcome {
        dcu: dcu_value(enabler, db),
        lock: dcu_lock(enabler, &lifecycle::dcu_default_lock(otp)?),
        is_rma: false,
    };

    info!("secure debug enabled: dcu {:08x?}", outcome.dcu);

    Ok(outcome)
}

fn check_link(expected: &[u8; HASH_SIZE], actual: &[u8; HASH_SIZE], what: &str) -> Result<(), Error> {
    if expected != actual {
        return Err(Error::PubKeyHash(format!(
            "{what} public key hash {} does not match {}",
            hex::encode(actual),
            hex::encode(expected)
        )));
    }

    Ok(())
}

fn rma_outcome(lcs: Lcs, pkg: &DebugCertPackage) -> Result<DebugOutcome, Error> {
    if !matches!(lcs, Lcs::DeviceManufacture | Lcs::Secure) {
        return Err(Error::IllegalLcs(format!("RMA entry requested in {lcs} LCS")));
    }

    if pkg.developer.is_some() {
        return Err(Error::InvalidInput(
            "developer certificate with an RMA enabler".to_string(),
        ));
    }

    debug!("RMA entry requested from {lcs} LCS");

    Ok(DebugOutcome {
        dcu: [DCU_ENABLE_ALL; DCU_SIZE_IN_WORDS],
        lock: [DCU_ENABLE_ALL; DCU_SIZE_IN_WORDS],
        is_rma: true,
    })
}

fn dcu_value(enabler: &EnablerCertBody, developer: &DeveloperCertBody) -> [u32; DCU_SIZE_IN_WORDS] {
    let mut dcu = [0u32; DCU_SIZE_IN_WORDS];

    for (i, d) in dcu.iter_mut().enumerate() {
        *d = enabler.debug_mask[i] & developer.debug_mask[i];
    }

    dcu
}

fn dcu_lock(enabler: &EnablerCertBody, default: &[u32; DCU_SIZE_IN_WORDS]) -> [u32; DCU_SIZE_IN_WORDS] {
    let mut lock = [0u32; DCU_SIZE_IN_WORDS];

    for (i, l) in lock.iter_mut().enumerate() {
        *l = enabler.debug_lock[i] | default[i];
    }

    lock
}
