// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

//! Helpers for the code that stages certificates in memory before handing
//! them to the verifiers.

use super::errors::Error;
use crate::cert::{
    self, num_of_comps_from_flags, CertHeader, CertType, HEADER_SIZE, MAX_CONTENT_PKG_SIZE,
    MAX_DEVELOPER_CERT_SIZE, MAX_ENABLER_CERT_SIZE, MAX_KEY_CERT_SIZE, MAX_SW_COMPS,
    MAX_X509_CERT_SIZE, SIGNATURE_SIZE, SW_REC_NON_SIGNED_SIZE, X509_HEADER_SIZE,
};
use log::debug;

/// Which kind of chain a certificate belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChainType {
    SecureBoot,
    SecureDebug,
}

/// Return how many bytes must be read to get the whole certificate, or
/// certificate package, starting with the header in `buf`.  Only the header
/// is looked at.  An X.509 header does not tell the certificate type, so the
/// largest package of the chain is assumed.
pub fn get_cert_size(chain: ChainType, buf: &[u8]) -> Result<usize, Error> {
    if cert::is_x509(buf) {
        return get_x509_cert_size(chain, buf);
    }

    if buf.len() < HEADER_SIZE {
        return Err(Error::InvalidInput(format!(
            "{} bytes is too short for a certificate header",
            buf.len()
        )));
    }

    let header = CertHeader::decode(buf)?;
    let cert_type = CertType::from_magic(header.magic);

    let size = match (chain, cert_type) {
        (ChainType::SecureBoot, Some(CertType::Key)) => {
            header.validate(CertType::Key)?;
            MAX_KEY_CERT_SIZE
        }
        (ChainType::SecureBoot, Some(CertType::Content)) => {
            header.validate(CertType::Content)?;

            let n = num_of_comps_from_flags(header.flags)?;
            let size = header.signed_size() + SIGNATURE_SIZE + n * SW_REC_NON_SIGNED_SIZE;

            if size > MAX_CONTENT_PKG_SIZE {
                return Err(Error::InvalidInput(format!(
                    "content certificate package is {size} bytes, at most {MAX_CONTENT_PKG_SIZE} are supported"
                )));
            }
            size
        }
        (ChainType::SecureDebug, Some(CertType::Key)) => {
            MAX_KEY_CERT_SIZE + MAX_ENABLER_CERT_SIZE + MAX_DEVELOPER_CERT_SIZE
        }
        (ChainType::SecureDebug, Some(CertType::Enabler)) => {
            MAX_ENABLER_CERT_SIZE + MAX_DEVELOPER_CERT_SIZE
        }
        _ => {
            return Err(cert::Error::MagicNumber(format!(
                "unexpected magic number {:#010x} for a {chain:?} chain",
                header.magic
            ))
            .into())
        }
    };

    debug!("{chain:?} certificate needs {size} bytes");

    Ok(size)
}

fn get_x509_cert_size(chain: ChainType, buf: &[u8]) -> Result<usize, Error> {
    let size = cert::x509_cert_size(buf)?;

    if size > MAX_X509_CERT_SIZE {
        return Err(cert::Error::CertSize(format!(
            "X.509 certificate is {size} bytes, at most {MAX_X509_CERT_SIZE} are supported"
        ))
        .into());
    }

    let size = match chain {
        ChainType::SecureBoot => MAX_X509_CERT_SIZE + MAX_SW_COMPS * SW_REC_NON_SIGNED_SIZE,
        ChainType::SecureDebug => 3 * MAX_X509_CERT_SIZE,
    };

    debug!("{chain:?} X.509 certificate needs at most {size} bytes");

    Ok(size)
}

/// Patch the flash address image `index` is loaded from, in the non-signed
/// part of the content certificate package in `pkg`.  The signature is not
/// affected.
pub fn sw_image_store_addr_change(
    pkg: &mut [u8],
    max_size: usize,
    addr: u64,
    index: usize,
) -> Result<(), Error> {
    if pkg.len() < HEADER_SIZE || max_size < HEADER_SIZE {
        return Err(cert::Error::BufferTooSmall(format!(
            "{} bytes is too short for a certificate header",
            pkg.len()
        ))
        .into());
    }

    let header = CertHeader::decode(pkg)?;

    header.validate(CertType::Content)?;

    let n = num_of_comps_from_flags(header.flags)?;

    if index >= n {
        return Err(Error::InvalidInput(format!(
            "image index {index} out of {n}"
        )));
    }

    let end = header.signed_size() + SIGNATURE_SIZE + n * SW_REC_NON_SIGNED_SIZE;
    if end > max_size || end > pkg.len() {
        return Err(Error::InvalidInput(format!(
            "content certificate package of {end} bytes does not fit in {max_size}"
        )));
    }

    let off = header.signed_size() + SIGNATURE_SIZE + index * SW_REC_NON_SIGNED_SIZE;
    pkg[off..off + SW_REC_NON_SIGNED_SIZE].copy_from_slice(&addr.to_le_bytes());

    debug!("image {index} store address set to {addr:#x}");

    Ok(())
}
