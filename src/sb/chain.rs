// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::errors::Error;
use super::flash::{IFlashReader, IMemory};
use super::swcomp::{verify_sw_comps, VerifiedImageInfo};
use crate::cert::{
    self, nv_counter_id, nv_counter_value, CertBody, CertHeader, CertType, Certificate,
    CurrentTime, IValidity, HASH_SIZE, HEADER_SIZE, MAX_CERT_SIZE, MAX_X509_CERT_SIZE,
    SIGNATURE_SIZE,
};
use crate::otp::{self, lifecycle, CounterId, HbkId, IOtpStore, Lcs};
use log::{debug, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ChainPosition {
    First,
    Second,
    Third,
    Done,
}

/// State carried from one certificate of a secure boot chain to the next
#[derive(Debug)]
pub struct CertChain {
    position: ChainPosition,
    hbk_id: HbkId,
    nv_counter: u32,
    pub_key_hash: [u8; HASH_SIZE],
    validity: Box<dyn IValidity>,
}

impl Default for CertChain {
    fn default() -> Self {
        Self::new()
    }
}

/// Check the hash of the first public key of a chain against OTP.  Returns
/// `false` if the check was skipped, which happens in CM and RMA, and while
/// the slot is not programmed yet.
pub(crate) fn verify_root_key_hash(
    otp: &impl IOtpStore,
    hbk_id: HbkId,
    computed: &[u8; HASH_SIZE],
) -> Result<bool, Error> {
    let lcs = otp.lcs()?;

    if matches!(lcs, Lcs::ChipManufacture | Lcs::Rma) {
        warn!("{lcs} LCS: root public key hash not checked");
        return Ok(false);
    }

    let Some(expected) = lifecycle::pub_key_hash(otp, hbk_id)? else {
        warn!("{hbk_id:?} not programmed: root public key hash not checked");
        return Ok(false);
    };

    // the 128-bit slots hold the leading half of the hash
    if computed.get(..expected.len()) != Some(expected.as_slice()) {
        return Err(Error::PubKeyHash(format!(
            "root public key hash {} does not match {hbk_id:?} {}",
            hex::encode(computed),
            hex::encode(&expected)
        )));
    }

    Ok(true)
}

// the anti-rollback counter is enforced in Secure LCS, and in DM for the
// ICV chain
fn counter_enforced(lcs: Lcs, hbk_id: HbkId) -> bool {
    lcs == Lcs::Secure || (lcs == Lcs::DeviceManufacture && hbk_id == HbkId::Hbk0)
}

/// Decode a certificate NV counter word and check it against OTP.  Returns
/// the counter and the version the certificate carries.
pub(crate) fn check_nv_counter(
    otp: &impl IOtpStore,
    hbk_id: HbkId,
    word: u32,
) -> Result<(CounterId, u32), Error> {
    let id = CounterId::try_from(nv_counter_id(word))
        .map_err(|x| Error::SwVersionIllegal(format!("unknown counter id {x}")))?;
    let version = nv_counter_value(word);

    if version > id.max_version() {
        return Err(Error::SwVersionIllegal(format!(
            "{id:?} version {version} exceeds {}",
            id.max_version()
        )));
    }

    if counter_enforced(otp.lcs()?, hbk_id) {
        let min = lifecycle::sw_version(otp, id)?;

        if version < min {
            return Err(Error::SwVersionSmaller(format!(
                "{id:?} version {version} is smaller than {min}"
            )));
        }
    }

    Ok((id, version))
}

impl CertChain {
    /// Start a new chain: the next certificate is expected to be a key
    /// certificate whose public key is rooted in OTP.  X.509 certificates
    /// are checked against the system clock.
    pub fn new() -> Self {
        Self::with_validity(Box::new(CurrentTime))
    }

    /// Start a new chain whose X.509 certificates must pass `validity`
    pub fn with_validity(validity: Box<dyn IValidity>) -> Self {
        Self {
            position: ChainPosition::First,
            hbk_id: HbkId::Hbk,
            nv_counter: 0,
            pub_key_hash: [0; HASH_SIZE],
            validity,
        }
    }

    /// Has the content certificate been processed?
    pub fn is_complete(&self) -> bool {
        self.position == ChainPosition::Done
    }

    /// HBK slot the chain is rooted in, once the first certificate is in
    pub fn hbk_id(&self) -> Option<HbkId> {
        match self.position {
            ChainPosition::First => None,
            _ => Some(self.hbk_id),
        }
    }

    fn expected_type(&self) -> Result<CertType, Error> {
        match self.position {
            ChainPosition::First => Ok(CertType::Key),
            ChainPosition::Second => Ok(CertType::KeyOrContent),
            ChainPosition::Third => Ok(CertType::Content),
            ChainPosition::Done => Err(Error::InvalidInput(
                "no certificate expected after the content certificate".to_string(),
            )),
        }
    }

    /// Load the certificate at `cert_addr` and verify it as the next link of
    /// the chain.  For the content certificate, the images it lists are
    /// verified as well and reported in `images`.  `images` is empty on
    /// failure.
    pub fn verify_single(
        &mut self,
        otp: &impl IOtpStore,
        flash: &impl IFlashReader,
        ram: &impl IMemory,
        cert_addr: u64,
        images: &mut Vec<VerifiedImageInfo>,
    ) -> Result<CertType, Error> {
        images.clear();

        let r = self.verify_single_inner(otp, flash, ram, cert_addr, images);

        if r.is_err() {
            images.clear();
        }

        r
    }

    fn verify_single_inner(
        &mut self,
        otp: &impl IOtpStore,
        flash: &impl IFlashReader,
        ram: &impl IMemory,
        cert_addr: u64,
        images: &mut Vec<VerifiedImageInfo>,
    ) -> Result<CertType, Error> {
        let expected = self.expected_type()?;

        let cert = load_certificate(flash, cert_addr, expected, self.validity.as_ref())?;

        let hbk_id = cert
            .hbk_id()
            .ok_or_else(|| {
                Error::InvalidInput(format!(
                    "{:?} certificate in a secure boot chain",
                    cert.cert_type
                ))
            })?;

        if self.position == ChainPosition::First {
            self.hbk_id = hbk_id;
        } else if hbk_id != self.hbk_id {
            return Err(Error::HbkIdx(format!(
                "certificate names {hbk_id:?}, chain is rooted in {:?}",
                self.hbk_id
            )));
        }

        let key_hash = cert.pub_key.hash()?;

        if self.position == ChainPosition::First {
            verify_root_key_hash(otp, self.hbk_id, &key_hash)?;
        } else if key_hash != self.pub_key_hash {
            return Err(Error::PubKeyHash(format!(
                "public key hash {} does not match the one in the previous certificate",
                hex::encode(key_hash)
            )));
        }

        cert.verify_signature()?;

        let word = cert
            .nv_counter()
            .ok_or_else(|| Error::InvalidInput("missing NV counter".to_string()))?;

        let (counter, version) = check_nv_counter(otp, self.hbk_id, word)?;

        if self.position != ChainPosition::First && word != self.nv_counter {
            return Err(Error::SwVersionIllegal(format!(
                "NV counter {word:#010x} differs from the chain's {:#010x}",
                self.nv_counter
            )));
        }

        match &cert.body {
            CertBody::Key(b) => {
                self.nv_counter = word;
                self.pub_key_hash = b.next_pub_key_hash;
                self.position = match self.position {
                    ChainPosition::First => ChainPosition::Second,
                    _ => ChainPosition::Third,
                };

                debug!("key certificate at {cert_addr:#x} verified");
            }
            CertBody::Content(b) => {
                let verified = verify_sw_comps(otp, flash, ram, self.hbk_id, b)?;

                update_nv_counter(otp, self.hbk_id, counter, version)?;

                images.extend(verified);
                self.position = ChainPosition::Done;

                info!(
                    "content certificate at {cert_addr:#x} verified, {} images",
                    images.len()
                );
            }
            _ => {
                return Err(Error::InvalidInput(format!(
                    "{:?} certificate in a secure boot chain",
                    cert.cert_type
                )))
            }
        }

        Ok(cert.cert_type)
    }
}

/// Read a certificate package from flash: the header first, to learn the
/// size, then the signed part and the signature, then the non-signed part.
/// For X.509 certificates the header is the DER sequence header, and the
/// non-signed part starts at the next word boundary.
pub fn load_certificate(
    flash: &impl IFlashReader,
    addr: u64,
    expected: CertType,
    validity: &dyn IValidity,
) -> Result<Certificate, Error> {
    let mut hdr = [0u8; HEADER_SIZE];
    flash.read(addr, &mut hdr)?;

    let (size, max) = if cert::is_x509(&hdr) {
        (cert::x509_cert_size(&hdr)?, MAX_X509_CERT_SIZE)
    } else {
        let header = CertHeader::decode(&hdr)?;
        header.validate(expected)?;
        (header.signed_size() + SIGNATURE_SIZE, MAX_CERT_SIZE)
    };

    if size > max {
        return Err(cert::Error::CertSize(format!(
            "certificate is {size} bytes, at most {max} are supported"
        ))
        .into());
    }

    let mut buf = vec![0u8; size];
    flash.read(addr, &mut buf)?;

    let mut c = Certificate::decode_with_validity(&buf, expected, validity)?;

    let n = c.non_signed_size();
    if n > 0 {
        let mut trailer = vec![0u8; n];
        flash.read(addr + c.size() as u64, &mut trailer)?;
        c.attach_non_signed(&trailer)?;
    }

    Ok(c)
}

// Move the OTP counter up to the version of the content certificate, where
// the counter is enforced
fn update_nv_counter(
    otp: &impl IOtpStore,
    hbk_id: HbkId,
    id: CounterId,
    version: u32,
) -> Result<(), Error> {
    let lcs = otp.lcs()?;

    if !counter_enforced(lcs, hbk_id) {
        return Ok(());
    }

    let current = lifecycle::sw_version(otp, id)?;
    if version <= current {
        return Ok(());
    }

    match lifecycle::set_sw_version(otp, id, version) {
        Ok(()) => {}
        Err(otp::Error::WriteCompare(e)) => return Err(Error::OtpVersion(e)),
        Err(e) => return Err(e.into()),
    }

    let now = lifecycle::sw_version(otp, id)?;
    if now != version {
        return Err(Error::OtpVersion(format!(
            "{id:?} counter reads {now} after setting {version}"
        )));
    }

    info!("{id:?} counter moved from {current} to {version}");

    Ok(())
}
