// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use crate::cert::{self, CertHeader, CertType, Certificate, CurrentTime, IValidity, HEADER_SIZE};
use crate::sb::Error;
use bitmask::*;
use log::{debug, warn};
use serde::Serialize;

bitmask! {
    #[derive(Debug)]
    mask DebugCertsSet: u8 where flags DebugCerts {
        Key       = 0x01,
        Enabler   = 0x02,
        Developer = 0x04,
    }
}

/// A secure debug certificate package: an optional key certificate, the
/// enabler certificate and, unless the enabler requests RMA, the developer
/// certificate, laid out back to back in this order
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DebugCertPackage {
    #[serde(rename = "key", skip_serializing_if = "Option::is_none")]
    pub key: Option<Certificate>,
    #[serde(rename = "enabler")]
    pub enabler: Certificate,
    #[serde(rename = "developer", skip_serializing_if = "Option::is_none")]
    pub developer: Option<Certificate>,
}

impl DebugCertPackage {
    /// Split and decode the certificates of a package.  Signatures are not
    /// checked here.  Bytes following the last certificate that do not start
    /// with a known magic number are ignored, so that a buffer sized with
    /// [`crate::sb::get_cert_size`] can be passed as is.  X.509
    /// certificates are checked against the system clock.
    pub fn parse(buf: &[u8]) -> Result<DebugCertPackage, Error> {
        DebugCertPackage::parse_with_validity(buf, &CurrentTime)
    }

    /// Like [`DebugCertPackage::parse`], with `validity` judging the
    /// validity window of X.509 certificates
    pub fn parse_with_validity(
        buf: &[u8],
        validity: &dyn IValidity,
    ) -> Result<DebugCertPackage, Error> {
        let mut seen = DebugCertsSet::none();
        let mut key = None;
        let mut enabler = None;
        let mut developer = None;
        let mut off = 0;

        while buf.len() - off >= HEADER_SIZE {
            let rest = &buf[off..];

            // the X.509 subject, or the proprietary magic number, names the type
            let found = if cert::is_x509(rest) {
                Ok(cert::x509_cert_type(rest)?)
            } else {
                let header = CertHeader::decode(rest)?;
                CertType::from_magic(header.magic).ok_or(header.magic)
            };

            let (flag, expected) = match found {
                Ok(CertType::Key) => (DebugCerts::Key, CertType::Key),
                Ok(CertType::Enabler) => (DebugCerts::Enabler, CertType::Enabler),
                Ok(CertType::Developer) => (DebugCerts::Developer, CertType::Developer),
                Ok(t) => {
                    return Err(cert::Error::MagicNumber(format!(
                        "{t:?} certificate in a secure debug package"
                    ))
                    .into())
                }
                Err(_) if off > 0 => {
                    debug!("{} trailing bytes ignored", buf.len() - off);
                    break;
                }
                Err(magic) => {
                    return Err(cert::Error::MagicNumber(format!(
                        "unknown magic number {magic:#010x}"
                    ))
                    .into())
                }
            };

            if seen.contains(flag) {
                return Err(Error::Decoding(format!("duplicate {expected:?} certificate")));
            }

            let misplaced = match flag {
                DebugCerts::Key => {
                    seen.contains(DebugCerts::Enabler) || seen.contains(DebugCerts::Developer)
                }
                DebugCerts::Enabler => seen.contains(DebugCerts::Developer),
                DebugCerts::Developer => !seen.contains(DebugCerts::Enabler),
            };
            if misplaced {
                return Err(Error::Decoding(format!(
                    "{expected:?} certificate out of order"
                )));
            }

            let c = Certificate::decode_with_validity(rest, expected, validity)?;
            off += c.size();

            match flag {
                DebugCerts::Key => key = Some(c),
                DebugCerts::Enabler => enabler = Some(c),
                DebugCerts::Developer => developer = Some(c),
            }
            seen.set(flag);

            if matches!(flag, DebugCerts::Developer) {
                break;
            }
        }

        let Some(enabler) = enabler else {
            return Err(Error::Decoding(
                "secure debug package without an enabler certificate".to_string(),
            ));
        };

        if off < buf.len() && developer.is_some() {
            warn!("{} bytes after the developer certificate", buf.len() - off);
        }

        Ok(DebugCertPackage {
            key,
            enabler,
            developer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::{
        CertBody, CertSigner, DeveloperCertBody, EnablerCertBody, FixedTime, KeyCertBody,
        X509Params,
    };
    use crate::otp::{HbkId, Lcs};

    const TEST_HBK_KEY: &[u8] = include_bytes!("../../testdata/hbk-key.pem");
    const TEST_OEM_KEY: &[u8] = include_bytes!("../../testdata/oem-key.pem");

    fn signer() -> CertSigner {
        CertSigner::from_pem(TEST_HBK_KEY).unwrap()
    }

    fn key() -> Vec<u8> {
        signer()
            .sign(&CertBody::Key(KeyCertBody {
                hbk_id: HbkId::Hbk,
                nv_counter: 0,
                next_pub_key_hash: [1; 32],
            }))
            .unwrap()
    }

    fn enabler() -> Vec<u8> {
        signer()
            .sign(&CertBody::Enabler(EnablerCertBody {
                hbk_id: HbkId::Hbk,
                lcs: Lcs::Secure,
                is_rma: false,
                debug_mask: [0xffff_0000; 4],
                debug_lock: [0; 4],
                next_pub_key_hash: [2; 32],
            }))
            .unwrap()
    }

    fn developer() -> Vec<u8> {
        CertSigner::from_pem(TEST_OEM_KEY)
            .unwrap()
            .sign(&CertBody::Developer(DeveloperCertBody {
                debug_mask: [0x0000_ffff; 4],
                soc_id: [3; 32],
            }))
            .unwrap()
    }

    #[test]
    fn parse_full_package() {
        let buf = [key(), enabler(), developer()].concat();

        let p = DebugCertPackage::parse(&buf).unwrap();

        assert_eq!(p.key.unwrap().cert_type, CertType::Key);
        assert_eq!(p.enabler.cert_type, CertType::Enabler);
        assert_eq!(p.developer.unwrap().cert_type, CertType::Developer);
    }

    #[test]
    fn parse_enabler_only() {
        // erased flash after the enabler
        let mut buf = enabler();
        buf.extend_from_slice(&[0xff; 64]);

        let p = DebugCertPackage::parse(&buf).unwrap();

        assert!(p.key.is_none());
        assert!(p.developer.is_none());
    }

    #[test]
    fn parse_bad_layout() {
        // no enabler
        let r = DebugCertPackage::parse(&[key(), developer()].concat());
        assert!(matches!(r, Err(Error::Decoding(_))));

        // developer before enabler
        let r = DebugCertPackage::parse(&[developer(), enabler()].concat());
        assert!(matches!(r, Err(Error::Decoding(_))));

        // key after enabler
        let r = DebugCertPackage::parse(&[enabler(), key()].concat());
        assert!(matches!(r, Err(Error::Decoding(_))));

        // two enablers
        let r = DebugCertPackage::parse(&[enabler(), enabler()].concat());
        assert!(matches!(r, Err(Error::Decoding(_))));

        // garbage
        let r = DebugCertPackage::parse(&[0xffu8; 32]);
        assert!(matches!(r, Err(Error::Cert(cert::Error::MagicNumber(_)))));

        // truncated developer certificate
        let buf = [enabler(), developer()].concat();
        let r = DebugCertPackage::parse(&buf[..buf.len() - 1]);
        assert!(matches!(r, Err(Error::Cert(cert::Error::InvalidInput(_)))));
    }

    #[test]
    fn parse_x509_package() {
        let params = X509Params {
            not_before: "20240101000000Z".to_string(),
            not_after: "20250101000000Z".to_string(),
            ..Default::default()
        };

        let enabler = signer()
            .sign_x509(
                &CertBody::Enabler(EnablerCertBody {
                    hbk_id: HbkId::Hbk,
                    lcs: Lcs::Secure,
                    is_rma: false,
                    debug_mask: [0xffff_0000; 4],
                    debug_lock: [0; 4],
                    next_pub_key_hash: [2; 32],
                }),
                &params,
            )
            .unwrap();
        let developer = CertSigner::from_pem(TEST_OEM_KEY)
            .unwrap()
            .sign_x509(
                &CertBody::Developer(DeveloperCertBody {
                    debug_mask: [0x0000_ffff; 4],
                    soc_id: [3; 32],
                }),
                &params,
            )
            .unwrap();

        // X.509 and proprietary certificates can be mixed
        let buf = [key(), enabler, developer].concat();

        // 2024-06-01T00:00:00Z
        let p = DebugCertPackage::parse_with_validity(&buf, &FixedTime(1_717_200_000)).unwrap();

        assert!(p.key.is_some());
        assert!(p.enabler.x509.is_some());
        assert_eq!(p.developer.unwrap().cert_type, CertType::Developer);

        // 2025-06-01T00:00:00Z
        let r = DebugCertPackage::parse_with_validity(&buf, &FixedTime(1_748_736_000));
        assert!(matches!(r, Err(Error::Cert(cert::Error::Validity(_)))));
    }
}
