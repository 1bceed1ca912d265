// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::common::*;
use super::content::ContentCertBody;
use super::debugcert::{DeveloperCertBody, EnablerCertBody};
use super::errors::Error;
use super::header::CertHeader;
use super::key::KeyCertBody;
use super::pubkey::PublicKey;
use super::x509::{self, CurrentTime, IValidity, X509Info};
use crate::otp::HbkId;
use log::debug;
use serde::Serialize;

/// Type specific part of the signed region
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum CertBody {
    #[serde(rename = "key")]
    Key(KeyCertBody),
    #[serde(rename = "content")]
    Content(ContentCertBody),
    #[serde(rename = "enabler")]
    Enabler(EnablerCertBody),
    #[serde(rename = "developer")]
    Developer(DeveloperCertBody),
}

impl CertBody {
    pub fn parse(cert_type: CertType, flags: u32, buf: &[u8]) -> Result<CertBody, Error> {
        match cert_type {
            CertType::Key => Ok(CertBody::Key(KeyCertBody::parse(flags, buf)?)),
            CertType::Content => Ok(CertBody::Content(ContentCertBody::parse(flags, buf)?)),
            CertType::Enabler => Ok(CertBody::Enabler(EnablerCertBody::parse(flags, buf)?)),
            CertType::Developer => Ok(CertBody::Developer(DeveloperCertBody::parse(buf)?)),
            CertType::KeyOrContent => Err(Error::InvalidInput(
                "cannot parse a body of an undetermined type".to_string(),
            )),
        }
    }

    pub fn cert_type(&self) -> CertType {
        match self {
            CertBody::Key(_) => CertType::Key,
            CertBody::Content(_) => CertType::Content,
            CertBody::Enabler(_) => CertType::Enabler,
            CertBody::Developer(_) => CertType::Developer,
        }
    }

    pub fn flags(&self) -> u32 {
        match self {
            CertBody::Key(b) => b.flags(),
            CertBody::Content(b) => b.flags(),
            CertBody::Enabler(b) => b.flags(),
            CertBody::Developer(_) => 0,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            CertBody::Key(b) => b.encode(),
            CertBody::Content(b) => b.encode(),
            CertBody::Enabler(b) => b.encode(),
            CertBody::Developer(b) => b.encode(),
        }
    }

    pub fn encode_non_signed(&self) -> Vec<u8> {
        match self {
            CertBody::Content(b) => b.encode_non_signed(),
            _ => vec![],
        }
    }
}

/// A decoded certificate: header, signer public key, body and signature.
/// X.509 certificates also carry their issuer, serial number and validity.
#[serde_with::serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Certificate {
    #[serde(rename = "header")]
    pub header: CertHeader,
    #[serde(rename = "type")]
    pub cert_type: CertType,
    #[serde(rename = "pub-key")]
    pub pub_key: PublicKey,
    #[serde(rename = "body")]
    pub body: CertBody,
    #[serde(rename = "signature")]
    #[serde_as(as = "serde_with::hex::Hex")]
    pub signature: Vec<u8>,
    #[serde(rename = "x509", skip_serializing_if = "Option::is_none")]
    pub x509: Option<X509Info>,

    #[serde(skip)]
    pub(super) tbs: Vec<u8>,
    #[serde(skip)]
    pub(super) size: usize,
}

impl Certificate {
    /// Decode the signed part and the signature of a certificate, in either
    /// format.  The non-signed part of a content certificate, if any, is left
    /// alone: see [`Certificate::attach_non_signed`].  X.509 certificates
    /// are checked against the system clock.
    pub fn decode(buf: &[u8], expected: CertType) -> Result<Certificate, Error> {
        Certificate::decode_with_validity(buf, expected, &CurrentTime)
    }

    /// Like [`Certificate::decode`], with `validity` judging the validity
    /// window of X.509 certificates
    pub fn decode_with_validity(
        buf: &[u8],
        expected: CertType,
        validity: &dyn IValidity,
    ) -> Result<Certificate, Error> {
        if x509::is_x509(buf) {
            return x509::decode(buf, expected, validity);
        }

        Certificate::decode_proprietary(buf, expected)
    }

    fn decode_proprietary(buf: &[u8], expected: CertType) -> Result<Certificate, Error> {
        let header = CertHeader::decode(buf)?;
        let cert_type = header.validate(expected)?;

        let signed_size = header.signed_size();

        if signed_size + SIGNATURE_SIZE > buf.len() {
            return Err(Error::InvalidInput(format!(
                "certificate needs {} bytes, buffer has {}",
                signed_size + SIGNATURE_SIZE,
                buf.len()
            )));
        }

        if signed_size > cert_type.max_signed_size() || signed_size < HEADER_SIZE + PUB_KEY_SIZE {
            return Err(Error::CertSize(format!(
                "signed size {signed_size} out of bounds for a {cert_type:?} certificate"
            )));
        }

        let pub_key = PublicKey::decode(&buf[HEADER_SIZE..])?;
        let body = CertBody::parse(
            cert_type,
            header.flags,
            &buf[HEADER_SIZE + PUB_KEY_SIZE..signed_size],
        )?;

        debug!("decoded {cert_type:?} certificate, {signed_size} bytes signed");

        Ok(Certificate {
            header,
            cert_type,
            pub_key,
            body,
            signature: buf[signed_size..signed_size + SIGNATURE_SIZE].to_vec(),
            x509: None,
            tbs: buf[..signed_size].to_vec(),
            size: signed_size + SIGNATURE_SIZE,
        })
    }

    /// Parse the non-signed data that trails the signature
    pub fn attach_non_signed(&mut self, buf: &[u8]) -> Result<(), Error> {
        match &mut self.body {
            CertBody::Content(b) => b.attach_src_addrs(buf),
            _ => Ok(()),
        }
    }

    /// Decode a certificate together with its non-signed trailer
    pub fn decode_package(buf: &[u8], expected: CertType) -> Result<Certificate, Error> {
        let mut c = Certificate::decode(buf, expected)?;

        c.attach_non_signed(&buf[c.size()..])?;

        Ok(c)
    }

    /// Bytes covered by the signature
    pub fn tbs(&self) -> &[u8] {
        &self.tbs
    }

    pub fn verify_signature(&self) -> Result<(), Error> {
        self.pub_key.verify(&self.tbs, &self.signature)
    }

    /// Bytes taken by the certificate up to its non-signed part: the signed
    /// part plus the signature, or the word-aligned DER encoding
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn non_signed_size(&self) -> usize {
        match &self.body {
            CertBody::Content(b) => b.non_signed_size(),
            _ => 0,
        }
    }

    pub fn package_size(&self) -> usize {
        self.size() + self.non_signed_size()
    }

    /// The OTP slot the chain is rooted in.  Developer certificates do not
    /// name one.
    pub fn hbk_id(&self) -> Option<HbkId> {
        match &self.body {
            CertBody::Key(b) => Some(b.hbk_id),
            CertBody::Content(b) => Some(b.hbk_id),
            CertBody::Enabler(b) => Some(b.hbk_id),
            CertBody::Developer(_) => None,
        }
    }

    pub fn nv_counter(&self) -> Option<u32> {
        match &self.body {
            CertBody::Key(b) => Some(b.nv_counter),
            CertBody::Content(b) => Some(b.nv_counter),
            _ => None,
        }
    }

    /// Hash of the public key that must sign the next certificate
    pub fn next_pub_key_hash(&self) -> Option<&[u8; HASH_SIZE]> {
        match &self.body {
            CertBody::Key(b) => Some(&b.next_pub_key_hash),
            CertBody::Enabler(b) => Some(&b.next_pub_key_hash),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::builder::CertSigner;
    use crate::cert::content::{SwComponentInfo, SwImageRecord};
    use hex_literal::hex;

    const TEST_HBK_KEY: &[u8] = include_bytes!("../../testdata/hbk-key.pem");
    const TEST_OEM_KEY_HASH: [u8; 32] =
        hex!("f559706a851ecc29a4aed1ae58668cba0ec339bbb49e6ad7804d868be2e48b30");

    fn key_body() -> CertBody {
        CertBody::Key(KeyCertBody {
            hbk_id: HbkId::Hbk,
            nv_counter: 3,
            next_pub_key_hash: TEST_OEM_KEY_HASH,
        })
    }

    fn content_body() -> CertBody {
        let img = SwImageRecord {
            hash: [0x5a; HASH_SIZE],
            dst_addr: 0x2000,
            size: 64,
            aes_enc_used: false,
            src_addr: 0x4000,
        };

        CertBody::Content(ContentCertBody {
            hbk_id: HbkId::Hbk,
            nv_counter: 3,
            info: SwComponentInfo {
                code_enc_type: CodeEncType::None,
                crypto_type: CryptoType::HashOnDecrypted,
                load_verify_scheme: LoadVerifyScheme::LoadAndVerify,
                nonce: [0; NONCE_SIZE],
            },
            images: vec![img; 3],
        })
    }

    fn signer() -> CertSigner {
        CertSigner::from_pem(TEST_HBK_KEY).expect("loading signer")
    }

    #[test]
    fn decode_key_cert() {
        let s = signer();
        let buf = s.sign(&key_body()).unwrap();

        assert_eq!(buf.len(), MAX_KEY_CERT_SIZE);

        let c = Certificate::decode(&buf, CertType::KeyOrContent).unwrap();

        assert_eq!(c.cert_type, CertType::Key);
        assert_eq!(c.body, key_body());
        assert_eq!(c.hbk_id(), Some(HbkId::Hbk));
        assert_eq!(c.next_pub_key_hash(), Some(&TEST_OEM_KEY_HASH));
        assert_eq!(&c.pub_key, s.public_key());
        assert_eq!(c.size(), buf.len());

        c.verify_signature().expect("verifying key certificate");
    }

    #[test]
    fn decode_content_package() {
        let s = signer();
        let buf = s.sign(&content_body()).unwrap();

        let c = Certificate::decode_package(&buf, CertType::Content).unwrap();

        assert_eq!(c.body, content_body());
        assert_eq!(c.non_signed_size(), 3 * SW_REC_NON_SIGNED_SIZE);
        assert_eq!(c.package_size(), buf.len());

        c.verify_signature().expect("verifying content certificate");
    }

    #[test]
    fn decode_wrong_type() {
        let buf = signer().sign(&key_body()).unwrap();

        let r = Certificate::decode(&buf, CertType::Content);
        assert!(matches!(r, Err(Error::CertType(_))));
    }

    #[test]
    fn decode_truncated() {
        let buf = signer().sign(&key_body()).unwrap();

        let r = Certificate::decode(&buf[..buf.len() - 1], CertType::Key);
        assert!(matches!(r, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn decode_oversized() {
        let mut buf = signer().sign(&key_body()).unwrap();

        // claim one more signed word than a key certificate can hold
        let words = (MAX_KEY_CERT_SIZE - SIGNATURE_SIZE) / WORD_SIZE + 1;
        buf[8..12].copy_from_slice(&(words as u32).to_le_bytes());
        buf.extend_from_slice(&[0u8; WORD_SIZE]);

        let r = Certificate::decode(&buf, CertType::Key);
        assert!(matches!(r, Err(Error::CertSize(_))));
    }

    #[test]
    fn tampered_body() {
        let mut buf = signer().sign(&key_body()).unwrap();

        // bump the NV counter
        buf[HEADER_SIZE + PUB_KEY_SIZE] ^= 0x01;

        let c = Certificate::decode(&buf, CertType::Key).unwrap();
        assert!(matches!(c.verify_signature(), Err(Error::Signature(_))));
    }

    #[test]
    fn non_signed_is_not_covered() {
        let mut buf = signer().sign(&content_body()).unwrap();

        let n = buf.len();
        buf[n - 1] = 0x80;

        let c = Certificate::decode_package(&buf, CertType::Content).unwrap();
        c.verify_signature().expect("non-signed data is outside the signature");

        let CertBody::Content(b) = &c.body else {
            panic!("expecting a content certificate")
        };
        assert_eq!(b.images[2].src_addr, 0x8000_0000_0000_4000);
    }
}
