// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

//! X.509 flavour of the certificates.  The proprietary header, the Np of the
//! public key and the type specific body travel as private extensions of an
//! RSASSA-PSS signed v3 certificate, whose subject names the certificate
//! type.

use super::certificate::{CertBody, Certificate};
use super::common::*;
use super::errors::Error;
use super::header::CertHeader;
use super::pubkey::{PublicKey, RSA_PUBLIC_EXPONENT};
use log::debug;
use openssl::asn1::{Asn1Time, Asn1TimeRef};
use openssl::bn::BigNum;
use openssl::nid::Nid;
use openssl::x509::{X509NameRef, X509Ref, X509};
use serde::Serialize;
use std::cmp::Ordering;

pub const PROPRIETARY_HEADER_OID: asn1::ObjectIdentifier = asn1::oid!(2, 20, 1);
pub const PUB_KEY_NP_OID: asn1::ObjectIdentifier = asn1::oid!(2, 20, 2);
pub const KEY_CERT_MAIN_OID: asn1::ObjectIdentifier = asn1::oid!(2, 20, 3);
pub const CONTENT_CERT_MAIN_OID: asn1::ObjectIdentifier = asn1::oid!(2, 20, 4);
pub const ENABLER_CERT_MAIN_OID: asn1::ObjectIdentifier = asn1::oid!(2, 20, 5);
pub const DEVELOPER_CERT_MAIN_OID: asn1::ObjectIdentifier = asn1::oid!(2, 20, 6);

pub const X509_ISSUER_NAME: &str = "ARM";

/// Largest X.509 certificate, non-signed part excluded
pub const MAX_X509_CERT_SIZE: usize = 0xB10;

/// Bytes to read to learn the size of a DER certificate
pub const X509_HEADER_SIZE: usize = 4;

/// AlgorithmIdentifier for RSASSA-PSS with SHA-256, MGF1 with SHA-256 and a
/// 32 bytes salt
pub(super) const PSS_ALGORITHM_ID: [u8; 67] = [
    0x30, 0x41, 0x06, 0x09, 0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x0a, 0x30, 0x34, 0xa0,
    0x0f, 0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01, 0x05, 0x00,
    0xa1, 0x1c, 0x30, 0x1a, 0x06, 0x09, 0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x08, 0x30,
    0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01, 0x05, 0x00, 0xa2, 0x03,
    0x02, 0x01, 0x20,
];

pub(super) const SEQUENCE_TAG: u8 = 0x30;
pub(super) const BIT_STRING_TAG: u8 = 0x03;
const LENGTH_2_BYTES: u8 = 0x82;
const EXTENSIONS_TAG: u8 = 0xa3;
const X509_VERSION_3: i32 = 2;
const MAX_SERIAL_NUMBER_SIZE: usize = 4;

// subject common name and body extension of each certificate type
static X509_CERT_TYPES: [(CertType, &str, asn1::ObjectIdentifier); 4] = [
    (CertType::Key, "KeyCert", KEY_CERT_MAIN_OID),
    (CertType::Content, "CntCert", CONTENT_CERT_MAIN_OID),
    (CertType::Enabler, "EnablerDbg", ENABLER_CERT_MAIN_OID),
    (CertType::Developer, "DeveloperDbg", DEVELOPER_CERT_MAIN_OID),
];

/// The X.509 fields with no proprietary counterpart
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct X509Info {
    #[serde(rename = "serial-number")]
    pub serial_number: u32,
    #[serde(rename = "issuer")]
    pub issuer: String,
    #[serde(rename = "subject")]
    pub subject: String,
    #[serde(rename = "not-before")]
    pub not_before: String,
    #[serde(rename = "not-after")]
    pub not_after: String,
}

/// Decides whether the validity window of an X.509 certificate is acceptable
pub trait IValidity: std::fmt::Debug {
    fn check(&self, not_before: &Asn1TimeRef, not_after: &Asn1TimeRef) -> Result<(), Error>;
}

/// Validity against the system clock
#[derive(Clone, Copy, Debug, Default)]
pub struct CurrentTime;

impl IValidity for CurrentTime {
    fn check(&self, not_before: &Asn1TimeRef, not_after: &Asn1TimeRef) -> Result<(), Error> {
        let now = Asn1Time::days_from_now(0).map_err(|e| Error::Crypto(format!("{e:?}")))?;

        check_window(&now, not_before, not_after)
    }
}

/// Validity at a fixed time, in seconds since the Unix epoch, for devices
/// without a trusted clock
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixedTime(pub i64);

impl IValidity for FixedTime {
    fn check(&self, not_before: &Asn1TimeRef, not_after: &Asn1TimeRef) -> Result<(), Error> {
        let at = Asn1Time::from_unix(self.0 as _).map_err(|e| Error::Crypto(format!("{e:?}")))?;

        check_window(&at, not_before, not_after)
    }
}

fn check_window(
    at: &Asn1TimeRef,
    not_before: &Asn1TimeRef,
    not_after: &Asn1TimeRef,
) -> Result<(), Error> {
    let cmp = |t: &Asn1TimeRef| at.compare(t).map_err(|e| Error::Crypto(format!("{e:?}")));

    if cmp(not_before)? == Ordering::Less {
        return Err(Error::Validity(format!("not valid before {not_before}")));
    }

    if cmp(not_after)? == Ordering::Greater {
        return Err(Error::Validity(format!("expired on {not_after}")));
    }

    Ok(())
}

/// Does the buffer start with a DER certificate rather than a proprietary
/// header?
pub fn is_x509(buf: &[u8]) -> bool {
    buf.first() == Some(&SEQUENCE_TAG)
}

/// Size of the DER certificate whose first [`X509_HEADER_SIZE`] bytes are in
/// `buf`
pub fn x509_cert_size(buf: &[u8]) -> Result<usize, Error> {
    let hdr = buf.get(..X509_HEADER_SIZE).ok_or_else(|| {
        Error::BufferTooSmall(format!(
            "{} bytes is too short for a DER header",
            buf.len()
        ))
    })?;

    if hdr[0] != SEQUENCE_TAG || hdr[1] != LENGTH_2_BYTES {
        return Err(Error::X509(format!(
            "unexpected DER header {}",
            hex::encode(hdr)
        )));
    }

    Ok(X509_HEADER_SIZE + u16::from_be_bytes([hdr[2], hdr[3]]) as usize)
}

/// The type of the X.509 certificate at the start of `buf`, from its subject
pub fn x509_cert_type(buf: &[u8]) -> Result<CertType, Error> {
    let der = der_slice(buf)?;
    let x509 = X509::from_der(der).map_err(|e| Error::X509(format!("{e:?}")))?;

    let subject = common_name(x509.subject_name())?;

    cert_type_from_subject(&subject)
}

pub(super) fn subject_name(cert_type: CertType) -> Result<&'static str, Error> {
    X509_CERT_TYPES
        .iter()
        .find(|(t, _, _)| *t == cert_type)
        .map(|(_, s, _)| *s)
        .ok_or_else(|| Error::InvalidInput(format!("no X.509 subject for {cert_type:?}")))
}

pub(super) fn body_oid(cert_type: CertType) -> Result<asn1::ObjectIdentifier, Error> {
    X509_CERT_TYPES
        .iter()
        .find(|(t, _, _)| *t == cert_type)
        .map(|(_, _, oid)| oid.clone())
        .ok_or_else(|| Error::InvalidInput(format!("no X.509 extension for {cert_type:?}")))
}

fn cert_type_from_subject(subject: &str) -> Result<CertType, Error> {
    X509_CERT_TYPES
        .iter()
        .find(|(_, s, _)| *s == subject)
        .map(|(t, _, _)| *t)
        .ok_or_else(|| Error::CertType(format!("unknown X.509 subject {subject:?}")))
}

fn der_slice(buf: &[u8]) -> Result<&[u8], Error> {
    let size = x509_cert_size(buf)?;

    if size > MAX_X509_CERT_SIZE {
        return Err(Error::CertSize(format!(
            "X.509 certificate is {size} bytes, at most {MAX_X509_CERT_SIZE} are supported"
        )));
    }

    buf.get(..size).ok_or_else(|| {
        Error::InvalidInput(format!(
            "certificate needs {size} bytes, buffer has {}",
            buf.len()
        ))
    })
}

/// Decode an X.509 certificate into the same form as a proprietary one
pub(super) fn decode(
    buf: &[u8],
    expected: CertType,
    validity: &dyn IValidity,
) -> Result<Certificate, Error> {
    let der = der_slice(buf)?;
    let x509 = X509::from_der(der).map_err(|e| Error::X509(format!("{e:?}")))?;

    if x509.version() != X509_VERSION_3 {
        return Err(Error::X509(format!(
            "expecting a v3 certificate, got v{}",
            x509.version() + 1
        )));
    }

    let alg = x509.signature_algorithm().object().nid();
    if alg != Nid::RSASSAPSS {
        return Err(Error::X509(format!(
            "expecting an RSASSA-PSS signature, got {alg:?}"
        )));
    }

    let subject = common_name(x509.subject_name())?;
    let cert_type = cert_type_from_subject(&subject)?;

    if !cert_type.satisfies(expected) {
        return Err(Error::CertType(format!(
            "expecting {expected:?}, got {cert_type:?}"
        )));
    }

    let info = X509Info {
        serial_number: serial_number(&x509)?,
        issuer: common_name(x509.issuer_name())?,
        subject,
        not_before: x509.not_before().to_string(),
        not_after: x509.not_after().to_string(),
    };

    validity.check(x509.not_before(), x509.not_after())?;

    let n = modulus(&x509)?;

    let tbs = tbs_certificate(der)?;
    let exts = extensions(tbs)?;

    let header = CertHeader::decode(find_extension(&exts, &PROPRIETARY_HEADER_OID, "header")?)?;
    let header_type = header.validate(expected)?;

    if header_type != cert_type {
        return Err(Error::CertType(format!(
            "header names {header_type:?}, subject names {cert_type:?}"
        )));
    }

    let np = find_extension(&exts, &PUB_KEY_NP_OID, "Np")?;
    if np.len() != NP_SIZE {
        return Err(Error::X509(format!(
            "Np is {} bytes, expecting {NP_SIZE}",
            np.len()
        )));
    }

    let body = CertBody::parse(
        cert_type,
        header.flags,
        find_extension(&exts, &body_oid(cert_type)?, "body")?,
    )?;

    let signature = x509.signature().as_slice().to_vec();
    if signature.len() != SIGNATURE_SIZE {
        return Err(Error::X509(format!(
            "signature is {} bytes, expecting {SIGNATURE_SIZE}",
            signature.len()
        )));
    }

    debug!(
        "decoded X.509 {cert_type:?} certificate, serial number {}",
        info.serial_number
    );

    Ok(Certificate {
        header,
        cert_type,
        pub_key: PublicKey { n, np: np.to_vec() },
        body,
        signature,
        x509: Some(info),
        tbs: tbs.to_vec(),
        size: der.len().next_multiple_of(WORD_SIZE),
    })
}

fn common_name(name: &X509NameRef) -> Result<String, Error> {
    let entry = name
        .entries_by_nid(Nid::COMMONNAME)
        .next()
        .ok_or_else(|| Error::X509("missing common name".to_string()))?;

    let cn = entry
        .data()
        .as_utf8()
        .map_err(|e| Error::X509(format!("{e:?}")))?;

    Ok(cn.to_string())
}

fn serial_number(x509: &X509Ref) -> Result<u32, Error> {
    let bn = x509
        .serial_number()
        .to_bn()
        .map_err(|e| Error::X509(format!("{e:?}")))?;
    let bytes = bn.to_vec();

    if bn.is_negative() || bytes.len() > MAX_SERIAL_NUMBER_SIZE {
        return Err(Error::X509(format!(
            "serial number {} does not fit in 32 bits",
            hex::encode(&bytes)
        )));
    }

    Ok(bytes.iter().fold(0, |acc, b| (acc << 8) | *b as u32))
}

// RSA-3072 modulus of the subject public key, whose exponent must be 65537
fn modulus(x509: &X509Ref) -> Result<Vec<u8>, Error> {
    let rsa = x509
        .public_key()
        .and_then(|k| k.rsa())
        .map_err(|e| Error::X509(format!("{e:?}")))?;

    if rsa.n().num_bytes() as usize != RSA_MOD_SIZE {
        return Err(Error::X509(format!(
            "expecting an RSA-{} key, got RSA-{}",
            RSA_MOD_SIZE * 8,
            rsa.n().num_bits()
        )));
    }

    let e = BigNum::from_u32(RSA_PUBLIC_EXPONENT).map_err(|e| Error::Crypto(format!("{e:?}")))?;
    if rsa.e() != &*e {
        return Err(Error::X509(format!(
            "public exponent {} is not {RSA_PUBLIC_EXPONENT}",
            rsa.e()
        )));
    }

    rsa.n()
        .to_vec_padded(RSA_MOD_SIZE as i32)
        .map_err(|e| Error::Crypto(format!("{e:?}")))
}

fn asn1_error(e: asn1::ParseError) -> Error {
    Error::X509(format!("{e:?}"))
}

/// The DER tbsCertificate, i.e. the part covered by the signature
pub(super) fn tbs_certificate<'a>(der: &'a [u8]) -> Result<&'a [u8], Error> {
    asn1::parse(der, |d| -> asn1::ParseResult<&'a [u8]> {
        d.read_element::<asn1::Sequence>()?
            .parse(|d| -> asn1::ParseResult<&'a [u8]> {
                let tbs = d.read_element::<asn1::Tlv>()?;
                // signatureAlgorithm, signatureValue
                d.read_element::<asn1::Tlv>()?;
                d.read_element::<asn1::Tlv>()?;
                Ok(tbs.full_data())
            })
    })
    .map_err(asn1_error)
}

/// The DER encoding of each field of a tbsCertificate
pub(super) fn tbs_fields<'a>(tbs: &'a [u8]) -> Result<Vec<&'a [u8]>, Error> {
    asn1::parse(tbs, |d| -> asn1::ParseResult<Vec<&'a [u8]>> {
        d.read_element::<asn1::Sequence>()?
            .parse(|d| -> asn1::ParseResult<Vec<&'a [u8]>> {
                let mut fields = vec![];
                while !d.is_empty() {
                    fields.push(d.read_element::<asn1::Tlv>()?.full_data());
                }
                Ok(fields)
            })
    })
    .map_err(asn1_error)
}

type Extension<'a> = (asn1::ObjectIdentifier, &'a [u8]);

// extnID and extnValue of each extension of a tbsCertificate
fn extensions<'a>(tbs: &'a [u8]) -> Result<Vec<Extension<'a>>, Error> {
    let field = tbs_fields(tbs)?
        .into_iter()
        .find(|f| f.first() == Some(&EXTENSIONS_TAG))
        .ok_or_else(|| Error::X509("no extensions".to_string()))?;

    let exts = asn1::parse_single::<asn1::Tlv>(field)
        .map_err(asn1_error)?
        .data();

    asn1::parse(exts, |d| -> asn1::ParseResult<Vec<Extension<'a>>> {
        d.read_element::<asn1::Sequence>()?
            .parse(|d| -> asn1::ParseResult<Vec<Extension<'a>>> {
                let mut v = vec![];
                while !d.is_empty() {
                    v.push(d.read_element::<asn1::Sequence>()?.parse(
                        |d| -> asn1::ParseResult<Extension<'a>> {
                            let oid = d.read_element::<asn1::ObjectIdentifier>()?;
                            d.read_element::<Option<bool>>()?; // critical
                            let value = d.read_element::<&'a [u8]>()?;
                            Ok((oid, value))
                        },
                    )?);
                }
                Ok(v)
            })
    })
    .map_err(asn1_error)
}

fn find_extension<'a>(
    exts: &[Extension<'a>],
    oid: &asn1::ObjectIdentifier,
    what: &str,
) -> Result<&'a [u8], Error> {
    let mut found = exts.iter().filter(|(o, _)| o == oid);

    match (found.next(), found.next()) {
        (Some((_, v)), None) => Ok(*v),
        (None, _) => Err(Error::X509(format!("missing {what} extension {oid}"))),
        _ => Err(Error::X509(format!("duplicate {what} extension {oid}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::builder::{CertSigner, X509Params};
    use crate::cert::content::{ContentCertBody, SwComponentInfo, SwImageRecord};
    use crate::cert::key::KeyCertBody;
    use crate::cert::SB_X509_CERT_PARSE_ILLEGAL_VAL;
    use crate::otp::HbkId;
    use hex_literal::hex;

    const TEST_OEM_KEY: &[u8] = include_bytes!("../../testdata/oem-key.pem");
    const TEST_CONTENT_KEY_HASH: [u8; 32] =
        hex!("373ea28c792910839f0ee9d49316cb7476db41629b3ab40070e91c3a0e9e7a29");

    // 2024-06-01T00:00:00Z
    const TEST_NOW: FixedTime = FixedTime(1_717_200_000);

    fn signer() -> CertSigner {
        CertSigner::from_pem(TEST_OEM_KEY).expect("loading signer")
    }

    fn key_body() -> CertBody {
        CertBody::Key(KeyCertBody {
            hbk_id: HbkId::Hbk1,
            nv_counter: 0x0000_0005,
            next_pub_key_hash: TEST_CONTENT_KEY_HASH,
        })
    }

    fn content_body() -> CertBody {
        CertBody::Content(ContentCertBody {
            hbk_id: HbkId::Hbk1,
            nv_counter: 0x0000_0005,
            info: SwComponentInfo {
                code_enc_type: CodeEncType::None,
                crypto_type: CryptoType::HashOnDecrypted,
                load_verify_scheme: LoadVerifyScheme::LoadAndVerify,
                nonce: [0x11; NONCE_SIZE],
            },
            images: vec![
                SwImageRecord {
                    hash: [0x5a; HASH_SIZE],
                    dst_addr: 0x8000_0000,
                    size: 0x400,
                    aes_enc_used: false,
                    src_addr: 0x1000_4000,
                };
                2
            ],
        })
    }

    fn params() -> X509Params {
        X509Params {
            serial_number: 0x0102_0304,
            not_before: "20240101000000Z".to_string(),
            not_after: "20250101000000Z".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn decode_key_cert() {
        let s = signer();
        let buf = s.sign_x509(&key_body(), &params()).unwrap();

        assert!(is_x509(&buf));
        assert_eq!(x509_cert_type(&buf).unwrap(), CertType::Key);

        let c = Certificate::decode_with_validity(&buf, CertType::KeyOrContent, &TEST_NOW)
            .unwrap();

        assert_eq!(c.cert_type, CertType::Key);
        assert_eq!(c.body, key_body());
        assert_eq!(&c.pub_key, s.public_key());
        assert_eq!(c.size(), buf.len());

        let info = c.x509.as_ref().expect("X.509 fields");
        assert_eq!(info.serial_number, 0x0102_0304);
        assert_eq!(info.issuer, X509_ISSUER_NAME);
        assert_eq!(info.subject, "KeyCert");

        c.verify_signature().expect("verifying X.509 key certificate");
    }

    #[test]
    fn decode_content_package() {
        let buf = signer().sign_x509(&content_body(), &params()).unwrap();

        let mut c =
            Certificate::decode_with_validity(&buf, CertType::Content, &TEST_NOW).unwrap();
        c.attach_non_signed(&buf[c.size()..]).unwrap();

        assert_eq!(c.body, content_body());
        assert_eq!(c.package_size(), buf.len());

        c.verify_signature().expect("verifying X.509 content certificate");
    }

    #[test]
    fn expired() {
        let buf = signer().sign_x509(&key_body(), &params()).unwrap();

        // 2025-06-01T00:00:00Z
        let r = Certificate::decode_with_validity(&buf, CertType::Key, &FixedTime(1_748_736_000));

        let e = r.unwrap_err();
        assert!(matches!(e, Error::Validity(_)));
        assert_eq!(e.code(), SB_X509_CERT_PARSE_ILLEGAL_VAL);
    }

    #[test]
    fn not_yet_valid() {
        let buf = signer().sign_x509(&key_body(), &params()).unwrap();

        // 2023-06-01T00:00:00Z
        let r = Certificate::decode_with_validity(&buf, CertType::Key, &FixedTime(1_685_577_600));

        assert!(matches!(r, Err(Error::Validity(_))));
    }

    #[test]
    fn system_clock() {
        let valid = X509Params {
            not_after: "20991231235959Z".to_string(),
            ..params()
        };
        let buf = signer().sign_x509(&key_body(), &valid).unwrap();
        Certificate::decode(&buf, CertType::Key).expect("valid until 2099");

        let buf = signer().sign_x509(&key_body(), &params()).unwrap();
        let r = Certificate::decode(&buf, CertType::Key);
        assert!(matches!(r, Err(Error::Validity(_))));
    }

    #[test]
    fn wrong_type() {
        let buf = signer().sign_x509(&key_body(), &params()).unwrap();

        let r = Certificate::decode_with_validity(&buf, CertType::Content, &TEST_NOW);
        assert!(matches!(r, Err(Error::CertType(_))));
    }

    #[test]
    fn tampered_body() {
        let mut buf = signer().sign_x509(&key_body(), &params()).unwrap();

        // flip a bit of the next public key hash, inside the body extension
        let off = buf
            .windows(HASH_SIZE)
            .position(|w| w == TEST_CONTENT_KEY_HASH)
            .expect("body extension");
        buf[off] ^= 0x01;

        let c = Certificate::decode_with_validity(&buf, CertType::Key, &TEST_NOW).unwrap();
        assert!(matches!(c.verify_signature(), Err(Error::Signature(_))));
    }

    #[test]
    fn truncated() {
        let buf = signer().sign_x509(&key_body(), &params()).unwrap();

        let r = Certificate::decode_with_validity(&buf[..buf.len() - 8], CertType::Key, &TEST_NOW);
        assert!(matches!(r, Err(Error::InvalidInput(_))));

        let r = x509_cert_size(&buf[..2]);
        assert!(matches!(r, Err(Error::BufferTooSmall(_))));
    }

    #[test]
    fn pkcs1_signature_rejected() {
        // a certificate straight out of openssl, signed with PKCS#1 v1.5
        let pkey = openssl::pkey::PKey::private_key_from_pem(TEST_OEM_KEY).unwrap();
        let mut b = openssl::x509::X509Builder::new().unwrap();
        b.set_version(2).unwrap();
        let mut name = openssl::x509::X509NameBuilder::new().unwrap();
        name.append_entry_by_nid(Nid::COMMONNAME, "KeyCert").unwrap();
        let name = name.build();
        b.set_subject_name(&name).unwrap();
        b.set_issuer_name(&name).unwrap();
        b.set_not_before(&Asn1Time::from_str("20240101000000Z").unwrap()).unwrap();
        b.set_not_after(&Asn1Time::from_str("20250101000000Z").unwrap()).unwrap();
        b.set_pubkey(&pkey).unwrap();
        b.sign(&pkey, openssl::hash::MessageDigest::sha256()).unwrap();
        let der = b.build().to_der().unwrap();

        let r = Certificate::decode_with_validity(&der, CertType::Key, &TEST_NOW);
        assert!(matches!(r, Err(Error::X509(_))));
    }
}
