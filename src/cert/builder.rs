// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::certificate::CertBody;
use super::common::*;
use super::errors::Error;
use super::header::CertHeader;
use super::pubkey::PublicKey;
use super::x509::{
    body_oid, subject_name, tbs_certificate, tbs_fields, BIT_STRING_TAG, PROPRIETARY_HEADER_OID,
    PSS_ALGORITHM_ID, PUB_KEY_NP_OID, SEQUENCE_TAG, X509_ISSUER_NAME,
};
use openssl::asn1::{Asn1Object, Asn1OctetString, Asn1Time};
use openssl::bn::BigNum;
use openssl::error::ErrorStack;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Padding;
use openssl::sign::{RsaPssSaltlen, Signer};
use openssl::x509::{X509Builder, X509Extension, X509Name, X509NameBuilder};

/// Issuer, serial number and validity window of a generated X.509
/// certificate.  Times use the `YYYYMMDDhhmmssZ` form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct X509Params {
    pub issuer: String,
    pub serial_number: u32,
    pub not_before: String,
    pub not_after: String,
}

impl Default for X509Params {
    fn default() -> Self {
        X509Params {
            issuer: X509_ISSUER_NAME.to_string(),
            serial_number: 1,
            not_before: "20230101000000Z".to_string(),
            not_after: "20991231235959Z".to_string(),
        }
    }
}

/// Host side certificate generator, holding the RSA-3072 private key of the
/// issuer
pub struct CertSigner {
    pkey: PKey<Private>,
    pub_key: PublicKey,
}

impl CertSigner {
    pub fn from_pem(pem: &[u8]) -> Result<CertSigner, Error> {
        let pkey = PKey::private_key_from_pem(pem).map_err(|e| Error::Crypto(format!("{e:?}")))?;

        let rsa = pkey.rsa().map_err(|e| Error::Crypto(format!("{e:?}")))?;

        if rsa.n().num_bytes() as usize != RSA_MOD_SIZE {
            return Err(Error::InvalidInput(format!(
                "expecting an RSA-{} key, got RSA-{}",
                RSA_MOD_SIZE * 8,
                rsa.n().num_bits()
            )));
        }

        let n = rsa
            .n()
            .to_vec_padded(RSA_MOD_SIZE as i32)
            .map_err(|e| Error::Crypto(format!("{e:?}")))?;

        Ok(CertSigner {
            pkey,
            pub_key: PublicKey::from_modulus(&n)?,
        })
    }

    /// The public key that goes in the certificates, and whose hash goes in
    /// OTP or in the issuing certificate
    pub fn public_key(&self) -> &PublicKey {
        &self.pub_key
    }

    /// Produce a complete certificate package: header, public key, body,
    /// signature and, for content certificates, the non-signed trailer
    pub fn sign(&self, body: &CertBody) -> Result<Vec<u8>, Error> {
        let b = body.encode();

        let header = CertHeader::new(body.cert_type(), HEADER_SIZE + PUB_KEY_SIZE + b.len(), body.flags());

        let mut buf = header.encode();
        buf.extend(self.pub_key.encode());
        buf.extend(b);

        let sig = self.pss_sign(&buf)?;

        buf.extend(sig);
        buf.extend(body.encode_non_signed());

        Ok(buf)
    }

    /// Produce the X.509 flavour of a certificate package: the DER
    /// certificate, zero padded to a word boundary, then the non-signed
    /// trailer of content certificates
    pub fn sign_x509(&self, body: &CertBody, params: &X509Params) -> Result<Vec<u8>, Error> {
        let cert_type = body.cert_type();
        let b = body.encode();

        let header = CertHeader::new(cert_type, HEADER_SIZE + PUB_KEY_SIZE + b.len(), body.flags());

        let exts = [
            (PROPRIETARY_HEADER_OID, header.encode()),
            (PUB_KEY_NP_OID, self.pub_key.np.clone()),
            (body_oid(cert_type)?, b),
        ];

        let template = self
            .x509_template(subject_name(cert_type)?, params, &exts)
            .map_err(|e| Error::Crypto(format!("{e:?}")))?;

        // openssl cannot sign with PSS parameters of our choosing, so swap
        // the algorithm in and sign the result again
        let mut fields = tbs_fields(tbs_certificate(&template)?)?;
        let alg = fields
            .get_mut(2)
            .ok_or_else(|| Error::X509("truncated tbsCertificate".to_string()))?;
        *alg = &PSS_ALGORITHM_ID;

        let tbs = der_tlv(SEQUENCE_TAG, &fields.concat());
        let sig = self.pss_sign(&tbs)?;

        let mut buf = der_tlv(
            SEQUENCE_TAG,
            &[tbs, PSS_ALGORITHM_ID.to_vec(), der_tlv(BIT_STRING_TAG, &[&[0u8][..], &sig[..]].concat())].concat(),
        );

        buf.resize(buf.len().next_multiple_of(WORD_SIZE), 0);
        buf.extend(body.encode_non_signed());

        Ok(buf)
    }

    fn x509_template(
        &self,
        subject: &str,
        params: &X509Params,
        exts: &[(asn1::ObjectIdentifier, Vec<u8>)],
    ) -> Result<Vec<u8>, ErrorStack> {
        let mut builder = X509Builder::new()?;

        builder.set_version(2)?;
        builder.set_serial_number(&*BigNum::from_u32(params.serial_number)?.to_asn1_integer()?)?;
        builder.set_issuer_name(&*common_name(&params.issuer)?)?;
        builder.set_subject_name(&*common_name(subject)?)?;
        builder.set_not_before(&*Asn1Time::from_str(&params.not_before)?)?;
        builder.set_not_after(&*Asn1Time::from_str(&params.not_after)?)?;
        builder.set_pubkey(&self.pkey)?;

        for (oid, value) in exts {
            let oid = Asn1Object::from_str(&oid.to_string())?;
            let value = Asn1OctetString::new_from_bytes(value)?;
            builder.append_extension(X509Extension::new_from_der(&oid, false, &value)?)?;
        }

        builder.sign(&self.pkey, MessageDigest::sha256())?;

        builder.build().to_der()
    }

    fn pss_sign(&self, tbs: &[u8]) -> Result<Vec<u8>, Error> {
        let mut signer =
            Signer::new(MessageDigest::sha256(), &self.pkey).map_err(|e| Error::Crypto(format!("{e:?}")))?;

        signer
            .set_rsa_padding(Padding::PKCS1_PSS)
            .and_then(|_| signer.set_rsa_mgf1_md(MessageDigest::sha256()))
            .and_then(|_| signer.set_rsa_pss_saltlen(RsaPssSaltlen::DIGEST_LENGTH))
            .and_then(|_| signer.update(tbs))
            .map_err(|e| Error::Crypto(format!("{e:?}")))?;

        signer.sign_to_vec().map_err(|e| Error::Crypto(format!("{e:?}")))
    }
}

fn common_name(cn: &str) -> Result<X509Name, ErrorStack> {
    let mut name = X509NameBuilder::new()?;
    name.append_entry_by_nid(Nid::COMMONNAME, cn)?;
    Ok(name.build())
}

// DER tag, definite length, value
fn der_tlv(tag: u8, value: &[u8]) -> Vec<u8> {
    let len = value.len();

    let mut out = vec![tag];
    match len {
        0..=0x7f => out.push(len as u8),
        0x80..=0xff => out.extend([0x81, len as u8]),
        _ => {
            out.push(0x82);
            out.extend((len as u16).to_be_bytes());
        }
    }
    out.extend_from_slice(value);

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    const TEST_CONTENT_KEY: &[u8] = include_bytes!("../../testdata/content-key.pem");
    const TEST_CONTENT_KEY_HASH: [u8; 32] =
        hex!("373ea28c792910839f0ee9d49316cb7476db41629b3ab40070e91c3a0e9e7a29");

    #[test]
    fn from_pem_ok() {
        let s = CertSigner::from_pem(TEST_CONTENT_KEY).unwrap();

        assert_eq!(s.public_key().hash().unwrap(), TEST_CONTENT_KEY_HASH);
    }

    #[test]
    fn from_pem_bad() {
        assert!(CertSigner::from_pem(b"not a key").is_err());

        let small = openssl::rsa::Rsa::generate(2048).unwrap();
        let pem = PKey::from_rsa(small).unwrap().private_key_to_pem_pkcs8().unwrap();

        let r = CertSigner::from_pem(&pem);
        assert!(matches!(r, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn der_lengths() {
        assert_eq!(der_tlv(0x04, &[0xaa; 3]), [&[0x04, 0x03][..], &[0xaa; 3]].concat());
        assert_eq!(der_tlv(0x04, &[0; 0x80])[..3], [0x04, 0x81, 0x80]);
        assert_eq!(der_tlv(0x30, &[0; 0x1234])[..4], [0x30, 0x82, 0x12, 0x34]);
    }

    #[test]
    fn sign_x509_layout() {
        let s = CertSigner::from_pem(TEST_CONTENT_KEY).unwrap();
        let body = CertBody::Key(crate::cert::KeyCertBody {
            hbk_id: crate::otp::HbkId::Hbk,
            nv_counter: 1,
            next_pub_key_hash: TEST_CONTENT_KEY_HASH,
        });

        let buf = s.sign_x509(&body, &Default::default()).unwrap();

        assert_eq!(buf[..2], [0x30, 0x82]);
        assert_eq!(buf.len() % WORD_SIZE, 0);
        assert!(buf.len() <= crate::cert::MAX_X509_CERT_SIZE);

        let der = &buf[..crate::cert::x509_cert_size(&buf).unwrap()];
        let x = openssl::x509::X509::from_der(der).unwrap();
        assert_eq!(x.signature_algorithm().object().nid(), Nid::RSASSAPSS);
    }
}
