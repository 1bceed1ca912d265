// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::common::*;
use super::errors::Error;
use openssl::bn::{BigNum, BigNumContext};
use openssl::hash::{Hasher, MessageDigest};
use openssl::pkey::PKey;
use openssl::rsa::{Padding, Rsa};
use openssl::sign::{RsaPssSaltlen, Verifier};
use serde::Serialize;

pub(super) const RSA_PUBLIC_EXPONENT: u32 = 65537;
const NP_EXTRA_BITS: i32 = 132;

/// RSA-3072 public key as carried in a certificate: the big-endian modulus
/// followed by its Barrett reduction tag
#[serde_with::serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PublicKey {
    #[serde(rename = "n")]
    #[serde_as(as = "serde_with::hex::Hex")]
    pub n: Vec<u8>,
    #[serde(rename = "np")]
    #[serde_as(as = "serde_with::hex::Hex")]
    pub np: Vec<u8>,
}

impl PublicKey {
    pub fn decode(buf: &[u8]) -> Result<PublicKey, Error> {
        let n = buf
            .get(..RSA_MOD_SIZE)
            .ok_or(Error::BufferTooSmall("public key modulus".to_string()))?;
        let np = buf
            .get(RSA_MOD_SIZE..PUB_KEY_SIZE)
            .ok_or(Error::BufferTooSmall("public key Np".to_string()))?;

        Ok(PublicKey {
            n: n.to_vec(),
            np: np.to_vec(),
        })
    }

    /// Build the certificate form of a modulus, computing its Barrett tag
    pub fn from_modulus(n: &[u8]) -> Result<PublicKey, Error> {
        if n.len() != RSA_MOD_SIZE {
            return Err(Error::InvalidInput(format!(
                "expecting a {RSA_MOD_SIZE} bytes modulus, got {}",
                n.len()
            )));
        }

        let np = barrett_tag(n).map_err(|e| Error::Crypto(format!("{e:?}")))?;

        Ok(PublicKey { n: n.to_vec(), np })
    }

    pub fn encode(&self) -> Vec<u8> {
        [self.n.as_slice(), self.np.as_slice()].concat()
    }

    /// SHA-256 over N and Np, which is what the OTP and the previous
    /// certificate in the chain commit to
    pub fn hash(&self) -> Result<[u8; HASH_SIZE], Error> {
        let mut hasher =
            Hasher::new(MessageDigest::sha256()).map_err(|e| Error::Crypto(format!("{e:?}")))?;

        hasher
            .update(&self.n)
            .and_then(|_| hasher.update(&self.np))
            .map_err(|e| Error::Crypto(format!("{e:?}")))?;

        let sum = hasher.finish().map_err(|e| Error::Crypto(format!("{e:?}")))?;

        let mut h = [0u8; HASH_SIZE];
        h.copy_from_slice(&sum);

        Ok(h)
    }

    /// Verify an RSASSA-PSS (SHA-256, MGF1 with SHA-256, 32 bytes salt)
    /// signature over `tbs`
    pub fn verify(&self, tbs: &[u8], sig: &[u8]) -> Result<(), Error> {
        let n = BigNum::from_slice(&self.n).map_err(|e| Error::Crypto(format!("{e:?}")))?;
        let e = BigNum::from_u32(RSA_PUBLIC_EXPONENT).map_err(|e| Error::Crypto(format!("{e:?}")))?;

        let rsa = Rsa::from_public_components(n, e).map_err(|e| Error::Crypto(format!("{e:?}")))?;
        let pkey = PKey::from_rsa(rsa).map_err(|e| Error::Crypto(format!("{e:?}")))?;

        let mut verifier = Verifier::new(MessageDigest::sha256(), &pkey)
            .map_err(|e| Error::Crypto(format!("{e:?}")))?;

        verifier
            .set_rsa_padding(Padding::PKCS1_PSS)
            .and_then(|_| verifier.set_rsa_mgf1_md(MessageDigest::sha256()))
            .and_then(|_| verifier.set_rsa_pss_saltlen(RsaPssSaltlen::DIGEST_LENGTH))
            .map_err(|e| Error::Crypto(format!("{e:?}")))?;

        verifier
            .update(tbs)
            .map_err(|e| Error::Crypto(format!("{e:?}")))?;

        // a malformed signature is reported as an error by some openssl
        // versions, and as a plain mismatch by others
        match verifier.verify(sig) {
            Ok(true) => Ok(()),
            Ok(false) => Err(Error::Signature("RSA-PSS signature mismatch".to_string())),
            Err(e) => Err(Error::Signature(format!("{e:?}"))),
        }
    }
}

// Np = floor(2^(bits(N) + 132) / N), truncated to its low 160 bits
fn barrett_tag(n: &[u8]) -> Result<Vec<u8>, openssl::error::ErrorStack> {
    let n = BigNum::from_slice(n)?;
    let mut ctx = BigNumContext::new()?;

    let mut num = BigNum::new()?;
    num.set_bit(n.num_bits() + NP_EXTRA_BITS)?;

    let mut np = BigNum::new()?;
    np.checked_div(&num, &n, &mut ctx)?;
    np.mask_bits(NP_SIZE as i32 * 8)?;

    np.to_vec_padded(NP_SIZE as i32)
}
