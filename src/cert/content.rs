// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::common::*;
use super::errors::Error;
use super::key::hbk_id_from_flags;
use crate::otp::HbkId;
use serde::Serialize;

const CODE_ENC_SHIFT: u32 = 4;
const LOAD_VERIFY_SHIFT: u32 = 8;
const CRYPTO_TYPE_SHIFT: u32 = 12;
const NUM_OF_COMPS_SHIFT: u32 = 16;

/// The crypto policy shared by all the images of a content certificate
#[serde_with::serde_as]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct SwComponentInfo {
    #[serde(rename = "code-enc-type")]
    pub code_enc_type: CodeEncType,
    #[serde(rename = "crypto-type")]
    pub crypto_type: CryptoType,
    #[serde(rename = "load-verify-scheme")]
    pub load_verify_scheme: LoadVerifyScheme,
    #[serde(rename = "nonce")]
    #[serde_as(as = "serde_with::hex::Hex")]
    pub nonce: [u8; NONCE_SIZE],
}

/// One software image, as described by the signed record and the non-signed
/// storage address that follows the signature
#[serde_with::serde_as]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct SwImageRecord {
    #[serde(rename = "hash")]
    #[serde_as(as = "serde_with::hex::Hex")]
    pub hash: [u8; HASH_SIZE],
    #[serde(rename = "dst-addr")]
    pub dst_addr: u64,
    #[serde(rename = "size")]
    pub size: u32,
    #[serde(rename = "aes-enc-used")]
    pub aes_enc_used: bool,
    #[serde(rename = "src-addr")]
    pub src_addr: u64,
}

impl SwImageRecord {
    fn parse(buf: &[u8]) -> Result<SwImageRecord, Error> {
        Ok(SwImageRecord {
            hash: read_array(buf, 0, "image hash")?,
            dst_addr: read_u64(buf, HASH_SIZE, "dst-addr")?,
            size: read_u32(buf, HASH_SIZE + 8, "image size")?,
            aes_enc_used: read_u32(buf, HASH_SIZE + 12, "aes-enc-used")? != 0,
            src_addr: NO_MEM_LOAD,
        })
    }

    fn encode(&self) -> Vec<u8> {
        let mut v = self.hash.to_vec();
        v.extend_from_slice(&self.dst_addr.to_le_bytes());
        v.extend_from_slice(&self.size.to_le_bytes());
        v.extend_from_slice(&(self.aes_enc_used as u32).to_le_bytes());
        v
    }
}

/// A content certificate describes up to sixteen software images
#[serde_with::serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ContentCertBody {
    #[serde(rename = "hbk-id")]
    pub hbk_id: HbkId,
    #[serde(rename = "nv-counter")]
    pub nv_counter: u32,
    #[serde(rename = "sw-info")]
    pub info: SwComponentInfo,
    #[serde(rename = "images")]
    pub images: Vec<SwImageRecord>,
}

/// Number of images announced in the flags of a content certificate
pub fn num_of_comps_from_flags(flags: u32) -> Result<usize, Error> {
    let n = (flags >> NUM_OF_COMPS_SHIFT) as usize;

    if n == 0 || n > MAX_SW_COMPS {
        return Err(Error::NumOfImages(format!(
            "{n} images, expecting 1 to {MAX_SW_COMPS}"
        )));
    }

    Ok(n)
}

impl ContentCertBody {
    pub fn parse(flags: u32, buf: &[u8]) -> Result<ContentCertBody, Error> {
        let hbk_id = hbk_id_from_flags(flags)?;
        let n = num_of_comps_from_flags(flags)?;

        let expected = CONTENT_CERT_BODY_FIXED_SIZE + n * SW_REC_SIGNED_SIZE;
        if buf.len() != expected {
            return Err(Error::CertSize(format!(
                "content certificate body is {} bytes, expecting {expected} for {n} images",
                buf.len()
            )));
        }

        let info = SwComponentInfo {
            code_enc_type: CodeEncType::try_from(get_field(flags, CODE_ENC_SHIFT, 4))?,
            load_verify_scheme: LoadVerifyScheme::try_from(get_field(flags, LOAD_VERIFY_SHIFT, 4))?,
            crypto_type: CryptoType::try_from(get_field(flags, CRYPTO_TYPE_SHIFT, 4))?,
            nonce: read_array(buf, 4, "nonce")?,
        };

        let images = buf[CONTENT_CERT_BODY_FIXED_SIZE..]
            .chunks(SW_REC_SIGNED_SIZE)
            .map(SwImageRecord::parse)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ContentCertBody {
            hbk_id,
            nv_counter: read_u32(buf, 0, "nv-counter")?,
            info,
            images,
        })
    }

    /// Fill in the storage addresses from the non-signed part
    pub fn attach_src_addrs(&mut self, buf: &[u8]) -> Result<(), Error> {
        if buf.len() < self.non_signed_size() {
            return Err(Error::BufferTooSmall(format!(
                "non-signed data is {} bytes, expecting {}",
                buf.len(),
                self.non_signed_size()
            )));
        }

        for (i, img) in self.images.iter_mut().enumerate() {
            img.src_addr = read_u64(buf, i * SW_REC_NON_SIGNED_SIZE, "src-addr")?;
        }

        Ok(())
    }

    pub fn non_signed_size(&self) -> usize {
        self.images.len() * SW_REC_NON_SIGNED_SIZE
    }

    pub fn flags(&self) -> u32 {
        (self.hbk_id as u32)
            | (self.info.code_enc_type as u32) << CODE_ENC_SHIFT
            | (self.info.load_verify_scheme as u32) << LOAD_VERIFY_SHIFT
            | (self.info.crypto_type as u32) << CRYPTO_TYPE_SHIFT
            | (self.images.len() as u32) << NUM_OF_COMPS_SHIFT
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut v = self.nv_counter.to_le_bytes().to_vec();
        v.extend_from_slice(&self.info.nonce);
        for img in self.images.iter() {
            v.extend(img.encode());
        }
        v
    }

    pub fn encode_non_signed(&self) -> Vec<u8> {
        self.images
            .iter()
            .flat_map(|img| img.src_addr.to_le_bytes())
            .collect()
    }
}
