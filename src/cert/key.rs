// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::common::*;
use super::errors::Error;
use crate::otp::HbkId;
use serde::Serialize;

const HBK_ID_MASK: u32 = 0xF;

pub fn hbk_id_from_flags(flags: u32) -> Result<HbkId, Error> {
    HbkId::try_from(flags & HBK_ID_MASK).map_err(|x| Error::HbkIdx(format!("unknown HBK id {x}")))
}

/// The anti-rollback counter word: counter id in bits [31:16], version in
/// bits [15:0]
pub fn nv_counter_id(word: u32) -> u32 {
    word >> 16
}

pub fn nv_counter_value(word: u32) -> u32 {
    word & 0xFFFF
}

pub fn nv_counter_word(id: u32, value: u32) -> u32 {
    (id << 16) | (value & 0xFFFF)
}

/// A key certificate delegates trust to the next public key in the chain
#[serde_with::serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct KeyCertBody {
    #[serde(rename = "hbk-id")]
    pub hbk_id: HbkId,
    #[serde(rename = "nv-counter")]
    pub nv_counter: u32,
    #[serde(rename = "next-pub-key-hash")]
    #[serde_as(as = "serde_with::hex::Hex")]
    pub next_pub_key_hash: [u8; HASH_SIZE],
}

impl KeyCertBody {
    pub fn parse(flags: u32, buf: &[u8]) -> Result<KeyCertBody, Error> {
        if buf.len() != KEY_CERT_BODY_SIZE {
            return Err(Error::CertSize(format!(
                "key certificate body is {} bytes, expecting {KEY_CERT_BODY_SIZE}",
                buf.len()
            )));
        }

        Ok(KeyCertBody {
            hbk_id: hbk_id_from_flags(flags)?,
            nv_counter: read_u32(buf, 0, "nv-counter")?,
            next_pub_key_hash: read_array(buf, 4, "next-pub-key-hash")?,
        })
    }

    pub fn flags(&self) -> u32 {
        self.hbk_id as u32
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut v = self.nv_counter.to_le_bytes().to_vec();
        v.extend_from_slice(&self.next_pub_key_hash);
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    const TEST_KEY_CERT_BODY: [u8; 36] = hex!(
        "05000100"
        "0102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f20"
    );

    #[test]
    fn parse_ok() {
        let b = KeyCertBody::parse(1, &TEST_KEY_CERT_BODY).unwrap();

        assert_eq!(b.hbk_id, HbkId::Hbk1);
        assert_eq!(nv_counter_id(b.nv_counter), 1);
        assert_eq!(nv_counter_value(b.nv_counter), 5);
        assert_eq!(b.next_pub_key_hash[31], 0x20);
        assert_eq!(b.encode(), TEST_KEY_CERT_BODY.to_vec());
    }

    #[test]
    fn parse_bad_hbk_id() {
        let r = KeyCertBody::parse(3, &TEST_KEY_CERT_BODY);

        assert!(matches!(r, Err(Error::HbkIdx(_))));
    }

    #[test]
    fn parse_bad_size() {
        let r = KeyCertBody::parse(0, &TEST_KEY_CERT_BODY[..32]);

        assert!(matches!(r, Err(Error::CertSize(_))));
    }
}
