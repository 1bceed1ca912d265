// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::common::*;
use super::errors::Error;
use serde::Serialize;

/// The fixed part common to all proprietary certificates
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CertHeader {
    #[serde(rename = "magic")]
    pub magic: u32,
    #[serde(rename = "version")]
    pub version: u32,
    /// Bits [15:0] hold the offset of the signature in words, i.e. the
    /// length of the signed part
    #[serde(rename = "cert-size")]
    pub cert_size: u32,
    #[serde(rename = "flags")]
    pub flags: u32,
}

impl CertHeader {
    pub fn new(cert_type: CertType, signed_size: usize, flags: u32) -> Self {
        Self {
            magic: cert_type.magic(),
            version: CERT_VERSION,
            cert_size: (signed_size / WORD_SIZE) as u32 & CERT_LEN_SIGNATURE_OFFSET_MASK,
            flags,
        }
    }

    /// Decode the little-endian header at the start of the buffer
    pub fn decode(buf: &[u8]) -> Result<CertHeader, Error> {
        Ok(CertHeader {
            magic: read_u32(buf, 0, "magic")?,
            version: read_u32(buf, 4, "version")?,
            cert_size: read_u32(buf, 8, "cert-size")?,
            flags: read_u32(buf, 12, "flags")?,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        [self.magic, self.version, self.cert_size, self.flags]
            .iter()
            .flat_map(|w| w.to_le_bytes())
            .collect()
    }

    /// Length in bytes of the signed part, which is also where the signature
    /// starts
    pub fn signed_size(&self) -> usize {
        (self.cert_size & CERT_LEN_SIGNATURE_OFFSET_MASK) as usize * WORD_SIZE
    }

    /// Check magic number, type and version.  Returns the actual type of the
    /// certificate.
    pub fn validate(&self, expected: CertType) -> Result<CertType, Error> {
        if self.magic == 0 {
            return Err(Error::CertType("magic number is zero".to_string()));
        }

        let actual = CertType::from_magic(self.magic).ok_or(Error::CertType(format!(
            "unknown magic number {:#010x}",
            self.magic
        )))?;

        if !actual.satisfies(expected) {
            return Err(Error::CertType(format!(
                "expecting {expected:?}, got {actual:?}"
            )));
        }

        if self.version != CERT_VERSION {
            return Err(Error::Version(format!(
                "expecting {CERT_VERSION:#010x}, got {:#010x}",
                self.version
            )));
        }

        Ok(actual)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    // key certificate header, 114 words signed, hbk-id 2
    const TEST_KEY_CERT_HEADER: [u8; 16] = hex!("636b4253 00000107 72000000 02000000");

    #[test]
    fn decode_ok() {
        let h = CertHeader::decode(&TEST_KEY_CERT_HEADER).unwrap();

        assert_eq!(h.magic, KEY_CERT_MAGIC_NUMBER);
        assert_eq!(h.version, CERT_VERSION);
        assert_eq!(h.signed_size(), 456);
        assert_eq!(h.flags, 2);

        assert_eq!(h.validate(CertType::Key).unwrap(), CertType::Key);
        assert_eq!(h.validate(CertType::KeyOrContent).unwrap(), CertType::Key);
        assert_eq!(h.encode(), TEST_KEY_CERT_HEADER.to_vec());
    }

    #[test]
    fn decode_short() {
        let r = CertHeader::decode(&TEST_KEY_CERT_HEADER[..12]);

        assert!(r.is_err());
    }

    #[test]
    fn validate_type_mismatch() {
        let h = CertHeader::decode(&TEST_KEY_CERT_HEADER).unwrap();

        assert!(matches!(
            h.validate(CertType::Content),
            Err(Error::CertType(_))
        ));
    }

    #[test]
    fn validate_zero_magic() {
        let h = CertHeader {
            version: CERT_VERSION,
            ..Default::default()
        };

        assert!(matches!(h.validate(CertType::Key), Err(Error::CertType(_))));
    }

    #[test]
    fn validate_bad_version() {
        let h = CertHeader {
            version: CERT_VERSION + 1,
            ..CertHeader::new(CertType::Content, 1200, 0)
        };

        assert!(matches!(
            h.validate(CertType::Content),
            Err(Error::Version(_))
        ));
    }
}
