// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::errors::Error;
use super::flash::{IFlashReader, IMemory};
use crate::cert::{
    CodeEncType, ContentCertBody, CryptoType, LoadVerifyScheme, SwImageRecord, HASH_SIZE,
    NONCE_SIZE, NO_MEM_LOAD,
};
use crate::otp::{lifecycle, CodeEncKey, HbkId, IOtpStore, Lcs};
use log::{debug, error, warn};
use openssl::hash::{Hasher, MessageDigest};
use openssl::symm::{Cipher, Crypter, Mode};
use serde::Serialize;

/// Images are streamed from storage in chunks of this size
pub const SW_IMAGE_CHUNK_SIZE: usize = 0x1000;

const AES_IV_SIZE: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum MemoryType {
    #[serde(rename = "ram")]
    Ram,
    #[serde(rename = "flash")]
    Flash,
}

/// Where a verified image can be found, and how big it is
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct VerifiedImageInfo {
    #[serde(rename = "addr")]
    pub addr: u64,
    #[serde(rename = "mem-type")]
    pub mem_type: MemoryType,
    #[serde(rename = "size")]
    pub size: u32,
}

// what to do with each image of a content certificate
struct ImagePolicy {
    scheme: LoadVerifyScheme,
    crypto_type: CryptoType,
    key: Option<[u8; 16]>,
    nonce: [u8; NONCE_SIZE],
}

impl ImagePolicy {
    fn new(
        otp: &impl IOtpStore,
        hbk_id: HbkId,
        body: &ContentCertBody,
    ) -> Result<ImagePolicy, Error> {
        let lcs = otp.lcs()?;
        let info = &body.info;

        if info.load_verify_scheme == LoadVerifyScheme::LoadOnly && lcs == Lcs::Secure {
            return Err(Error::IllegalLcs(
                "load-only images are not allowed in Secure LCS".to_string(),
            ));
        }

        let key_type = match info.code_enc_type {
            CodeEncType::None => None,
            CodeEncType::Icv => {
                if !matches!(hbk_id, HbkId::Hbk0 | HbkId::Hbk) {
                    return Err(Error::InvalidInput(format!(
                        "ICV encrypted images in a chain rooted in {hbk_id:?}"
                    )));
                }
                Some(CodeEncKey::Kceicv)
            }
            CodeEncType::Oem => {
                if !matches!(hbk_id, HbkId::Hbk1 | HbkId::Hbk) {
                    return Err(Error::InvalidInput(format!(
                        "OEM encrypted images in a chain rooted in {hbk_id:?}"
                    )));
                }
                Some(CodeEncKey::Kce)
            }
        };

        let key = match key_type {
            None => None,
            Some(k) => {
                if lcs == Lcs::Rma {
                    return Err(Error::IllegalLcs(format!(
                        "{k:?} encrypted images are not allowed in RMA LCS"
                    )));
                }

                if matches!(
                    info.load_verify_scheme,
                    LoadVerifyScheme::LoadOnly | LoadVerifyScheme::VerifyInFlash
                ) {
                    return Err(Error::InvalidInput(format!(
                        "encrypted images cannot use {:?}",
                        info.load_verify_scheme
                    )));
                }

                Some(lifecycle::code_enc_key(otp, k)?)
            }
        };

        Ok(ImagePolicy {
            scheme: info.load_verify_scheme,
            crypto_type: info.crypto_type,
            key,
            nonce: info.nonce,
        })
    }

    fn loads_from_flash(&self) -> bool {
        self.scheme != LoadVerifyScheme::VerifyInMemory
    }

    fn verifies(&self) -> bool {
        self.scheme != LoadVerifyScheme::LoadOnly
    }

    fn check_addresses(&self, i: usize, rec: &SwImageRecord) -> Result<(), Error> {
        let in_flash = self.scheme == LoadVerifyScheme::VerifyInFlash;
        let in_mem = self.scheme == LoadVerifyScheme::VerifyInMemory;

        if in_flash != (rec.dst_addr == NO_MEM_LOAD) || in_mem != (rec.src_addr == NO_MEM_LOAD) {
            return Err(Error::InvalidInput(format!(
                "image {i}: addresses {:#x} -> {:#x} do not match {:?}",
                rec.src_addr, rec.dst_addr, self.scheme
            )));
        }

        let size = rec.size as u64;

        if (!in_mem && rec.src_addr.checked_add(size).is_none())
            || (!in_flash && rec.dst_addr.checked_add(size).is_none())
        {
            return Err(Error::InvalidInput(format!("image {i}: address overflow")));
        }

        Ok(())
    }

    fn iv(&self, dst_addr: u64) -> [u8; AES_IV_SIZE] {
        let mut iv = [0u8; AES_IV_SIZE];
        iv[..NONCE_SIZE].copy_from_slice(&self.nonce);
        iv[NONCE_SIZE..].copy_from_slice(&dst_addr.to_be_bytes());
        iv
    }
}

/// Load and/or verify every image listed in a content certificate.  Images
/// that fail verification are wiped from RAM.
pub fn verify_sw_comps(
    otp: &impl IOtpStore,
    flash: &impl IFlashReader,
    ram: &impl IMemory,
    hbk_id: HbkId,
    body: &ContentCertBody,
) -> Result<Vec<VerifiedImageInfo>, Error> {
    let policy = ImagePolicy::new(otp, hbk_id, body)?;

    if !policy.verifies() {
        warn!("load-only scheme: image hashes are not checked");
    }

    let mut images = Vec::with_capacity(body.images.len());

    for (i, rec) in body.images.iter().enumerate() {
        images.push(load_and_verify(&policy, flash, ram, i, rec)?);
    }

    Ok(images)
}

fn load_and_verify(
    policy: &ImagePolicy,
    flash: &impl IFlashReader,
    ram: &impl IMemory,
    i: usize,
    rec: &SwImageRecord,
) -> Result<VerifiedImageInfo, Error> {
    if rec.size == 0 {
        return Err(Error::SwCompSizeNull(format!("image {i}")));
    }

    policy.check_addresses(i, rec)?;

    let uses_ram = policy.scheme != LoadVerifyScheme::VerifyInFlash;

    if uses_ram && !ram.contains(rec.dst_addr, rec.size as u64) {
        return Err(Error::InvalidInput(format!(
            "image {i}: {} bytes at {:#x} are outside the RAM aperture",
            rec.size, rec.dst_addr
        )));
    }

    let key = match (rec.aes_enc_used, &policy.key) {
        (false, _) => None,
        (true, Some(k)) => Some(k),
        (true, None) => {
            return Err(Error::Decoding(format!(
                "image {i} is marked encrypted but the certificate names no key"
            )))
        }
    };

    let r = process_image(policy, flash, ram, rec, key);

    match r {
        Ok(digest) if !policy.verifies() || digest == rec.hash => {
            debug!("image {i}: {} bytes at {:#x} verified", rec.size, rec.dst_addr);
        }
        Ok(digest) => {
            error!(
                "image {i}: hash mismatch, expected {}, got {}",
                hex::encode(rec.hash),
                hex::encode(digest)
            );
            if uses_ram {
                ram.zero(rec.dst_addr, rec.size as usize)?;
            }
            return Err(Error::SwCompFailed(format!("image {i} hash mismatch")));
        }
        Err(e) => {
            if uses_ram {
                ram.zero(rec.dst_addr, rec.size as usize)?;
            }
            return Err(e);
        }
    }

    Ok(match policy.scheme {
        LoadVerifyScheme::VerifyInFlash => VerifiedImageInfo {
            addr: rec.src_addr,
            mem_type: MemoryType::Flash,
            size: rec.size,
        },
        _ => VerifiedImageInfo {
            addr: rec.dst_addr,
            mem_type: MemoryType::Ram,
            size: rec.size,
        },
    })
}

// Stream the image through the (optional) decryption and the hash, storing
// the plaintext in RAM where the scheme asks for it
fn process_image(
    policy: &ImagePolicy,
    flash: &impl IFlashReader,
    ram: &impl IMemory,
    rec: &SwImageRecord,
    key: Option<&[u8; 16]>,
) -> Result<[u8; HASH_SIZE], Error> {
    let cipher = Cipher::aes_128_ctr();

    let mut crypter = match key {
        Some(k) => Some(
            Crypter::new(cipher, Mode::Decrypt, k, Some(&policy.iv(rec.dst_addr)[..]))
                .map_err(|e| Error::Crypto(format!("{e:?}")))?,
        ),
        None => None,
    };

    let mut hasher =
        Hasher::new(MessageDigest::sha256()).map_err(|e| Error::Crypto(format!("{e:?}")))?;

    let stores = policy.scheme != LoadVerifyScheme::VerifyInFlash
        && (policy.loads_from_flash() || crypter.is_some());

    let size = rec.size as usize;
    let mut off = 0usize;

    while off < size {
        let n = SW_IMAGE_CHUNK_SIZE.min(size - off);
        let mut chunk = vec![0u8; n];

        if policy.loads_from_flash() {
            flash.read(rec.src_addr + off as u64, &mut chunk)?;
        } else {
            ram.read(rec.dst_addr + off as u64, &mut chunk)?;
        }

        let plain = match crypter.as_mut() {
            Some(c) => {
                let mut out = vec![0u8; n + cipher.block_size()];
                let k = c
                    .update(&chunk, &mut out)
                    .map_err(|e| Error::Crypto(format!("{e:?}")))?;
                out.truncate(k);

                let hashed = if policy.crypto_type == CryptoType::HashOnEncrypted {
                    &chunk
                } else {
                    &out
                };
                hasher
                    .update(hashed)
                    .map_err(|e| Error::Crypto(format!("{e:?}")))?;

                out
            }
            None => {
                hasher
                    .update(&chunk)
                    .map_err(|e| Error::Crypto(format!("{e:?}")))?;
                chunk
            }
        };

        if stores {
            ram.write(rec.dst_addr + off as u64, &plain)?;
        }

        off += n;
    }

    let sum = hasher.finish().map_err(|e| Error::Crypto(format!("{e:?}")))?;

    let mut digest = [0u8; HASH_SIZE];
    digest.copy_from_slice(&sum);

    Ok(digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::SwComponentInfo;
    use crate::otp::{MemoOtpStore, OtpConfig};
    use crate::sb::flash::{MemoFlash, MemoRam};
    use hex_literal::hex;
    use openssl::hash::hash;
    use openssl::symm::encrypt;

    const TEST_KCE: [u8; 16] = hex!("2b7e151628aed2a6abf7158809cf4f3c");
    const TEST_NONCE: [u8; 8] = hex!("a0a1a2a3a4a5a6a7");

    const FLASH_BASE: u64 = 0x1000_0000;
    const RAM_BASE: u64 = 0x8000_0000;

    fn otp(lcs: Lcs) -> MemoOtpStore {
        let mut s = MemoOtpStore::new();
        let cfg = OtpConfig {
            lcs,
            kce: Some(TEST_KCE),
            ..Default::default()
        };
        s.provision(&cfg).expect("provisioning OTP");
        s
    }

    fn image(n: usize) -> Vec<u8> {
        (0..n).map(|i| (i * 7 + 3) as u8).collect()
    }

    fn sha256(b: &[u8]) -> [u8; 32] {
        let mut h = [0u8; 32];
        h.copy_from_slice(&hash(MessageDigest::sha256(), b).unwrap());
        h
    }

    fn body(
        scheme: LoadVerifyScheme,
        enc: CodeEncType,
        crypto_type: CryptoType,
        recs: Vec<SwImageRecord>,
    ) -> ContentCertBody {
        ContentCertBody {
            hbk_id: HbkId::Hbk,
            nv_counter: 0,
            info: SwComponentInfo {
                code_enc_type: enc,
                crypto_type,
                load_verify_scheme: scheme,
                nonce: TEST_NONCE,
            },
            images: recs,
        }
    }

    fn rec(hash: [u8; 32], src: u64, dst: u64, size: usize, aes: bool) -> SwImageRecord {
        SwImageRecord {
            hash,
            dst_addr: dst,
            size: size as u32,
            aes_enc_used: aes,
            src_addr: src,
        }
    }

    #[test]
    fn load_and_verify_plain() {
        let img = image(SW_IMAGE_CHUNK_SIZE + 100);

        let mut flash = MemoFlash::new(FLASH_BASE, 0x4000);
        flash.program(FLASH_BASE + 0x100, &img).unwrap();
        let ram = MemoRam::new(RAM_BASE, 0x4000);

        let b = body(
            LoadVerifyScheme::LoadAndVerify,
            CodeEncType::None,
            CryptoType::HashOnDecrypted,
            vec![rec(sha256(&img), FLASH_BASE + 0x100, RAM_BASE + 0x10, img.len(), false)],
        );

        let v = verify_sw_comps(&otp(Lcs::Secure), &flash, &ram, HbkId::Hbk, &b).unwrap();

        assert_eq!(
            v,
            vec![VerifiedImageInfo {
                addr: RAM_BASE + 0x10,
                mem_type: MemoryType::Ram,
                size: img.len() as u32,
            }]
        );

        let mut loaded = vec![0u8; img.len()];
        ram.read(RAM_BASE + 0x10, &mut loaded).unwrap();
        assert_eq!(loaded, img);
    }

    #[test]
    fn hash_mismatch_wipes_ram() {
        let img = image(64);

        let mut flash = MemoFlash::new(FLASH_BASE, 0x1000);
        flash.program(FLASH_BASE, &img).unwrap();
        let ram = MemoRam::new(RAM_BASE, 0x1000);

        let b = body(
            LoadVerifyScheme::LoadAndVerify,
            CodeEncType::None,
            CryptoType::HashOnDecrypted,
            vec![rec([0u8; 32], FLASH_BASE, RAM_BASE, img.len(), false)],
        );

        let r = verify_sw_comps(&otp(Lcs::Secure), &flash, &ram, HbkId::Hbk, &b);
        assert!(matches!(r, Err(Error::SwCompFailed(_))));

        let mut loaded = vec![0xffu8; img.len()];
        ram.read(RAM_BASE, &mut loaded).unwrap();
        assert_eq!(loaded, vec![0u8; img.len()]);
    }

    #[test]
    fn verify_in_flash() {
        let img = image(200);

        let mut flash = MemoFlash::new(FLASH_BASE, 0x1000);
        flash.program(FLASH_BASE + 0x20, &img).unwrap();
        let ram = MemoRam::new(RAM_BASE, 0x10);

        let b = body(
            LoadVerifyScheme::VerifyInFlash,
            CodeEncType::None,
            CryptoType::HashOnDecrypted,
            vec![rec(sha256(&img), FLASH_BASE + 0x20, NO_MEM_LOAD, img.len(), false)],
        );

        let v = verify_sw_comps(&otp(Lcs::Secure), &flash, &ram, HbkId::Hbk, &b).unwrap();
        assert_eq!(v[0].mem_type, MemoryType::Flash);
        assert_eq!(v[0].addr, FLASH_BASE + 0x20);

        // a destination is not allowed when verifying in place
        let b = body(
            LoadVerifyScheme::VerifyInFlash,
            CodeEncType::None,
            CryptoType::HashOnDecrypted,
            vec![rec(sha256(&img), FLASH_BASE + 0x20, RAM_BASE, img.len(), false)],
        );
        let r = verify_sw_comps(&otp(Lcs::Secure), &flash, &ram, HbkId::Hbk, &b);
        assert!(matches!(r, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn verify_in_memory_encrypted() {
        let img = image(300);
        let dst = RAM_BASE + 0x200;

        let b0 = body(
            LoadVerifyScheme::VerifyInMemory,
            CodeEncType::Oem,
            CryptoType::HashOnEncrypted,
            vec![],
        );
        let policy = ImagePolicy::new(&otp(Lcs::Secure), HbkId::Hbk, &b0).unwrap();
        let enc = encrypt(Cipher::aes_128_ctr(), &TEST_KCE, Some(&policy.iv(dst)[..]), &img).unwrap();

        let flash = MemoFlash::new(FLASH_BASE, 0x10);
        let ram = MemoRam::new(RAM_BASE, 0x1000);
        ram.write(dst, &enc).unwrap();

        let b = ContentCertBody {
            images: vec![rec(sha256(&enc), NO_MEM_LOAD, dst, img.len(), true)],
            ..b0
        };

        verify_sw_comps(&otp(Lcs::Secure), &flash, &ram, HbkId::Hbk, &b).unwrap();

        // decrypted in place
        let mut loaded = vec![0u8; img.len()];
        ram.read(dst, &mut loaded).unwrap();
        assert_eq!(loaded, img);
    }

    // RAM that faults on reads past the first chunk
    struct FaultyRam(MemoRam);

    impl IMemory for FaultyRam {
        fn base(&self) -> u64 {
            self.0.base()
        }

        fn size(&self) -> u64 {
            self.0.size()
        }

        fn read(&self, addr: u64, buf: &mut [u8]) -> Result<(), Error> {
            if addr >= self.0.base() + SW_IMAGE_CHUNK_SIZE as u64 {
                return Err(Error::InvalidInput(format!("read fault at {addr:#x}")));
            }
            self.0.read(addr, buf)
        }

        fn write(&self, addr: u64, data: &[u8]) -> Result<(), Error> {
            self.0.write(addr, data)
        }

        fn zero(&self, addr: u64, len: usize) -> Result<(), Error> {
            self.0.zero(addr, len)
        }
    }

    #[test]
    fn verify_in_memory_failure_wipes_ram() {
        let img = image(SW_IMAGE_CHUNK_SIZE + 100);
        let dst = RAM_BASE;

        let b0 = body(
            LoadVerifyScheme::VerifyInMemory,
            CodeEncType::Oem,
            CryptoType::HashOnEncrypted,
            vec![],
        );
        let policy = ImagePolicy::new(&otp(Lcs::Secure), HbkId::Hbk, &b0).unwrap();
        let enc = encrypt(Cipher::aes_128_ctr(), &TEST_KCE, Some(&policy.iv(dst)[..]), &img).unwrap();

        let flash = MemoFlash::new(FLASH_BASE, 0x10);
        let ram = FaultyRam(MemoRam::new(RAM_BASE, 0x4000));
        ram.write(dst, &enc).unwrap();

        let b = ContentCertBody {
            images: vec![rec(sha256(&enc), NO_MEM_LOAD, dst, img.len(), true)],
            ..b0
        };

        // the first chunk is decrypted in place before the second read fails
        let r = verify_sw_comps(&otp(Lcs::Secure), &flash, &ram, HbkId::Hbk, &b);
        assert!(matches!(r, Err(Error::InvalidInput(_))));

        let mut loaded = vec![0xffu8; SW_IMAGE_CHUNK_SIZE];
        ram.0.read(dst, &mut loaded).unwrap();
        assert_eq!(loaded, vec![0u8; SW_IMAGE_CHUNK_SIZE]);

        let mut tail = vec![0xffu8; 100];
        ram.0
            .read(dst + SW_IMAGE_CHUNK_SIZE as u64, &mut tail)
            .unwrap();
        assert_eq!(tail, vec![0u8; 100]);
    }

    #[test]
    fn load_encrypted_hash_on_decrypted() {
        let img = image(SW_IMAGE_CHUNK_SIZE * 2 + 5);
        let dst = RAM_BASE;

        let mut iv = [0u8; 16];
        iv[..8].copy_from_slice(&TEST_NONCE);
        iv[8..].copy_from_slice(&dst.to_be_bytes());
        let enc = encrypt(Cipher::aes_128_ctr(), &TEST_KCE, Some(&iv[..]), &img).unwrap();

        let mut flash = MemoFlash::new(FLASH_BASE, 0x4000);
        flash.program(FLASH_BASE, &enc).unwrap();
        let ram = MemoRam::new(RAM_BASE, 0x4000);

        let b = body(
            LoadVerifyScheme::LoadAndVerify,
            CodeEncType::Oem,
            CryptoType::HashOnDecrypted,
            vec![rec(sha256(&img), FLASH_BASE, dst, img.len(), true)],
        );

        verify_sw_comps(&otp(Lcs::Secure), &flash, &ram, HbkId::Hbk, &b).unwrap();

        let mut loaded = vec![0u8; img.len()];
        ram.read(dst, &mut loaded).unwrap();
        assert_eq!(loaded, img);
    }

    #[test]
    fn policy_checks() {
        let flash = MemoFlash::new(FLASH_BASE, 0x10);
        let ram = MemoRam::new(RAM_BASE, 0x10);

        let load_only = body(
            LoadVerifyScheme::LoadOnly,
            CodeEncType::None,
            CryptoType::HashOnDecrypted,
            vec![rec([0; 32], FLASH_BASE, RAM_BASE, 4, false)],
        );
        let r = verify_sw_comps(&otp(Lcs::Secure), &flash, &ram, HbkId::Hbk, &load_only);
        assert!(matches!(r, Err(Error::IllegalLcs(_))));

        // nothing is checked, so anything goes outside Secure
        verify_sw_comps(&otp(Lcs::DeviceManufacture), &flash, &ram, HbkId::Hbk0, &load_only)
            .unwrap();

        let oem = body(
            LoadVerifyScheme::LoadAndVerify,
            CodeEncType::Oem,
            CryptoType::HashOnDecrypted,
            vec![rec([0; 32], FLASH_BASE, RAM_BASE, 4, true)],
        );
        let r = verify_sw_comps(&otp(Lcs::Secure), &flash, &ram, HbkId::Hbk0, &oem);
        assert!(matches!(r, Err(Error::InvalidInput(_))));

        let r = verify_sw_comps(&otp(Lcs::Rma), &flash, &ram, HbkId::Hbk, &oem);
        assert!(matches!(r, Err(Error::IllegalLcs(_))));
        assert_eq!(
            r.unwrap_err().code(),
            crate::sb::BOOT_IMG_VERIFIER_ILLEGAL_LCS_FOR_OPERATION_ERR
        );

        // no ICV key provisioned
        let icv = body(
            LoadVerifyScheme::LoadAndVerify,
            CodeEncType::Icv,
            CryptoType::HashOnDecrypted,
            vec![rec([0; 32], FLASH_BASE, RAM_BASE, 4, true)],
        );
        let r = verify_sw_comps(&otp(Lcs::Secure), &flash, &ram, HbkId::Hbk, &icv);
        assert!(matches!(r, Err(Error::Otp(_))));
    }

    #[test]
    fn record_checks() {
        let flash = MemoFlash::new(FLASH_BASE, 0x100);
        let ram = MemoRam::new(RAM_BASE, 0x100);
        let o = otp(Lcs::Secure);

        let check = |r: SwImageRecord| {
            let b = body(
                LoadVerifyScheme::LoadAndVerify,
                CodeEncType::None,
                CryptoType::HashOnDecrypted,
                vec![r],
            );
            verify_sw_comps(&o, &flash, &ram, HbkId::Hbk, &b)
        };

        let r = check(rec([0; 32], FLASH_BASE, RAM_BASE, 0, false));
        assert!(matches!(r, Err(Error::SwCompSizeNull(_))));

        let r = check(rec([0; 32], u64::MAX - 2, RAM_BASE, 4, false));
        assert!(matches!(r, Err(Error::InvalidInput(_))));

        // outside the RAM aperture
        let r = check(rec([0; 32], FLASH_BASE, RAM_BASE + 0xfe, 4, false));
        assert!(matches!(r, Err(Error::InvalidInput(_))));

        // encrypted record in a certificate without encryption
        let r = check(rec([0; 32], FLASH_BASE, RAM_BASE, 4, true));
        assert!(matches!(r, Err(Error::Decoding(_))));
    }
}
