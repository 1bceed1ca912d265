// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

//! Lifecycle-dependent views over the raw OTP content: which root key hash is
//! usable, what the anti-rollback counters say, and which code encryption
//! keys are available.

use super::common::*;
use super::errors::Error;
use super::IOtpStore;
use log::{debug, warn};
use openssl::hash::{hash, MessageDigest};

/// Security-disable and RMA requests burned in the second manufacture word
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RmaFlags {
    pub secure_disable: bool,
    pub icv_rma: bool,
    pub oem_rma: bool,
}

fn read_words<O: IOtpStore + ?Sized>(otp: &O, offset: usize, n: usize) -> Result<Vec<u32>, Error> {
    (offset..offset + n).map(|o| otp.read_word(o)).collect()
}

/// Return the root public key hash held in the requested OTP slot, or `None`
/// if the slot is not programmed yet.  A `None` in CM, or for the OEM owned
/// slots in DM, is expected: it is up to the caller to decide whether that
/// allows skipping the root key check.
pub fn pub_key_hash<O: IOtpStore + ?Sized>(
    otp: &O,
    hbk_id: HbkId,
) -> Result<Option<Vec<u8>>, Error> {
    let lcs = otp.lcs()?;

    if lcs == Lcs::ChipManufacture {
        return Ok(None);
    }

    let first_flags = otp.read_word(OTP_FIRST_MANUFACTURE_FLAG_OFFSET)?;
    let oem_flags = otp.read_word(OTP_OEM_FLAG_OFFSET)?;

    let full_hbk = first_flags & HBK0_NOT_IN_USE_BIT != 0;
    let hbk0_zeros = get_field(first_flags, HBK0_ZERO_BITS_SHIFT, HBK0_ZERO_BITS_SIZE);
    let oem_zeros = get_field(oem_flags, HBK_ZERO_BITS_SHIFT, HBK_ZERO_BITS_SIZE);

    let (offset, n, expected_zeros) = match hbk_id {
        HbkId::Hbk => {
            if lcs == Lcs::DeviceManufacture {
                return Ok(None);
            }
            if !full_hbk || hbk0_zeros != 0 {
                return Err(Error::IllegalInput(
                    "OTP is not provisioned with a 256-bit HBK".to_string(),
                ));
            }
            (OTP_HBK_OFFSET, OTP_HBK_SIZE_IN_WORDS, oem_zeros)
        }
        HbkId::Hbk0 => {
            if full_hbk {
                return Err(Error::IllegalInput(
                    "OTP is provisioned with a 256-bit HBK, HBK0 is not in use".to_string(),
                ));
            }
            (OTP_HBK0_OFFSET, OTP_HBK0_SIZE_IN_WORDS, hbk0_zeros)
        }
        HbkId::Hbk1 => {
            if lcs == Lcs::DeviceManufacture {
                return Ok(None);
            }
            if full_hbk {
                return Err(Error::IllegalInput(
                    "OTP is provisioned with a 256-bit HBK, HBK1 is not in use".to_string(),
                ));
            }
            (OTP_HBK1_OFFSET, OTP_HBK1_SIZE_IN_WORDS, oem_zeros)
        }
    };

    let words = read_words(otp, offset, n)?;

    if words.iter().all(|w| *w == 0) {
        debug!("{hbk_id:?} is not programmed");
        return Ok(None);
    }

    let zeros = zero_bits(&words);
    if zeros != expected_zeros {
        return Err(Error::ZeroCount(format!(
            "{hbk_id:?} has {zeros} zero bits, expected {expected_zeros}"
        )));
    }

    Ok(Some(words_to_bytes(&words)))
}

/// Decode the unary anti-rollback counter.  The set bits must be contiguous
/// from bit 0, and once a word is not full all the following words must be
/// zero.
pub fn sw_version<O: IOtpStore + ?Sized>(otp: &O, id: CounterId) -> Result<u32, Error> {
    let words = read_words(otp, id.offset(), id.size_in_words())?;

    let mut version = 0u32;
    let mut done = false;

    for (i, w) in words.iter().enumerate() {
        if done {
            if *w != 0 {
                return Err(Error::SwVersion(format!(
                    "{id:?} counter word {i} set after a partial word"
                )));
            }
            continue;
        }

        let ones = w.count_ones();
        if w.trailing_ones() != ones {
            return Err(Error::SwVersion(format!(
                "{id:?} counter word {i} is not unary encoded: {w:#010x}"
            )));
        }

        version += ones;

        if ones < 32 {
            done = true;
        }
    }

    Ok(version)
}

/// Move the anti-rollback counter forward to `version`.  Going backwards is
/// refused; setting the current value is a no-op.
pub fn set_sw_version<O: IOtpStore + ?Sized>(
    otp: &O,
    id: CounterId,
    version: u32,
) -> Result<(), Error> {
    if version > id.max_version() {
        return Err(Error::IllegalInput(format!(
            "{id:?} version {version} exceeds {}",
            id.max_version()
        )));
    }

    let current = sw_version(otp, id)?;

    if version < current {
        return Err(Error::IllegalInput(format!(
            "{id:?} version {version} is older than {current}"
        )));
    }

    if version == current {
        return Ok(());
    }

    let words = unary_words(version, id.size_in_words());

    for (i, w) in words.iter().enumerate() {
        otp.write_word(id.offset() + i, *w)?;
    }

    for (i, w) in words.iter().enumerate() {
        let r = otp.read_word(id.offset() + i)?;
        if r != *w {
            return Err(Error::WriteCompare(format!(
                "{id:?} counter word {i}: wrote {w:#010x}, read back {r:#010x}"
            )));
        }
    }

    debug!("{id:?} counter moved from {current} to {version}");

    Ok(())
}

/// Secure-disable and RMA flags from the second manufacture word
pub fn rma_flags<O: IOtpStore + ?Sized>(otp: &O) -> Result<RmaFlags, Error> {
    let w = otp.read_word(OTP_SECOND_MANUFACTURE_FLAG_OFFSET)?;

    Ok(RmaFlags {
        secure_disable: w & SECURE_DISABLE_BIT != 0,
        icv_rma: w & ICV_RMA_MODE_BIT != 0,
        oem_rma: w & OEM_RMA_MODE_BIT != 0,
    })
}

/// Fetch a 128-bit code encryption key, checking its zero count
pub fn code_enc_key<O: IOtpStore + ?Sized>(otp: &O, key: CodeEncKey) -> Result<[u8; 16], Error> {
    let (flags_offset, not_in_use, zeros_shift, zeros_size, offset, n) = match key {
        CodeEncKey::Kceicv => (
            OTP_FIRST_MANUFACTURE_FLAG_OFFSET,
            KCEICV_NOT_IN_USE_BIT,
            KCEICV_ZERO_BITS_SHIFT,
            KCEICV_ZERO_BITS_SIZE,
            OTP_KCEICV_OFFSET,
            OTP_KCEICV_SIZE_IN_WORDS,
        ),
        CodeEncKey::Kce => (
            OTP_OEM_FLAG_OFFSET,
            KCE_NOT_IN_USE_BIT,
            KCE_ZERO_BITS_SHIFT,
            KCE_ZERO_BITS_SIZE,
            OTP_KCE_OFFSET,
            OTP_KCE_SIZE_IN_WORDS,
        ),
    };

    let flags = otp.read_word(flags_offset)?;

    if flags & not_in_use != 0 {
        return Err(Error::KeyNotInUse(format!("{key:?}")));
    }

    let words = read_words(otp, offset, n)?;

    if words.iter().all(|w| *w == 0) {
        return Err(Error::KeyNotInUse(format!("{key:?} is not programmed")));
    }

    let zeros = zero_bits(&words);
    let expected = get_field(flags, zeros_shift, zeros_size);
    if zeros != expected {
        return Err(Error::ZeroCount(format!(
            "{key:?} has {zeros} zero bits, expected {expected}"
        )));
    }

    let mut k = [0u8; 16];
    k.copy_from_slice(&words_to_bytes(&words));

    Ok(k)
}

/// The SoC identifier that developer debug certificates are bound to
pub fn soc_id<O: IOtpStore + ?Sized>(otp: &O) -> Result<[u8; 32], Error> {
    let words = read_words(otp, OTP_HBK_OFFSET, OTP_HBK_SIZE_IN_WORDS)?;

    if words.iter().all(|w| *w == 0) {
        warn!("deriving SoC ID from an unprogrammed HBK");
    }

    let digest = hash(MessageDigest::sha256(), &words_to_bytes(&words))
        .map_err(|e| Error::HashCalculateFail(format!("{e:?}")))?;

    let mut id = [0u8; 32];
    id.copy_from_slice(&digest);

    Ok(id)
}

/// DCU lock value applied by default, i.e. when no debug certificate is
/// presented
pub fn dcu_default_lock<O: IOtpStore + ?Sized>(otp: &O) -> Result<[u32; 4], Error> {
    let words = read_words(otp, OTP_DCU_OFFSET, OTP_DCU_SIZE_IN_WORDS)?;

    Ok([words[0], words[1], words[2], words[3]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::otp::{MemoOtpStore, OtpConfig};
    use hex_literal::hex;

    const TEST_JSON_OTP_SECURE: &str = include_str!("../../testdata/otp-secure.json");
    const TEST_JSON_OTP_DM: &str = include_str!("../../testdata/otp-dm.json");
    const TEST_HBK: [u8; 32] =
        hex!("647ad55da05ecc7cd2e31ad513286fc9c83ac03834ccf6c4c4ce64e54cbdfb64");
    const TEST_HBK0: [u8; 16] = hex!("647ad55da05ecc7cd2e31ad513286fc9");
    const TEST_KCE: [u8; 16] = hex!("2b7e151628aed2a6abf7158809cf4f3c");

    fn store(j: &str) -> MemoOtpStore {
        let mut s = MemoOtpStore::new();
        s.load_json(j).expect("loading OTP");
        s
    }

    #[test]
    fn pub_key_hash_full() {
        let s = store(TEST_JSON_OTP_SECURE);

        let h = pub_key_hash(&s, HbkId::Hbk).unwrap();
        assert_eq!(h, Some(TEST_HBK.to_vec()));

        // 128-bit slots are not in use
        assert!(pub_key_hash(&s, HbkId::Hbk0).is_err());
        assert!(pub_key_hash(&s, HbkId::Hbk1).is_err());
    }

    #[test]
    fn pub_key_hash_dm() {
        let s = store(TEST_JSON_OTP_DM);

        let h = pub_key_hash(&s, HbkId::Hbk0).unwrap();
        assert_eq!(h, Some(TEST_HBK0.to_vec()));

        // OEM slot is ignored in DM
        assert_eq!(pub_key_hash(&s, HbkId::Hbk1).unwrap(), None);
    }

    #[test]
    fn pub_key_hash_cm_not_programmed() {
        let s = store(TEST_JSON_OTP_SECURE);
        s.set_lcs(Lcs::ChipManufacture).unwrap();

        assert_eq!(pub_key_hash(&s, HbkId::Hbk).unwrap(), None);
    }

    #[test]
    fn pub_key_hash_zero_count_mismatch() {
        let s = store(TEST_JSON_OTP_SECURE);

        // flip a zero bit to one in the last HBK word
        let w = s.read_word(OTP_HBK_OFFSET + 7).unwrap();
        s.write_word(OTP_HBK_OFFSET + 7, !w & (!w).wrapping_neg())
            .unwrap();

        let r = pub_key_hash(&s, HbkId::Hbk);
        assert!(matches!(r, Err(Error::ZeroCount(_))));
    }

    #[test]
    fn sw_version_read_and_update() {
        let s = store(TEST_JSON_OTP_SECURE);

        assert_eq!(sw_version(&s, CounterId::Trusted).unwrap(), 2);
        assert_eq!(sw_version(&s, CounterId::NonTrusted).unwrap(), 33);

        set_sw_version(&s, CounterId::NonTrusted, 70).unwrap();
        assert_eq!(sw_version(&s, CounterId::NonTrusted).unwrap(), 70);

        // no going back, no going past the end
        assert!(set_sw_version(&s, CounterId::NonTrusted, 69).is_err());
        assert!(set_sw_version(&s, CounterId::Trusted, 33).is_err());

        // same value is fine
        set_sw_version(&s, CounterId::Trusted, 2).unwrap();
    }

    #[test]
    fn sw_version_malformed() {
        let s = MemoOtpStore::new();

        s.write_word(OTP_TRUSTED_MIN_SW_VERSION_OFFSET, 0b101).unwrap();
        assert!(matches!(
            sw_version(&s, CounterId::Trusted),
            Err(Error::SwVersion(_))
        ));

        s.write_word(OTP_NON_TRUSTED_MIN_SW_VERSION_OFFSET, 0b1).unwrap();
        s.write_word(OTP_NON_TRUSTED_MIN_SW_VERSION_OFFSET + 2, 0b1)
            .unwrap();
        assert!(matches!(
            sw_version(&s, CounterId::NonTrusted),
            Err(Error::SwVersion(_))
        ));
    }

    #[test]
    fn code_enc_keys() {
        let s = store(TEST_JSON_OTP_SECURE);

        assert_eq!(code_enc_key(&s, CodeEncKey::Kce).unwrap(), TEST_KCE);
        assert!(matches!(
            code_enc_key(&s, CodeEncKey::Kceicv),
            Err(Error::KeyNotInUse(_))
        ));
    }

    #[test]
    fn rma_flags_from_otp() {
        let mut s = MemoOtpStore::new();
        let cfg = OtpConfig {
            lcs: Lcs::Rma,
            oem_rma: true,
            ..Default::default()
        };
        s.provision(&cfg).unwrap();

        let f = rma_flags(&s).unwrap();
        assert_eq!(
            f,
            RmaFlags {
                oem_rma: true,
                ..Default::default()
            }
        );
    }

    #[test]
    fn soc_id_is_stable() {
        let s = store(TEST_JSON_OTP_SECURE);

        let a = soc_id(&s).unwrap();
        let b = soc_id(&s).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, [0u8; 32]);
    }

    #[test]
    fn dcu_lock_from_otp() {
        let s = store(TEST_JSON_OTP_DM);

        assert_eq!(dcu_default_lock(&s).unwrap(), [u32::MAX; 4]);
    }

    // OTP whose fuses never blow
    struct StuckOtp(MemoOtpStore);

    impl IOtpStore for StuckOtp {
        fn read_word(&self, offset: usize) -> Result<u32, Error> {
            self.0.read_word(offset)
        }

        fn write_word(&self, _offset: usize, _value: u32) -> Result<(), Error> {
            Ok(())
        }

        fn lcs(&self) -> Result<Lcs, Error> {
            self.0.lcs()
        }
    }

    #[test]
    fn sw_version_write_compare() {
        let s = StuckOtp(store(TEST_JSON_OTP_SECURE));

        let r = set_sw_version(&s, CounterId::NonTrusted, 40);
        assert!(matches!(r, Err(Error::WriteCompare(_))));

        assert_eq!(sw_version(&s, CounterId::NonTrusted).unwrap(), 33);
    }
}
