// Copyright 2023-2025 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::common::*;
use super::config::OtpConfig;
use super::errors::Error;
use super::IOtpStore;
use std::sync::RwLock;

/// An in-memory OTP image together with the lifecycle state register.
#[derive(Debug)]
pub struct MemoOtpStore {
    words: RwLock<Vec<u32>>,
    lcs: RwLock<Lcs>,
}

impl Default for MemoOtpStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoOtpStore {
    /// Returns a blank OTP in chip-manufacture state
    pub fn new() -> Self {
        Self {
            words: RwLock::new(vec![0; OTP_SIZE_IN_WORDS]),
            lcs: RwLock::new(Lcs::ChipManufacture),
        }
    }

    /// Burn the OTP content described by the given JSON document
    pub fn load_json(&mut self, j: &str) -> Result<(), Error> {
        let cfg: OtpConfig = serde_json::from_str(j).map_err(|e| Error::Syntax(e.to_string()))?;

        self.provision(&cfg)
    }

    /// Burn hash and key material, along with the zero-count and not-in-use
    /// flags that go with them, the anti-rollback counters and the DCU lock
    pub fn provision(&mut self, cfg: &OtpConfig) -> Result<(), Error> {
        if cfg.hbk.is_some() && (cfg.hbk0.is_some() || cfg.hbk1.is_some()) {
            return Err(Error::Syntax(
                "hbk is mutually exclusive with hbk0 and hbk1".to_string(),
            ));
        }

        let mut first_flags = 0u32;
        let mut oem_flags = 0u32;
        let mut second_flags = 0u32;

        if let Some(h) = &cfg.hbk {
            let zeros = self.burn(OTP_HBK_OFFSET, h, "hbk")?;
            first_flags |= HBK0_NOT_IN_USE_BIT;
            oem_flags |= zeros << HBK_ZERO_BITS_SHIFT;
        }

        if let Some(h) = &cfg.hbk0 {
            let zeros = self.burn(OTP_HBK0_OFFSET, h, "hbk0")?;
            first_flags |= zeros << HBK0_ZERO_BITS_SHIFT;
        }

        if let Some(h) = &cfg.hbk1 {
            let zeros = self.burn(OTP_HBK1_OFFSET, h, "hbk1")?;
            oem_flags |= zeros << HBK_ZERO_BITS_SHIFT;
        }

        match &cfg.kceicv {
            Some(k) => {
                let zeros = self.burn(OTP_KCEICV_OFFSET, k, "kceicv")?;
                first_flags |= zeros << KCEICV_ZERO_BITS_SHIFT;
            }
            None => first_flags |= KCEICV_NOT_IN_USE_BIT,
        }

        match &cfg.kce {
            Some(k) => {
                let zeros = self.burn(OTP_KCE_OFFSET, k, "kce")?;
                oem_flags |= zeros << KCE_ZERO_BITS_SHIFT;
            }
            None => oem_flags |= KCE_NOT_IN_USE_BIT,
        }

        for (id, v) in [
            (CounterId::Trusted, cfg.trusted_min_version),
            (CounterId::NonTrusted, cfg.non_trusted_min_version),
        ] {
            if v > id.max_version() {
                return Err(Error::Syntax(format!(
                    "{id:?} min version {v} exceeds {}",
                    id.max_version()
                )));
            }

            for (i, w) in unary_words(v, id.size_in_words()).iter().enumerate() {
                self.write_word(id.offset() + i, *w)?;
            }
        }

        for (i, w) in cfg.dcu_lock.iter().enumerate() {
            self.write_word(OTP_DCU_OFFSET + i, *w)?;
        }

        if cfg.secure_disable {
            second_flags |= SECURE_DISABLE_BIT;
        }
        if cfg.icv_rma {
            second_flags |= ICV_RMA_MODE_BIT;
        }
        if cfg.oem_rma {
            second_flags |= OEM_RMA_MODE_BIT;
        }

        self.write_word(OTP_FIRST_MANUFACTURE_FLAG_OFFSET, first_flags)?;
        self.write_word(OTP_SECOND_MANUFACTURE_FLAG_OFFSET, second_flags)?;
        self.write_word(OTP_OEM_FLAG_OFFSET, oem_flags)?;

        self.set_lcs(cfg.lcs)
    }

    /// Latch a new lifecycle state
    pub fn set_lcs(&self, lcs: Lcs) -> Result<(), Error> {
        let mut l = self.lcs.write().map_err(|e| Error::Access(e.to_string()))?;
        *l = lcs;

        Ok(())
    }

    // returns the number of zero bits in the burned value
    fn burn(&self, offset: usize, v: &[u8], what: &str) -> Result<u32, Error> {
        let words = bytes_to_words(v);

        if words.iter().all(|w| *w == 0) {
            return Err(Error::Syntax(format!("{what} is all zeros")));
        }

        for (i, w) in words.iter().enumerate() {
            self.write_word(offset + i, *w)?;
        }

        Ok(zero_bits(&words))
    }
}

impl IOtpStore for MemoOtpStore {
    fn read_word(&self, offset: usize) -> Result<u32, Error> {
        let words = self.words.read().map_err(|e| Error::Access(e.to_string()))?;

        words
            .get(offset)
            .copied()
            .ok_or(Error::Access(format!("word offset {offset:#x} out of range")))
    }

    fn write_word(&self, offset: usize, value: u32) -> Result<(), Error> {
        let mut words = self.words.write().map_err(|e| Error::Access(e.to_string()))?;

        let w = words
            .get_mut(offset)
            .ok_or(Error::Access(format!("word offset {offset:#x} out of range")))?;

        *w |= value;

        Ok(())
    }

    fn lcs(&self) -> Result<Lcs, Error> {
        let l = self.lcs.read().map_err(|e| Error::Access(e.to_string()))?;

        Ok(*l)
    }
}
