// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::errors::Error;
use std::sync::RwLock;

/// Read access to the storage holding certificates and images
pub trait IFlashReader {
    /// Fill `buf` with the bytes stored at `addr`
    fn read(&self, addr: u64, buf: &mut [u8]) -> Result<(), Error>;
}

/// The RAM aperture images are loaded into
pub trait IMemory {
    /// First address of the aperture
    fn base(&self) -> u64;

    /// Size of the aperture in bytes
    fn size(&self) -> u64;

    fn read(&self, addr: u64, buf: &mut [u8]) -> Result<(), Error>;

    fn write(&self, addr: u64, data: &[u8]) -> Result<(), Error>;

    /// Clear a region, e.g. after a failed verification
    fn zero(&self, addr: u64, len: usize) -> Result<(), Error>;

    /// Is `[addr, addr + len)` entirely within the aperture?
    fn contains(&self, addr: u64, len: u64) -> bool {
        match (addr.checked_add(len), self.base().checked_add(self.size())) {
            (Some(end), Some(limit)) => addr >= self.base() && end <= limit,
            _ => false,
        }
    }
}

// offset of `[addr, addr + len)` in a window starting at `base`, if it fits
fn window_offset(base: u64, size: usize, addr: u64, len: usize) -> Option<usize> {
    let off = usize::try_from(addr.checked_sub(base)?).ok()?;

    if off.checked_add(len)? > size {
        return None;
    }

    Some(off)
}

/// Flash contents held in memory, mapped at a base address.  Unwritten
/// locations read as erased (0xFF).
#[derive(Debug, Default)]
pub struct MemoFlash {
    base: u64,
    data: Vec<u8>,
}

impl MemoFlash {
    pub fn new(base: u64, size: usize) -> Self {
        Self {
            base,
            data: vec![0xFF; size],
        }
    }

    /// Map an existing flash image at `base`
    pub fn from_image(base: u64, image: Vec<u8>) -> Self {
        Self { base, data: image }
    }

    /// Program `data` at `addr`
    pub fn program(&mut self, addr: u64, data: &[u8]) -> Result<(), Error> {
        let off = window_offset(self.base, self.data.len(), addr, data.len()).ok_or(Error::Map(
            format!("flash write of {} bytes at {addr:#x} out of range", data.len()),
        ))?;

        self.data[off..off + data.len()].copy_from_slice(data);

        Ok(())
    }
}

impl IFlashReader for MemoFlash {
    fn read(&self, addr: u64, buf: &mut [u8]) -> Result<(), Error> {
        let off = window_offset(self.base, self.data.len(), addr, buf.len()).ok_or(Error::Map(
            format!("flash read of {} bytes at {addr:#x} out of range", buf.len()),
        ))?;

        buf.copy_from_slice(&self.data[off..off + buf.len()]);

        Ok(())
    }
}

/// A RAM aperture backed by a byte vector
#[derive(Debug)]
pub struct MemoRam {
    base: u64,
    data: RwLock<Vec<u8>>,
}

impl MemoRam {
    pub fn new(base: u64, size: usize) -> Self {
        Self {
            base,
            data: RwLock::new(vec![0; size]),
        }
    }

    fn offset(&self, addr: u64, len: usize, len_total: usize) -> Result<usize, Error> {
        window_offset(self.base, len_total, addr, len).ok_or(Error::InvalidInput(format!(
            "{len} bytes at {addr:#x} are outside the RAM aperture"
        )))
    }
}

impl IMemory for MemoRam {
    fn base(&self) -> u64 {
        self.base
    }

    fn size(&self) -> u64 {
        self.data.read().map(|d| d.len() as u64).unwrap_or(0)
    }

    fn read(&self, addr: u64, buf: &mut [u8]) -> Result<(), Error> {
        let data = self.data.read().map_err(|e| Error::Map(e.to_string()))?;
        let off = self.offset(addr, buf.len(), data.len())?;

        buf.copy_from_slice(&data[off..off + buf.len()]);

        Ok(())
    }

    fn write(&self, addr: u64, src: &[u8]) -> Result<(), Error> {
        let mut data = self.data.write().map_err(|e| Error::Map(e.to_string()))?;
        let off = self.offset(addr, src.len(), data.len())?;

        data[off..off + src.len()].copy_from_slice(src);

        Ok(())
    }

    fn zero(&self, addr: u64, len: usize) -> Result<(), Error> {
        let mut data = self.data.write().map_err(|e| Error::Map(e.to_string()))?;
        let off = self.offset(addr, len, data.len())?;

        data[off..off + len].fill(0);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flash_program_and_read() {
        let mut f = MemoFlash::new(0x1000, 0x100);

        f.program(0x1010, &[1, 2, 3]).unwrap();

        let mut b = [0u8; 4];
        f.read(0x100f, &mut b).unwrap();
        assert_eq!(b, [0xff, 1, 2, 3]);

        assert!(f.read(0x10fe, &mut b).is_err());
        assert!(f.read(0x0fff, &mut b).is_err());
        assert!(f.program(0x1100, &[0]).is_err());
    }

    #[test]
    fn ram_aperture() {
        let r = MemoRam::new(0x8000, 0x40);

        assert!(r.contains(0x8000, 0x40));
        assert!(!r.contains(0x8001, 0x40));
        assert!(!r.contains(u64::MAX, 2));

        r.write(0x8010, &[0xaa; 4]).unwrap();
        r.zero(0x8011, 2).unwrap();

        let mut b = [0u8; 4];
        r.read(0x8010, &mut b).unwrap();
        assert_eq!(b, [0xaa, 0, 0, 0xaa]);

        let e = r.write(0x803e, &[0; 4]).unwrap_err();
        assert!(matches!(e, Error::InvalidInput(_)));
    }
}
