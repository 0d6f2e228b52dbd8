use std::{
    fmt,
    fs::File,
    io::{self, Read},
    path::Path,
};

use derivative::Derivative;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ROM_BANK_SIZE: usize = 0x4000;
pub const ROM_WINDOW_SIZE: usize = 0x8000;
pub const RAM_BANK_SIZE: usize = 0x2000;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("ROM image is empty")]
    Empty,
    #[error("unable to read ROM image: {0}")]
    IoFailure(#[from] io::Error),
}

/// Reads a whole image from `reader`.
pub fn read_image(mut reader: impl Read) -> Result<Vec<u8>, LoadError> {
    let mut buffer = Vec::new();
    reader.read_to_end(&mut buffer)?;
    if buffer.is_empty() {
        return Err(LoadError::Empty);
    }
    Ok(buffer)
}

pub fn read_image_file(path: impl AsRef<Path>) -> Result<Vec<u8>, LoadError> {
    let file = File::open(path.as_ref())?;
    read_image(file)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mbc {
    RomOnly,
    Mbc1,
    Mbc5,
}

impl Mbc {
    pub fn from_cartridge_type(cartridge_type: u8) -> Self {
        match cartridge_type {
            0x00 | 0x08 | 0x09 => Mbc::RomOnly,
            0x01..=0x03 => Mbc::Mbc1,
            0x19..=0x1E => Mbc::Mbc5,
            _ => {
                tracing::warn!(
                    "[CART] Unsupported cartridge type {:#04X}, mapping as ROM only",
                    cartridge_type
                );
                Mbc::RomOnly
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartridgeHeader {
    pub title: String,
    pub cartridge_type: u8,
    pub rom_size_code: u8,
    pub ram_size_code: u8,
}

impl CartridgeHeader {
    /// Parses the header at 0x0134-0x014F, if the image is long enough to have one.
    pub fn parse(image: &[u8]) -> Option<Self> {
        if image.len() < 0x150 {
            return None;
        }

        let title = image[0x134..0x144]
            .iter()
            .take_while(|b| **b != 0)
            .map(|b| if b.is_ascii_graphic() || *b == b' ' { *b as char } else { '?' })
            .collect::<String>()
            .trim_end()
            .to_string();

        Some(Self {
            title,
            cartridge_type: image[0x147],
            rom_size_code: image[0x148],
            ram_size_code: image[0x149],
        })
    }

    pub fn ram_size(&self) -> usize {
        match self.ram_size_code {
            0x01 => 0x800,
            0x02 => 0x2000,
            0x03 => 0x8000,
            0x04 => 0x20000,
            0x05 => 0x10000,
            _ => 0,
        }
    }
}

impl fmt::Display for CartridgeHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "\"{}\" type={:#04X} rom={:#04X} ram={:#04X}",
            self.title, self.cartridge_type, self.rom_size_code, self.ram_size_code
        )
    }
}

/// The inserted ROM image plus the bank controller state that maps it.
#[derive(Derivative, Clone, PartialEq)]
#[derivative(Debug)]
pub struct Cartridge {
    #[derivative(Debug = "ignore")]
    rom: Vec<u8>,
    #[derivative(Debug = "ignore")]
    ram: Vec<u8>,
    pub header: Option<CartridgeHeader>,
    pub mbc: Mbc,
    ram_enabled: bool,
    bank_low: u16,
    bank_high: u8,
    banking_mode: bool,
}

impl Cartridge {
    pub fn new(image: &[u8]) -> Result<Self, LoadError> {
        if image.is_empty() {
            return Err(LoadError::Empty);
        }

        let header = CartridgeHeader::parse(image);
        let (mbc, ram_size) = match &header {
            Some(header) => (Mbc::from_cartridge_type(header.cartridge_type), header.ram_size()),
            None => (Mbc::RomOnly, 0),
        };

        let mut cartridge = Self {
            rom: image.to_vec(),
            ram: vec![0; ram_size],
            header,
            mbc,
            ram_enabled: false,
            bank_low: 1,
            bank_high: 0,
            banking_mode: false,
        };
        cartridge.reset();
        Ok(cartridge)
    }

    pub fn reset(&mut self) {
        self.ram_enabled = self.mbc == Mbc::RomOnly;
        self.bank_low = 1;
        self.bank_high = 0;
        self.banking_mode = false;
        self.ram.fill(0);
    }

    pub fn rom(&self) -> &[u8] {
        &self.rom
    }

    pub fn bank_count(&self) -> usize {
        self.rom.len().div_ceil(ROM_BANK_SIZE).max(1)
    }

    /// Bytes of `bank`; the last bank of an odd-sized image may be short.
    pub fn bank(&self, bank: usize) -> &[u8] {
        let start = (bank % self.bank_count()) * ROM_BANK_SIZE;
        let end = (start + ROM_BANK_SIZE).min(self.rom.len());
        &self.rom[start.min(end)..end]
    }

    /// Bank mapped at 0x0000-0x3FFF.
    pub fn lower_bank(&self) -> usize {
        match self.mbc {
            Mbc::Mbc1 if self.banking_mode => ((self.bank_high as usize) << 5) % self.bank_count(),
            _ => 0,
        }
    }

    /// Bank mapped at 0x4000-0x7FFF.
    pub fn upper_bank(&self) -> usize {
        let bank = match self.mbc {
            Mbc::RomOnly => 1,
            Mbc::Mbc1 => ((self.bank_high as usize) << 5) | self.bank_low as usize,
            Mbc::Mbc5 => self.bank_low as usize,
        };
        bank % self.bank_count()
    }

    fn ram_bank(&self) -> usize {
        match self.mbc {
            Mbc::Mbc1 if self.banking_mode => self.bank_high as usize,
            Mbc::Mbc5 => self.bank_high as usize,
            _ => 0,
        }
    }

    /// Handles a CPU write into the ROM window. The ROM itself never changes;
    /// returns true when the bank mapping did.
    pub fn write_control(&mut self, address: u16, value: u8) -> bool {
        let before = (self.lower_bank(), self.upper_bank());
        match (self.mbc, address) {
            (Mbc::RomOnly, _) => {
                tracing::trace!("[CART] Ignored write to ROM {:#06X} = {:#04X}", address, value);
                return false;
            }
            (_, 0x0000..=0x1FFF) => {
                self.ram_enabled = value & 0x0F == 0x0A;
            }
            (Mbc::Mbc1, 0x2000..=0x3FFF) => {
                self.bank_low = (value & 0x1F).max(1) as u16;
            }
            (Mbc::Mbc1, 0x4000..=0x5FFF) => {
                self.bank_high = value & 0x03;
            }
            (Mbc::Mbc1, 0x6000..=0x7FFF) => {
                self.banking_mode = value & 0x01 != 0;
            }
            (Mbc::Mbc5, 0x2000..=0x2FFF) => {
                self.bank_low = (self.bank_low & 0x100) | value as u16;
            }
            (Mbc::Mbc5, 0x3000..=0x3FFF) => {
                self.bank_low = (self.bank_low & 0xFF) | ((value as u16 & 0x01) << 8);
            }
            (Mbc::Mbc5, 0x4000..=0x5FFF) => {
                self.bank_high = value & 0x0F;
            }
            _ => {}
        }

        let after = (self.lower_bank(), self.upper_bank());
        if before != after {
            tracing::debug!(
                "[CART] Bank switch {:?}: lower {} -> {}, upper {} -> {}",
                self.mbc,
                before.0,
                after.0,
                before.1,
                after.1
            );
        }
        before != after
    }

    pub fn has_ram(&self) -> bool {
        !self.ram.is_empty()
    }

    fn ram_index(&self, address: u16) -> usize {
        (self.ram_bank() * RAM_BANK_SIZE + (address as usize - 0xA000)) % self.ram.len()
    }

    /// Reads cartridge RAM. `None` when the cartridge carries no RAM.
    pub fn read_ram(&self, address: u16) -> Option<u8> {
        if !self.has_ram() {
            return None;
        }
        if !self.ram_enabled {
            return Some(0xFF);
        }
        Some(self.ram[self.ram_index(address)])
    }

    /// Writes cartridge RAM. Returns false when the cartridge carries no RAM.
    pub fn write_ram(&mut self, address: u16, value: u8) -> bool {
        if !self.has_ram() {
            return false;
        }
        if self.ram_enabled {
            let index = self.ram_index(address);
            self.ram[index] = value;
        }
        true
    }
}
