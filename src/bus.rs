use std::{fmt, io::Read, path::Path};

use derivative::Derivative;
use serde::{Deserialize, Serialize};

use crate::{
    cartridge::{read_image, read_image_file, Cartridge, LoadError, ROM_BANK_SIZE, ROM_WINDOW_SIZE},
    config::PowerOn,
    cpu::MemoryBus,
    timer::Timer,
    utils::hexdump,
    video::VideoUnit,
};

pub const MEMORY_SIZE: usize = 0x10000;
pub const ECHO_OFFSET: u16 = 0x2000;
/// Value read from ROM window bytes a bank does not cover.
pub const UNMAPPED_ROM: u8 = 0xFF;

/// Interrupt sources, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    VBlank = 0,
    Stat = 1,
    Timer = 2,
    Serial = 3,
    Joypad = 4,
}

impl Interrupt {
    pub fn mask(self) -> u8 {
        1 << self as u8
    }

    pub fn vector(self) -> u16 {
        0x0040 + 8 * self as u16
    }
}

/// Owner of an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Region {
    Rom,
    VideoRam,
    CartridgeRam,
    WorkRam,
    EchoRam,
    Oam,
    Unusable,
    Joypad,
    Timer,
    InterruptFlag,
    Video,
    Dma,
    Io,
    HighRam,
    InterruptEnable,
}

const fn page_region(page: usize) -> Option<Region> {
    match page {
        0x00..=0x7F => Some(Region::Rom),
        0x80..=0x9F => Some(Region::VideoRam),
        0xA0..=0xBF => Some(Region::CartridgeRam),
        0xC0..=0xDF => Some(Region::WorkRam),
        0xE0..=0xFD => Some(Region::EchoRam),
        _ => None,
    }
}

const fn high_region(address: u16) -> Region {
    match address {
        0xFE00..=0xFE9F => Region::Oam,
        0xFEA0..=0xFEFF => Region::Unusable,
        0xFF00 => Region::Joypad,
        0xFF04..=0xFF07 => Region::Timer,
        0xFF0F => Region::InterruptFlag,
        0xFF46 => Region::Dma,
        0xFF40..=0xFF4B => Region::Video,
        0xFF80..=0xFFFE => Region::HighRam,
        0xFFFF => Region::InterruptEnable,
        _ => Region::Io,
    }
}

const fn build_page_table() -> [Option<Region>; 256] {
    let mut table = [None; 256];
    let mut page = 0;
    while page < 256 {
        table[page] = page_region(page);
        page += 1;
    }
    table
}

const fn build_high_table() -> [Region; 512] {
    let mut table = [Region::Io; 512];
    let mut i = 0;
    while i < 512 {
        table[i] = high_region(0xFE00 + i as u16);
        i += 1;
    }
    table
}

/// Owner by high byte; `None` for the two pages resolved per address.
static PAGES: [Option<Region>; 256] = build_page_table();
/// Owners of 0xFE00-0xFFFF.
static HIGH: [Region; 512] = build_high_table();

pub fn region(address: u16) -> Region {
    match PAGES[(address >> 8) as usize] {
        Some(region) => region,
        None => HIGH[(address - 0xFE00) as usize],
    }
}

/// A contiguous range of addresses owned by one region.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct MemorySegment {
    pub start: u16,
    pub end: u16,
    pub region: Region,
}

impl fmt::Display for MemorySegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "0x{:04X} - 0x{:04X} - {:?}",
            self.start, self.end, self.region
        )
    }
}

/// The 64 KB address space and everything mapped into it.
///
/// Work RAM, high RAM, the unusable block at 0xFEA0 and every I/O register
/// without an owner are plain storage: reads return the last value written.
/// Writes to the ROM window never change it; they go to the cartridge's bank
/// controller, if any.
#[derive(Clone, PartialEq, Derivative)]
#[derivative(Debug)]
pub struct AddressSpace {
    #[derivative(Debug = "ignore")]
    memory: Box<[u8]>,
    pub video: VideoUnit,
    pub timer: Timer,
    cartridge: Option<Cartridge>,
    interrupt_flags: u8,
    interrupt_enable: u8,
    joypad_select: u8,
    power_on: PowerOn,
}

impl AddressSpace {
    pub fn new(power_on: PowerOn) -> Self {
        let mut space = Self {
            memory: vec![0; MEMORY_SIZE].into_boxed_slice(),
            video: VideoUnit::new(power_on),
            timer: Timer::new(),
            cartridge: None,
            interrupt_flags: 0,
            interrupt_enable: 0,
            joypad_select: 0,
            power_on,
        };
        space.reset();
        space
    }

    /// Restores the power-on pattern and maps the inserted cartridge again.
    pub fn reset(&mut self) {
        self.memory.fill(0);
        self.video.reset(self.power_on);
        self.timer.reset();
        self.interrupt_flags = match self.power_on {
            PowerOn::Zeroed => 0,
            PowerOn::PostBoot => Interrupt::VBlank.mask(),
        };
        self.interrupt_enable = 0;
        self.joypad_select = 0;

        if let Some(cartridge) = self.cartridge.as_mut() {
            cartridge.reset();
        }
        self.map_rom_window();
    }

    pub fn power_on(&self) -> PowerOn {
        self.power_on
    }

    pub fn set_power_on(&mut self, power_on: PowerOn) {
        self.power_on = power_on;
    }

    /// Inserts a cartridge. The first 32 KB of the image (or all of it, when
    /// shorter) is copied into the ROM window; the rest of the window keeps
    /// its contents. An empty image is rejected and nothing changes.
    pub fn load_image(&mut self, image: &[u8]) -> Result<(), LoadError> {
        let cartridge = Cartridge::new(image)?;

        match &cartridge.header {
            Some(header) => tracing::info!(
                "[BUS] Loaded {} bytes, {:?}: {}",
                image.len(),
                cartridge.mbc,
                header
            ),
            None => tracing::info!("[BUS] Loaded {} bytes, no header", image.len()),
        }

        self.cartridge = Some(cartridge);
        self.map_rom_window();
        Ok(())
    }

    pub fn load_image_from(&mut self, reader: impl Read) -> Result<(), LoadError> {
        let image = read_image(reader)?;
        self.load_image(&image)
    }

    pub fn load_image_file(&mut self, path: impl AsRef<Path>) -> Result<(), LoadError> {
        let image = read_image_file(path)?;
        self.load_image(&image)
    }

    pub fn cartridge(&self) -> Option<&Cartridge> {
        self.cartridge.as_ref()
    }

    fn map_rom_window(&mut self) {
        if let Some(cartridge) = self.cartridge.as_ref() {
            let rom = cartridge.rom();
            let len = rom.len().min(ROM_WINDOW_SIZE);
            self.memory[..len].copy_from_slice(&rom[..len]);
        }
    }

    /// Copies the currently selected banks into the ROM window. The part of
    /// a slot past the end of a short final bank reads as 0xFF.
    fn map_banks(&mut self) {
        if let Some(cartridge) = self.cartridge.as_ref() {
            let lower = cartridge.bank(cartridge.lower_bank());
            let slot = &mut self.memory[..ROM_BANK_SIZE];
            slot[..lower.len()].copy_from_slice(lower);
            slot[lower.len()..].fill(UNMAPPED_ROM);

            let upper = cartridge.bank(cartridge.upper_bank());
            let slot = &mut self.memory[ROM_BANK_SIZE..ROM_WINDOW_SIZE];
            slot[..upper.len()].copy_from_slice(upper);
            slot[upper.len()..].fill(UNMAPPED_ROM);
        }
    }

    /// Raw contents of the 64 KB store.
    pub fn store(&self) -> &[u8] {
        &self.memory
    }

    pub fn read_byte(&self, address: u16) -> u8 {
        let index = address as usize;
        match region(address) {
            Region::Rom | Region::WorkRam | Region::Unusable | Region::Io | Region::HighRam => {
                self.memory[index]
            }
            Region::VideoRam => self.video.read_vram(address),
            Region::CartridgeRam => self
                .cartridge
                .as_ref()
                .and_then(|cartridge| cartridge.read_ram(address))
                .unwrap_or(self.memory[index]),
            Region::EchoRam => self.memory[(address - ECHO_OFFSET) as usize],
            Region::Oam => self.video.read_oam(address - 0xFE00),
            Region::Joypad => 0xC0 | self.joypad_select | 0x0F,
            Region::Timer => self.timer.read(address),
            Region::InterruptFlag => 0xE0 | self.requested_interrupts(),
            Region::Video => self.video.read_register(address),
            Region::Dma => self.memory[index],
            Region::InterruptEnable => self.interrupt_enable,
        }
    }

    pub fn write_byte(&mut self, address: u16, value: u8) {
        let index = address as usize;
        match region(address) {
            Region::Rom => self.write_rom(address, value),
            Region::WorkRam | Region::Unusable | Region::Io | Region::HighRam => {
                self.memory[index] = value
            }
            Region::VideoRam => self.video.write_vram(address, value),
            Region::CartridgeRam => {
                let handled = self
                    .cartridge
                    .as_mut()
                    .map(|cartridge| cartridge.write_ram(address, value))
                    .unwrap_or(false);
                if !handled {
                    self.memory[index] = value;
                }
            }
            Region::EchoRam => self.memory[(address - ECHO_OFFSET) as usize] = value,
            Region::Oam => self.video.write_oam(address - 0xFE00, value),
            Region::Joypad => self.joypad_select = value & 0x30,
            Region::Timer => self.timer.write(address, value),
            Region::InterruptFlag => {
                self.video.interrupt = 0;
                self.timer.interrupt = 0;
                self.interrupt_flags = value & 0x1F;
            }
            Region::Video => self.video.write_register(address, value),
            Region::Dma => {
                self.memory[index] = value;
                self.oam_dma(value);
            }
            Region::InterruptEnable => self.interrupt_enable = value,
        }
    }

    fn write_rom(&mut self, address: u16, value: u8) {
        let remapped = match self.cartridge.as_mut() {
            Some(cartridge) => cartridge.write_control(address, value),
            None => {
                tracing::trace!("[BUS] Ignored write to ROM {:04X} = {:02X}", address, value);
                false
            }
        };
        if remapped {
            self.map_banks();
        }
    }

    /// Copies 160 bytes from `page << 8` into OAM in one go.
    fn oam_dma(&mut self, page: u8) {
        let source = (page as u16) << 8;
        tracing::trace!("[BUS] OAM DMA from {:04X}", source);
        for offset in 0..0xA0u16 {
            let value = self.read_byte(source.wrapping_add(offset));
            self.video.write_oam(offset, value);
        }
    }

    fn requested_interrupts(&self) -> u8 {
        (self.interrupt_flags | self.video.interrupt | self.timer.interrupt) & 0x1F
    }

    pub fn request_interrupt(&mut self, interrupt: Interrupt) {
        self.interrupt_flags |= interrupt.mask();
    }

    /// Runs video and timer for `cycles` and latches their interrupt requests.
    pub fn advance(&mut self, cycles: u32) {
        self.video.advance(cycles);
        self.timer.clock(cycles);

        self.interrupt_flags = self.requested_interrupts();
        self.video.interrupt = 0;
        self.timer.interrupt = 0;
    }

    pub fn memory_map(&self) -> Vec<MemorySegment> {
        let mut segments: Vec<MemorySegment> = Vec::new();
        for address in 0..=0xFFFFu16 {
            let region = region(address);
            match segments.last_mut() {
                Some(segment) if segment.region == region => segment.end = address,
                _ => segments.push(MemorySegment {
                    start: address,
                    end: address,
                    region,
                }),
            }
        }
        segments
    }

    /// Hexdump of `start..=end` as the CPU sees it.
    pub fn dump(&self, start: u16, end: u16) -> String {
        let bytes: Vec<u8> = (0..=0xFFFFu16).map(|a| self.read_byte(a)).collect();
        hexdump(&bytes, start, end)
    }
}

impl MemoryBus for AddressSpace {
    fn read_byte(&self, address: u16) -> u8 {
        self.read_byte(address)
    }

    fn write_byte(&mut self, address: u16, value: u8) {
        self.write_byte(address, value);
    }

    fn pending_interrupts(&self) -> u8 {
        self.interrupt_enable & self.requested_interrupts()
    }

    fn acknowledge_interrupt(&mut self, mask: u8) {
        self.interrupt_flags = self.requested_interrupts() & !mask;
        self.video.interrupt = 0;
        self.timer.interrupt = 0;
    }
}
