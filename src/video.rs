use derivative::Derivative;

use crate::{
    bus::Interrupt,
    clock::{Clock, ClockEvent, Mode},
    config::PowerOn,
    renderer::{LcdRegisters, Renderer, LCD_ENABLE, SCREEN_HEIGHT, SCREEN_WIDTH},
};

pub const VRAM_SIZE: usize = 0x2000;
pub const OAM_SIZE: usize = 0xA0;

pub const LCDC: u16 = 0xFF40;
pub const STAT: u16 = 0xFF41;
pub const SCY: u16 = 0xFF42;
pub const SCX: u16 = 0xFF43;
pub const LY: u16 = 0xFF44;
pub const LYC: u16 = 0xFF45;
pub const BGP: u16 = 0xFF47;
pub const OBP0: u16 = 0xFF48;
pub const OBP1: u16 = 0xFF49;
pub const WY: u16 = 0xFF4A;
pub const WX: u16 = 0xFF4B;

// STAT interrupt sources
const STAT_HBLANK: u8 = 0x08;
const STAT_VBLANK: u8 = 0x10;
const STAT_OAM: u8 = 0x20;
const STAT_LYC: u8 = 0x40;

/// 160x144 picture, one byte per pixel.
///
/// Each byte is a shade from 0 (lightest) to 3 (darkest), already mapped
/// through the palette registers. Rows are stored top to bottom.
#[derive(Clone, PartialEq, Eq, Derivative)]
#[derivative(Debug)]
pub struct FrameBuffer {
    #[derivative(Debug = "ignore")]
    pixels: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self {
            pixels: vec![0; SCREEN_WIDTH * SCREEN_HEIGHT],
        }
    }

    pub fn width(&self) -> usize {
        SCREEN_WIDTH
    }

    pub fn height(&self) -> usize {
        SCREEN_HEIGHT
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixel(&self, x: usize, y: usize) -> u8 {
        self.pixels[y * SCREEN_WIDTH + x]
    }

    pub fn row(&self, y: usize) -> &[u8] {
        &self.pixels[y * SCREEN_WIDTH..(y + 1) * SCREEN_WIDTH]
    }

    fn row_mut(&mut self, y: usize) -> &mut [u8] {
        &mut self.pixels[y * SCREEN_WIDTH..(y + 1) * SCREEN_WIDTH]
    }

    pub fn clear(&mut self) {
        self.pixels.fill(0);
    }

    /// Expands shades to RGBA bytes using the given colours (0xRRGGBBAA).
    pub fn to_rgba(&self, shades: &[u32; 4]) -> Vec<u8> {
        self.pixels
            .iter()
            .flat_map(|&shade| shades[(shade & 0x03) as usize].to_be_bytes())
            .collect()
    }

    /// Binary PGM (P5) image, white for shade 0.
    pub fn to_pgm(&self) -> Vec<u8> {
        let mut pgm = format!("P5\n{} {}\n3\n", SCREEN_WIDTH, SCREEN_HEIGHT).into_bytes();
        pgm.extend(self.pixels.iter().map(|&shade| 3 - (shade & 0x03)));
        pgm
    }

    pub fn as_ascii(&self) -> String {
        const CHARS: [char; 4] = [' ', '.', '+', '#'];
        let mut text = String::with_capacity((SCREEN_WIDTH + 1) * SCREEN_HEIGHT);
        for row in self.pixels.chunks_exact(SCREEN_WIDTH) {
            text.extend(row.iter().map(|&shade| CHARS[(shade & 0x03) as usize]));
            text.push('\n');
        }
        text
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// LCD controller: VRAM, OAM, the 0xFF40-0xFF4B registers and the picture.
///
/// Lines are drawn into a back buffer as they enter HBlank. On entering
/// VBlank the back buffer is copied to the front buffer, which is what
/// `take_frame` hands out.
#[derive(Clone, PartialEq, Derivative)]
#[derivative(Debug)]
pub struct VideoUnit {
    #[derivative(Debug = "ignore")]
    vram: Vec<u8>,
    #[derivative(Debug = "ignore")]
    oam: Vec<u8>,

    regs: LcdRegisters,
    stat: u8,
    ly: u8,
    lyc: u8,
    mode: Mode,
    window_line: u8,

    clock: Clock,
    stat_line: bool,

    #[derivative(Debug = "ignore")]
    back: FrameBuffer,
    #[derivative(Debug = "ignore")]
    front: FrameBuffer,
    frame_ready: bool,
    frames: u64,
    lines_rendered: u64,

    /// Interrupt requests not yet collected by the address space.
    pub interrupt: u8,
}

impl VideoUnit {
    pub fn new(power_on: PowerOn) -> Self {
        let mut video = Self {
            vram: vec![0; VRAM_SIZE],
            oam: vec![0; OAM_SIZE],
            regs: LcdRegisters::default(),
            stat: 0,
            ly: 0,
            lyc: 0,
            mode: Mode::HBlank,
            window_line: 0,
            clock: Clock::new(),
            stat_line: false,
            back: FrameBuffer::new(),
            front: FrameBuffer::new(),
            frame_ready: false,
            frames: 0,
            lines_rendered: 0,
            interrupt: 0,
        };
        video.reset(power_on);
        video
    }

    /// Back to the power-on pattern, reusing the existing buffers.
    pub fn reset(&mut self, power_on: PowerOn) {
        self.vram.fill(0);
        self.oam.fill(0);
        self.back.clear();
        self.front.clear();

        self.regs = match power_on {
            PowerOn::Zeroed => LcdRegisters::default(),
            PowerOn::PostBoot => LcdRegisters {
                lcdc: 0x91,
                bgp: 0xFC,
                obp0: 0xFF,
                obp1: 0xFF,
                ..Default::default()
            },
        };
        self.stat = 0;
        self.ly = 0;
        self.lyc = 0;
        self.window_line = 0;
        self.clock.reset();
        self.mode = if self.lcd_enabled() {
            self.clock.mode()
        } else {
            Mode::HBlank
        };
        self.stat_line = false;
        self.frame_ready = false;
        self.frames = 0;
        self.lines_rendered = 0;
        self.interrupt = 0;
    }

    pub fn lcd_enabled(&self) -> bool {
        self.regs.enabled(LCD_ENABLE)
    }

    pub fn registers(&self) -> &LcdRegisters {
        &self.regs
    }

    pub fn ly(&self) -> u8 {
        self.ly
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn vram(&self) -> &[u8] {
        &self.vram
    }

    pub fn oam(&self) -> &[u8] {
        &self.oam
    }

    pub fn read_vram(&self, address: u16) -> u8 {
        self.vram[address as usize & (VRAM_SIZE - 1)]
    }

    pub fn write_vram(&mut self, address: u16, value: u8) {
        self.vram[address as usize & (VRAM_SIZE - 1)] = value;
    }

    pub fn read_oam(&self, address: u16) -> u8 {
        self.oam
            .get((address & 0xFF) as usize)
            .copied()
            .unwrap_or(0xFF)
    }

    pub fn write_oam(&mut self, address: u16, value: u8) {
        if let Some(cell) = self.oam.get_mut((address & 0xFF) as usize) {
            *cell = value;
        }
    }

    pub fn read_register(&self, address: u16) -> u8 {
        match address {
            LCDC => self.regs.lcdc,
            STAT => {
                let coincidence = if self.ly == self.lyc { 0x04 } else { 0 };
                0x80 | self.stat | coincidence | self.mode as u8
            }
            SCY => self.regs.scy,
            SCX => self.regs.scx,
            LY => self.ly,
            LYC => self.lyc,
            BGP => self.regs.bgp,
            OBP0 => self.regs.obp0,
            OBP1 => self.regs.obp1,
            WY => self.regs.wy,
            WX => self.regs.wx,
            _ => {
                tracing::trace!("[VIDEO] Read from unknown register {:04X}", address);
                0xFF
            }
        }
    }

    pub fn write_register(&mut self, address: u16, value: u8) {
        match address {
            LCDC => self.write_lcdc(value),
            STAT => self.stat = value & 0x78,
            SCY => self.regs.scy = value,
            SCX => self.regs.scx = value,
            LY => tracing::trace!("[VIDEO] Ignoring write to LY: {:02X}", value),
            LYC => self.lyc = value,
            BGP => self.regs.bgp = value,
            OBP0 => self.regs.obp0 = value,
            OBP1 => self.regs.obp1 = value,
            WY => self.regs.wy = value,
            WX => self.regs.wx = value,
            _ => {
                tracing::trace!(
                    "[VIDEO] Write to unknown register {:04X} = {:02X}",
                    address,
                    value
                );
            }
        }
        self.update_stat_line();
    }

    fn write_lcdc(&mut self, value: u8) {
        let was_enabled = self.lcd_enabled();
        self.regs.lcdc = value;

        match (was_enabled, self.lcd_enabled()) {
            (true, false) => {
                tracing::debug!("[VIDEO] LCD off at line {}", self.ly);
                self.clock.reset();
                self.ly = 0;
                self.mode = Mode::HBlank;
                self.window_line = 0;
                self.back.clear();
            }
            (false, true) => {
                tracing::debug!("[VIDEO] LCD on");
                self.clock.reset();
                self.ly = 0;
                self.mode = self.clock.mode();
                self.window_line = 0;
            }
            _ => {}
        }
    }

    /// Runs the LCD for `cycles` dots. Does nothing while the LCD is off.
    pub fn advance(&mut self, cycles: u32) {
        if !self.lcd_enabled() {
            return;
        }

        for event in self.clock.tick(cycles) {
            match event {
                ClockEvent::LineStart(line) => self.ly = line,
                ClockEvent::OamScanStart(_) => self.mode = Mode::OamScan,
                ClockEvent::DrawStart(_) => self.mode = Mode::Drawing,
                ClockEvent::HBlankStart(line) => {
                    self.mode = Mode::HBlank;
                    self.render_line(line);
                }
                ClockEvent::VBlankStart => {
                    self.mode = Mode::VBlank;
                    self.interrupt |= Interrupt::VBlank.mask();
                    self.present();
                }
                ClockEvent::FrameEnd => self.window_line = 0,
            }
            self.update_stat_line();
        }
    }

    fn render_line(&mut self, line: u8) {
        let renderer = Renderer::new(&self.vram, &self.oam, &self.regs);
        let row = self.back.row_mut(line as usize);
        if renderer.render_line(line, self.window_line, row) {
            self.window_line = self.window_line.wrapping_add(1);
        }
        self.lines_rendered += 1;
    }

    fn present(&mut self) {
        self.front.clone_from(&self.back);
        self.frame_ready = true;
        self.frames += 1;
        tracing::trace!("[VIDEO] Frame {} ready", self.frames);
    }

    /// Raises the STAT interrupt on a rising edge of the combined source line.
    fn update_stat_line(&mut self) {
        let line = self.lcd_enabled()
            && ((self.stat & STAT_LYC != 0 && self.ly == self.lyc)
                || (self.stat & STAT_HBLANK != 0 && self.mode == Mode::HBlank)
                || (self.stat & STAT_VBLANK != 0 && self.mode == Mode::VBlank)
                || (self.stat & STAT_OAM != 0 && self.mode == Mode::OamScan));

        if line && !self.stat_line {
            self.interrupt |= Interrupt::Stat.mask();
        }
        self.stat_line = line;
    }

    pub fn frame_ready(&self) -> bool {
        self.frame_ready
    }

    /// Returns a copy of the last completed frame and clears the ready flag.
    pub fn take_frame(&mut self) -> FrameBuffer {
        self.frame_ready = false;
        self.front.clone()
    }

    /// Last completed frame.
    pub fn frame(&self) -> &FrameBuffer {
        &self.front
    }

    /// Frame in progress.
    pub fn back_buffer(&self) -> &FrameBuffer {
        &self.back
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn lines_rendered(&self) -> u64 {
        self.lines_rendered
    }

    pub fn timing_info(&self) -> crate::clock::TimingInfo {
        self.clock.timing_info()
    }
}
