use serde::{Deserialize, Serialize};

pub const SCREEN_WIDTH: usize = 160;
pub const SCREEN_HEIGHT: usize = 144;
pub const MAX_SPRITES_PER_LINE: usize = 10;

// LCDC bits
pub const LCD_ENABLE: u8 = 0x80;
pub const WINDOW_MAP: u8 = 0x40;
pub const WINDOW_ENABLE: u8 = 0x20;
pub const TILE_DATA: u8 = 0x10;
pub const BG_MAP: u8 = 0x08;
pub const SPRITE_SIZE: u8 = 0x04;
pub const SPRITE_ENABLE: u8 = 0x02;
pub const BG_ENABLE: u8 = 0x01;

// OAM attribute bits
const BEHIND_BG: u8 = 0x80;
const Y_FLIP: u8 = 0x40;
const X_FLIP: u8 = 0x20;
const PALETTE_1: u8 = 0x10;

/// The LCD registers a scanline depends on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LcdRegisters {
    pub lcdc: u8,
    pub scy: u8,
    pub scx: u8,
    pub wy: u8,
    pub wx: u8,
    pub bgp: u8,
    pub obp0: u8,
    pub obp1: u8,
}

impl LcdRegisters {
    pub fn enabled(&self, bit: u8) -> bool {
        self.lcdc & bit != 0
    }

    pub fn sprite_height(&self) -> i16 {
        if self.enabled(SPRITE_SIZE) {
            16
        } else {
            8
        }
    }
}

/// Maps a 2-bit colour index through a palette register to a shade.
pub fn shade(palette: u8, index: u8) -> u8 {
    (palette >> (index * 2)) & 0x03
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Sprite {
    index: u8,
    x: i16,
    y: i16,
    tile: u8,
    attributes: u8,
}

pub struct Renderer<'a> {
    vram: &'a [u8],
    oam: &'a [u8],
    regs: &'a LcdRegisters,
}

impl<'a> Renderer<'a> {
    pub fn new(vram: &'a [u8], oam: &'a [u8], regs: &'a LcdRegisters) -> Self {
        Self { vram, oam, regs }
    }

    /// Renders one line of shades into `row`.
    ///
    /// `window_line` is the window's own line counter, which only advances on
    /// lines where the window was actually drawn. Returns whether it was.
    pub fn render_line(&self, line: u8, window_line: u8, row: &mut [u8]) -> bool {
        let mut bg_index = [0u8; SCREEN_WIDTH];

        let window_drawn = if self.regs.enabled(BG_ENABLE) {
            self.render_background(line, &mut bg_index);
            self.render_window(line, window_line, &mut bg_index)
        } else {
            false
        };

        for (pixel, &index) in row.iter_mut().zip(bg_index.iter()) {
            *pixel = if self.regs.enabled(BG_ENABLE) {
                shade(self.regs.bgp, index)
            } else {
                0
            };
        }

        if self.regs.enabled(SPRITE_ENABLE) {
            self.render_sprites(line, &bg_index, row);
        }

        window_drawn
    }

    fn render_background(&self, line: u8, bg_index: &mut [u8; SCREEN_WIDTH]) {
        let map = if self.regs.enabled(BG_MAP) { 0x1C00 } else { 0x1800 };
        let y = line.wrapping_add(self.regs.scy);

        for (screen_x, index) in bg_index.iter_mut().enumerate() {
            let x = (screen_x as u8).wrapping_add(self.regs.scx);
            *index = self.map_pixel(map, x, y);
        }
    }

    fn render_window(&self, line: u8, window_line: u8, bg_index: &mut [u8; SCREEN_WIDTH]) -> bool {
        if !self.regs.enabled(WINDOW_ENABLE) || line < self.regs.wy || self.regs.wx > 166 {
            return false;
        }

        let map = if self.regs.enabled(WINDOW_MAP) { 0x1C00 } else { 0x1800 };
        let left = self.regs.wx as i16 - 7;

        for (screen_x, index) in bg_index.iter_mut().enumerate() {
            let x = screen_x as i16 - left;
            if x >= 0 {
                *index = self.map_pixel(map, x as u8, window_line);
            }
        }

        true
    }

    /// Colour index of pixel (x, y) of the 256x256 plane described by a tile map.
    fn map_pixel(&self, map: usize, x: u8, y: u8) -> u8 {
        let entry = map + (y as usize / 8) * 32 + x as usize / 8;
        let tile = self.vram[entry];
        let address = self.tile_address(tile) + (y as usize % 8) * 2;
        tile_pixel(self.vram[address], self.vram[address + 1], x % 8)
    }

    fn tile_address(&self, tile: u8) -> usize {
        if self.regs.enabled(TILE_DATA) {
            tile as usize * 16
        } else {
            (0x1000 + tile as i8 as i32 * 16) as usize
        }
    }

    /// Up to ten sprites covering `line`, in drawing priority order.
    fn sprites_on_line(&self, line: u8) -> Vec<Sprite> {
        let height = self.regs.sprite_height();
        let line = line as i16;

        let mut sprites: Vec<Sprite> = self
            .oam
            .chunks_exact(4)
            .take(40)
            .enumerate()
            .map(|(index, entry)| Sprite {
                index: index as u8,
                y: entry[0] as i16 - 16,
                x: entry[1] as i16 - 8,
                tile: entry[2],
                attributes: entry[3],
            })
            .filter(|sprite| line >= sprite.y && line < sprite.y + height)
            .take(MAX_SPRITES_PER_LINE)
            .collect();

        sprites.sort_by_key(|sprite| (sprite.x, sprite.index));
        sprites
    }

    fn render_sprites(&self, line: u8, bg_index: &[u8; SCREEN_WIDTH], row: &mut [u8]) {
        let height = self.regs.sprite_height();
        let mut claimed = [false; SCREEN_WIDTH];

        for sprite in self.sprites_on_line(line) {
            let mut tile_row = line as i16 - sprite.y;
            if sprite.attributes & Y_FLIP != 0 {
                tile_row = height - 1 - tile_row;
            }

            let tile = if height == 16 {
                sprite.tile & 0xFE
            } else {
                sprite.tile
            };
            let address = tile as usize * 16 + tile_row as usize * 2;
            let (lo, hi) = (self.vram[address], self.vram[address + 1]);

            let palette = if sprite.attributes & PALETTE_1 != 0 {
                self.regs.obp1
            } else {
                self.regs.obp0
            };

            for px in 0..8u8 {
                let x = sprite.x + px as i16;
                if !(0..SCREEN_WIDTH as i16).contains(&x) {
                    continue;
                }
                let x = x as usize;
                if claimed[x] {
                    continue;
                }

                let column = if sprite.attributes & X_FLIP != 0 { 7 - px } else { px };
                let index = tile_pixel(lo, hi, column);
                if index == 0 {
                    continue;
                }

                // The highest priority opaque sprite pixel owns the dot even
                // when it loses to the background.
                claimed[x] = true;
                if sprite.attributes & BEHIND_BG != 0 && bg_index[x] != 0 {
                    continue;
                }
                row[x] = shade(palette, index);
            }
        }
    }
}

fn tile_pixel(lo: u8, hi: u8, column: u8) -> u8 {
    let bit = 7 - column;
    ((lo >> bit) & 1) | (((hi >> bit) & 1) << 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vram() -> Vec<u8> {
        vec![0; 0x2000]
    }

    fn regs() -> LcdRegisters {
        LcdRegisters {
            lcdc: LCD_ENABLE | TILE_DATA | BG_ENABLE,
            bgp: 0xE4,
            obp0: 0xE4,
            obp1: 0x1B,
            ..Default::default()
        }
    }

    fn render(vram: &[u8], oam: &[u8], regs: &LcdRegisters, line: u8) -> Vec<u8> {
        let mut row = vec![0xAA; SCREEN_WIDTH];
        Renderer::new(vram, oam, regs).render_line(line, 0, &mut row);
        row
    }

    fn set_tile_row(vram: &mut [u8], tile: usize, row: usize, lo: u8, hi: u8) {
        vram[tile * 16 + row * 2] = lo;
        vram[tile * 16 + row * 2 + 1] = hi;
    }

    #[test]
    fn test_background_through_palette() {
        let mut vram = vram();
        for row in 0..8 {
            set_tile_row(&mut vram, 0, row, 0xFF, 0x00);
        }
        let oam = [0u8; 0xA0];

        let row = render(&vram, &oam, &regs(), 0);
        assert!(row.iter().all(|&p| p == 1));

        let mut regs = regs();
        regs.bgp = 0b0000_1100;
        let row = render(&vram, &oam, &regs, 0);
        assert!(row.iter().all(|&p| p == 3));
    }

    #[test]
    fn test_background_disabled_is_blank() {
        let mut vram = vram();
        set_tile_row(&mut vram, 0, 0, 0xFF, 0xFF);
        let mut regs = regs();
        regs.lcdc &= !BG_ENABLE;

        let row = render(&vram, &[0u8; 0xA0], &regs, 0);
        assert!(row.iter().all(|&p| p == 0));
    }

    #[test]
    fn test_scroll() {
        let mut vram = vram();
        // Tile 1 is solid colour 3, placed at map column 1, map row 1.
        for row in 0..8 {
            set_tile_row(&mut vram, 1, row, 0xFF, 0xFF);
        }
        vram[0x1800 + 32 + 1] = 1;
        let oam = [0u8; 0xA0];

        let mut regs = regs();
        regs.scy = 8;
        let row = render(&vram, &oam, &regs, 0);
        assert_eq!(&row[0..8], &[0; 8]);
        assert_eq!(&row[8..16], &[3; 8]);
        assert_eq!(row[16], 0);

        regs.scx = 4;
        let row = render(&vram, &oam, &regs, 0);
        assert_eq!(row[3], 0);
        assert_eq!(&row[4..12], &[3; 8]);
        assert_eq!(row[12], 0);
    }

    #[test]
    fn test_signed_tile_data() {
        let mut vram = vram();
        // Tile number 0x80 in signed mode lives at 0x0800.
        vram[0x0800] = 0xFF;
        vram[0x1800] = 0x80;
        let mut regs = regs();
        regs.lcdc &= !TILE_DATA;

        let row = render(&vram, &[0u8; 0xA0], &regs, 0);
        assert_eq!(&row[0..8], &[1; 8]);
        assert_eq!(row[8], 0);
    }

    #[test]
    fn test_window() {
        let mut vram = vram();
        for row in 0..8 {
            set_tile_row(&mut vram, 2, row, 0x00, 0xFF);
        }
        for entry in 0..32 * 32 {
            vram[0x1C00 + entry] = 2;
        }
        let oam = [0u8; 0xA0];

        let mut regs = regs();
        regs.lcdc |= WINDOW_ENABLE | WINDOW_MAP;
        regs.wy = 10;
        regs.wx = 87;

        let mut row = vec![0; SCREEN_WIDTH];
        let renderer = Renderer::new(&vram, &oam, &regs);
        assert!(!renderer.render_line(9, 0, &mut row));
        assert!(row.iter().all(|&p| p == 0));

        assert!(renderer.render_line(10, 0, &mut row));
        assert!(row[..80].iter().all(|&p| p == 0));
        assert!(row[80..].iter().all(|&p| p == 2));
    }

    #[test]
    fn test_sprite_over_background_and_behind() {
        let mut vram = vram();
        set_tile_row(&mut vram, 0, 0, 0x0F, 0x00);
        set_tile_row(&mut vram, 1, 0, 0xFF, 0xFF);
        let mut oam = [0u8; 0xA0];
        oam[0..4].copy_from_slice(&[16, 8, 1, 0]);

        let mut regs = regs();
        regs.lcdc |= SPRITE_ENABLE;

        let row = render(&vram, &oam, &regs, 0);
        assert_eq!(&row[0..8], &[3; 8]);

        oam[3] = BEHIND_BG;
        let row = render(&vram, &oam, &regs, 0);
        assert_eq!(&row[0..4], &[3; 4]);
        assert_eq!(&row[4..8], &[1; 4]);

        oam[3] = PALETTE_1;
        let row = render(&vram, &oam, &regs, 0);
        assert_eq!(&row[0..8], &[0; 8]);
    }

    #[test]
    fn test_sprite_flips_and_tall_sprites() {
        let mut vram = vram();
        set_tile_row(&mut vram, 4, 0, 0x80, 0x00);
        set_tile_row(&mut vram, 5, 7, 0x01, 0x01);
        let mut oam = [0u8; 0xA0];
        oam[0..4].copy_from_slice(&[16, 8, 4, X_FLIP]);

        let mut regs = regs();
        regs.lcdc |= SPRITE_ENABLE;

        let row = render(&vram, &oam, &regs, 0);
        assert_eq!(&row[0..8], &[0, 0, 0, 0, 0, 0, 0, 1]);

        regs.lcdc |= SPRITE_SIZE;
        oam[2] = 5;
        oam[3] = 0;
        let row = render(&vram, &oam, &regs, 15);
        assert_eq!(&row[0..8], &[0, 0, 0, 0, 0, 0, 0, 3]);

        oam[3] = Y_FLIP | X_FLIP;
        let row = render(&vram, &oam, &regs, 0);
        assert_eq!(&row[0..8], &[3, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_ten_sprites_per_line() {
        let mut vram = vram();
        set_tile_row(&mut vram, 1, 0, 0xFF, 0x00);
        let mut oam = [0u8; 0xA0];
        for i in 0..11 {
            oam[i * 4..i * 4 + 4].copy_from_slice(&[16, 8 + i as u8 * 8, 1, 0]);
        }
        let mut regs = regs();
        regs.lcdc |= SPRITE_ENABLE;

        let row = render(&vram, &oam, &regs, 0);
        assert!(row[..80].iter().all(|&p| p == 1));
        assert!(row[80..88].iter().all(|&p| p == 0));
    }

    #[test]
    fn test_sprite_priority() {
        let mut vram = vram();
        set_tile_row(&mut vram, 1, 0, 0xFF, 0x00);
        set_tile_row(&mut vram, 2, 0, 0x00, 0xFF);
        let mut oam = [0u8; 0xA0];
        // Lower X wins even with a higher OAM index.
        oam[0..4].copy_from_slice(&[16, 12, 2, 0]);
        oam[4..8].copy_from_slice(&[16, 10, 1, 0]);
        let mut regs = regs();
        regs.lcdc |= SPRITE_ENABLE;

        let row = render(&vram, &oam, &regs, 0);
        assert_eq!(&row[2..10], &[1; 8]);
        assert_eq!(&row[10..12], &[2; 2]);

        // Same X: lower OAM index wins.
        oam[4..8].copy_from_slice(&[16, 12, 1, 0]);
        let row = render(&vram, &oam, &regs, 0);
        assert_eq!(&row[4..12], &[2; 8]);
    }
}
