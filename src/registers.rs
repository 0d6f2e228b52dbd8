use serde::{Deserialize, Serialize};

use crate::config::PowerOn;

/// Condition bits held in the upper nibble of F.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    Z = 0b1000_0000,
    N = 0b0100_0000,
    H = 0b0010_0000,
    C = 0b0001_0000,
}

/// The LR35902 register file.
///
/// Pairs (AF, BC, DE, HL) are views over the 8-bit registers. F is kept
/// private so that its low nibble stays zero whatever is written to it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registers {
    pub a: u8,
    f: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub h: u8,
    pub l: u8,
    pub sp: u16,
    pub pc: u16,
}

impl Registers {
    pub fn new(power_on: PowerOn) -> Self {
        match power_on {
            PowerOn::Zeroed => Self::default(),
            PowerOn::PostBoot => {
                let mut regs = Self {
                    a: 0x01,
                    f: 0,
                    b: 0x00,
                    c: 0x13,
                    d: 0x00,
                    e: 0xD8,
                    h: 0x01,
                    l: 0x4D,
                    sp: 0xFFFE,
                    pc: 0x0100,
                };
                regs.set_f(0xB0);
                regs
            }
        }
    }

    pub fn f(&self) -> u8 {
        self.f
    }

    pub fn set_f(&mut self, value: u8) {
        self.f = value & 0xF0;
    }

    pub fn flag(&self, flag: Flag) -> bool {
        self.f & flag as u8 != 0
    }

    pub fn set_flag(&mut self, flag: Flag, on: bool) {
        if on {
            self.f |= flag as u8;
        } else {
            self.f &= !(flag as u8);
        }
    }

    /// Overwrites all four flags at once.
    pub fn set_flags(&mut self, z: bool, n: bool, h: bool, c: bool) {
        self.f = (z as u8) << 7 | (n as u8) << 6 | (h as u8) << 5 | (c as u8) << 4;
    }

    pub fn af(&self) -> u16 {
        u16::from_be_bytes([self.a, self.f])
    }

    pub fn bc(&self) -> u16 {
        u16::from_be_bytes([self.b, self.c])
    }

    pub fn de(&self) -> u16 {
        u16::from_be_bytes([self.d, self.e])
    }

    pub fn hl(&self) -> u16 {
        u16::from_be_bytes([self.h, self.l])
    }

    pub fn set_af(&mut self, value: u16) {
        let [a, f] = value.to_be_bytes();
        self.a = a;
        self.set_f(f);
    }

    pub fn set_bc(&mut self, value: u16) {
        [self.b, self.c] = value.to_be_bytes();
    }

    pub fn set_de(&mut self, value: u16) {
        [self.d, self.e] = value.to_be_bytes();
    }

    pub fn set_hl(&mut self, value: u16) {
        [self.h, self.l] = value.to_be_bytes();
    }

    /// Returns HL, then increments it (the `(HL+)` addressing form).
    pub fn hl_inc(&mut self) -> u16 {
        let hl = self.hl();
        self.set_hl(hl.wrapping_add(1));
        hl
    }

    /// Returns HL, then decrements it (the `(HL-)` addressing form).
    pub fn hl_dec(&mut self) -> u16 {
        let hl = self.hl();
        self.set_hl(hl.wrapping_sub(1));
        hl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_low_nibble_is_masked() {
        let mut regs = Registers::default();
        regs.set_f(0xFF);
        assert_eq!(regs.f(), 0xF0);

        regs.set_af(0x12_3F);
        assert_eq!(regs.a, 0x12);
        assert_eq!(regs.f(), 0x30);
        assert_eq!(regs.af(), 0x1230);
    }

    #[test]
    fn test_pairs_are_views() {
        let mut regs = Registers::default();
        regs.set_bc(0xBEEF);
        assert_eq!((regs.b, regs.c), (0xBE, 0xEF));

        regs.d = 0x12;
        regs.e = 0x34;
        assert_eq!(regs.de(), 0x1234);

        regs.set_hl(0xFFFF);
        assert_eq!(regs.hl_inc(), 0xFFFF);
        assert_eq!(regs.hl(), 0x0000);
        assert_eq!(regs.hl_dec(), 0x0000);
        assert_eq!(regs.hl(), 0xFFFF);
    }

    #[test]
    fn test_individual_flags() {
        let mut regs = Registers::default();
        regs.set_flag(Flag::H, true);
        regs.set_flag(Flag::C, true);
        assert_eq!(regs.f(), 0x30);
        assert!(regs.flag(Flag::H));
        assert!(!regs.flag(Flag::Z));

        regs.set_flag(Flag::H, false);
        assert_eq!(regs.f(), 0x10);

        regs.set_flags(true, true, false, false);
        assert_eq!(regs.f(), 0xC0);
    }

    #[test]
    fn test_power_on_patterns() {
        assert_eq!(Registers::new(PowerOn::Zeroed), Registers::default());

        let regs = Registers::new(PowerOn::PostBoot);
        assert_eq!(regs.af(), 0x01B0);
        assert_eq!(regs.bc(), 0x0013);
        assert_eq!(regs.de(), 0x00D8);
        assert_eq!(regs.hl(), 0x014D);
        assert_eq!(regs.sp, 0xFFFE);
        assert_eq!(regs.pc, 0x0100);
    }
}
