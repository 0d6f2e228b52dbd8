use std::fmt;

use serde::{Deserialize, Serialize};

use crate::registers::{Flag, Registers};

/// Snapshot of the CPU for trace logs and debuggers.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct InternalState {
    // 8-bit registers
    pub a: u8,
    pub f: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub h: u8,
    pub l: u8,

    // 16-bit registers
    pub sp: u16,
    pub pc: u16,

    pub ime: bool,
    pub halted: bool,

    // contents
    pub hl_contents: u8,
    pub opcode: u8,
    pub instruction: String,

    pub ly: u8,
    pub cycles: u64,
}

impl InternalState {
    pub fn registers(&self) -> Registers {
        let mut regs = Registers::default();
        regs.a = self.a;
        regs.set_f(self.f);
        regs.b = self.b;
        regs.c = self.c;
        regs.d = self.d;
        regs.e = self.e;
        regs.h = self.h;
        regs.l = self.l;
        regs.sp = self.sp;
        regs.pc = self.pc;
        regs
    }
}

impl fmt::Display for InternalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flag = |flag: Flag, name: char| {
            if self.f & flag as u8 != 0 {
                name
            } else {
                '-'
            }
        };
        write!(
            f,
            "#{:04X} #{:02X} {:<14} - A: #{:02X} B: #{:02X} C: #{:02X} D: #{:02X} E: #{:02X} H: #{:02X} L: #{:02X} - (HL): #{:02X} SP: #{:04X} - {}{}{}{} LY: {} CYC: {}",
            self.pc,
            self.opcode,
            self.instruction,
            self.a,
            self.b,
            self.c,
            self.d,
            self.e,
            self.h,
            self.l,
            self.hl_contents,
            self.sp,
            flag(Flag::Z, 'Z'),
            flag(Flag::N, 'N'),
            flag(Flag::H, 'H'),
            flag(Flag::C, 'C'),
            self.ly,
            self.cycles,
        )
    }
}

pub trait ReportState {
    fn report_state(&self) -> InternalState;
}
