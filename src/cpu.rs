use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    config::PowerOn,
    instruction::{cb_cycles, Instruction, OPCODES},
    registers::{Flag, Registers},
};

const IF_ADDRESS: u16 = 0xFF0F;
const IE_ADDRESS: u16 = 0xFFFF;
const DIV_ADDRESS: u16 = 0xFF04;

/// Cycles charged for servicing an interrupt.
pub const INTERRUPT_CYCLES: u32 = 20;
/// Cycles charged per step while halted, stopped or locked.
pub const IDLE_CYCLES: u32 = 4;

/// Everything the CPU can see of the machine.
pub trait MemoryBus {
    fn read_byte(&self, address: u16) -> u8;
    fn write_byte(&mut self, address: u16, value: u8);

    fn read_word(&self, address: u16) -> u16 {
        u16::from_le_bytes([
            self.read_byte(address),
            self.read_byte(address.wrapping_add(1)),
        ])
    }

    fn write_word(&mut self, address: u16, value: u16) {
        let [lo, hi] = value.to_le_bytes();
        self.write_byte(address, lo);
        self.write_byte(address.wrapping_add(1), hi);
    }

    /// Requested and enabled interrupts (IE & IF), low five bits.
    fn pending_interrupts(&self) -> u8 {
        self.read_byte(IE_ADDRESS) & self.read_byte(IF_ADDRESS) & 0x1F
    }

    fn acknowledge_interrupt(&mut self, mask: u8) {
        let flags = self.read_byte(IF_ADDRESS);
        self.write_byte(IF_ADDRESS, flags & !mask);
    }
}

/// An opcode with no defined behaviour was fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("illegal instruction {opcode:#04X} at {address:#06X}")]
pub struct IllegalInstruction {
    pub opcode: u8,
    pub address: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cpu {
    pub regs: Registers,
    pub ime: bool,
    /// Steps left before a preceding EI takes effect.
    ei_delay: u8,
    pub halted: bool,
    pub stopped: bool,
    halt_bug: bool,
    /// Set once an illegal opcode has been executed; only a reset clears it.
    locked: Option<IllegalInstruction>,
    /// Fault not yet collected by the machine.
    fault: Option<IllegalInstruction>,
}

impl Cpu {
    pub fn new(power_on: PowerOn) -> Self {
        Self {
            regs: Registers::new(power_on),
            ime: false,
            ei_delay: 0,
            halted: false,
            stopped: false,
            halt_bug: false,
            locked: None,
            fault: None,
        }
    }

    pub fn reset(&mut self, power_on: PowerOn) {
        *self = Self::new(power_on);
    }

    pub fn pc(&self) -> u16 {
        self.regs.pc
    }

    pub fn locked(&self) -> Option<IllegalInstruction> {
        self.locked
    }

    pub fn take_fault(&mut self) -> Option<IllegalInstruction> {
        self.fault.take()
    }

    /// Executes one instruction, or services one interrupt, and returns the
    /// clock cycles it took.
    pub fn step<B: MemoryBus + ?Sized>(&mut self, bus: &mut B) -> u32 {
        if self.locked.is_some() {
            return IDLE_CYCLES;
        }

        self.update_ime();

        let pending = bus.pending_interrupts();
        if self.halted || self.stopped {
            if pending == 0 {
                return IDLE_CYCLES;
            }
            self.halted = false;
            self.stopped = false;
        }

        if self.ime && pending != 0 {
            return self.dispatch_interrupt(bus, pending);
        }

        let pc = self.regs.pc;
        tracing::trace!(
            "[CPU] {:04X}: {:<16} {:?}",
            pc,
            Instruction::parse_at(&*bus, pc).name(),
            self.regs
        );

        let opcode = self.fetch_byte(bus);
        self.execute(bus, opcode, pc)
    }

    fn update_ime(&mut self) {
        match self.ei_delay {
            2 => self.ei_delay = 1,
            1 => {
                self.ei_delay = 0;
                self.ime = true;
            }
            _ => {}
        }
    }

    fn dispatch_interrupt<B: MemoryBus + ?Sized>(&mut self, bus: &mut B, pending: u8) -> u32 {
        let n = pending.trailing_zeros() as u16;
        let mask = 1 << n;

        self.ime = false;
        bus.acknowledge_interrupt(mask);
        // EI; HALT with a request already pending: return to the HALT itself.
        let pc = if self.halt_bug {
            self.halt_bug = false;
            self.regs.pc.wrapping_sub(1)
        } else {
            self.regs.pc
        };
        self.push(bus, pc);
        self.regs.pc = 0x0040 + n * 8;

        tracing::trace!("[CPU] Interrupt {} from {:04X}", n, pc);
        INTERRUPT_CYCLES
    }

    fn lock(&mut self, opcode: u8, address: u16) {
        let fault = IllegalInstruction { opcode, address };
        tracing::error!("[CPU] {}, CPU locked", fault);
        self.locked = Some(fault);
        self.fault = Some(fault);
    }

    fn fetch_byte<B: MemoryBus + ?Sized>(&mut self, bus: &B) -> u8 {
        let value = bus.read_byte(self.regs.pc);
        if self.halt_bug {
            self.halt_bug = false;
        } else {
            self.regs.pc = self.regs.pc.wrapping_add(1);
        }
        value
    }

    fn fetch_word<B: MemoryBus + ?Sized>(&mut self, bus: &B) -> u16 {
        let lo = self.fetch_byte(bus);
        let hi = self.fetch_byte(bus);
        u16::from_le_bytes([lo, hi])
    }

    fn push<B: MemoryBus + ?Sized>(&mut self, bus: &mut B, value: u16) {
        self.regs.sp = self.regs.sp.wrapping_sub(2);
        bus.write_word(self.regs.sp, value);
    }

    fn pop<B: MemoryBus + ?Sized>(&mut self, bus: &B) -> u16 {
        let value = bus.read_word(self.regs.sp);
        self.regs.sp = self.regs.sp.wrapping_add(2);
        value
    }

    /// Operand by its 3-bit encoding: B C D E H L (HL) A.
    fn read_r<B: MemoryBus + ?Sized>(&self, bus: &B, r: u8) -> u8 {
        match r & 0x07 {
            0 => self.regs.b,
            1 => self.regs.c,
            2 => self.regs.d,
            3 => self.regs.e,
            4 => self.regs.h,
            5 => self.regs.l,
            6 => bus.read_byte(self.regs.hl()),
            _ => self.regs.a,
        }
    }

    fn write_r<B: MemoryBus + ?Sized>(&mut self, bus: &mut B, r: u8, value: u8) {
        match r & 0x07 {
            0 => self.regs.b = value,
            1 => self.regs.c = value,
            2 => self.regs.d = value,
            3 => self.regs.e = value,
            4 => self.regs.h = value,
            5 => self.regs.l = value,
            6 => bus.write_byte(self.regs.hl(), value),
            _ => self.regs.a = value,
        }
    }

    /// Register pair by its 2-bit encoding: BC DE HL SP.
    fn read_rr(&self, rr: u8) -> u16 {
        match rr & 0x03 {
            0 => self.regs.bc(),
            1 => self.regs.de(),
            2 => self.regs.hl(),
            _ => self.regs.sp,
        }
    }

    fn write_rr(&mut self, rr: u8, value: u16) {
        match rr & 0x03 {
            0 => self.regs.set_bc(value),
            1 => self.regs.set_de(value),
            2 => self.regs.set_hl(value),
            _ => self.regs.sp = value,
        }
    }

    /// NZ Z NC C
    fn condition(&self, cc: u8) -> bool {
        match cc & 0x03 {
            0 => !self.regs.flag(Flag::Z),
            1 => self.regs.flag(Flag::Z),
            2 => !self.regs.flag(Flag::C),
            _ => self.regs.flag(Flag::C),
        }
    }

    fn execute<B: MemoryBus + ?Sized>(&mut self, bus: &mut B, opcode: u8, address: u16) -> u32 {
        let info = &OPCODES[opcode as usize];
        let mut taken = false;

        match opcode {
            0x00 => {}
            0x01 | 0x11 | 0x21 | 0x31 => {
                let value = self.fetch_word(bus);
                self.write_rr(opcode >> 4, value);
            }
            0x02 => bus.write_byte(self.regs.bc(), self.regs.a),
            0x12 => bus.write_byte(self.regs.de(), self.regs.a),
            0x22 => {
                let hl = self.regs.hl_inc();
                bus.write_byte(hl, self.regs.a);
            }
            0x32 => {
                let hl = self.regs.hl_dec();
                bus.write_byte(hl, self.regs.a);
            }
            0x0A => self.regs.a = bus.read_byte(self.regs.bc()),
            0x1A => self.regs.a = bus.read_byte(self.regs.de()),
            0x2A => {
                let hl = self.regs.hl_inc();
                self.regs.a = bus.read_byte(hl);
            }
            0x3A => {
                let hl = self.regs.hl_dec();
                self.regs.a = bus.read_byte(hl);
            }
            0x03 | 0x13 | 0x23 | 0x33 => {
                let rr = opcode >> 4;
                self.write_rr(rr, self.read_rr(rr).wrapping_add(1));
            }
            0x0B | 0x1B | 0x2B | 0x3B => {
                let rr = opcode >> 4;
                self.write_rr(rr, self.read_rr(rr).wrapping_sub(1));
            }
            0x09 | 0x19 | 0x29 | 0x39 => self.alu_add_hl(self.read_rr(opcode >> 4)),
            0x04 | 0x0C | 0x14 | 0x1C | 0x24 | 0x2C | 0x34 | 0x3C => {
                let r = opcode >> 3;
                let value = self.read_r(bus, r);
                let result = self.alu_inc(value);
                self.write_r(bus, r, result);
            }
            0x05 | 0x0D | 0x15 | 0x1D | 0x25 | 0x2D | 0x35 | 0x3D => {
                let r = opcode >> 3;
                let value = self.read_r(bus, r);
                let result = self.alu_dec(value);
                self.write_r(bus, r, result);
            }
            0x06 | 0x0E | 0x16 | 0x1E | 0x26 | 0x2E | 0x36 | 0x3E => {
                let value = self.fetch_byte(bus);
                self.write_r(bus, opcode >> 3, value);
            }
            // Accumulator rotates always clear Z.
            0x07 => {
                self.regs.a = self.alu_rlc(self.regs.a);
                self.regs.set_flag(Flag::Z, false);
            }
            0x0F => {
                self.regs.a = self.alu_rrc(self.regs.a);
                self.regs.set_flag(Flag::Z, false);
            }
            0x17 => {
                self.regs.a = self.alu_rl(self.regs.a);
                self.regs.set_flag(Flag::Z, false);
            }
            0x1F => {
                self.regs.a = self.alu_rr(self.regs.a);
                self.regs.set_flag(Flag::Z, false);
            }
            0x08 => {
                let address = self.fetch_word(bus);
                bus.write_word(address, self.regs.sp);
            }
            0x10 => {
                self.fetch_byte(bus);
                bus.write_byte(DIV_ADDRESS, 0);
                self.stopped = true;
                tracing::debug!("[CPU] STOP at {:04X}", address);
            }
            0x18 => self.jump_relative(bus, true),
            0x20 | 0x28 | 0x30 | 0x38 => {
                taken = self.condition(opcode >> 3);
                self.jump_relative(bus, taken);
            }
            0x27 => self.alu_daa(),
            0x2F => {
                self.regs.a = !self.regs.a;
                self.regs.set_flag(Flag::N, true);
                self.regs.set_flag(Flag::H, true);
            }
            0x37 => {
                self.regs.set_flag(Flag::N, false);
                self.regs.set_flag(Flag::H, false);
                self.regs.set_flag(Flag::C, true);
            }
            0x3F => {
                let carry = self.regs.flag(Flag::C);
                self.regs.set_flag(Flag::N, false);
                self.regs.set_flag(Flag::H, false);
                self.regs.set_flag(Flag::C, !carry);
            }
            0x76 => {
                if !self.ime && bus.pending_interrupts() != 0 {
                    self.halt_bug = true;
                } else {
                    self.halted = true;
                }
            }
            0x40..=0x7F => {
                let value = self.read_r(bus, opcode);
                self.write_r(bus, opcode >> 3, value);
            }
            0x80..=0xBF => {
                let value = self.read_r(bus, opcode);
                self.alu(opcode >> 3, value);
            }
            0xC6 | 0xCE | 0xD6 | 0xDE | 0xE6 | 0xEE | 0xF6 | 0xFE => {
                let value = self.fetch_byte(bus);
                self.alu(opcode >> 3, value);
            }
            0xC0 | 0xC8 | 0xD0 | 0xD8 => {
                taken = self.condition(opcode >> 3);
                if taken {
                    self.regs.pc = self.pop(bus);
                }
            }
            0xC9 => self.regs.pc = self.pop(bus),
            0xD9 => {
                self.regs.pc = self.pop(bus);
                self.ime = true;
            }
            0xC1 | 0xD1 | 0xE1 => {
                let value = self.pop(bus);
                self.write_rr((opcode >> 4) & 0x03, value);
            }
            0xF1 => {
                let value = self.pop(bus);
                self.regs.set_af(value);
            }
            0xC5 | 0xD5 | 0xE5 => {
                let value = self.read_rr((opcode >> 4) & 0x03);
                self.push(bus, value);
            }
            0xF5 => {
                let value = self.regs.af();
                self.push(bus, value);
            }
            0xC2 | 0xCA | 0xD2 | 0xDA => {
                let target = self.fetch_word(bus);
                taken = self.condition(opcode >> 3);
                if taken {
                    self.regs.pc = target;
                }
            }
            0xC3 => self.regs.pc = self.fetch_word(bus),
            0xE9 => self.regs.pc = self.regs.hl(),
            0xC4 | 0xCC | 0xD4 | 0xDC => {
                let target = self.fetch_word(bus);
                taken = self.condition(opcode >> 3);
                if taken {
                    let pc = self.regs.pc;
                    self.push(bus, pc);
                    self.regs.pc = target;
                }
            }
            0xCD => {
                let target = self.fetch_word(bus);
                let pc = self.regs.pc;
                self.push(bus, pc);
                self.regs.pc = target;
            }
            0xC7 | 0xCF | 0xD7 | 0xDF | 0xE7 | 0xEF | 0xF7 | 0xFF => {
                let pc = self.regs.pc;
                self.push(bus, pc);
                self.regs.pc = (opcode & 0x38) as u16;
            }
            0xCB => return self.execute_cb(bus),
            0xE0 => {
                let offset = self.fetch_byte(bus);
                bus.write_byte(0xFF00 | offset as u16, self.regs.a);
            }
            0xF0 => {
                let offset = self.fetch_byte(bus);
                self.regs.a = bus.read_byte(0xFF00 | offset as u16);
            }
            0xE2 => bus.write_byte(0xFF00 | self.regs.c as u16, self.regs.a),
            0xF2 => self.regs.a = bus.read_byte(0xFF00 | self.regs.c as u16),
            0xEA => {
                let address = self.fetch_word(bus);
                bus.write_byte(address, self.regs.a);
            }
            0xFA => {
                let address = self.fetch_word(bus);
                self.regs.a = bus.read_byte(address);
            }
            0xE8 => {
                let offset = self.fetch_byte(bus);
                self.regs.sp = self.alu_add_sp(offset);
            }
            0xF8 => {
                let offset = self.fetch_byte(bus);
                let value = self.alu_add_sp(offset);
                self.regs.set_hl(value);
            }
            0xF9 => self.regs.sp = self.regs.hl(),
            0xF3 => {
                self.ime = false;
                self.ei_delay = 0;
            }
            0xFB => self.ei_delay = 2,
            0xD3 | 0xDB | 0xDD | 0xE3 | 0xE4 | 0xEB | 0xEC | 0xED | 0xF4 | 0xFC | 0xFD => {
                self.lock(opcode, address);
            }
        }

        if taken {
            info.taken_cycles as u32
        } else {
            info.cycles as u32
        }
    }

    fn execute_cb<B: MemoryBus + ?Sized>(&mut self, bus: &mut B) -> u32 {
        let opcode = self.fetch_byte(bus);
        let bit = (opcode >> 3) & 0x07;
        let value = self.read_r(bus, opcode);

        match opcode >> 6 {
            0 => {
                let result = match bit {
                    0 => self.alu_rlc(value),
                    1 => self.alu_rrc(value),
                    2 => self.alu_rl(value),
                    3 => self.alu_rr(value),
                    4 => self.alu_sla(value),
                    5 => self.alu_sra(value),
                    6 => self.alu_swap(value),
                    _ => self.alu_srl(value),
                };
                self.write_r(bus, opcode, result);
            }
            1 => self.alu_bit(value, bit),
            2 => self.write_r(bus, opcode, value & !(1 << bit)),
            _ => self.write_r(bus, opcode, value | (1 << bit)),
        }

        cb_cycles(opcode) as u32
    }

    fn jump_relative<B: MemoryBus + ?Sized>(&mut self, bus: &B, taken: bool) {
        let offset = self.fetch_byte(bus) as i8;
        if taken {
            self.regs.pc = self.regs.pc.wrapping_add(offset as u16);
        }
    }

    /// ADD ADC SUB SBC AND XOR OR CP, by their 3-bit encoding.
    fn alu(&mut self, op: u8, value: u8) {
        match op & 0x07 {
            0 => self.alu_add(value, false),
            1 => self.alu_add(value, true),
            2 => self.alu_sub(value, false),
            3 => self.alu_sub(value, true),
            4 => {
                self.regs.a &= value;
                self.regs.set_flags(self.regs.a == 0, false, true, false);
            }
            5 => {
                self.regs.a ^= value;
                self.regs.set_flags(self.regs.a == 0, false, false, false);
            }
            6 => {
                self.regs.a |= value;
                self.regs.set_flags(self.regs.a == 0, false, false, false);
            }
            _ => {
                let a = self.regs.a;
                self.alu_sub(value, false);
                self.regs.a = a;
            }
        }
    }

    fn alu_add(&mut self, b: u8, use_carry: bool) {
        let c = (use_carry && self.regs.flag(Flag::C)) as u8;
        let a = self.regs.a;
        let result = a.wrapping_add(b).wrapping_add(c);
        self.regs.set_flags(
            result == 0,
            false,
            (a & 0x0F) + (b & 0x0F) + c > 0x0F,
            a as u16 + b as u16 + c as u16 > 0xFF,
        );
        self.regs.a = result;
    }

    fn alu_sub(&mut self, b: u8, use_carry: bool) {
        let c = (use_carry && self.regs.flag(Flag::C)) as u8;
        let a = self.regs.a;
        let result = a.wrapping_sub(b).wrapping_sub(c);
        self.regs.set_flags(
            result == 0,
            true,
            (a & 0x0F) < (b & 0x0F) + c,
            (a as u16) < b as u16 + c as u16,
        );
        self.regs.a = result;
    }

    fn alu_inc(&mut self, value: u8) -> u8 {
        let result = value.wrapping_add(1);
        self.regs.set_flag(Flag::Z, result == 0);
        self.regs.set_flag(Flag::N, false);
        self.regs.set_flag(Flag::H, value & 0x0F == 0x0F);
        result
    }

    fn alu_dec(&mut self, value: u8) -> u8 {
        let result = value.wrapping_sub(1);
        self.regs.set_flag(Flag::Z, result == 0);
        self.regs.set_flag(Flag::N, true);
        self.regs.set_flag(Flag::H, value & 0x0F == 0);
        result
    }

    fn alu_add_hl(&mut self, value: u16) {
        let hl = self.regs.hl();
        self.regs.set_flag(Flag::N, false);
        self.regs.set_flag(Flag::H, (hl & 0x0FFF) + (value & 0x0FFF) > 0x0FFF);
        self.regs.set_flag(Flag::C, hl as u32 + value as u32 > 0xFFFF);
        self.regs.set_hl(hl.wrapping_add(value));
    }

    /// SP plus a signed offset; flags come from the unsigned low-byte add.
    fn alu_add_sp(&mut self, offset: u8) -> u16 {
        let sp = self.regs.sp;
        let value = offset as i8 as i16 as u16;
        self.regs.set_flags(
            false,
            false,
            (sp & 0x000F) + (value & 0x000F) > 0x000F,
            (sp & 0x00FF) + (value & 0x00FF) > 0x00FF,
        );
        sp.wrapping_add(value)
    }

    fn alu_daa(&mut self) {
        let mut a = self.regs.a;
        let mut adjust = if self.regs.flag(Flag::C) { 0x60 } else { 0x00 };
        if self.regs.flag(Flag::H) {
            adjust |= 0x06;
        }

        if !self.regs.flag(Flag::N) {
            if a & 0x0F > 0x09 {
                adjust |= 0x06;
            }
            if a > 0x99 {
                adjust |= 0x60;
            }
            a = a.wrapping_add(adjust);
        } else {
            a = a.wrapping_sub(adjust);
        }

        self.regs.set_flag(Flag::Z, a == 0);
        self.regs.set_flag(Flag::H, false);
        self.regs.set_flag(Flag::C, adjust >= 0x60);
        self.regs.a = a;
    }

    fn shift_flags(&mut self, result: u8, carry: bool) {
        self.regs.set_flags(result == 0, false, false, carry);
    }

    fn alu_rlc(&mut self, value: u8) -> u8 {
        let result = value.rotate_left(1);
        self.shift_flags(result, value & 0x80 != 0);
        result
    }

    fn alu_rrc(&mut self, value: u8) -> u8 {
        let result = value.rotate_right(1);
        self.shift_flags(result, value & 0x01 != 0);
        result
    }

    fn alu_rl(&mut self, value: u8) -> u8 {
        let result = (value << 1) | self.regs.flag(Flag::C) as u8;
        self.shift_flags(result, value & 0x80 != 0);
        result
    }

    fn alu_rr(&mut self, value: u8) -> u8 {
        let result = (value >> 1) | ((self.regs.flag(Flag::C) as u8) << 7);
        self.shift_flags(result, value & 0x01 != 0);
        result
    }

    fn alu_sla(&mut self, value: u8) -> u8 {
        let result = value << 1;
        self.shift_flags(result, value & 0x80 != 0);
        result
    }

    fn alu_sra(&mut self, value: u8) -> u8 {
        let result = (value >> 1) | (value & 0x80);
        self.shift_flags(result, value & 0x01 != 0);
        result
    }

    fn alu_srl(&mut self, value: u8) -> u8 {
        let result = value >> 1;
        self.shift_flags(result, value & 0x01 != 0);
        result
    }

    fn alu_swap(&mut self, value: u8) -> u8 {
        let result = value.rotate_left(4);
        self.shift_flags(result, false);
        result
    }

    fn alu_bit(&mut self, value: u8, bit: u8) {
        self.regs.set_flag(Flag::Z, value & (1 << bit) == 0);
        self.regs.set_flag(Flag::N, false);
        self.regs.set_flag(Flag::H, true);
    }
}
