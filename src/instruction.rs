use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cpu::MemoryBus;

/// Static description of one base opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpInfo {
    pub mnemonic: &'static str,
    /// Instruction length in bytes, opcode included.
    pub length: u8,
    /// Cycle cost, or the not-taken cost for conditional control flow.
    pub cycles: u8,
    /// Cycle cost when a conditional branch is taken. Equal to `cycles` otherwise.
    pub taken_cycles: u8,
}

impl OpInfo {
    pub fn is_conditional(&self) -> bool {
        self.cycles != self.taken_cycles
    }
}

#[rustfmt::skip]
const MNEMONICS: [&str; 256] = [
    "NOP", "LD BC,d16", "LD (BC),A", "INC BC", "INC B", "DEC B", "LD B,d8", "RLCA",
    "LD (a16),SP", "ADD HL,BC", "LD A,(BC)", "DEC BC", "INC C", "DEC C", "LD C,d8", "RRCA",
    "STOP", "LD DE,d16", "LD (DE),A", "INC DE", "INC D", "DEC D", "LD D,d8", "RLA",
    "JR r8", "ADD HL,DE", "LD A,(DE)", "DEC DE", "INC E", "DEC E", "LD E,d8", "RRA",
    "JR NZ,r8", "LD HL,d16", "LD (HL+),A", "INC HL", "INC H", "DEC H", "LD H,d8", "DAA",
    "JR Z,r8", "ADD HL,HL", "LD A,(HL+)", "DEC HL", "INC L", "DEC L", "LD L,d8", "CPL",
    "JR NC,r8", "LD SP,d16", "LD (HL-),A", "INC SP", "INC (HL)", "DEC (HL)", "LD (HL),d8", "SCF",
    "JR C,r8", "ADD HL,SP", "LD A,(HL-)", "DEC SP", "INC A", "DEC A", "LD A,d8", "CCF",
    "LD B,B", "LD B,C", "LD B,D", "LD B,E", "LD B,H", "LD B,L", "LD B,(HL)", "LD B,A",
    "LD C,B", "LD C,C", "LD C,D", "LD C,E", "LD C,H", "LD C,L", "LD C,(HL)", "LD C,A",
    "LD D,B", "LD D,C", "LD D,D", "LD D,E", "LD D,H", "LD D,L", "LD D,(HL)", "LD D,A",
    "LD E,B", "LD E,C", "LD E,D", "LD E,E", "LD E,H", "LD E,L", "LD E,(HL)", "LD E,A",
    "LD H,B", "LD H,C", "LD H,D", "LD H,E", "LD H,H", "LD H,L", "LD H,(HL)", "LD H,A",
    "LD L,B", "LD L,C", "LD L,D", "LD L,E", "LD L,H", "LD L,L", "LD L,(HL)", "LD L,A",
    "LD (HL),B", "LD (HL),C", "LD (HL),D", "LD (HL),E", "LD (HL),H", "LD (HL),L", "HALT", "LD (HL),A",
    "LD A,B", "LD A,C", "LD A,D", "LD A,E", "LD A,H", "LD A,L", "LD A,(HL)", "LD A,A",
    "ADD A,B", "ADD A,C", "ADD A,D", "ADD A,E", "ADD A,H", "ADD A,L", "ADD A,(HL)", "ADD A,A",
    "ADC A,B", "ADC A,C", "ADC A,D", "ADC A,E", "ADC A,H", "ADC A,L", "ADC A,(HL)", "ADC A,A",
    "SUB B", "SUB C", "SUB D", "SUB E", "SUB H", "SUB L", "SUB (HL)", "SUB A",
    "SBC A,B", "SBC A,C", "SBC A,D", "SBC A,E", "SBC A,H", "SBC A,L", "SBC A,(HL)", "SBC A,A",
    "AND B", "AND C", "AND D", "AND E", "AND H", "AND L", "AND (HL)", "AND A",
    "XOR B", "XOR C", "XOR D", "XOR E", "XOR H", "XOR L", "XOR (HL)", "XOR A",
    "OR B", "OR C", "OR D", "OR E", "OR H", "OR L", "OR (HL)", "OR A",
    "CP B", "CP C", "CP D", "CP E", "CP H", "CP L", "CP (HL)", "CP A",
    "RET NZ", "POP BC", "JP NZ,a16", "JP a16", "CALL NZ,a16", "PUSH BC", "ADD A,d8", "RST 00H",
    "RET Z", "RET", "JP Z,a16", "PREFIX CB", "CALL Z,a16", "CALL a16", "ADC A,d8", "RST 08H",
    "RET NC", "POP DE", "JP NC,a16", "ILLEGAL_D3", "CALL NC,a16", "PUSH DE", "SUB d8", "RST 10H",
    "RET C", "RETI", "JP C,a16", "ILLEGAL_DB", "CALL C,a16", "ILLEGAL_DD", "SBC A,d8", "RST 18H",
    "LDH (a8),A", "POP HL", "LD (C),A", "ILLEGAL_E3", "ILLEGAL_E4", "PUSH HL", "AND d8", "RST 20H",
    "ADD SP,r8", "JP (HL)", "LD (a16),A", "ILLEGAL_EB", "ILLEGAL_EC", "ILLEGAL_ED", "XOR d8", "RST 28H",
    "LDH A,(a8)", "POP AF", "LD A,(C)", "DI", "ILLEGAL_F4", "PUSH AF", "OR d8", "RST 30H",
    "LD HL,SP+r8", "LD SP,HL", "LD A,(a16)", "EI", "ILLEGAL_FC", "ILLEGAL_FD", "CP d8", "RST 38H",
];

#[rustfmt::skip]
const LENGTHS: [u8; 256] = [
    1, 3, 1, 1, 1, 1, 2, 1, 3, 1, 1, 1, 1, 1, 2, 1,
    2, 3, 1, 1, 1, 1, 2, 1, 2, 1, 1, 1, 1, 1, 2, 1,
    2, 3, 1, 1, 1, 1, 2, 1, 2, 1, 1, 1, 1, 1, 2, 1,
    2, 3, 1, 1, 1, 1, 2, 1, 2, 1, 1, 1, 1, 1, 2, 1,
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1,
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1,
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1,
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1,
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1,
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1,
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1,
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1,
    1, 1, 3, 3, 3, 1, 2, 1, 1, 1, 3, 2, 3, 3, 2, 1,
    1, 1, 3, 1, 3, 1, 2, 1, 1, 1, 3, 1, 3, 1, 2, 1,
    2, 1, 1, 1, 1, 1, 2, 1, 2, 1, 3, 1, 1, 1, 2, 1,
    2, 1, 1, 1, 1, 1, 2, 1, 2, 1, 3, 1, 1, 1, 2, 1,
];

// Clock cycles, not-taken cost for conditional branches. 0xCB is the cost of
// the prefix alone; the full cost of a prefixed instruction is `cb_cycles`.
#[rustfmt::skip]
const CYCLES: [u8; 256] = [
     4, 12,  8,  8,  4,  4,  8,  4, 20,  8,  8,  8,  4,  4,  8,  4,
     4, 12,  8,  8,  4,  4,  8,  4, 12,  8,  8,  8,  4,  4,  8,  4,
     8, 12,  8,  8,  4,  4,  8,  4,  8,  8,  8,  8,  4,  4,  8,  4,
     8, 12,  8,  8, 12, 12, 12,  4,  8,  8,  8,  8,  4,  4,  8,  4,
     4,  4,  4,  4,  4,  4,  8,  4,  4,  4,  4,  4,  4,  4,  8,  4,
     4,  4,  4,  4,  4,  4,  8,  4,  4,  4,  4,  4,  4,  4,  8,  4,
     4,  4,  4,  4,  4,  4,  8,  4,  4,  4,  4,  4,  4,  4,  8,  4,
     8,  8,  8,  8,  8,  8,  4,  8,  4,  4,  4,  4,  4,  4,  8,  4,
     4,  4,  4,  4,  4,  4,  8,  4,  4,  4,  4,  4,  4,  4,  8,  4,
     4,  4,  4,  4,  4,  4,  8,  4,  4,  4,  4,  4,  4,  4,  8,  4,
     4,  4,  4,  4,  4,  4,  8,  4,  4,  4,  4,  4,  4,  4,  8,  4,
     4,  4,  4,  4,  4,  4,  8,  4,  4,  4,  4,  4,  4,  4,  8,  4,
     8, 12, 12, 16, 12, 16,  8, 16,  8, 16, 12,  4, 12, 24,  8, 16,
     8, 12, 12,  4, 12, 16,  8, 16,  8, 16, 12,  4, 12,  4,  8, 16,
    12, 12,  8,  4,  4, 16,  8, 16, 16,  4, 16,  4,  4,  4,  8, 16,
    12, 12,  8,  4,  4, 16,  8, 16, 12,  8, 16,  4,  4,  4,  8, 16,
];

const fn taken_cycles(opcode: u8) -> u8 {
    match opcode {
        0x20 | 0x28 | 0x30 | 0x38 => 12,
        0xC0 | 0xC8 | 0xD0 | 0xD8 => 20,
        0xC2 | 0xCA | 0xD2 | 0xDA => 16,
        0xC4 | 0xCC | 0xD4 | 0xDC => 24,
        _ => CYCLES[opcode as usize],
    }
}

const fn build_opcode_table() -> [OpInfo; 256] {
    let mut table = [OpInfo {
        mnemonic: "",
        length: 1,
        cycles: 4,
        taken_cycles: 4,
    }; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = OpInfo {
            mnemonic: MNEMONICS[i],
            length: LENGTHS[i],
            cycles: CYCLES[i],
            taken_cycles: taken_cycles(i as u8),
        };
        i += 1;
    }
    table
}

/// Dense table indexed by opcode byte.
pub static OPCODES: [OpInfo; 256] = build_opcode_table();

/// Opcodes with no defined behaviour. Executing one locks the CPU.
pub const fn is_illegal(opcode: u8) -> bool {
    matches!(
        opcode,
        0xD3 | 0xDB | 0xDD | 0xE3 | 0xE4 | 0xEB | 0xEC | 0xED | 0xF4 | 0xFC | 0xFD
    )
}

/// Full cost of a CB-prefixed instruction, prefix fetch included.
pub const fn cb_cycles(opcode: u8) -> u8 {
    if opcode & 0x07 == 0x06 {
        if opcode >> 6 == 1 {
            12
        } else {
            16
        }
    } else {
        8
    }
}

pub const OPERAND_NAMES: [&str; 8] = ["B", "C", "D", "E", "H", "L", "(HL)", "A"];

pub fn cb_mnemonic(opcode: u8) -> String {
    let operand = OPERAND_NAMES[(opcode & 0x07) as usize];
    let bit = (opcode >> 3) & 0x07;
    match opcode >> 6 {
        0 => {
            let name = ["RLC", "RRC", "RL", "RR", "SLA", "SRA", "SWAP", "SRL"][bit as usize];
            format!("{} {}", name, operand)
        }
        1 => format!("BIT {},{}", bit, operand),
        2 => format!("RES {},{}", bit, operand),
        _ => format!("SET {},{}", bit, operand),
    }
}

/// One decoded instruction, for disassembly and tracing.
pub struct Instruction {
    pub address: u16,
    pub opcode: u8,
    pub operands: [u8; 2],
}

impl Instruction {
    pub fn parse_at<B: MemoryBus + ?Sized>(bus: &B, pc: u16) -> Self {
        let opcode = bus.read_byte(pc);
        let operands = [
            bus.read_byte(pc.wrapping_add(1)),
            bus.read_byte(pc.wrapping_add(2)),
        ];
        Instruction {
            address: pc,
            opcode,
            operands,
        }
    }

    pub fn info(&self) -> &'static OpInfo {
        &OPCODES[self.opcode as usize]
    }

    /// Bytes taken by the instruction, opcode included.
    pub fn length(&self) -> u8 {
        self.info().length
    }

    pub fn is_illegal(&self) -> bool {
        is_illegal(self.opcode)
    }

    fn word(&self) -> u16 {
        u16::from_le_bytes(self.operands)
    }

    pub fn name(&self) -> String {
        let mnemonic = self.info().mnemonic;
        if self.opcode == 0xCB {
            return cb_mnemonic(self.operands[0]);
        }

        let byte = self.operands[0];
        if mnemonic.contains("d16") {
            mnemonic.replace("d16", &format!("${:04X}", self.word()))
        } else if mnemonic.contains("a16") {
            mnemonic.replace("a16", &format!("${:04X}", self.word()))
        } else if mnemonic.contains("d8") {
            mnemonic.replace("d8", &format!("${:02X}", byte))
        } else if mnemonic.contains("a8") {
            mnemonic.replace("a8", &format!("$FF{:02X}", byte))
        } else if mnemonic.starts_with("JR") {
            let target = self
                .address
                .wrapping_add(2)
                .wrapping_add(byte as i8 as u16);
            mnemonic.replace("r8", &format!("${:04X}", target))
        } else if mnemonic.contains("r8") {
            mnemonic.replace("r8", &format!("{:+}", byte as i8))
        } else {
            mnemonic.to_string()
        }
    }

    pub fn as_hex_vector(&self) -> Vec<String> {
        let mut res = vec![format!("{:02X}", self.opcode)];
        for arg in self.operands.iter().take(self.length() as usize - 1) {
            res.push(format!("{:02X}", arg));
        }
        res
    }

    pub fn to_entry(&self) -> ProgramEntry {
        ProgramEntry {
            address: self.address,
            instruction: self.name(),
            data: self.as_hex_vector().join(" "),
            dump: None,
        }
    }
}

/// Disassembles `count` instructions starting at `start`.
pub fn disassemble<B: MemoryBus + ?Sized>(bus: &B, start: u16, count: usize) -> Vec<ProgramEntry> {
    let mut pc = start;
    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        let instruction = Instruction::parse_at(bus, pc);
        entries.push(instruction.to_entry());
        pc = pc.wrapping_add(instruction.length() as u16);
    }
    entries
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramEntry {
    pub address: u16,
    pub instruction: String,
    pub data: String,
    pub dump: Option<String>,
}

impl fmt::Display for ProgramEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04X}  {:<12}  {:<20} {}",
            self.address,
            self.data,
            self.instruction,
            self.dump.as_deref().unwrap_or("")
        )
    }
}
