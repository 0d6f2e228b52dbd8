use gbcore::{
    instruction::{cb_cycles, is_illegal, OPCODES},
    Cpu, Flag, MemoryBus, PowerOn,
};
use tracing_subscriber::fmt;

#[cfg(test)]
#[ctor::ctor]
fn init() {
    let fmt_subscriber = fmt::Subscriber::builder()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(fmt_subscriber)
        .expect("Unable to set global tracing subscriber");
}

struct Ram(Vec<u8>);

impl Ram {
    fn with_program(address: u16, program: &[u8]) -> Self {
        let mut memory = vec![0u8; 0x10000];
        let start = address as usize;
        memory[start..start + program.len()].copy_from_slice(program);
        Self(memory)
    }
}

impl MemoryBus for Ram {
    fn read_byte(&self, address: u16) -> u8 {
        self.0[address as usize]
    }

    fn write_byte(&mut self, address: u16, value: u8) {
        self.0[address as usize] = value;
    }
}

fn condition_holds(opcode: u8, flags: u8) -> bool {
    let zero = flags & Flag::Z as u8 != 0;
    let carry = flags & Flag::C as u8 != 0;
    match (opcode >> 3) & 0x03 {
        0 => !zero,
        1 => zero,
        2 => !carry,
        _ => carry,
    }
}

/// Where PC ends up after one instruction at 0x0100 with zero operands and
/// zero-filled memory everywhere else.
fn expected_pc(opcode: u8, taken: bool, hl: u16) -> u16 {
    let next = 0x0100 + OPCODES[opcode as usize].length as u16;
    match opcode {
        // JP, CALL, RET and RETI all land on the zero operand or stack word
        0xC3 | 0xCD | 0xC9 | 0xD9 => 0x0000,
        0xC2 | 0xCA | 0xD2 | 0xDA | 0xC4 | 0xCC | 0xD4 | 0xDC | 0xC0 | 0xC8 | 0xD0 | 0xD8
            if taken =>
        {
            0x0000
        }
        0xC7 | 0xCF | 0xD7 | 0xDF | 0xE7 | 0xEF | 0xF7 | 0xFF => (opcode & 0x38) as u16,
        0xE9 => hl,
        _ => next,
    }
}

#[test]
fn test_every_base_opcode_advances_and_costs() {
    for flags in [0x00, 0xF0] {
        for opcode in 0..=0xFFu8 {
            if opcode == 0xCB || is_illegal(opcode) {
                continue;
            }

            let mut bus = Ram::with_program(0x0100, &[opcode, 0x00, 0x00]);
            let mut cpu = Cpu::new(PowerOn::PostBoot);
            cpu.regs.set_f(flags);
            let hl = cpu.regs.hl();

            let info = &OPCODES[opcode as usize];
            let taken = info.is_conditional() && condition_holds(opcode, flags);
            let expected_cycles = if taken {
                info.taken_cycles
            } else {
                info.cycles
            };

            let cycles = cpu.step(&mut bus);
            assert_eq!(
                cycles, expected_cycles as u32,
                "{} ({:02X}) with F={:02X}",
                info.mnemonic, opcode, flags
            );
            assert_eq!(
                cpu.pc(),
                expected_pc(opcode, taken, hl),
                "{} ({:02X}) with F={:02X}",
                info.mnemonic,
                opcode,
                flags
            );
            assert!(cpu.locked().is_none());
        }
    }
}

#[test]
fn test_every_prefixed_opcode() {
    for opcode in 0..=0xFFu8 {
        let mut bus = Ram::with_program(0x0100, &[0xCB, opcode]);
        let mut cpu = Cpu::new(PowerOn::PostBoot);

        assert_eq!(cpu.step(&mut bus), cb_cycles(opcode) as u32, "CB {:02X}", opcode);
        assert_eq!(cpu.pc(), 0x0102, "CB {:02X}", opcode);
    }
}

#[test]
fn test_every_illegal_opcode_locks() {
    for opcode in (0..=0xFFu8).filter(|&op| is_illegal(op)) {
        let mut bus = Ram::with_program(0x0100, &[opcode, 0x3C]);
        let mut cpu = Cpu::new(PowerOn::PostBoot);

        assert_eq!(cpu.step(&mut bus), 4);
        let fault = cpu.take_fault().unwrap();
        assert_eq!(fault.opcode, opcode);
        assert_eq!(fault.address, 0x0100);

        let a = cpu.regs.a;
        assert_eq!(cpu.step(&mut bus), 4);
        assert_eq!(cpu.regs.a, a);
        assert!(cpu.take_fault().is_none());
        assert!(cpu.locked().is_some());
    }
}

#[test]
fn test_inc_a_half_carry_and_wrap() {
    let mut bus = Ram::with_program(0x0000, &[0x3C, 0x3C]);
    let mut cpu = Cpu::new(PowerOn::Zeroed);
    cpu.regs.a = 0x0F;
    cpu.regs.set_f(Flag::C as u8);

    cpu.step(&mut bus);
    assert_eq!(cpu.regs.a, 0x10);
    assert!(cpu.regs.flag(Flag::H));
    assert!(!cpu.regs.flag(Flag::Z));
    assert!(!cpu.regs.flag(Flag::N));
    assert!(cpu.regs.flag(Flag::C));

    cpu.regs.a = 0xFF;
    cpu.step(&mut bus);
    assert_eq!(cpu.regs.a, 0x00);
    assert!(cpu.regs.flag(Flag::Z));
    assert!(cpu.regs.flag(Flag::H));
    assert!(cpu.regs.flag(Flag::C));
}

#[test]
fn test_push_pop_round_trip() {
    // LD BC,$1234; PUSH BC; POP DE
    let mut bus = Ram::with_program(0x0100, &[0x01, 0x34, 0x12, 0xC5, 0xD1]);
    let mut cpu = Cpu::new(PowerOn::PostBoot);

    cpu.step(&mut bus);
    assert_eq!(cpu.step(&mut bus), 16);
    assert_eq!(cpu.regs.sp, 0xFFFC);
    assert_eq!(bus.0[0xFFFC], 0x34);
    assert_eq!(bus.0[0xFFFD], 0x12);

    assert_eq!(cpu.step(&mut bus), 12);
    assert_eq!(cpu.regs.de(), 0x1234);
    assert_eq!(cpu.regs.sp, 0xFFFE);
}

#[test]
fn test_ei_takes_effect_after_next_instruction() {
    // EI; NOP; NOP with a pending, enabled interrupt
    let mut bus = Ram::with_program(0x0100, &[0xFB, 0x00, 0x00]);
    bus.0[0xFFFF] = 0x01;
    bus.0[0xFF0F] = 0x01;
    let mut cpu = Cpu::new(PowerOn::PostBoot);

    cpu.step(&mut bus);
    assert!(!cpu.ime);
    cpu.step(&mut bus);
    assert_eq!(cpu.pc(), 0x0102);

    assert_eq!(cpu.step(&mut bus), 20);
    assert_eq!(cpu.pc(), 0x0040);
    assert!(!cpu.ime);
    assert_eq!(bus.0[0xFF0F], 0x00);
    assert_eq!(bus.read_word(cpu.regs.sp), 0x0102);
}
