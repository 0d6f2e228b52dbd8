use std::{collections::VecDeque, io::Read, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    bus::{AddressSpace, MemorySegment},
    cartridge::LoadError,
    clock::CYCLES_PER_FRAME,
    config::{MachineConfig, PowerOn},
    cpu::{Cpu, IllegalInstruction},
    instruction::{disassemble, Instruction, ProgramEntry},
    internal_state::{InternalState, ReportState},
    utils::compact_hexdump,
    video::FrameBuffer,
};

/// Things that happened while stepping, for the host to pick up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MachineEvent {
    FrameReady { frame: u64 },
    IllegalInstruction(IllegalInstruction),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Machine {
    pub cpu: Cpu,
    pub space: AddressSpace,
    config: MachineConfig,
    cycles: u64,
    events: VecDeque<MachineEvent>,
    frame_count: u64,
    illegal_instructions: u64,
}

impl Machine {
    pub fn new(config: MachineConfig) -> Self {
        tracing::info!("[MACHINE] Initializing with {:?}", config);
        Self {
            cpu: Cpu::new(config.power_on),
            space: AddressSpace::new(config.power_on),
            config,
            cycles: 0,
            events: VecDeque::new(),
            frame_count: 0,
            illegal_instructions: 0,
        }
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    /// Inserts a cartridge and puts the whole machine in its power-on state.
    /// On error the machine is left as it was.
    pub fn load_image(&mut self, image: &[u8]) -> Result<(), LoadError> {
        self.space.load_image(image)?;
        self.reset();
        Ok(())
    }

    pub fn load_image_from(&mut self, reader: impl Read) -> Result<(), LoadError> {
        self.space.load_image_from(reader)?;
        self.reset();
        Ok(())
    }

    pub fn load_image_file(&mut self, path: impl AsRef<Path>) -> Result<(), LoadError> {
        self.space.load_image_file(path)?;
        self.reset();
        Ok(())
    }

    /// Reinitializes every component in place.
    pub fn reset(&mut self) {
        tracing::info!("[MACHINE] Reset ({:?})", self.config.power_on);
        self.cpu.reset(self.config.power_on);
        self.space.reset();
        self.cycles = 0;
        self.events.clear();
        self.frame_count = 0;
        self.illegal_instructions = 0;
    }

    /// Runs one instruction (or interrupt dispatch, or idle period) and the
    /// video and timer for the cycles it took. Returns those cycles.
    pub fn step(&mut self) -> u32 {
        let cycles = self.cpu.step(&mut self.space);
        self.space.advance(cycles);
        self.cycles += cycles as u64;

        if let Some(fault) = self.cpu.take_fault() {
            tracing::warn!("[MACHINE] {} after {} cycles", fault, self.cycles);
            self.illegal_instructions += 1;
            self.events
                .push_back(MachineEvent::IllegalInstruction(fault));
        }

        let frames = self.space.video.frames();
        if frames > self.frame_count {
            self.frame_count = frames;
            self.events.push_back(MachineEvent::FrameReady { frame: frames });
        }

        cycles
    }

    /// Steps until at least `cycles` cycles have run; returns how many did.
    pub fn step_for(&mut self, cycles: u64) -> u64 {
        let mut executed = 0;
        while executed < cycles {
            executed += self.step() as u64;
        }
        executed
    }

    /// Steps until the next frame completes, giving up after two frames'
    /// worth of cycles (the LCD may be off). Returns whether a frame completed.
    pub fn step_frame(&mut self) -> bool {
        let start_frame = self.frame_count;
        let budget = 2 * CYCLES_PER_FRAME as u64;
        let start = self.cycles;

        while self.frame_count == start_frame && self.cycles - start < budget {
            self.step();
        }

        self.frame_count != start_frame
    }

    pub fn frame_ready(&self) -> bool {
        self.space.video.frame_ready()
    }

    pub fn take_frame(&mut self) -> FrameBuffer {
        self.space.video.take_frame()
    }

    /// Last completed frame as RGBA bytes in the configured shades.
    pub fn frame_rgba(&self) -> Vec<u8> {
        self.space.video.frame().to_rgba(&self.config.shades)
    }

    pub fn drain_events(&mut self) -> Vec<MachineEvent> {
        self.events.drain(..).collect()
    }

    pub fn pc(&self) -> u16 {
        self.cpu.pc()
    }

    pub fn halted(&self) -> bool {
        self.cpu.halted
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn illegal_instruction_count(&self) -> u64 {
        self.illegal_instructions
    }

    pub fn read_byte(&self, address: u16) -> u8 {
        self.space.read_byte(address)
    }

    pub fn memory_dump(&self, start: u16, end: u16) -> String {
        self.space.dump(start, end)
    }

    pub fn vram_dump(&self) -> String {
        let vram = self.space.video.vram();
        compact_hexdump(vram, 0, (vram.len() - 1) as u16)
    }

    pub fn memory_map(&self) -> Vec<MemorySegment> {
        self.space.memory_map()
    }

    pub fn disassemble(&self, start: u16, count: usize) -> Vec<ProgramEntry> {
        disassemble(&self.space, start, count)
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::new(MachineConfig::default())
    }
}

impl ReportState for Machine {
    fn report_state(&self) -> InternalState {
        let regs = &self.cpu.regs;
        let instruction = Instruction::parse_at(&self.space, regs.pc);
        InternalState {
            a: regs.a,
            f: regs.f(),
            b: regs.b,
            c: regs.c,
            d: regs.d,
            e: regs.e,
            h: regs.h,
            l: regs.l,
            sp: regs.sp,
            pc: regs.pc,
            ime: self.cpu.ime,
            halted: self.cpu.halted,
            hl_contents: self.space.read_byte(regs.hl()),
            opcode: instruction.opcode,
            instruction: instruction.name(),
            ly: self.space.video.ly(),
            cycles: self.cycles,
        }
    }
}

#[derive(Default)]
pub struct MachineBuilder {
    config: MachineConfig,
    image: Option<Vec<u8>>,
}

impl MachineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(&mut self, config: MachineConfig) -> &mut Self {
        self.config = config;
        self
    }

    pub fn power_on(&mut self, power_on: PowerOn) -> &mut Self {
        self.config.power_on = power_on;
        self
    }

    pub fn shades(&mut self, shades: [u32; 4]) -> &mut Self {
        self.config.shades = shades;
        self
    }

    pub fn rom(&mut self, image: &[u8]) -> &mut Self {
        self.image = Some(image.to_vec());
        self
    }

    pub fn build(&self) -> Result<Machine, LoadError> {
        let mut machine = Machine::new(self.config.clone());
        if let Some(image) = &self.image {
            machine.load_image(image)?;
        }
        Ok(machine)
    }
}
