pub mod bus;
pub mod cartridge;
pub mod clock;
pub mod config;
pub mod cpu;
pub mod instruction;
pub mod internal_state;
pub mod machine;
pub mod registers;
pub mod renderer;
pub mod timer;
pub mod utils;
pub mod video;

use std::sync::Once;

pub use bus::{AddressSpace, Interrupt, MemorySegment, Region};
pub use cartridge::{Cartridge, LoadError};
pub use config::{MachineConfig, PowerOn};
pub use cpu::{Cpu, IllegalInstruction, MemoryBus};
pub use instruction::{Instruction, ProgramEntry};
pub use internal_state::{InternalState, ReportState};
pub use machine::{Machine, MachineBuilder, MachineEvent};
pub use registers::{Flag, Registers};
pub use renderer::Renderer;
pub use utils::{compact_hexdump, hexdump};
pub use video::{FrameBuffer, VideoUnit};
use wasm_bindgen::prelude::*;

static INIT: Once = Once::new();

fn init_wasm() {
    INIT.call_once(|| {
        console_error_panic_hook::set_once();
        tracing_wasm::set_as_global_default();
    });
}

#[wasm_bindgen(js_name = Machine)]
pub struct JsMachine(Machine);

#[wasm_bindgen(js_class = Machine)]
impl JsMachine {
    #[wasm_bindgen(constructor)]
    pub fn new(rom_data: &[u8]) -> Result<JsMachine, JsValue> {
        init_wasm();

        MachineBuilder::new()
            .power_on(PowerOn::PostBoot)
            .rom(rom_data)
            .build()
            .map(Self)
            .map_err(|err| JsValue::from_str(&err.to_string()))
    }

    #[wasm_bindgen(getter)]
    pub fn pc(&self) -> u16 {
        self.0.pc()
    }

    #[wasm_bindgen(getter)]
    pub fn ly(&self) -> u8 {
        self.0.space.video.ly()
    }

    #[wasm_bindgen(getter = frameCount)]
    pub fn frame_count(&self) -> u32 {
        self.0.frame_count() as u32
    }

    pub fn step(&mut self) -> u32 {
        self.0.step()
    }

    pub fn step_for(&mut self, cycles: u32) -> u32 {
        self.0.step_for(cycles as u64) as u32
    }

    pub fn step_frame(&mut self) -> bool {
        self.0.step_frame()
    }

    pub fn reset(&mut self) {
        self.0.reset();
    }

    /// 160x144 RGBA pixels of the last completed frame.
    pub fn frame_rgba(&self) -> Vec<u8> {
        self.0.frame_rgba()
    }

    #[wasm_bindgen(getter)]
    pub fn vram(&self) -> Vec<u8> {
        self.0.space.video.vram().to_vec()
    }

    #[wasm_bindgen(getter)]
    pub fn text(&self) -> String {
        self.0.space.video.frame().as_ascii()
    }

    #[wasm_bindgen(getter)]
    pub fn state(&self) -> String {
        self.0.report_state().to_string()
    }
}
