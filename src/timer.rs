use crate::bus::Interrupt;

pub const DIV: u16 = 0xFF04;
pub const TIMA: u16 = 0xFF05;
pub const TMA: u16 = 0xFF06;
pub const TAC: u16 = 0xFF07;

/// DIV/TIMA/TMA/TAC.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Timer {
    /// Free running 16-bit counter; DIV is its upper byte.
    divider: u16,
    counter: u8,
    modulo: u8,
    control: u8,
    /// Cycles accumulated towards the next TIMA increment.
    accumulated: u32,
    pub interrupt: u8,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn enabled(&self) -> bool {
        self.control & 0x04 != 0
    }

    /// Cycles per TIMA increment for the selected input clock.
    fn period(&self) -> u32 {
        match self.control & 0x03 {
            0 => 1024,
            1 => 16,
            2 => 64,
            _ => 256,
        }
    }

    pub fn read(&self, address: u16) -> u8 {
        match address {
            DIV => (self.divider >> 8) as u8,
            TIMA => self.counter,
            TMA => self.modulo,
            TAC => 0xF8 | self.control,
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, address: u16, value: u8) {
        match address {
            DIV => {
                self.divider = 0;
                self.accumulated = 0;
            }
            TIMA => self.counter = value,
            TMA => self.modulo = value,
            TAC => {
                self.control = value & 0x07;
                tracing::trace!(
                    "[TIMER] TAC = {:#04X} (enabled: {}, period: {})",
                    value,
                    self.enabled(),
                    self.period()
                );
            }
            _ => {}
        }
    }

    pub fn clock(&mut self, cycles: u32) {
        self.divider = self.divider.wrapping_add(cycles as u16);

        if !self.enabled() {
            return;
        }

        self.accumulated += cycles;
        let period = self.period();
        while self.accumulated >= period {
            self.accumulated -= period;
            let (counter, overflow) = self.counter.overflowing_add(1);
            if overflow {
                self.counter = self.modulo;
                self.interrupt |= Interrupt::Timer.mask();
            } else {
                self.counter = counter;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_divider() {
        let mut timer = Timer::new();

        timer.clock(255);
        assert_eq!(timer.read(DIV), 0);
        timer.clock(1);
        assert_eq!(timer.read(DIV), 1);
        timer.clock(256);
        assert_eq!(timer.read(DIV), 2);

        timer.write(DIV, 0x77);
        assert_eq!(timer.read(DIV), 0);
    }

    #[test]
    fn test_counter_disabled_by_default() {
        let mut timer = Timer::new();
        timer.clock(4096);
        assert_eq!(timer.read(TIMA), 0);
        assert_eq!(timer.read(TAC), 0xF8);
    }

    #[test]
    fn test_timer_overflow() {
        let mut timer = Timer::new();

        timer.write(TAC, 0x05);
        timer.write(TIMA, 0xFF);
        timer.write(TMA, 0x80);

        timer.clock(15);
        assert_eq!(timer.read(TIMA), 0xFF);
        timer.clock(1);
        assert_eq!(timer.read(TIMA), 0x80);
        assert_eq!(timer.interrupt, Interrupt::Timer.mask());
    }

    #[test]
    fn test_input_clock_selection() {
        let mut timer = Timer::new();
        timer.write(TAC, 0x04);
        timer.clock(1024 * 3);
        assert_eq!(timer.read(TIMA), 3);

        timer.write(TAC, 0x06);
        timer.clock(64 * 5);
        assert_eq!(timer.read(TIMA), 8);
    }
}
