/// DMG dot timing constants
pub const CPU_CLOCK_HZ: u32 = 4_194_304;
pub const DOTS_PER_LINE: u32 = 456;
pub const LINES_PER_FRAME: u32 = 154;
pub const VISIBLE_LINES: u32 = 144;
pub const OAM_SCAN_DOTS: u32 = 80;
pub const DRAW_DOTS: u32 = 172;
pub const CYCLES_PER_FRAME: u32 = DOTS_PER_LINE * LINES_PER_FRAME;
pub const FRAME_RATE: f64 = CPU_CLOCK_HZ as f64 / CYCLES_PER_FRAME as f64;

/// LCD mode as reported in the low bits of STAT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    HBlank = 0,
    VBlank = 1,
    OamScan = 2,
    Drawing = 3,
}

/// Timing transitions, in the order they happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockEvent {
    LineStart(u8),
    OamScanStart(u8),
    DrawStart(u8),
    HBlankStart(u8),
    VBlankStart,
    FrameEnd,
}

/// Dot clock driving the scanline state machine.
///
/// Visible lines go through OAM scan (80 dots), drawing (172 dots) and
/// HBlank (the rest of the 456-dot line). Lines 144 to 153 are VBlank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clock {
    total_cycles: u64,
    line: u32,
    dot: u32,
    frame_count: u64,
    mode: Mode,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            total_cycles: 0,
            line: 0,
            dot: 0,
            frame_count: 0,
            mode: Mode::OamScan,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Advances by `cycles` dots and returns the transitions crossed, in order.
    pub fn tick(&mut self, cycles: u32) -> Vec<ClockEvent> {
        let mut triggered_events = Vec::new();
        let mut remaining = cycles;

        while remaining > 0 {
            let boundary = self.next_boundary();
            let step = (boundary - self.dot).min(remaining);

            self.dot += step;
            self.total_cycles += step as u64;
            remaining -= step;

            if self.dot == boundary {
                self.transition(&mut triggered_events);
            }
        }

        triggered_events
    }

    /// Dot within the line at which the current mode ends.
    fn next_boundary(&self) -> u32 {
        match self.mode {
            Mode::OamScan => OAM_SCAN_DOTS,
            Mode::Drawing => OAM_SCAN_DOTS + DRAW_DOTS,
            Mode::HBlank | Mode::VBlank => DOTS_PER_LINE,
        }
    }

    fn transition(&mut self, events: &mut Vec<ClockEvent>) {
        let line = self.line as u8;
        match self.mode {
            Mode::OamScan => {
                self.mode = Mode::Drawing;
                events.push(ClockEvent::DrawStart(line));
            }
            Mode::Drawing => {
                self.mode = Mode::HBlank;
                events.push(ClockEvent::HBlankStart(line));
            }
            Mode::HBlank | Mode::VBlank => {
                self.dot = 0;
                self.line += 1;

                if self.line >= LINES_PER_FRAME {
                    self.line = 0;
                    self.frame_count += 1;
                    events.push(ClockEvent::FrameEnd);
                }

                let line = self.line as u8;
                events.push(ClockEvent::LineStart(line));

                if self.line < VISIBLE_LINES {
                    self.mode = Mode::OamScan;
                    events.push(ClockEvent::OamScanStart(line));
                } else if self.line == VISIBLE_LINES {
                    self.mode = Mode::VBlank;
                    events.push(ClockEvent::VBlankStart);
                }
            }
        }
    }

    /// Current line, dot and mode.
    pub fn timing_info(&self) -> TimingInfo {
        TimingInfo {
            total_cycles: self.total_cycles,
            line: self.line,
            dot: self.dot,
            frame_count: self.frame_count,
            mode: self.mode,
        }
    }

    /// Dots left before line 0 starts again.
    pub fn cycles_until_frame_end(&self) -> u32 {
        CYCLES_PER_FRAME - (self.line * DOTS_PER_LINE + self.dot)
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn total_cycles(&self) -> u64 {
        self.total_cycles
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

/// Timing information snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimingInfo {
    pub total_cycles: u64,
    pub line: u32,
    pub dot: u32,
    pub frame_count: u64,
    pub mode: Mode,
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}
