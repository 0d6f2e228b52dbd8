use gbcore::{
    clock::{Mode, CYCLES_PER_FRAME, DOTS_PER_LINE, DRAW_DOTS, OAM_SCAN_DOTS},
    AddressSpace, PowerOn, VideoUnit,
};
use tracing_subscriber::fmt;

#[cfg(test)]
#[ctor::ctor]
fn init() {
    let fmt_subscriber = fmt::Subscriber::builder()
        .with_max_level(tracing::Level::DEBUG)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(fmt_subscriber)
        .expect("Unable to set global tracing subscriber");
}

const VBLANK_START: u32 = 144 * DOTS_PER_LINE;

#[test]
fn test_one_scanline_renders_one_row() {
    let mut video = VideoUnit::new(PowerOn::PostBoot);

    video.advance(DOTS_PER_LINE);
    assert_eq!(video.lines_rendered(), 1);
    assert_eq!(video.ly(), 1);
    assert_eq!(video.mode(), Mode::OamScan);
}

#[test]
fn test_line_renders_on_entering_hblank() {
    let mut video = VideoUnit::new(PowerOn::PostBoot);

    video.advance(OAM_SCAN_DOTS + DRAW_DOTS - 1);
    assert_eq!(video.mode(), Mode::Drawing);
    assert_eq!(video.lines_rendered(), 0);

    video.advance(1);
    assert_eq!(video.mode(), Mode::HBlank);
    assert_eq!(video.lines_rendered(), 1);
}

#[test]
fn test_small_steps_match_one_big_step() {
    let mut stepped = VideoUnit::new(PowerOn::PostBoot);
    let mut jumped = stepped.clone();

    for _ in 0..(3 * DOTS_PER_LINE + 100) / 4 {
        stepped.advance(4);
    }
    jumped.advance(3 * DOTS_PER_LINE + 100);

    assert_eq!(stepped.ly(), jumped.ly());
    assert_eq!(stepped.mode(), jumped.mode());
    assert_eq!(stepped.lines_rendered(), jumped.lines_rendered());
    assert_eq!(stepped.timing_info(), jumped.timing_info());
}

#[test]
fn test_no_frame_before_line_144() {
    let mut video = VideoUnit::new(PowerOn::PostBoot);

    video.advance(VBLANK_START - 1);
    assert!(!video.frame_ready());
    assert_eq!(video.ly(), 143);
    assert_eq!(video.lines_rendered(), 144);
    assert_eq!(video.interrupt & 0x01, 0);

    video.advance(1);
    assert!(video.frame_ready());
    assert_eq!(video.ly(), 144);
    assert_eq!(video.mode(), Mode::VBlank);
    assert_eq!(video.interrupt & 0x01, 0x01);
    assert_eq!(video.frames(), 1);
}

#[test]
fn test_full_frames() {
    let mut video = VideoUnit::new(PowerOn::PostBoot);

    video.advance(CYCLES_PER_FRAME);
    assert_eq!(video.frames(), 1);
    assert_eq!(video.ly(), 0);
    assert_eq!(video.lines_rendered(), 144);
    assert_eq!(video.timing_info().frame_count, 1);
    assert_eq!(video.timing_info().total_cycles, CYCLES_PER_FRAME as u64);

    video.advance(CYCLES_PER_FRAME);
    assert_eq!(video.frames(), 2);
    assert_eq!(video.lines_rendered(), 288);
}

#[test]
fn test_lcd_off_never_presents() {
    let mut video = VideoUnit::new(PowerOn::Zeroed);

    video.advance(2 * CYCLES_PER_FRAME);
    assert_eq!(video.frames(), 0);
    assert_eq!(video.lines_rendered(), 0);
    assert_eq!(video.ly(), 0);
    assert!(!video.frame_ready());
}

#[test]
fn test_vblank_reaches_interrupt_flag() {
    let mut space = AddressSpace::new(PowerOn::PostBoot);
    space.write_byte(0xFF0F, 0x00);
    assert_eq!(space.read_byte(0xFF0F), 0xE0);

    space.advance(VBLANK_START - 4);
    assert_eq!(space.read_byte(0xFF0F), 0xE0);
    space.advance(4);
    assert_eq!(space.read_byte(0xFF0F), 0xE1);
    assert_eq!(space.read_byte(0xFF44), 144);
}

#[test]
fn test_lyc_match_raises_stat_interrupt() {
    let mut space = AddressSpace::new(PowerOn::PostBoot);
    space.write_byte(0xFF45, 2);
    space.write_byte(0xFF41, 0x40);
    space.write_byte(0xFF0F, 0x00);

    space.advance(2 * DOTS_PER_LINE - 4);
    assert_eq!(space.read_byte(0xFF0F) & 0x02, 0);
    assert_eq!(space.read_byte(0xFF41) & 0x04, 0);

    space.advance(4);
    assert_eq!(space.read_byte(0xFF0F) & 0x02, 0x02);
    assert_eq!(space.read_byte(0xFF41) & 0x04, 0x04);
}

#[test]
fn test_timer_overflow_reaches_interrupt_flag() {
    let mut space = AddressSpace::new(PowerOn::Zeroed);
    space.write_byte(0xFF06, 0xF0);
    space.write_byte(0xFF05, 0xFF);
    // enabled, 16 cycles per tick
    space.write_byte(0xFF07, 0x05);

    space.advance(15);
    assert_eq!(space.read_byte(0xFF0F), 0xE0);
    space.advance(1);
    assert_eq!(space.read_byte(0xFF05), 0xF0);
    assert_eq!(space.read_byte(0xFF0F), 0xE4);
}
