//! Thin CLI driver: load configuration, construct the board, and step its
//! timers for a bounded run. There is no CPU emulator in this crate (out
//! of scope per the device model's external-interfaces boundary); this
//! binary exists to exercise `Board` end to end the way the teacher's
//! `main.rs` boots its emulator core before handing off to the GUI event
//! loop, minus the GUI.

use arm9_core::board::Board;
use arm9_core::bus::AccessSize;
use arm9_core::config::BoardConfig;

fn main() {
    env_logger::init();

    let config = BoardConfig::load();
    log::info!(
        "starting arm9-core board: data_dir={}, ram_size={} bytes",
        config.data_dir.display(),
        config.ram_size
    );

    let mut board = Board::new(&config);

    const STEPS: u32 = 1000;
    const CYCLES_PER_STEP: u32 = 1024;
    for step in 0..STEPS {
        board.tick(CYCLES_PER_STEP);
        if board.cpu_irq() {
            log::debug!("step {step}: CPU IRQ line asserted");
        }
    }

    // Touch the handshake register the way ARM9 boot code would while
    // waiting on the (unmodeled) application core.
    let handshake = 0x1FFF_FFF0;
    board.write(handshake, AccessSize::Word, 1);
    log::info!("handshake register reads back {:#x}", board.read(handshake, AccessSize::Word));

    config.save();
}
