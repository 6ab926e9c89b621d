//! `Board`: owns every device, installs the address map, and wires IRQ
//! lines and NDMA startup sources between them.
//!
//! Grounded on `c64_emu/c64.rs`'s `C64` struct — owns every chip/bank as a
//! concrete field, implements a single bus dispatch point, and is the one
//! place wiring between chips (CIA timers to IRQ lines, VIC-II to RAM)
//! happens. Address ranges and IRQ/startup-source assignments are taken
//! directly from spec.md §6.
//!
//! Devices that only the CPU touches are installed straight into the
//! shared [`AddressSpace`] as boxed trait objects. Devices the board also
//! needs typed access to (for cross-device wiring, or because their API
//! takes `&mut AddressSpace` themselves, like NDMA) are wrapped in
//! `Rc<RefCell<_>>`; the same handle is installed into the address space
//! through a thin forwarding adapter, so CPU-facing dispatch and board-side
//! wiring always observe the same state.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use crate::aes::AesEngine;
use crate::bus::{AccessSize, AddressSpace, MmioDevice, RamDevice};
use crate::config::BoardConfig;
use crate::hid::Hid;
use crate::lcd::Lcd;
use crate::ndma::Ndma;
use crate::pic::{IrqLine, Pic};
use crate::pit::Pit;
use crate::prng::Prng;
use crate::pxi::Pxi;
use crate::rsa::RsaEngine;
use crate::sdmmc::Sdmmc;
use crate::sha::ShaEngine;

const ITCM_BASE: u32 = 0x0000_0000;
const ITCM_SIZE: u32 = 32 * 1024;
const ITCM_ALIAS_BASE: u32 = 0x01FF_8000;
const INTERNAL_RAM_BASE: u32 = 0x0800_0000;
const INTERNAL_RAM_SIZE: u32 = 1024 * 1024;
const PIC_BASE: u32 = 0x1000_1000;
const PIC_SIZE: u32 = 4096;
const NDMA_BASE: u32 = 0x1000_2000;
const NDMA_SIZE: u32 = 4096;
const PIT_BASE: u32 = 0x1000_3000;
const PIT_SIZE: u32 = 16;
const SDMMC_BASE: u32 = 0x1000_6000;
const SDMMC_SIZE: u32 = 512;
const PXI_BASE: u32 = 0x1000_8000;
const PXI_SIZE: u32 = 512;
const AES_BASE: u32 = 0x1000_9000;
const AES_SIZE: u32 = 512;
const SHA_BASE: u32 = 0x1000_A000;
const SHA_SIZE: u32 = 256;
const RSA_BASE: u32 = 0x1000_B000;
const RSA_SIZE: u32 = 4096;
/// No fixed offset is given in the retained board-init excerpt of the
/// original source; this free 4 KiB slot adjacent to NDMA in the ARM9
/// peripheral region is as good as any (DESIGN.md).
const PRNG_BASE: u32 = 0x1001_1000;
const PRNG_SIZE: u32 = 4;
const HID_BASE: u32 = 0x1014_6000;
const HID_SIZE: u32 = 4;
const LCD_BASE: u32 = 0x1040_0000;
const LCD_SIZE: u32 = 4;
const VRAM_BASE: u32 = 0x1800_0000;
const VRAM_SIZE: u32 = 6 * 1024 * 1024;
const DSP_RAM_BASE: u32 = 0x1FF0_0000;
const DSP_RAM_SIZE: u32 = 512 * 1024;
const AXI_WRAM_BASE: u32 = 0x1FF8_0000;
const AXI_WRAM_SIZE: u32 = 512 * 1024;
const HANDSHAKE_BASE: u32 = 0x1FFF_FFF0;
const HANDSHAKE_SIZE: u32 = 4;
const FCRAM_BASE: u32 = 0x2000_0000;
const DTCM_BASE: u32 = 0x2800_8000;
const DTCM_SIZE: u32 = 16 * 1024;
const BOOTROM_BASE: u32 = 0xFFFF_0000;
const BOOTROM_SIZE: u32 = 64 * 1024;

const IRQ_TIMER: [u32; 4] = [8, 9, 10, 11];
const IRQ_PXI_SYNC: u32 = 12;
const IRQ_PXI_SEND_EMPTY: u32 = 13;
const IRQ_PXI_RECV_NONEMPTY: u32 = 14;
const IRQ_AES: u32 = 15;
const IRQ_SDIO1: u32 = 16;
const IRQ_RSA: u32 = 22;

const STARTUP_AES_WRFIFO: u8 = 8;
const STARTUP_AES_RDFIFO: u8 = 9;

/// Forwards an `MmioDevice` window to a device also held directly by the
/// board, so the same state backs both the CPU-facing address space and
/// whatever typed access the board needs for wiring.
struct Shared<T>(Rc<RefCell<T>>);

impl<T: MmioDevice> MmioDevice for Shared<T> {
    fn read(&mut self, offset: u32, size: AccessSize) -> u32 {
        self.0.borrow_mut().read(offset, size)
    }

    fn write(&mut self, offset: u32, size: AccessSize, value: u32) {
        self.0.borrow_mut().write(offset, size, value)
    }
}

/// `reading after writing value=1 must return 3` (spec.md §6); any other
/// write is a no-op. Models the companion application core only as far as
/// the ARM9 boot code's handshake poll requires.
#[derive(Default)]
struct Handshake {
    val: u32,
}

impl MmioDevice for Handshake {
    fn read(&mut self, _offset: u32, _size: AccessSize) -> u32 {
        self.val
    }

    fn write(&mut self, _offset: u32, _size: AccessSize, value: u32) {
        if value == 1 {
            self.val = 3;
        }
    }
}

fn load_file_into(space: &mut AddressSpace, base: u32, path: &Path) {
    match std::fs::read(path) {
        Ok(bytes) => space.write_bytes(base, &bytes),
        Err(e) => eprintln!("[board] could not load {}: {e}", path.display()),
    }
}

pub struct Board {
    space: AddressSpace,
    lines: [IrqLine; 32],
    pic: Rc<RefCell<Pic>>,
    pit: Rc<RefCell<Pit>>,
    ndma: Rc<RefCell<Ndma>>,
    aes: Rc<RefCell<AesEngine>>,
    sha: Rc<RefCell<ShaEngine>>,
    rsa: Rc<RefCell<RsaEngine>>,
    pxi: Rc<RefCell<Pxi>>,
    sdmmc: Rc<RefCell<Sdmmc>>,
    lcd: Rc<RefCell<Lcd>>,
    hid: Rc<RefCell<Hid>>,
    prng: Rc<RefCell<Prng>>,
}

impl Board {
    pub fn new(config: &BoardConfig) -> Self {
        let pic = Rc::new(RefCell::new(Pic::new()));
        let pit = Rc::new(RefCell::new(Pit::new(config.pit_base_frequency)));
        let ndma = Rc::new(RefCell::new(Ndma::new()));
        let aes = Rc::new(RefCell::new(AesEngine::new()));
        let sha = Rc::new(RefCell::new(ShaEngine::new()));
        let rsa = Rc::new(RefCell::new(RsaEngine::new()));
        let pxi = Rc::new(RefCell::new(Pxi::new()));
        let sdmmc = Rc::new(RefCell::new(Sdmmc::new()));
        let lcd = Rc::new(RefCell::new(Lcd::new()));
        let hid = Rc::new(RefCell::new(Hid::new()));
        let prng = Rc::new(RefCell::new(Prng::new(config.prng_seed)));

        let data_dir = config.data_dir.clone();
        sdmmc
            .borrow_mut()
            .card_mut(0)
            .attach_backing_file(&data_dir.join("sd.bin"));
        sdmmc
            .borrow_mut()
            .card_mut(1)
            .attach_backing_file(&data_dir.join("nand.bin"));
        match std::fs::read(data_dir.join("extcsd.bin")) {
            Ok(bytes) => sdmmc.borrow_mut().card_mut(1).set_extcsd(bytes),
            Err(e) => eprintln!("[board] could not load extcsd.bin: {e}"),
        }
        match std::fs::read(data_dir.join("sdmmc_info.bin")) {
            Ok(bytes) => sdmmc.borrow_mut().load_info_blob(&bytes),
            Err(e) => eprintln!("[board] could not load sdmmc_info.bin: {e}"),
        }

        let mut space = AddressSpace::new();

        space.install(ITCM_BASE, ITCM_SIZE, Box::new(RamDevice::new(ITCM_SIZE as usize)));
        load_file_into(&mut space, ITCM_BASE, &data_dir.join("itcm.bin"));
        // The real ITCM alias shares physical storage with the primary
        // mapping; here it's a second window loaded from the same file at
        // boot but not kept coherent with runtime writes to the primary
        // window (DESIGN.md: no aliasing support in `AddressSpace`).
        space.install(ITCM_ALIAS_BASE, ITCM_SIZE, Box::new(RamDevice::new(ITCM_SIZE as usize)));
        load_file_into(&mut space, ITCM_ALIAS_BASE, &data_dir.join("itcm.bin"));

        space.install(INTERNAL_RAM_BASE, INTERNAL_RAM_SIZE, Box::new(RamDevice::new(INTERNAL_RAM_SIZE as usize)));

        space.install(PIC_BASE, PIC_SIZE, Box::new(Shared(pic.clone())));
        space.install(NDMA_BASE, NDMA_SIZE, Box::new(Shared(ndma.clone())));
        space.install(PIT_BASE, PIT_SIZE, Box::new(Shared(pit.clone())));
        space.install(SDMMC_BASE, SDMMC_SIZE, Box::new(Shared(sdmmc.clone())));
        space.install(PXI_BASE, PXI_SIZE, Box::new(Shared(pxi.clone())));
        space.install(AES_BASE, AES_SIZE, Box::new(Shared(aes.clone())));
        space.install(SHA_BASE, SHA_SIZE, Box::new(Shared(sha.clone())));
        space.install(RSA_BASE, RSA_SIZE, Box::new(Shared(rsa.clone())));
        space.install(PRNG_BASE, PRNG_SIZE, Box::new(Shared(prng.clone())));
        space.install(HID_BASE, HID_SIZE, Box::new(Shared(hid.clone())));
        space.install(LCD_BASE, LCD_SIZE, Box::new(Shared(lcd.clone())));

        space.install(VRAM_BASE, VRAM_SIZE, Box::new(RamDevice::new(VRAM_SIZE as usize)));
        space.install(DSP_RAM_BASE, DSP_RAM_SIZE, Box::new(RamDevice::new(DSP_RAM_SIZE as usize)));
        space.install(AXI_WRAM_BASE, AXI_WRAM_SIZE, Box::new(RamDevice::new(AXI_WRAM_SIZE as usize)));
        space.install(HANDSHAKE_BASE, HANDSHAKE_SIZE, Box::new(Handshake::default()));
        space.install(FCRAM_BASE, config.ram_size, Box::new(RamDevice::new(config.ram_size as usize)));
        space.install(DTCM_BASE, DTCM_SIZE, Box::new(RamDevice::new(DTCM_SIZE as usize)));

        let bootrom = match std::fs::read(data_dir.join("qemu_ctr_bootrom9.bin")) {
            Ok(bytes) => bytes,
            Err(e) => {
                eprintln!("[board] could not load qemu_ctr_bootrom9.bin: {e}");
                vec![0; BOOTROM_SIZE as usize]
            }
        };
        space.install(BOOTROM_BASE, BOOTROM_SIZE, Box::new(RamDevice::rom(bootrom)));

        lcd.borrow().write_draw_info(&mut space);
        let lines = pic.borrow().connect();

        Self {
            space,
            lines,
            pic,
            pit,
            ndma,
            aes,
            sha,
            rsa,
            pxi,
            sdmmc,
            lcd,
            hid,
            prng,
        }
    }

    pub fn read(&mut self, addr: u32, size: AccessSize) -> u32 {
        self.space.read(addr, size)
    }

    pub fn write(&mut self, addr: u32, size: AccessSize, value: u32) {
        self.space.write(addr, size, value);
        self.drain_ndma_immediate();
        self.service_edges();
    }

    /// Advance the PIT by `base_cycles` cycles and route any timer that
    /// reached zero to its PIC line (spec.md §6: timers 0..3 → lines 8..11).
    pub fn tick(&mut self, base_cycles: u32) {
        self.pit.borrow_mut().tick(base_cycles);
        let pulses = self.pit.borrow().irq_pulses;
        for (i, pulse) in pulses.into_iter().enumerate() {
            if pulse {
                self.raise(self.lines[IRQ_TIMER[i] as usize]);
            }
        }
    }

    /// Host key-down/key-up events, forwarded straight to the keypad.
    pub fn key_down(&mut self, scancode: u8) {
        self.hid.borrow_mut().key_down(scancode);
    }

    pub fn key_up(&mut self, scancode: u8) {
        self.hid.borrow_mut().key_up(scancode);
    }

    /// Composite both screens into a host-ready RGBA8888 surface.
    pub fn blit(&mut self) -> Vec<u32> {
        self.lcd.borrow().blit(&mut self.space)
    }

    pub fn cpu_irq(&self) -> bool {
        self.pic.borrow().cpu_irq
    }

    /// Raise one of the PIC's 32 input lines, routed through the typed
    /// handle `Pic::connect` hands out rather than a bare line number.
    fn raise(&mut self, line: IrqLine) {
        self.pic.borrow_mut().set_line(line.index(), true);
    }

    fn drain_ndma_immediate(&mut self) {
        let result = self
            .ndma
            .borrow_mut()
            .drain_immediate(&mut self.space)
            .unwrap_or_else(|e| panic!("{e}"));
        for ch in result.irq_channels {
            self.raise(self.lines[ch]);
        }
    }

    fn fire_ndma_startup(&mut self, source: u8) {
        let result = self
            .ndma
            .borrow_mut()
            .fire_startup(source, &mut self.space)
            .unwrap_or_else(|e| panic!("{e}"));
        for ch in result.irq_channels {
            self.raise(self.lines[ch]);
        }
    }

    /// Forward sticky device-side interrupt/edge flags to the PIC and to
    /// NDMA's startup sources, re-polling until a pass finds nothing new:
    /// firing NDMA for an AES FIFO-available edge can itself feed AES
    /// another block and raise the same edge again before this write
    /// returns (spec.md §4.3's re-entrancy case), so one pass isn't enough.
    fn service_edges(&mut self) {
        const MAX_PASSES: usize = 64;
        for _ in 0..MAX_PASSES {
            let mut progressed = false;

            let (aes_irq, aes_wr, aes_rd) = {
                let mut aes = self.aes.borrow_mut();
                let edges = (aes.irq_pending, aes.ndma_wrfifo_available, aes.ndma_rdfifo_available);
                aes.irq_pending = false;
                aes.ndma_wrfifo_available = false;
                aes.ndma_rdfifo_available = false;
                edges
            };
            if aes_irq {
                self.raise(self.lines[IRQ_AES as usize]);
                progressed = true;
            }
            if aes_wr {
                self.fire_ndma_startup(STARTUP_AES_WRFIFO);
                progressed = true;
            }
            if aes_rd {
                self.fire_ndma_startup(STARTUP_AES_RDFIFO);
                progressed = true;
            }

            let rsa_irq = std::mem::take(&mut self.rsa.borrow_mut().irq_pending);
            if rsa_irq {
                self.raise(self.lines[IRQ_RSA as usize]);
                progressed = true;
            }

            let (pxi_sync, pxi_send, pxi_recv) = {
                let mut pxi = self.pxi.borrow_mut();
                let edges = (pxi.irq_sync, pxi.irq_send_empty, pxi.irq_recv_nonempty);
                pxi.irq_sync = false;
                pxi.irq_send_empty = false;
                pxi.irq_recv_nonempty = false;
                edges
            };
            if pxi_sync {
                self.raise(self.lines[IRQ_PXI_SYNC as usize]);
                progressed = true;
            }
            if pxi_send {
                self.raise(self.lines[IRQ_PXI_SEND_EMPTY as usize]);
                progressed = true;
            }
            if pxi_recv {
                self.raise(self.lines[IRQ_PXI_RECV_NONEMPTY as usize]);
                progressed = true;
            }

            let sdmmc_irq = std::mem::take(&mut self.sdmmc.borrow_mut().irq_pending);
            if sdmmc_irq {
                self.raise(self.lines[IRQ_SDIO1 as usize]);
                progressed = true;
            }

            if !progressed {
                return;
            }
        }
        log::warn!("service_edges did not converge after {MAX_PASSES} passes");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_board() -> Board {
        let mut dir = std::env::temp_dir();
        dir.push(format!("arm9_core_board_test_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let config = BoardConfig {
            data_dir: dir,
            ram_size: 0x10000,
            pit_base_frequency: 1_000_000,
            prng_seed: 1,
        };
        Board::new(&config)
    }

    #[test]
    fn handshake_register_returns_three_after_write_one() {
        let mut board = test_board();
        assert_eq!(board.read(HANDSHAKE_BASE, AccessSize::Word), 0);
        board.write(HANDSHAKE_BASE, AccessSize::Word, 1);
        assert_eq!(board.read(HANDSHAKE_BASE, AccessSize::Word), 3);
        board.write(HANDSHAKE_BASE, AccessSize::Word, 99);
        assert_eq!(board.read(HANDSHAKE_BASE, AccessSize::Word), 3);
    }

    #[test]
    fn timer_zero_crossing_asserts_pic_line_eight() {
        let mut board = test_board();
        // Timer 0: timer mode, prescaler 0, irq enabled, started, counter 0.
        board.write(PIT_BASE + 0x02, AccessSize::Half, 0b1100_0000);
        board.write(PIT_BASE, AccessSize::Half, 0xFFFF);
        board.tick(0x10000);
        assert!(board.pic.borrow().pending() & (1 << 8) != 0);
    }

    #[test]
    fn ndma_immediate_copy_through_board_dispatch_preserves_source() {
        let mut board = test_board();
        let pattern: [u32; 4] = [0x1111_1111, 0x2222_2222, 0x3333_3333, 0x4444_4444];
        let src = FCRAM_BASE;
        let dst = FCRAM_BASE + 0x1000;
        for (i, word) in pattern.iter().enumerate() {
            board.write(src + (i as u32) * 4, AccessSize::Word, *word);
        }

        let ch_base = NDMA_BASE + 0x04;
        board.write(ch_base, AccessSize::Word, src);
        board.write(ch_base + 0x04, AccessSize::Word, dst);
        board.write(ch_base + 0x08, AccessSize::Word, 16);
        board.write(ch_base + 0x0C, AccessSize::Word, 16);
        let cnt = (4u32 << 16) | (1 << 28) | (1 << 31); // block_size=4, immediate, enable
        board.write(ch_base + 0x18, AccessSize::Word, cnt);

        for (i, word) in pattern.iter().enumerate() {
            assert_eq!(board.read(dst + (i as u32) * 4, AccessSize::Word), *word);
            assert_eq!(board.read(src + (i as u32) * 4, AccessSize::Word), *word);
        }
    }

    #[test]
    fn aes_startup_edge_is_armed_after_start() {
        let mut board = test_board();
        board.write(AES_BASE + 0x10, AccessSize::Byte, 0); // REG_KEYSEL
        board.write(AES_BASE, AccessSize::Word, 1 << 26); // latch active key
        board.write(AES_BASE + 0x06, AccessSize::Half, 1); // block count lo
        let start_cnt = (7u32 << 27) | (1 << 31); // ECB-encrypt, start
        board.write(AES_BASE, AccessSize::Word, start_cnt);

        // begin_start() armed ndma_wrfifo_available; service_edges (run
        // after every board write) should have drained it by now since no
        // NDMA channel listens on source 8 in this test.
        assert!(!board.aes.borrow().ndma_wrfifo_available);
    }
}
