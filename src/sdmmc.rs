//! Dual-card (SD + eMMC) TMIO-style storage host.
//!
//! Register offsets, magic probe-response constants, and the command
//! dispatch table are taken directly from
//! `examples/original_source/hw/arm/ctr9_sdmmc.c`. One deliberate
//! departure: the original's CMD8/SEND_EXT_CSD handler opens
//! `3ds-data/extcsd.bin` from a hardcoded relative path in the middle of a
//! register write. Here that load happens once, up front, through
//! [`Card::set_extcsd`] — the data directory is already a `Board`/
//! `BoardConfig` concern (see `board.rs`), so a raw `fopen` buried in a
//! write handler would be the odd one out rather than a faithful
//! reproduction.

use crate::bus::{AccessSize, MmioDevice};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

const REG_CMD: u32 = 0x00;
const REG_PORTSEL: u32 = 0x02;
const REG_CMDARG0: u32 = 0x04;
const REG_CMDARG1: u32 = 0x06;
const REG_STOP: u32 = 0x08;
const REG_BLKCOUNT: u32 = 0x0A;
const REG_RESP0: u32 = 0x0C;
const REG_RESP1: u32 = 0x0E;
const REG_RESP2: u32 = 0x10;
const REG_RESP3: u32 = 0x12;
const REG_RESP4: u32 = 0x14;
const REG_RESP5: u32 = 0x16;
const REG_RESP6: u32 = 0x18;
const REG_RESP7: u32 = 0x1A;
const REG_STATUS0: u32 = 0x1C;
const REG_STATUS1: u32 = 0x1E;
const REG_IRQMASK0: u32 = 0x20;
const REG_IRQMASK1: u32 = 0x22;
const REG_CLKCTL: u32 = 0x24;
const REG_OPT: u32 = 0x28;
const REG_FIFO: u32 = 0x30;
const REG_RESET: u32 = 0xE0;
const REG_SDCTL_RESERVED5: u32 = 0xF8;
const REG_DATACTL32: u32 = 0x100;
const REG_SDBLKLEN32: u32 = 0x104;
const REG_SDBLKCOUNT32: u32 = 0x108;
const REG_SDFIFO32: u32 = 0x10C;

const STAT0_CMDRESPEND: u16 = 0x0001;
const STAT0_DATAEND: u16 = 0x0004;
const STAT0_SIGSTATE: u16 = 0x0020;
const STAT0_WRPROTECT: u16 = 0x0080;
const STAT0_SIGSTATE_A: u16 = 0x0400;
const STAT1_CMDTIMEOUT: u16 = 0x0040;
const STAT1_RXRDY: u16 = 0x0100;
const STAT1_TXRQ: u16 = 0x0200;
const STAT1_CMD_BUSY: u16 = 0x4000;

const STATUS0_NORMAL: u16 = STAT0_SIGSTATE | STAT0_WRPROTECT | STAT0_SIGSTATE_A;
const STATUS1_NORMAL: u16 = 0x0080;

const BUFFER_SIZE: usize = 0x1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardState {
    Idle,
    Ready,
    Ident,
    Standby,
    Transfer,
    Read,
    Write,
    Prog,
    Dc,
}

impl CardState {
    fn code(self) -> u32 {
        match self {
            CardState::Idle => 0,
            CardState::Ready => 1,
            CardState::Ident => 2,
            CardState::Standby => 3,
            CardState::Transfer => 4,
            CardState::Read => 5,
            CardState::Write => 6,
            CardState::Prog => 7,
            CardState::Dc => 8,
        }
    }
}

pub struct Card {
    cid: [u32; 4],
    csd: [u32; 4],
    is_sd: bool,
    state: CardState,
    block_len: u32,
    io_block_count: u32,
    io_ptr: u32,
    status: [u16; 2],
    irqmask: [u16; 2],
    ctl32: u32,
    buffer: Box<[u8; BUFFER_SIZE]>,
    ptr: usize,
    backing_file: Option<File>,
    extcsd: Vec<u8>,
}

impl Card {
    fn new(is_sd: bool, irqmask: [u16; 2]) -> Self {
        Self {
            cid: [0; 4],
            csd: [0; 4],
            is_sd,
            state: CardState::Idle,
            block_len: 0,
            io_block_count: 0,
            io_ptr: 0,
            status: [0; 2],
            irqmask,
            ctl32: 0,
            buffer: Box::new([0; BUFFER_SIZE]),
            ptr: 0,
            backing_file: None,
            extcsd: Vec::new(),
        }
    }

    /// Attach (or replace) the backing file. Logs and leaves the card
    /// file-less on failure rather than treating it as fatal — matches
    /// the original's `if (!file) printf(...)` tolerance for a missing
    /// `sd.bin`/`nand.bin`.
    pub fn attach_backing_file(&mut self, path: &Path) {
        match File::options().read(true).write(true).open(path) {
            Ok(f) => self.backing_file = Some(f),
            Err(e) => eprintln!("[sdmmc] could not open {}: {e}", path.display()),
        }
    }

    pub fn set_extcsd(&mut self, data: Vec<u8>) {
        self.extcsd = data;
    }

    pub fn set_cid(&mut self, cid: [u32; 4]) {
        self.cid = cid;
    }

    pub fn set_csd(&mut self, csd: [u32; 4]) {
        self.csd = csd;
    }

    fn read_block(&mut self) {
        if self.io_block_count >= 1 {
            if let Some(file) = self.backing_file.as_mut() {
                let len = self.block_len as usize;
                if file.seek(SeekFrom::Start(self.io_ptr as u64)).is_ok() {
                    let _ = file.read_exact(&mut self.buffer[..len.min(BUFFER_SIZE)]);
                }
            }
            self.ptr = 0;
            self.io_ptr = self.io_ptr.wrapping_add(self.block_len);
            self.io_block_count -= 1;
            self.status[0] = STAT0_CMDRESPEND;
            self.status[1] = STAT1_CMD_BUSY | STAT1_RXRDY;
            self.ctl32 |= 0x100;
        } else {
            self.status[0] = STAT0_CMDRESPEND | STAT0_DATAEND;
            self.status[1] = 0;
            self.ctl32 = 0;
            self.state = CardState::Transfer;
        }
    }

    /// Flush whatever partial block data has accumulated in `buffer` (the
    /// first `ptr` bytes) to the backing file. Used when a write transfer
    /// is cut short by STOP_TRANSMISSION before a full block completes —
    /// without this, those bytes are simply lost.
    fn flush_partial_write(&mut self) {
        if self.state != CardState::Write || self.ptr == 0 {
            return;
        }
        if let Some(file) = self.backing_file.as_mut() {
            let len = self.ptr.min(BUFFER_SIZE);
            if file.seek(SeekFrom::Start(self.io_ptr as u64)).is_ok() {
                let _ = file.write_all(&self.buffer[..len]);
            }
        }
    }

    fn write_block(&mut self) {
        if self.io_block_count >= 1 {
            if let Some(file) = self.backing_file.as_mut() {
                let len = self.block_len as usize;
                if file.seek(SeekFrom::Start(self.io_ptr as u64)).is_ok() {
                    let _ = file.write_all(&self.buffer[..len.min(BUFFER_SIZE)]);
                }
            }
            self.ptr = 0;
            self.io_ptr = self.io_ptr.wrapping_add(self.block_len);
            self.io_block_count -= 1;
            if self.io_block_count > 0 {
                self.status[0] = STAT0_CMDRESPEND;
                self.status[1] = STAT1_CMD_BUSY | STAT1_TXRQ;
                self.ctl32 |= 0x100;
            } else {
                self.status[0] = STAT0_CMDRESPEND | STAT0_DATAEND;
                self.status[1] = 0;
                self.ctl32 = 0;
                self.state = CardState::Transfer;
            }
        } else {
            self.status[0] = STAT0_CMDRESPEND | STAT0_DATAEND;
            self.status[1] = 0;
            self.state = CardState::Ready;
        }
    }
}

fn resp_r1(ret: &mut [u32; 4], card: &Card) {
    ret[0] = (card.state.code() << 1 | 1) << 8;
}

pub struct Sdmmc {
    cards: [Card; 2],
    selected: usize,
    prevcmd: u16,
    cmdarg0: u16,
    cmdarg1: u16,
    ret: [u32; 4],
    pub irq_pending: bool,
}

impl Sdmmc {
    pub fn new() -> Self {
        let sd = Card::new(true, [0x031D, 0x807F]);
        let emmc = Card::new(false, [0x031D, 0x837F]);
        Self {
            cards: [sd, emmc],
            selected: 0,
            prevcmd: 0,
            cmdarg0: 0,
            cmdarg1: 0,
            ret: [0; 4],
            irq_pending: false,
        }
    }

    pub fn reset(&mut self) {
        let sd_extcsd = std::mem::take(&mut self.cards[1].extcsd);
        let sd_file = self.cards[0].backing_file.take();
        let emmc_file = self.cards[1].backing_file.take();
        let sd_cid = self.cards[0].cid;
        let sd_csd = self.cards[0].csd;
        let emmc_cid = self.cards[1].cid;
        let emmc_csd = self.cards[1].csd;
        *self = Self::new();
        self.cards[1].extcsd = sd_extcsd;
        self.cards[0].backing_file = sd_file;
        self.cards[1].backing_file = emmc_file;
        self.cards[0].cid = sd_cid;
        self.cards[0].csd = sd_csd;
        self.cards[1].cid = emmc_cid;
        self.cards[1].csd = emmc_csd;
    }

    /// Card 0 = SD, card 1 = eMMC/NAND.
    pub fn card_mut(&mut self, idx: usize) -> &mut Card {
        &mut self.cards[idx]
    }

    /// Parse the 4x16-byte info blob: NAND-CSD, NAND-CID, SD-CSD, SD-CID.
    pub fn load_info_blob(&mut self, bytes: &[u8]) {
        if bytes.len() < 0x40 {
            eprintln!("[sdmmc] sdmmc_info.bin too short ({} bytes)", bytes.len());
            return;
        }
        let words = |chunk: &[u8]| -> [u32; 4] {
            let mut out = [0u32; 4];
            for i in 0..4 {
                out[i] = u32::from_le_bytes(chunk[i * 4..i * 4 + 4].try_into().unwrap());
            }
            out
        };
        self.cards[1].csd = words(&bytes[0x00..0x10]);
        self.cards[1].cid = words(&bytes[0x10..0x20]);
        self.cards[0].csd = words(&bytes[0x20..0x30]);
        self.cards[0].cid = words(&bytes[0x30..0x40]);
    }

    fn recompute_irq(&mut self) {
        let card = &self.cards[self.selected];
        let active = (card.status[0] & !card.irqmask[0]) != 0 || (card.status[1] & !card.irqmask[1]) != 0;
        if active {
            self.irq_pending = true;
        }
    }

    fn dispatch_command(&mut self, cmd: u8) {
        let arg = (self.cmdarg0 as u32) | ((self.cmdarg1 as u32) << 16);
        let sel = self.selected;
        self.cards[sel].status[0] = 0;
        match cmd {
            0x00 => {
                let c = &mut self.cards[sel];
                c.status[0] = STAT0_CMDRESPEND;
                c.state = CardState::Idle;
            }
            0x01 => {
                self.ret[0] = 0x80FF_8080;
                let c = &mut self.cards[sel];
                c.status[0] = STAT0_CMDRESPEND;
                c.state = CardState::Ready;
            }
            0x02 => {
                let c = &mut self.cards[sel];
                self.ret = c.cid;
                c.status[0] = STAT0_CMDRESPEND;
                c.state = CardState::Ident;
            }
            0x03 => {
                self.ret[0] = if sel != 0 { 1 } else { 0x48 };
                self.cards[sel].status[0] = STAT0_CMDRESPEND;
            }
            0x06 => {
                self.cards[sel].status[0] = STAT0_CMDRESPEND;
                resp_r1(&mut self.ret, &self.cards[sel]);
            }
            0x07 => {
                let c = &mut self.cards[sel];
                c.status[0] = STAT0_CMDRESPEND;
                resp_r1(&mut self.ret, c);
                c.state = CardState::Transfer;
            }
            0x08 => {
                let c = &mut self.cards[sel];
                if c.is_sd {
                    self.ret[0] = arg;
                    c.status[0] = STAT0_CMDRESPEND;
                } else if c.state == CardState::Idle {
                    c.status[0] = STAT0_CMDRESPEND;
                    c.status[1] = STAT1_CMDTIMEOUT;
                } else {
                    c.ptr = 0;
                    c.io_block_count = 0;
                    c.block_len = 0x200;
                    let len = c.extcsd.len().min(0x200).min(BUFFER_SIZE);
                    c.buffer[..len].copy_from_slice(&c.extcsd[..len]);
                    c.status[0] = STAT0_CMDRESPEND;
                    c.status[1] = STAT1_CMD_BUSY | STAT1_RXRDY;
                    c.ctl32 |= 0x100;
                    resp_r1(&mut self.ret, c);
                    c.state = CardState::Read;
                }
            }
            0x09 => {
                let c = &mut self.cards[sel];
                self.ret = c.csd;
                c.status[0] = STAT0_CMDRESPEND;
            }
            0x0A => {
                let c = &mut self.cards[sel];
                self.ret = c.cid;
                c.status[0] = STAT0_CMDRESPEND;
            }
            0x0C => {
                let c = &mut self.cards[sel];
                c.flush_partial_write();
                c.status[0] = STAT0_CMDRESPEND;
                c.state = CardState::Transfer;
                c.ptr = 0;
                c.io_block_count = 0;
                resp_r1(&mut self.ret, c);
            }
            0x0D => {
                self.cards[sel].status[0] = STAT0_CMDRESPEND;
                resp_r1(&mut self.ret, &self.cards[sel]);
            }
            0x10 => {
                let c = &mut self.cards[sel];
                c.block_len = self.cmdarg0 as u32;
                c.status[0] = STAT0_CMDRESPEND;
                resp_r1(&mut self.ret, c);
            }
            0x12 => {
                let c = &mut self.cards[sel];
                c.io_ptr = arg;
                c.state = CardState::Read;
                c.read_block();
                resp_r1(&mut self.ret, c);
            }
            0x19 => {
                let c = &mut self.cards[sel];
                c.ptr = 0;
                c.io_ptr = arg;
                c.state = CardState::Write;
                c.status[0] = STAT0_CMDRESPEND;
                c.status[1] = STAT1_TXRQ;
            }
            55 => {
                let c = &mut self.cards[sel];
                if !c.is_sd {
                    c.status[1] = STAT1_CMDTIMEOUT;
                }
                c.status[0] = STAT0_CMDRESPEND;
            }
            0x46 => {
                let c = &mut self.cards[sel];
                if !c.is_sd {
                    c.status[1] = STAT1_CMDTIMEOUT;
                }
                c.status[0] = STAT0_CMDRESPEND;
            }
            0x69 => {
                let c = &mut self.cards[sel];
                if c.is_sd {
                    self.ret[0] = (0x8000_0000u32 | arg) & !0x4000_0000;
                    c.state = CardState::Ready;
                } else {
                    c.status[1] = STAT1_CMDTIMEOUT;
                }
                c.status[0] = STAT0_CMDRESPEND;
            }
            _ => {}
        }
        self.recompute_irq();
    }
}

impl Default for Sdmmc {
    fn default() -> Self {
        Self::new()
    }
}

impl MmioDevice for Sdmmc {
    fn read(&mut self, offset: u32, size: AccessSize) -> u32 {
        let sel = self.selected;
        match offset {
            REG_CMD => self.prevcmd as u32,
            REG_PORTSEL => sel as u32,
            REG_STATUS0 => {
                let card = &self.cards[sel];
                let mut res = (card.status[0] | STATUS0_NORMAL) as u32;
                if size == AccessSize::Word {
                    res |= ((card.status[1] | STATUS1_NORMAL) as u32) << 16;
                }
                res
            }
            REG_STATUS1 => (self.cards[sel].status[1] | STATUS1_NORMAL) as u32,
            REG_IRQMASK0 => self.cards[sel].irqmask[0] as u32,
            REG_IRQMASK1 => self.cards[sel].irqmask[1] as u32,
            REG_CLKCTL => 0x0300,
            REG_OPT => 0x40EB,
            REG_RESET => 0x0007,
            0x0D8 => 0x1012,
            REG_RESP0 => self.ret[0] & 0xFFFF,
            REG_RESP1 => self.ret[0] >> 16,
            REG_RESP2 => self.ret[1] & 0xFFFF,
            REG_RESP3 => self.ret[1] >> 16,
            REG_RESP4 => self.ret[2] & 0xFFFF,
            REG_RESP5 => self.ret[2] >> 16,
            REG_RESP6 => self.ret[3] & 0xFFFF,
            REG_RESP7 => self.ret[3] >> 16,
            0x38 => 0xC007,
            REG_SDCTL_RESERVED5 => 6,
            0xFA => 7,
            0xFC | 0xFE => 0xFF,
            REG_SDFIFO32 | REG_FIFO => {
                let card = &mut self.cards[sel];
                if card.state == CardState::Read && card.ptr < card.block_len as usize {
                    let n = size.bytes();
                    let mut buf = [0u8; 4];
                    buf[..n].copy_from_slice(&card.buffer[card.ptr..card.ptr + n]);
                    let value = u32::from_le_bytes(buf);
                    card.ptr += n;
                    if card.ptr == card.block_len as usize {
                        card.read_block();
                    }
                    value
                } else {
                    0
                }
            }
            REG_DATACTL32 => self.cards[sel].ctl32 | 2,
            _ => 0,
        }
    }

    fn write(&mut self, offset: u32, size: AccessSize, value: u32) {
        let sel = self.selected;
        match offset {
            REG_CMD => {
                self.prevcmd = value as u16;
                self.dispatch_command((value & 0xFF) as u8);
                // dispatch_command() recomputes irq_pending itself; this is
                // the only path that should.
            }
            REG_CMDARG0 => self.cmdarg0 = value as u16,
            REG_CMDARG1 => self.cmdarg1 = value as u16,
            REG_STOP => {
                if value != 0 {
                    let c = &mut self.cards[sel];
                    c.state = match c.state {
                        CardState::Read | CardState::Write => CardState::Transfer,
                        _ => CardState::Ready,
                    };
                    c.status[1] = 0;
                    resp_r1(&mut self.ret, c);
                }
            }
            REG_BLKCOUNT | REG_SDBLKCOUNT32 => self.cards[sel].io_block_count = value,
            REG_PORTSEL => {
                self.selected = if value & 0x03 == 0 { 0 } else { 1 };
            }
            REG_STATUS0 => self.cards[sel].status[0] &= value as u16,
            REG_STATUS1 => self.cards[sel].status[1] &= value as u16,
            REG_IRQMASK0 => self.cards[sel].irqmask[0] = value as u16,
            REG_IRQMASK1 => self.cards[sel].irqmask[1] = value as u16,
            REG_CLKCTL | REG_OPT | REG_RESET | 0x0D8 => {}
            REG_DATACTL32 => self.cards[sel].ctl32 = value,
            REG_SDBLKLEN32 => self.cards[sel].block_len = value,
            REG_SDFIFO32 | REG_FIFO => {
                let card = &mut self.cards[sel];
                if card.state == CardState::Write && card.ptr < card.block_len as usize {
                    let n = size.bytes();
                    if n == 2 || n == 4 {
                        let bytes = value.to_le_bytes();
                        card.buffer[card.ptr..card.ptr + n].copy_from_slice(&bytes[..n]);
                        card.ptr += n;
                        if card.ptr == card.block_len as usize {
                            card.write_block();
                        }
                    }
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn write_word(s: &mut Sdmmc, reg: u32, value: u32) {
        s.write(reg, AccessSize::Half, value);
    }

    fn issue_cmd(s: &mut Sdmmc, cmd: u8, arg: u32) {
        write_word(s, REG_CMDARG0, arg & 0xFFFF);
        write_word(s, REG_CMDARG1, arg >> 16);
        write_word(s, REG_CMD, cmd as u32);
    }

    #[test]
    fn go_idle_then_send_op_cond_transitions_state() {
        let mut s = Sdmmc::new();
        issue_cmd(&mut s, 0x00, 0);
        assert_eq!(s.cards[0].state, CardState::Idle);
        issue_cmd(&mut s, 0x01, 0);
        assert_eq!(s.cards[0].state, CardState::Ready);
        assert_eq!(s.read(REG_RESP0, AccessSize::Half) | (s.read(REG_RESP1, AccessSize::Half) << 16), 0x80FF_8080);
    }

    #[test]
    fn portsel_switches_selected_card() {
        let mut s = Sdmmc::new();
        write_word(&mut s, REG_PORTSEL, 1);
        assert_eq!(s.selected, 1);
        write_word(&mut s, REG_PORTSEL, 0);
        assert_eq!(s.selected, 0);
    }

    #[test]
    fn acmd41_sets_busy_bit_for_sd_card_only() {
        let mut s = Sdmmc::new();
        issue_cmd(&mut s, 0x69, 0x00FF_8000);
        let resp = s.read(REG_RESP0, AccessSize::Half) | (s.read(REG_RESP1, AccessSize::Half) << 16);
        assert_eq!(resp & 0x8000_0000, 0x8000_0000);
        assert_eq!(resp & 0x4000_0000, 0);

        write_word(&mut s, REG_PORTSEL, 1);
        issue_cmd(&mut s, 0x69, 0);
        assert_ne!(s.cards[1].status[1] & STAT1_CMDTIMEOUT, 0);
    }

    #[test]
    fn cmd16_then_cmd18_reads_multiple_blocks_from_backing_file() {
        let mut path = std::env::temp_dir();
        path.push(format!("sdmmc_test_{}.bin", std::process::id()));
        {
            let mut f = File::create(&path).unwrap();
            let mut data = vec![0u8; 1024];
            for (i, b) in data.iter_mut().enumerate() {
                *b = (i % 256) as u8;
            }
            f.write_all(&data).unwrap();
        }

        let mut s = Sdmmc::new();
        s.card_mut(0).attach_backing_file(&path);

        issue_cmd(&mut s, 0x10, 512); // SET_BLOCKLEN
        assert_eq!(s.cards[0].block_len, 512);

        issue_cmd(&mut s, 0x12, 0); // READ_MULTIPLE_BLOCK at offset 0
        s.cards[0].io_block_count = 2;
        s.cards[0].state = CardState::Read;
        s.cards[0].read_block();

        let first = s.read(REG_FIFO, AccessSize::Half);
        assert_eq!(first & 0xFFFF, 0x0100);

        std::fs::remove_file(&path).ok();
    }
}
