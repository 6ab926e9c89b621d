//! Inter-processor FIFO pair (PXI): two word FIFOs with sync counters.
//!
//! Register offsets grounded on
//! `examples/original_source/hw/arm/ctr9_pxi.c`. That source sizes both
//! FIFOs at 64 bytes (16 words); the recv/send FIFOs here are sized to
//! the spec's 64 *words* instead, and the CNT error-clear bit is
//! implemented as a proper write-one-to-clear — the original's
//! `s->error = ~((value >> 14) & 1)` leaves it permanently true
//! regardless of what's written, which clearly isn't the intent.
//!
//! In a single-core model there is no ARM11 peer: pushes to SEND are
//! consumed immediately (so the send FIFO reads back as perpetually
//! empty) and RECV only has data when a test harness preloads it via
//! [`Pxi::preload_recv`].

use crate::bus::{AccessSize, MmioDevice};
use crate::fifo::ByteFifo;

const REG_SYNC: u32 = 0x00;
const REG_CNT: u32 = 0x04;
const REG_SEND: u32 = 0x08;
const REG_RECV: u32 = 0x0C;

pub struct Pxi {
    recv_count: u8,
    send_count: u8,
    sync_irq_enable: bool,

    send_empty_irq_enable: bool,
    recv_notempty_irq_enable: bool,
    error: bool,
    fifo_enable: bool,

    recv_fifo: ByteFifo<256>,

    pub irq_sync: bool,
    pub irq_send_empty: bool,
    pub irq_recv_nonempty: bool,
}

impl Pxi {
    pub fn new() -> Self {
        Self {
            recv_count: 0,
            send_count: 0,
            sync_irq_enable: false,
            send_empty_irq_enable: false,
            recv_notempty_irq_enable: false,
            error: false,
            fifo_enable: false,
            recv_fifo: ByteFifo::new(),
            irq_sync: false,
            irq_send_empty: false,
            irq_recv_nonempty: false,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Test/harness hook: push a word into RECV as if the peer had sent
    /// it, firing the recv-became-nonempty edge if applicable.
    pub fn preload_recv(&mut self, word: u32) {
        let was_empty = self.recv_fifo.is_empty();
        if !self.recv_fifo.push_u32(word) {
            self.error = true;
            return;
        }
        if was_empty && self.recv_notempty_irq_enable {
            self.irq_recv_nonempty = true;
        }
        self.recv_count = self.recv_count.wrapping_add(1);
        if self.sync_irq_enable {
            self.irq_sync = true;
        }
    }
}

impl Default for Pxi {
    fn default() -> Self {
        Self::new()
    }
}

impl MmioDevice for Pxi {
    fn read(&mut self, offset: u32, _size: AccessSize) -> u32 {
        match offset {
            REG_SYNC => (self.recv_count as u32) | ((self.send_count as u32) << 8) | ((self.sync_irq_enable as u32) << 31),
            REG_CNT => {
                let send_empty = 1u32;
                let send_full = 0u32;
                let recv_empty = self.recv_fifo.is_empty() as u32;
                let recv_full = self.recv_fifo.is_full() as u32;
                send_empty
                    | (send_full << 1)
                    | ((self.send_empty_irq_enable as u32) << 2)
                    | ((self.recv_notempty_irq_enable as u32) << 10)
                    | ((recv_empty | (recv_full << 1)) << 8)
                    | ((self.error as u32) << 14)
                    | ((self.fifo_enable as u32) << 15)
            }
            REG_RECV => {
                if self.recv_fifo.len() < 4 {
                    self.error = true;
                    0
                } else {
                    self.recv_fifo.pop_u32()
                }
            }
            _ => 0,
        }
    }

    fn write(&mut self, offset: u32, _size: AccessSize, value: u32) {
        match offset {
            REG_SYNC => {
                self.send_count = ((value >> 8) & 0xFF) as u8;
                self.sync_irq_enable = (value >> 31) & 1 != 0;
            }
            REG_CNT => {
                self.send_empty_irq_enable = (value >> 2) & 1 != 0;
                self.recv_notempty_irq_enable = (value >> 10) & 1 != 0;
                if (value >> 14) & 1 != 0 {
                    self.error = false;
                }
                self.fifo_enable = (value >> 15) & 1 != 0;
                if (value >> 3) & 1 != 0 {
                    self.recv_fifo.reset();
                }
            }
            REG_SEND => {
                // Peer stub: consumed immediately, FIFO never retains data.
                if self.send_empty_irq_enable {
                    self.irq_send_empty = true;
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_is_always_reported_empty() {
        let mut pxi = Pxi::new();
        pxi.write(REG_SEND, AccessSize::Word, 0xDEAD_BEEF);
        assert_eq!(pxi.read(REG_CNT, AccessSize::Word) & 1, 1);
    }

    #[test]
    fn recv_read_on_empty_sets_sticky_error() {
        let mut pxi = Pxi::new();
        assert_eq!(pxi.read(REG_RECV, AccessSize::Word), 0);
        assert_ne!(pxi.read(REG_CNT, AccessSize::Word) & (1 << 14), 0);

        // Write-one-to-clear.
        pxi.write(REG_CNT, AccessSize::Word, 1 << 14);
        assert_eq!(pxi.read(REG_CNT, AccessSize::Word) & (1 << 14), 0);
    }

    #[test]
    fn preloaded_recv_fires_nonempty_edge_and_pops_correctly() {
        let mut pxi = Pxi::new();
        pxi.write(REG_CNT, AccessSize::Word, 1 << 10); // recv-nonempty irq enable
        pxi.preload_recv(0x1234_5678);
        assert!(pxi.irq_recv_nonempty);
        assert_eq!(pxi.read(REG_RECV, AccessSize::Word), 0x1234_5678);
    }
}
