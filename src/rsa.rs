//! RSA engine: four keyslots (modulus + variable-length exponent) and a
//! shared text buffer for raw modular exponentiation.
//!
//! Register map and the right-aligned fixed-width buffer convention are
//! grounded on `examples/original_source/hw/arm/ctr9_rsa.c`. The modular
//! exponentiation itself uses `rsa::BigUint::modpow`, the same crate and
//! API `tock-tock/capsules/rsa_sw` depends on for its own RSA operations.

use crate::bus::{AccessSize, MmioDevice};
use crate::fifo::ByteFifo;
use rsa::BigUint;

const REG_CNT: u32 = 0x000;
const REG_UNK: u32 = 0x0F0;
const REG_SLOT0: u32 = 0x100;
const REG_SLOT3_END: u32 = 0x140;
const SLOT_STRIDE: u32 = 0x10;
const SLOT_CNT_OFF: u32 = 0x00;
const SLOT_SIZE_OFF: u32 = 0x04;
const REG_EXPFIFO: u32 = 0x200;
const REG_MOD: u32 = 0x400;
const REG_MOD_END: u32 = 0x500;
const REG_TXT: u32 = 0x800;
const REG_TXT_END: u32 = 0x900;

const BUFFER_SIZE: usize = 0x100;

#[derive(Debug, Clone)]
struct Keyslot {
    set: bool,
    key_wr_protect: bool,
    slot_size: u32,
    exp: [u8; BUFFER_SIZE],
    modulus: [u8; BUFFER_SIZE],
}

impl Keyslot {
    fn new() -> Self {
        Self {
            set: false,
            key_wr_protect: false,
            slot_size: 0,
            exp: [0; BUFFER_SIZE],
            modulus: [0; BUFFER_SIZE],
        }
    }
}

pub struct RsaEngine {
    irq_enable: bool,
    keyslot: u8,
    endian: bool,
    order: bool,
    unk: u32,
    keyslots: [Keyslot; 4],
    text: [u8; BUFFER_SIZE],
    exp_fifo: ByteFifo<256>,
    pub irq_pending: bool,
}

impl RsaEngine {
    pub fn new() -> Self {
        Self {
            irq_enable: false,
            keyslot: 0,
            endian: false,
            order: false,
            unk: 0,
            keyslots: std::array::from_fn(|_| Keyslot::new()),
            text: [0; BUFFER_SIZE],
            exp_fifo: ByteFifo::new(),
            irq_pending: false,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    fn run(&mut self) {
        let slot = &self.keyslots[self.keyslot as usize];
        let size = (slot.slot_size as usize * 4).min(BUFFER_SIZE);
        if size == 0 {
            return;
        }
        let start = BUFFER_SIZE - size;

        let modulus = BigUint::from_bytes_be(&slot.modulus[start..]);
        let exponent = BigUint::from_bytes_be(&slot.exp[start..]);
        let plain = BigUint::from_bytes_be(&self.text[start..]);

        if modulus == BigUint::from(0u32) || exponent == BigUint::from(0u32) || plain == BigUint::from(0u32) {
            return;
        }

        let cipher = plain.modpow(&exponent, &modulus);
        let cipher_bytes = cipher.to_bytes_be();
        let pad = size - cipher_bytes.len();

        self.text[start..start + pad].fill(0);
        self.text[start + pad..start + size].copy_from_slice(&cipher_bytes);
    }
}

impl Default for RsaEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MmioDevice for RsaEngine {
    fn read(&mut self, offset: u32, size: AccessSize) -> u32 {
        if offset < REG_CNT + 4 {
            return (self.irq_enable as u32) << 1 | ((self.keyslot as u32) << 4) | ((self.endian as u32) << 8) | ((self.order as u32) << 9);
        }
        if (REG_UNK..REG_UNK + 4).contains(&offset) {
            return self.unk;
        }
        if (REG_SLOT0..REG_SLOT3_END).contains(&offset) {
            let rel = offset - REG_SLOT0;
            let idx = (rel / SLOT_STRIDE) as usize;
            let slot_off = rel % SLOT_STRIDE;
            let slot = &self.keyslots[idx];
            return match slot_off {
                SLOT_CNT_OFF => (slot.set as u32) | ((slot.key_wr_protect as u32) << 1),
                SLOT_SIZE_OFF => slot.slot_size,
                _ => 0,
            };
        }
        if (REG_TXT..REG_TXT_END).contains(&offset) {
            let off = (offset - REG_TXT) as usize;
            let n = size.bytes();
            if off + n > BUFFER_SIZE {
                return 0;
            }
            let mut buf = [0u8; 4];
            buf[..n].copy_from_slice(&self.text[off..off + n]);
            return u32::from_le_bytes(buf);
        }
        0
    }

    fn write(&mut self, offset: u32, size: AccessSize, value: u32) {
        if offset < REG_CNT + 4 {
            let enable = value & 1 != 0;
            self.irq_enable = (value >> 1) & 1 != 0;
            self.keyslot = ((value >> 4) & 0x3) as u8;
            self.endian = (value >> 8) & 1 != 0;
            self.order = (value >> 9) & 1 != 0;
            if enable {
                self.run();
                if self.irq_enable {
                    self.irq_pending = true;
                }
            }
            return;
        }
        if (REG_UNK..REG_UNK + 4).contains(&offset) {
            self.unk = value;
            return;
        }
        if (REG_SLOT0..REG_SLOT3_END).contains(&offset) {
            let rel = offset - REG_SLOT0;
            let idx = (rel / SLOT_STRIDE) as usize;
            let slot_off = rel % SLOT_STRIDE;
            let slot = &mut self.keyslots[idx];
            match slot_off {
                SLOT_CNT_OFF => {
                    slot.set = value & 1 != 0;
                    slot.key_wr_protect = (value >> 1) & 1 != 0;
                    if !slot.set {
                        self.exp_fifo.reset();
                    }
                }
                SLOT_SIZE_OFF => slot.slot_size = value,
                _ => {}
            }
            return;
        }
        if (REG_EXPFIFO..REG_EXPFIFO + 4).contains(&offset) {
            self.exp_fifo.push_u32(value);
            let len = self.exp_fifo.len();
            self.keyslots[self.keyslot as usize].slot_size = (len / 4) as u32;
            if len == 0x80 || len == 0x100 {
                let snapshot = self.exp_fifo.snapshot();
                let start = BUFFER_SIZE - len;
                self.keyslots[self.keyslot as usize].exp[start..].copy_from_slice(&snapshot);
                self.keyslots[self.keyslot as usize].set = true;
            }
            return;
        }
        if (REG_MOD..REG_MOD_END).contains(&offset) {
            let off = (offset - REG_MOD) as usize;
            let n = size.bytes();
            if off + n > BUFFER_SIZE {
                return;
            }
            let slot = &mut self.keyslots[self.keyslot as usize];
            let bytes = value.to_le_bytes();
            slot.modulus[off..off + n].copy_from_slice(&bytes[..n]);
            return;
        }
        if (REG_TXT..REG_TXT_END).contains(&offset) {
            let off = (offset - REG_TXT) as usize;
            let n = size.bytes();
            if off + n > BUFFER_SIZE {
                return;
            }
            let bytes = value.to_le_bytes();
            self.text[off..off + n].copy_from_slice(&bytes[..n]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_word(e: &mut RsaEngine, reg: u32, value: u32) {
        e.write(reg, AccessSize::Word, value);
    }

    #[test]
    fn modexp_round_trip_small_numbers() {
        let mut rsa = RsaEngine::new();
        // 0x20-word (0x80-byte) slot, modulus = 143 (11*13), exponent = 7,
        // both right-aligned in their fixed-width buffers; loaded directly
        // to keep the test focused on `run()` rather than FIFO byte order.
        rsa.keyslots[0].slot_size = 0x20;
        rsa.keyslots[0].modulus[0xFF] = 143;
        rsa.keyslots[0].exp[0xFF] = 7;
        rsa.write(REG_TXT + 0xFF, AccessSize::Byte, 2);

        write_word(&mut rsa, REG_CNT, 1);

        let out = rsa.read(REG_TXT + 0xFF, AccessSize::Byte);
        // 2^7 mod 143 = 128.
        assert_eq!(out, 128);
    }

    #[test]
    fn expfifo_completion_marks_slot_set() {
        let mut rsa = RsaEngine::new();
        for _ in 0..32 {
            write_word(&mut rsa, REG_EXPFIFO, 0);
        }
        assert!(rsa.keyslots[0].set);
        assert_eq!(rsa.keyslots[0].slot_size, 0x20);
    }

    #[test]
    fn zero_modulus_leaves_text_untouched() {
        let mut rsa = RsaEngine::new();
        write_word(&mut rsa, REG_SLOT0 + SLOT_SIZE_OFF, 0x20);
        rsa.write(REG_TXT + 0xFF, AccessSize::Byte, 9);
        write_word(&mut rsa, REG_CNT, 1);
        assert_eq!(rsa.read(REG_TXT + 0xFF, AccessSize::Byte), 9);
    }
}
