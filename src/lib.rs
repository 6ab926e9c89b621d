//! ARM9 security co-processor device model: a collection of independent
//! MMIO peripherals (PIC, PIT, NDMA, AES, SHA, RSA, PXI, SDMMC, LCD blit,
//! HID) sharing one [`bus::AddressSpace`], wired together by [`board::Board`].

pub mod aes;
pub mod board;
pub mod bus;
pub mod config;
pub mod error;
pub mod fifo;
pub mod hid;
pub mod lcd;
pub mod ndma;
pub mod pic;
pub mod pit;
pub mod prng;
pub mod pxi;
pub mod rsa;
pub mod sdmmc;
pub mod sha;
