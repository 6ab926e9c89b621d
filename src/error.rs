//! Internal-invariant-violation error taxonomy.
//!
//! Guest programming errors (full-FIFO pushes, zero-modulus RSA, CCM
//! starts) and missing host files are *not* represented here — per the
//! error design they become sticky status bits or empty reads and are
//! logged, never propagated as a `Result`. `CoreError` exists only for
//! conditions the emulator cannot recover from.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("NDMA re-entrant event queue overflowed (capacity {capacity}); transfer aborted")]
    NdmaQueueOverflow { capacity: usize },
}
