//! Trace data model
//!
//! - **transfer**: transfer records and their kinds
//! - **reader**: the upstream [`LogReader`] interface and an in-memory reader
//! - **strata**: per-stratum counters with varint packing
//! - **instant**: point-in-time summaries built from strata
//!
//! # Geometry
//!
//! ```text
//! log bytes:      |---- TIMESTEP_SIZE ----|---- TIMESTEP_SIZE ----| ...
//! address space:  |BLOCK|BLOCK|BLOCK| ... (raw snapshots, wblocks table)
//!                 |------- STRATUM -------|------- STRATUM -------| (counters)
//! ```
//!
//! The three sizes are compiled in and recorded in every store; a store built
//! with different sizes is discarded on open.

pub mod instant;
pub mod reader;
pub mod strata;
pub mod transfer;

pub use instant::LogInstant;
pub use reader::{LogReader, MemoryLogReader, MEMORY_RECORD_HEADER};
pub use strata::LogStrata;
pub use transfer::{Transfer, TransferType};

/// Log bytes consumed between committed timesteps
pub const TIMESTEP_SIZE: u64 = 16 * 1024;

/// Address bytes per snapshot block
pub const BLOCK_SIZE: u64 = 1024;

/// Address bytes per stratum counter
pub const STRATUM_SIZE: u64 = 64 * 1024;

/// Number of strata needed to cover `mem_size` bytes of address space
pub fn strata_count(mem_size: u64) -> usize {
    mem_size.div_ceil(STRATUM_SIZE).max(1) as usize
}
