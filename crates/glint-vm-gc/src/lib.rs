//! # Glint VM GC
//!
//! Garbage collector contract for the Glint execution engine.
//!
//! The engine's object model addresses the heap through 16-bit
//! [`CompactPtr`] offsets rather than native pointers, so that the whole
//! object graph fits inside a bounded arena (512 KiB by default — see
//! [`GcConfig`]). This crate owns the arena and the collection policy; it
//! does not know what a `JsObject` or a `Value` is. `glint-vm-core` embeds
//! a [`GcHeader`] in every heap cell and implements [`GcCell`] so that this
//! crate can drive allocation, reference counting, and mark-sweep over
//! cells it never needs to downcast.
//!
//! Two complementary reclamation paths are provided:
//!
//! - **Reference counting** is the fast path: [`Heap::dec_ref`] frees a
//!   cell immediately once its count reaches zero, *unless* a mark phase
//!   is in progress (a cell may be revived as reachable before sweep).
//! - **Mark-and-sweep** is the correctness backstop for cycles: a
//!   [`Collector`] walks from an explicit root set (owned by the
//!   embedder, since only it knows the roots) and [`Heap::sweep`] frees
//!   every cell that the walk did not reach, independent of its
//!   reference count.

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod collector;
pub mod error;
pub mod header;
pub mod heap;
pub mod ptr;

pub use collector::Collector;
pub use error::GcError;
pub use header::{GcHeader, MarkColor};
pub use heap::{GcCell, Heap, HeapStats};
pub use ptr::CompactPtr;

/// Default heap budget in bytes: a 512 KiB ceiling that keeps a 16-bit
/// compact pointer sufficient to address every live cell.
pub const DEFAULT_HEAP_BYTES: usize = 512 * 1024;

/// Tunable knobs for a [`Heap`] / [`Collector`] pair.
///
/// Mirrors the shape of a production GC config struct (young/old
/// generation sizing, trigger ratios): there is only one generation here,
/// but the same fields the rest of the ecosystem configures a collector
/// with are present so the embedder has one place to look.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GcConfig {
    /// Total heap budget in bytes across every typed sub-heap.
    pub heap_bytes: usize,
    /// Fraction of `heap_bytes` that must be in use before the embedder's
    /// allocation path should request a collection.
    pub gc_trigger_ratio: f64,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            heap_bytes: DEFAULT_HEAP_BYTES,
            gc_trigger_ratio: 0.75,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_512_kib_budget() {
        let config = GcConfig::default();
        assert_eq!(config.heap_bytes, 512 * 1024);
        assert!(config.gc_trigger_ratio > 0.0 && config.gc_trigger_ratio < 1.0);
    }
}
