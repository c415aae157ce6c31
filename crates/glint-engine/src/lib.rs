//! Embeddable host surface for the Glint execution engine.
//!
//! This crate is the thing an embedder links against: it owns an
//! [`engine::Engine`] (a [`glint_vm_core::Context`] plus the pieces that
//! cannot live inside `glint-vm-core` without giving it a dependency on
//! the compiler), and exposes parsing, running, direct evaluation,
//! value marshalling, and snapshot persistence as a small set of plain
//! functions and methods rather than the raw VM internals.
#![warn(clippy::all)]

pub mod engine;
pub mod error;
pub mod port;
pub mod snapshot;
pub mod value;

pub use engine::{Engine, EngineFlags};
pub use error::{EngineError, EngineResult};
pub use port::{HostPort, LogLevel, StdPort};
