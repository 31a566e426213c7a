//! rename-n-sort Domain Layer
//!
//! This crate defines the vocabulary shared by every other layer: the three
//! kinds of file decision the system asks a text-generation backend for, the
//! requests that carry their semantic payload, and the `Transport` trait that
//! every backend adapter implements.
//!
//! ## Key Concepts
//!
//! - **Task**: one semantic request (`Rename`, `StemAction`, `Sort`)
//! - **Decision**: the typed, sanitized answer to a task
//! - **Transport**: an adapter that sends one prompt to one backend
//! - **Failure kinds**: the classification the engine's retry policy keys on
//!
//! ## Architecture
//!
//! - No external crate dependencies
//! - No I/O; backends live in `rns-llm`, orchestration in `rns-engine`

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod decision;
pub mod request;
pub mod traits;

// Re-exports for convenience
pub use decision::{Decision, RenameResult, SortResult, StemAction, StemActionResult};
pub use request::{
    FileDescriptor, FileMetadata, RenameRequest, SortRequest, StemActionRequest, Task,
};
pub use traits::{FailureKind, Transport, TransportError};
