//! Resume capability for crawls
//!
//! Provides persistent checkpoint state with atomic writes and file locking,
//! and the shared store the crawl engine records progress through.

pub mod checkpoint;
pub mod state;

pub use checkpoint::{CheckpointStore, Claim, FlushPolicy};
pub use state::{CheckpointState, ResumeError};
