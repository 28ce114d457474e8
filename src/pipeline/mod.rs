//! File-intake pipeline.
//!
//! Every inbox file flows through:
//! 1. `rules::classify()` — extension-based disposition (no I/O)
//! 2. `FileProcessor::process_file()` — deliver → convert → archive
//! 3. `BatchRunner::process_all()` — one sequential pass over the inbox
//!
//! **Nothing here returns an error to the caller.** Each step logs its own
//! failure and the pipeline moves on.

pub mod batch;
pub mod processor;
pub mod rules;
pub mod types;

pub use batch::BatchRunner;
pub use processor::FileProcessor;
pub use types::{BatchSummary, Disposition, FileReport};
