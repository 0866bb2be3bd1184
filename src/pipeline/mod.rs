// Data processing pipeline: ingestion, processing, and the task runners that chain them

pub mod ingestion;
pub mod processing;
pub mod tasks;

// Re-export key types and functions from each stage
pub use ingestion::{RawTable, SourceSchema};
pub use processing::{clean, merge, normalize, states};
