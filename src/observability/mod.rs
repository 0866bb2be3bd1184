// Observability: structured logging and in-process metrics

pub mod logging;
pub mod metrics;

// Re-export main functions for ease of use
pub use logging::init_logging;
pub use metrics::{init_metrics, render_metrics};
