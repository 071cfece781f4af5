//! Configuration, run summary, and error classification.

pub mod configuration;
pub mod error;
pub mod logging;
pub mod summary;

pub use configuration::PipelineConfiguration;
pub use error::{exit_code_for, PipelineError};
pub use logging::init_logging;
pub use summary::{PartitionLossReason, RunSummary};
