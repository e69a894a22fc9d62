pub mod article;
pub mod batch;
pub mod logging;
pub mod schedule;

#[cfg(test)]
mod testing;

pub use article::{ArticlePostProcessor, ProcessOutcome};
pub use batch::{BatchProcessor, RunSummary};
pub use logging::{init_logging, Environment};
pub use schedule::{parse_schedule, run_scheduled};

pub mod prelude {
    pub use super::article::{ArticlePostProcessor, ProcessOutcome};
    pub use super::batch::{BatchProcessor, RunSummary};
    pub use super::logging::Environment;
    pub use gn_core::{Error, Result};
}
