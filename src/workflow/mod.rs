//! Workflow orchestration for a bootstrap run.
//!
//! Steps run strictly in order and the first fatal error stops the run. The
//! run report and history line are written whatever the outcome.
mod bootstrap;
mod preflight;

pub use bootstrap::Bootstrapper;
pub use preflight::preflight;
