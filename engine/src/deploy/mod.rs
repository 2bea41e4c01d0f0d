//! Deployment execution: build and transfer phases, pipeline, log plumbing

pub mod build;
pub mod git;
pub mod languages;
pub mod pipeline;
pub mod sink;
pub mod transfer;
pub mod workspace;

/// Outcome of one completed phase
#[derive(Debug, Clone, Copy)]
pub struct PhaseReport {
    /// Elapsed phase time in whole seconds
    pub elapsed_secs: i64,
}
