//! Job tracking for background pipeline runs.
//!
//! - `state`: Job record and step state machine
//! - `tracker`: Shared in-memory table of jobs

pub mod state;
pub mod tracker;

pub use state::{CreatedRecords, Job, JobResult, JobStatus, JobStep, StepState, StepStatus};
pub use tracker::JobTracker;
