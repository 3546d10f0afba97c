//! docscribe-worker: background execution for documentation update runs.
//!
//! Hosts the agent outside the serving process: picks up pending runs,
//! executes them under a hard time limit with retry on transient failures,
//! and runs the recurring maintenance jobs (cleanup, index verification,
//! dependency rebuild, health checks).

pub mod config;
pub mod jobs;
pub mod logging;
pub mod maintenance;
pub mod retry;
pub mod scheduler;

pub use config::WorkerConfig;
pub use jobs::{process_query_job, JobContext, JobError};
pub use scheduler::Worker;
