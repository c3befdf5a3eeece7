//! TickerLake Silver: incremental orchestration of the Silver layer.
//!
//! This crate builds on `tickerlake-core` to provide:
//! - TOML pipeline configuration
//! - Split detection and per-ticker rewrite planning
//! - The run state machine and its transition guards
//! - Batched aggregation and indicator phases
//! - Checkpoint commit and run reports

pub mod batch;
pub mod config;
pub mod pipeline;
pub mod plan;
pub mod report;
pub mod state;

pub use batch::{batches, Batch};
pub use config::{BatchConfig, ConfigError, PipelineConfig};
pub use pipeline::{PipelineError, SilverPipeline};
pub use plan::{
    plan_run, DetectionInput, RewriteGranularity, RewriteReason, Route, RunMode, RunPlan,
};
pub use report::{BatchFailure, RunOutcome, RunReport, SkipReason, SkippedTicker};
pub use state::{BatchPhase, RunState, RunStateMachine, TransitionError};
