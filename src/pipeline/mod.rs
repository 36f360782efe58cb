//! Concurrent fan-out/fan-in coordination.
//!
//! A [`Pipeline`] seeds a [`Backlog`] with item identifiers, starts a fixed pool of workers that
//! claim items one at a time, and merges every extracted unit into a single [`FanIn`] buffer.
//! The consumer pulls units from the returned [`PipelineRun`]; the sequence ends once every
//! worker has marked itself done and the buffer is empty.

mod backlog;
mod driver;
pub mod fan_in;
mod worker;

pub use backlog::{Backlog, BacklogError};
pub use driver::{
    DEFAULT_WORKERS, Pipeline, PipelineError, PipelineReport, PipelineRun, PipelineSettings,
};
pub use fan_in::{BufferClosed, CompletionTracker, FanIn, Producer};
