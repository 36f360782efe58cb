#![deny(missing_docs)]

//! Core library for the Rusty Ingest document pipeline.

/// Environment-driven configuration management.
pub mod config;
/// Paragraph and Markdown section extraction strategies.
pub mod extract;
/// Structured logging and tracing setup.
pub mod logging;
/// Pipeline activity counters.
pub mod metrics;
/// Backlog, worker pool and fan-in buffer.
pub mod pipeline;
/// Local, remote and in-memory item sources.
pub mod source;
