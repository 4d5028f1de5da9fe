// src/lib.rs

//! taskpipe: a plugin pipeline executor.
//!
//! A [`pipeline::Pipeline`] drives a task through an ordered chain of
//! plugins resolved from a [`registry::Registry`], while supporting three
//! forms of asynchronous intervention:
//!
//! - external stop (`stop(false)`)
//! - cooperative scheduling preemption (`stop(true)`, source plugins only)
//! - hot swap of a running plugin (registry update → rerun of that index)
//!
//! Execution statistics are published on bounded channels with
//! drop-on-full semantics and drained into a [`stats::StatsSink`] by
//! background aggregators; an orderly `stop` waits for both drains.

pub mod config;
pub mod errors;
pub mod logging;
pub mod pipeline;
pub mod plugin;
pub mod registry;
pub mod stats;
pub mod task;
