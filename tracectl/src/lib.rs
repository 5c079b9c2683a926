// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Run-time control of log levels.
//!
//! Every crate declares the log target(s) it emits to with [`trace_target!`].  The declarations
//! are gathered at link time, so the full set of targets is known before the first event is logged, and levels can be changed
//! per target or per tag while the process runs.

pub mod control;
pub mod targets;

pub use control::{LogControl, TraceCtlError, get_trace_ctl};
pub use tracing_subscriber::filter::LevelFilter;
