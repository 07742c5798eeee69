//! Swarm Simulation Harness
//!
//! Runs the swarm engine against a controlled environment:
//! - **Time**: a virtual clock advanced once per tick (`SimContext`), or the
//!   realtime tokio clock for interactive sessions
//! - **Operator**: scripted events delivered at exact step boundaries, or
//!   live commands over an `OperatorLink`
//! - **Randomness**: every stream derived from a single 64-bit seed
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                  ScenarioRunner                      │
//! │  params(seed) + script ──► Simulation ──► StepRecord │
//! │                                │             │       │
//! │                       invariant checks   SimExport   │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use swarm_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42).run(ScenarioId::Bowtie);
//! assert!(result.passed);
//! ```

mod context;
mod commands;
mod driver;
mod exporter;
mod runner;
pub mod scenarios;

pub use commands::parse_command;
pub use context::SimContext;
pub use driver::{drive, DriveError};
pub use exporter::SimExport;
pub use runner::{drive_scripted, ScenarioMetrics, ScenarioResult, ScenarioRunner};
