//! Error types for the swarm environment abstraction.

use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Error)]
pub enum EnvError {
    /// The operator channel has been closed by its sender side
    #[error("Operator link closed")]
    LinkClosed,

    /// The operator channel is full and the event was not queued
    #[error("Operator link full: {0}")]
    LinkFull(String),
}
