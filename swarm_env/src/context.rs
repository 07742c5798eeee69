//! Core environment context trait for the swarm step loop.

use async_trait::async_trait;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::time::Duration;

/// Mixes a master seed with a stream id so each subsystem gets its own
/// reproducible RNG stream.
pub fn derive_stream_seed(master_seed: u64, stream: u64) -> u64 {
    master_seed
        .wrapping_mul(0x9e3779b97f4a7c15)
        .wrapping_add(stream.wrapping_mul(0x517cc1b727220a95))
}

/// Builds the RNG for one subsystem stream of a run.
///
/// # Arguments
/// * `master_seed` - The run's seed
/// * `stream` - A value combined with the master seed
pub fn stream_rng(master_seed: u64, stream: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(derive_stream_seed(master_seed, stream))
}

/// The central interface for environment interaction.
///
/// # Implementations
///
/// - **Realtime**: `TokioContext` - wraps `tokio::time`
/// - **Simulation**: `SimContext` (in `swarm_sim`) - virtual clock advanced per tick
///
/// # Determinism
///
/// The context supplies time only. Randomness comes from `stream_rng`
/// keyed by the run's seed, so swapping the clock never changes a swarm.
#[async_trait]
pub trait SwarmContext: Send + Sync + 'static {
    /// Returns the current monotonic time since context creation.
    ///
    /// In simulation, this is the virtual clock time.
    fn now(&self) -> Duration;

    /// Suspends execution for the given duration.
    ///
    /// In realtime: wraps `tokio::time::sleep`
    /// In simulation: advances the virtual clock
    async fn sleep(&self, duration: Duration);
}
