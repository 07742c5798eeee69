//! Swarm Environment Abstraction Layer
//!
//! This crate lets the swarm step loop run against either a **Realtime**
//! (tokio) clock or a **Simulation** (virtual) clock without changing the
//! engine.
//!
//! # Core Concept
//!
//! Everything the loop needs from the outside world goes through a trait:
//! - Time (`now()`, `sleep()`)
//! - Operator events (`OperatorLink::try_recv()` / `recv()`)
//!
//! Randomness is not part of the context: every subsystem takes its RNG
//! from `stream_rng(seed, stream)`, so a run is reproducible from its seed
//! number under either clock.
//!
//! # Example
//!
//! ```ignore
//! use swarm_env::{SwarmContext, OperatorLink};
//!
//! async fn tick_loop<Ctx: SwarmContext, L: OperatorLink<Event>>(ctx: &Ctx, link: &L) {
//!     loop {
//!         while let Ok(Some(event)) = link.try_recv() {
//!             apply(event);
//!         }
//!         step();
//!         ctx.sleep(Duration::from_millis(33)).await;
//!     }
//! }
//! ```

mod context;
mod operator;
mod types;
mod error;
mod tokio_impl;

pub use context::{derive_stream_seed, stream_rng, SwarmContext};
pub use operator::{operator_channel, ChannelOperatorLink, OperatorHandle, OperatorLink};
pub use types::RunId;
pub use error::EnvError;
pub use tokio_impl::TokioContext;
