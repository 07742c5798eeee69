//! Simulation context implementing SwarmContext for deterministic runs.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use swarm_env::SwarmContext;

/// Simulation context backed by a virtual clock.
///
/// `sleep` advances the clock instead of waiting, so a thousand-step run
/// at 30 Hz finishes as fast as the engine can compute it while still
/// reporting consistent timestamps. Clones share the clock.
#[derive(Debug, Clone, Default)]
pub struct SimContext {
    clock_ns: Arc<AtomicU64>,
}

impl SimContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance_time(&self, duration: Duration) {
        self.clock_ns.fetch_add(duration.as_nanos() as u64, Ordering::SeqCst);
    }

    /// Jumps the clock to an absolute time.
    pub fn set_time(&self, time_ns: u64) {
        self.clock_ns.store(time_ns, Ordering::SeqCst);
    }

    pub fn time_ns(&self) -> u64 {
        self.clock_ns.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SwarmContext for SimContext {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.time_ns())
    }

    async fn sleep(&self, duration: Duration) {
        self.advance_time(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sim_context_time() {
        let ctx = SimContext::new();
        assert_eq!(ctx.now(), Duration::ZERO);

        ctx.advance_time(Duration::from_secs(1));
        assert_eq!(ctx.now(), Duration::from_secs(1));

        ctx.advance_time(Duration::from_millis(500));
        assert_eq!(ctx.now(), Duration::from_millis(1500));

        ctx.set_time(7);
        assert_eq!(ctx.time_ns(), 7);
    }

    #[tokio::test]
    async fn test_sleep_advances_virtual_clock() {
        let ctx = SimContext::new();
        ctx.sleep(Duration::from_millis(33)).await;
        ctx.sleep(Duration::from_millis(33)).await;
        assert_eq!(ctx.now(), Duration::from_millis(66));
    }

    #[test]
    fn test_sim_context_clone_shares_time() {
        let ctx1 = SimContext::new();
        let ctx2 = ctx1.clone();

        ctx1.advance_time(Duration::from_secs(5));
        assert_eq!(ctx2.now(), Duration::from_secs(5));
    }
}
