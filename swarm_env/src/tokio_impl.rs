//! Realtime implementation of SwarmContext using Tokio.

use crate::SwarmContext;
use async_trait::async_trait;
use std::time::{Duration, Instant};

/// Realtime context backed by Tokio's clock.
///
/// Time comes from the system monotonic clock, measured from creation.
pub struct TokioContext {
    start: Instant,
}

impl TokioContext {
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }
}

impl Default for TokioContext {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SwarmContext for TokioContext {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tokio_context_time() {
        let ctx = TokioContext::new();
        let t1 = ctx.now();
        ctx.sleep(Duration::from_millis(10)).await;
        let t2 = ctx.now();

        assert!(t2 > t1);
        assert!(t2 - t1 >= Duration::from_millis(10));
    }
}
