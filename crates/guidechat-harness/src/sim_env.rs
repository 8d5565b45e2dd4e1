//! Simulated environment on tokio's clock.

use std::{future::Future, time::Duration};

use guidechat_core::env::Environment;

/// Environment backed by `tokio::time`.
///
/// Under a paused runtime (`start_paused = true`) time only moves when every
/// task is idle, so sleeps complete instantly and in deterministic order.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimEnv;

impl Environment for SimEnv {
    type Instant = tokio::time::Instant;

    fn now(&self) -> Self::Instant {
        tokio::time::Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn sleep_advances_virtual_time() {
        let env = SimEnv;
        let start = env.now();
        env.sleep(Duration::from_secs(5)).await;
        assert_eq!(env.now() - start, Duration::from_secs(5));
    }
}
