// SPDX-License-Identifier: GPL-3.0-or-later

use std::sync::Arc;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::{sleep, Duration, Instant};

use crate::error::TransportError;

/// Bounds how many HTTP requests are in flight and optionally spaces out
/// their start times.
///
/// Every concurrent fan-out funnels through one throttle, so hundreds of
/// spawned calls share `pool_size` connections instead of opening one each.
#[derive(Debug, Clone)]
pub struct Throttle {
    semaphore: Arc<Semaphore>,
    min_interval: Duration,
    last_start: Arc<Mutex<Option<Instant>>>,
}

impl Throttle {
    /// # Arguments
    /// * `pool_size` - Maximum requests in flight (clamped to at least 1).
    /// * `min_interval` - Minimum spacing between request starts; zero disables spacing.
    pub fn new(pool_size: usize, min_interval: Duration) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(pool_size.max(1))),
            min_interval,
            last_start: Arc::new(Mutex::new(None)),
        }
    }

    /// Wait for a free slot. The slot is released when the permit drops.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, TransportError> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| TransportError::PoolClosed)?;

        if !self.min_interval.is_zero() {
            let mut last = self.last_start.lock().await;
            if let Some(last_instant) = *last {
                let elapsed = last_instant.elapsed();
                if elapsed < self.min_interval {
                    let wait_time = self.min_interval - elapsed;
                    tracing::trace!(target: "transport", "throttling: waiting {:?}", wait_time);
                    sleep(wait_time).await;
                }
            }
            *last = Some(Instant::now());
        }

        Ok(permit)
    }
}
