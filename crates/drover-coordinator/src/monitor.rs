//! Heartbeat liveness monitor
//!
//! Agents heartbeat every 30 seconds. The monitor sweeps the registry at
//! a fixed interval and closes any session whose last heartbeat is older
//! than the configured timeout. Eviction goes through the session's own
//! cancellation token so the normal close path handles deregistration and
//! status updates.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::registry::SessionRegistry;

pub struct HeartbeatMonitor {
    interval: Duration,
    timeout: Duration,
}

impl HeartbeatMonitor {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Run the sweep loop until the token is cancelled
    pub async fn run(self, registry: Arc<SessionRegistry>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep(&registry);
                }
                _ = cancel.cancelled() => {
                    debug!("heartbeat monitor stopped");
                    return;
                }
            }
        }
    }

    fn sweep(&self, registry: &SessionRegistry) {
        let timeout_ms = self.timeout.as_millis() as u64;
        for session in registry.snapshot() {
            let silence = session.millis_since_heartbeat();
            if silence > timeout_ms {
                warn!(
                    client_id = %session.client_id(),
                    silence_ms = silence,
                    "session silent past heartbeat timeout, closing"
                );
                session.close();
            }
        }
    }
}
