use crate::session::SessionController;
use crate::transport::Transport;
use log::{debug, info, warn};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

pub(crate) const KEEP_ALIVE_INTERVAL_MIN: Duration = Duration::from_secs(20);
pub(crate) const KEEP_ALIVE_INTERVAL_MAX: Duration = Duration::from_secs(30);
pub(crate) const KEEP_ALIVE_MAX_FAIL_TIME: Duration = Duration::from_secs(180);

impl SessionController {
    /// Sends a single keepalive ping. Returns true on success; a failed
    /// ping is logged, not fatal.
    async fn send_keepalive(&self) -> bool {
        let Some(transport) = self.current_transport().await else {
            return false;
        };

        debug!(target: "Session/Keepalive", "[{}] sending keepalive ping", self.session_id());
        match transport.ping().await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    target: "Session/Keepalive",
                    "[{}] keepalive ping failed: {e}",
                    self.session_id()
                );
                false
            }
        }
    }

    /// The keepalive loop for one connection, spawned on entry to
    /// `Connected` and bound to that connection's transport. Exits when the
    /// session disconnects, the generation moves on, the transport is
    /// replaced by a reconnect, or sustained ping failure forces a
    /// transport teardown so the reconnect path takes over.
    pub(crate) async fn keepalive_loop(self: Arc<Self>, generation: u64, transport: Arc<dyn Transport>) {
        let mut last_success = chrono::Utc::now();
        let mut error_count = 0u32;

        loop {
            let interval_ms = rand::rng().random_range(
                self.config.keepalive_interval_min.as_millis()
                    ..=self.config.keepalive_interval_max.as_millis(),
            );
            let interval = Duration::from_millis(interval_ms as u64);

            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    let still_live = self
                        .current_transport()
                        .await
                        .is_some_and(|current| Arc::ptr_eq(&current, &transport));
                    if !self.is_current(generation) || !self.is_connected() || !still_live {
                        debug!(
                            target: "Session/Keepalive",
                            "[{}] connection gone or replaced, exiting keepalive loop",
                            self.session_id()
                        );
                        return;
                    }

                    if self.send_keepalive().await {
                        if error_count > 0 {
                            info!(
                                target: "Session/Keepalive",
                                "[{}] keepalive restored",
                                self.session_id()
                            );
                        }
                        error_count = 0;
                        last_success = chrono::Utc::now();
                    } else {
                        error_count += 1;
                        warn!(
                            target: "Session/Keepalive",
                            "[{}] keepalive failure, error count: {error_count}",
                            self.session_id()
                        );

                        let silent_for = chrono::Utc::now().signed_duration_since(last_success);
                        let max_fail = chrono::Duration::from_std(self.config.keepalive_max_fail_time)
                            .unwrap_or_else(|_| chrono::Duration::seconds(180));
                        if silent_for > max_fail {
                            warn!(
                                target: "Session/Keepalive",
                                "[{}] no successful ping for {silent_for}, forcing reconnect",
                                self.session_id()
                            );
                            // Closing the transport routes through the
                            // unexpected-disconnect path in the driver.
                            transport.disconnect().await;
                            return;
                        }
                    }
                },
                _ = self.shutdown_notifier.notified() => {
                    debug!(
                        target: "Session/Keepalive",
                        "[{}] shutdown signaled, exiting keepalive loop",
                        self.session_id()
                    );
                    return;
                }
            }
        }
    }
}
