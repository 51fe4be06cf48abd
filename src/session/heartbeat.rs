//! Periodic heartbeat publication.
//!
//! The interval is re-read from settings before every tick, so a config
//! replace takes effect on the next cycle without restarting the scheduler.

use crate::session::SessionManager;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Handle to a running heartbeat scheduler.
pub struct HeartbeatHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl HeartbeatHandle {
    pub fn stop(self) {
        let _ = self.stop.send(true);
        self.task.abort();
    }
}

/// Start the scheduler. The first beat goes out immediately so the control
/// plane sees the session as alive at connect time; heartbeats are
/// fire-and-forget, a failed publish is logged and the cycle continues.
pub fn start(session: SessionManager) -> HeartbeatHandle {
    let (stop, mut stopped) = watch::channel(false);
    let task = tokio::spawn(async move {
        loop {
            session.send_heartbeat().await;
            let interval = session.settings().heartbeat_interval_seconds();
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(interval)) => {}
                _ = stopped.changed() => break,
            }
        }
    });
    HeartbeatHandle { stop, task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{AgentConfig, Settings};
    use crate::core::identity::DeviceIdentity;

    fn session(config: AgentConfig) -> SessionManager {
        let identity = DeviceIdentity {
            device_id: "device_hb".into(),
            client_id: "agent_hb".into(),
        };
        SessionManager::new(Settings::new(config), identity).0
    }

    #[tokio::test]
    async fn test_stop_terminates_scheduler() {
        let handle = start(session(AgentConfig::default()));
        handle.stop();
    }

    #[tokio::test]
    async fn test_first_beat_goes_out_without_waiting_an_interval() {
        // With an interval this long, any beat observed within the test
        // window must be the immediate one sent before the first sleep.
        let mut config = AgentConfig::default();
        config.heartbeat_interval_seconds = 3600;
        let session = session(config);

        let handle = start(session.clone());
        for _ in 0..200 {
            if session.heartbeats_sent() > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        handle.stop();
        assert!(session.heartbeats_sent() > 0);
    }
}
