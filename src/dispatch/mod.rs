//! Inbound message routing.
//!
//! Classifies each broker message by topic and hands it to the right
//! handler: content pushes to the orchestrator, device commands to their
//! actions, broadcasts to the presentation surface. Content status events
//! flow back out here as content_response publishes.

use crate::content::{ContentEvent, ContentOrchestrator, SharedSurface};
use crate::protocol::{messages, BroadcastNotice, CommandRequest, Envelope, PresenceStatus};
use crate::session::topics::{self, TopicClass};
use crate::session::{InboundMessage, SessionManager};
use tokio::sync::{mpsc, watch};

pub struct Dispatcher {
    session: SessionManager,
    orchestrator: ContentOrchestrator,
    surface: SharedSurface,
    shutdown: watch::Sender<bool>,
}

impl Dispatcher {
    /// Returns the dispatcher and the shutdown signal it raises on a
    /// `restart` command.
    pub fn new(
        session: SessionManager,
        orchestrator: ContentOrchestrator,
        surface: SharedSurface,
    ) -> (Self, watch::Receiver<bool>) {
        let (shutdown, shutdown_rx) = watch::channel(false);
        (
            Self {
                session,
                orchestrator,
                surface,
                shutdown,
            },
            shutdown_rx,
        )
    }

    /// Drive routing until both input channels close.
    pub async fn run(
        self,
        mut inbound: mpsc::UnboundedReceiver<InboundMessage>,
        mut content_events: mpsc::UnboundedReceiver<ContentEvent>,
    ) {
        loop {
            tokio::select! {
                message = inbound.recv() => {
                    let Some(message) = message else { break };
                    self.route(message).await;
                }
                event = content_events.recv() => {
                    let Some(event) = event else { break };
                    self.forward_content_event(event).await;
                }
            }
        }
    }

    async fn route(&self, message: InboundMessage) {
        let Some(class) = topics::classify(&message.topic) else {
            tracing::debug!(topic = %message.topic, "ignoring message on unrecognized topic");
            return;
        };
        let envelope = match Envelope::parse(&message.payload) {
            Ok(envelope) => envelope,
            Err(err) => {
                tracing::warn!(topic = %message.topic, "dropping message: {err:#}");
                return;
            }
        };
        tracing::debug!(topic = %message.topic, kind = %envelope.kind, "routing message");
        match class {
            TopicClass::Content => self.orchestrator.handle_push(&envelope),
            TopicClass::Command => self.handle_command(&envelope).await,
            TopicClass::Broadcast => self.handle_broadcast(&envelope),
        }
    }

    async fn handle_command(&self, envelope: &Envelope) {
        let request = match CommandRequest::from_data(&envelope.data) {
            Ok(request) => request,
            Err(err) => {
                tracing::warn!("dropping command: {err:#}");
                return;
            }
        };
        match request.command.as_str() {
            "get_status" => {
                if let Err(err) = self.session.publish_presence(PresenceStatus::Online).await {
                    tracing::warn!("status response failed: {err:#}");
                }
            }
            "restart" => {
                tracing::info!("restart command received, shutting down");
                let _ = self.shutdown.send(true);
            }
            "screenshot" => {
                tracing::warn!("screenshot command is not supported on this platform");
            }
            other => tracing::warn!(command = other, "unknown command"),
        }
    }

    fn handle_broadcast(&self, envelope: &Envelope) {
        match BroadcastNotice::from_data(&envelope.data) {
            Ok(notice) => {
                tracing::info!(level = %notice.level, "broadcast: {}", notice.message);
                self.surface.show_notice(&notice.message, &notice.level);
            }
            Err(err) => tracing::warn!("dropping broadcast: {err:#}"),
        }
    }

    async fn forward_content_event(&self, event: ContentEvent) {
        tracing::info!(
            content_id = %event.content_id,
            status = event.status.as_str(),
            "content status"
        );
        let envelope = messages::content_response(
            self.session.identity(),
            &event.content_id,
            event.status,
            event.error.as_deref(),
        );
        if let Err(err) = self
            .session
            .publish(topics::TOPIC_CONTENT_RESPONSE, &envelope)
            .await
        {
            tracing::warn!("content response failed: {err:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{DisplayRequest, FetchCache, PresentationSurface};
    use crate::core::config::{AgentConfig, FetchConfig, Settings};
    use crate::core::identity::DeviceIdentity;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;

    #[derive(Default)]
    struct RecordingSurface {
        displayed: Mutex<Vec<DisplayRequest>>,
        notices: Mutex<Vec<(String, String)>>,
    }

    impl PresentationSurface for RecordingSurface {
        fn display_content(&self, request: DisplayRequest) {
            self.displayed.lock().push(request);
        }

        fn show_notice(&self, message: &str, level: &str) {
            self.notices.lock().push((message.into(), level.into()));
        }
    }

    struct Fixture {
        dispatcher: Dispatcher,
        surface: Arc<RecordingSurface>,
        shutdown: watch::Receiver<bool>,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let identity = DeviceIdentity {
            device_id: "device_disp".into(),
            client_id: "agent_disp".into(),
        };
        let (session, _inbound) = SessionManager::new(Settings::new(AgentConfig::default()), identity);
        let cache =
            FetchCache::new(&FetchConfig::default(), Some(dir.path().to_path_buf())).unwrap();
        let surface = Arc::new(RecordingSurface::default());
        let (orchestrator, _events) = ContentOrchestrator::new(surface.clone(), cache);
        let (dispatcher, shutdown) = Dispatcher::new(session, orchestrator, surface.clone());
        Fixture {
            dispatcher,
            surface,
            shutdown,
            _dir: dir,
        }
    }

    fn message(topic: &str, body: serde_json::Value) -> InboundMessage {
        InboundMessage {
            topic: topic.into(),
            payload: serde_json::to_vec(&body).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_content_topic_routes_to_display() {
        let fx = fixture();
        fx.dispatcher
            .route(message(
                "device/agent_disp/content",
                json!({
                    "type": "content_push",
                    "data": {"contentId": "c1", "type": "image", "url": "http://x/a.png"}
                }),
            ))
            .await;
        let displayed = fx.surface.displayed.lock();
        assert_eq!(displayed.len(), 1);
        assert_eq!(displayed[0].content_id, "c1");
    }

    #[tokio::test]
    async fn test_broadcast_reaches_surface() {
        let fx = fixture();
        fx.dispatcher
            .route(message(
                "broadcast/all",
                json!({
                    "type": "broadcast",
                    "data": {"message": "maintenance at noon", "level": "warning"}
                }),
            ))
            .await;
        let notices = fx.surface.notices.lock();
        assert_eq!(
            notices.as_slice(),
            &[("maintenance at noon".to_string(), "warning".to_string())]
        );
    }

    #[tokio::test]
    async fn test_restart_command_raises_shutdown() {
        let mut fx = fixture();
        assert!(!*fx.shutdown.borrow());
        fx.dispatcher
            .route(message(
                "device/agent_disp/commands",
                json!({"type": "command", "data": {"command": "restart"}}),
            ))
            .await;
        fx.shutdown.changed().await.unwrap();
        assert!(*fx.shutdown.borrow());
    }

    #[tokio::test]
    async fn test_unknown_topic_and_garbage_payload_are_dropped() {
        let fx = fixture();
        fx.dispatcher
            .route(message("some/other/topic", json!({"type": "x"})))
            .await;
        fx.dispatcher
            .route(InboundMessage {
                topic: "broadcast/all".into(),
                payload: b"not json".to_vec(),
            })
            .await;
        assert!(fx.surface.displayed.lock().is_empty());
        assert!(fx.surface.notices.lock().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_command_is_ignored() {
        let fx = fixture();
        fx.dispatcher
            .route(message(
                "device/agent_disp/commands",
                json!({"type": "command", "data": {"command": "selfdestruct"}}),
            ))
            .await;
        assert!(!*fx.shutdown.borrow());
    }
}
