//! Broker session management.
//!
//! Owns the MQTT transport, the connection state machine, the automatic
//! reconnect timer, and the heartbeat scheduler. Inbound publishes are
//! forwarded to the dispatcher over an unbounded channel so the transport
//! poll loop never blocks on message handling.

pub mod heartbeat;
pub mod lifecycle;
pub mod topics;

use crate::core::config::Settings;
use crate::core::identity::DeviceIdentity;
use crate::protocol::{messages, Envelope, PresenceStatus};
use crate::status::StatusProvider;
use anyhow::{bail, Context, Result};
use heartbeat::HeartbeatHandle;
use lifecycle::{SessionLifecycle, SessionState};
use parking_lot::Mutex;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// One message received from the broker, handed to the dispatcher verbatim.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// One established transport. Each connection carries its own liveness
/// flag so a stale poll loop from a previous connection can never act on
/// behalf of its successor.
struct Connection {
    client: AsyncClient,
    /// True only between CONNACK and the first transport error or an
    /// explicit disconnect. Distinguishes a lost connection from one we
    /// closed ourselves.
    alive: Arc<AtomicBool>,
}

struct SessionInner {
    settings: Settings,
    identity: DeviceIdentity,
    provider: StatusProvider,
    lifecycle: Mutex<SessionLifecycle>,
    connection: Mutex<Option<Connection>>,
    inbound: mpsc::UnboundedSender<InboundMessage>,
    heartbeat: Mutex<Option<HeartbeatHandle>>,
    heartbeats_sent: AtomicU64,
    retry_task: Mutex<Option<JoinHandle<()>>>,
}

/// Typed connection surface for callers that only manage the session and
/// never touch routing or content.
pub trait AgentHandle {
    fn device_id(&self) -> &str;
    fn client_id(&self) -> &str;
    fn is_connected(&self) -> bool;
    fn connect(&self) -> impl std::future::Future<Output = Result<()>> + Send;
    fn disconnect(&self) -> impl std::future::Future<Output = ()> + Send;
}

/// Shared handle to the broker session. Cheap to clone.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionInner>,
}

impl AgentHandle for SessionManager {
    fn device_id(&self) -> &str {
        &self.inner.identity.device_id
    }

    fn client_id(&self) -> &str {
        &self.inner.identity.client_id
    }

    fn is_connected(&self) -> bool {
        SessionManager::is_connected(self)
    }

    fn connect(&self) -> impl std::future::Future<Output = Result<()>> + Send {
        SessionManager::connect(self)
    }

    fn disconnect(&self) -> impl std::future::Future<Output = ()> + Send {
        SessionManager::disconnect(self)
    }
}

impl SessionManager {
    pub fn new(
        settings: Settings,
        identity: DeviceIdentity,
    ) -> (Self, mpsc::UnboundedReceiver<InboundMessage>) {
        let (inbound, rx) = mpsc::unbounded_channel();
        (
            Self {
                inner: Arc::new(SessionInner {
                    settings,
                    identity,
                    provider: StatusProvider::new(),
                    lifecycle: Mutex::new(SessionLifecycle::new()),
                    connection: Mutex::new(None),
                    inbound,
                    heartbeat: Mutex::new(None),
                    heartbeats_sent: AtomicU64::new(0),
                    retry_task: Mutex::new(None),
                }),
            },
            rx,
        )
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.inner.identity
    }

    pub fn state(&self) -> SessionState {
        self.inner.lifecycle.lock().state()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.lifecycle.lock().is_connected()
            && self
                .inner
                .connection
                .lock()
                .as_ref()
                .is_some_and(|connection| connection.alive.load(Ordering::SeqCst))
    }

    /// Number of heartbeat publishes attempted over the session's lifetime.
    pub fn heartbeats_sent(&self) -> u64 {
        self.inner.heartbeats_sent.load(Ordering::Relaxed)
    }

    /// Connect to the broker: resolve the address, open the transport, wait
    /// for CONNACK, then subscribe, register, and start the heartbeat. A
    /// transport failure schedules one fixed-delay retry; a precondition
    /// failure (unresolvable broker address) does not.
    pub async fn connect(&self) -> Result<()> {
        if !self.inner.lifecycle.lock().begin_connect() {
            tracing::debug!("connect requested while already connecting or connected");
            return Ok(());
        }

        let cfg = self.inner.settings.get();
        let addr = format!("{}:{}", cfg.broker_host, cfg.broker_port);
        if let Err(err) = tokio::net::lookup_host(addr.as_str()).await {
            self.inner.lifecycle.lock().abort_connect();
            bail!("broker address {addr} does not resolve: {err}");
        }

        tracing::info!(broker = %addr, client_id = %self.inner.identity.client_id, "connecting to broker");
        match self.open_transport().await {
            Ok(()) => Ok(()),
            Err(err) => {
                tracing::warn!("broker connection failed: {err:#}");
                // Retry only while the attempt is still ours: post-CONNACK
                // setup errors leave the state Connected (the poll loop
                // handles those as a lost connection) or Disconnected (a
                // shutdown raced us, nothing to revive).
                let schedule = {
                    let mut lc = self.inner.lifecycle.lock();
                    lc.state() == SessionState::Connecting && lc.connect_failed()
                };
                if schedule {
                    self.schedule_retry();
                }
                Err(err)
            }
        }
    }

    async fn open_transport(&self) -> Result<()> {
        let cfg = self.inner.settings.get();
        let mut options = MqttOptions::new(
            self.inner.identity.client_id.clone(),
            cfg.broker_host.clone(),
            cfg.broker_port,
        );
        options.set_keep_alive(Duration::from_secs(cfg.keepalive_seconds));
        // Persistent session: the broker queues QoS 1 messages across gaps.
        options.set_clean_session(false);

        let (client, mut eventloop) = AsyncClient::new(options, 64);
        let deadline = Duration::from_secs(cfg.connection_timeout_seconds);
        tokio::time::timeout(deadline, wait_for_connack(&mut eventloop))
            .await
            .context("timed out waiting for broker CONNACK")??;

        let alive = Arc::new(AtomicBool::new(true));
        let confirmed = {
            let mut lc = self.inner.lifecycle.lock();
            if lc.connect_succeeded() {
                *self.inner.connection.lock() = Some(Connection {
                    client: client.clone(),
                    alive: alive.clone(),
                });
                true
            } else {
                false
            }
        };
        if !confirmed {
            // Shutdown landed while we were waiting for CONNACK; close the
            // fresh transport instead of resurrecting the session.
            tracing::info!("connect attempt superseded by shutdown, closing transport");
            let _ = client.disconnect().await;
            return Ok(());
        }
        tracing::info!("broker session established");

        let session = self.clone();
        let loop_alive = alive.clone();
        tokio::spawn(async move { session.poll_loop(eventloop, loop_alive).await });

        for topic in [
            topics::content_topic(&self.inner.identity.client_id),
            topics::command_topic(&self.inner.identity.client_id),
            topics::TOPIC_BROADCAST.to_string(),
        ] {
            client
                .subscribe(topic.clone(), QoS::AtLeastOnce)
                .await
                .with_context(|| format!("subscribe {topic}"))?;
        }

        let specs = self.inner.provider.specifications();
        self.publish(
            topics::TOPIC_REGISTER,
            &messages::register(&self.inner.identity, &specs),
        )
        .await?;
        self.publish_presence(PresenceStatus::Online).await?;

        let previous = self
            .inner
            .heartbeat
            .lock()
            .replace(heartbeat::start(self.clone()));
        if let Some(previous) = previous {
            previous.stop();
        }
        Ok(())
    }

    /// Forward inbound publishes until the transport errors out. A failure
    /// while this connection's `alive` flag is set marks a lost connection
    /// and schedules a reconnect; after an explicit disconnect it is just
    /// the close.
    async fn poll_loop(self, mut eventloop: EventLoop, alive: Arc<AtomicBool>) {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let message = InboundMessage {
                        topic: publish.topic.clone(),
                        payload: publish.payload.to_vec(),
                    };
                    if self.inner.inbound.send(message).is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    if alive.swap(false, Ordering::SeqCst) {
                        tracing::warn!("broker connection lost: {err}");
                        self.handle_connection_lost(&alive);
                    }
                    break;
                }
            }
        }
    }

    /// React to a lost connection, but only if `alive` still identifies the
    /// current connection. A loss reported by an already-replaced transport
    /// is ignored so it cannot tear down its successor.
    fn handle_connection_lost(&self, alive: &Arc<AtomicBool>) {
        {
            let mut connection = self.inner.connection.lock();
            match connection.as_ref() {
                Some(current) if Arc::ptr_eq(&current.alive, alive) => *connection = None,
                _ => return,
            }
        }
        if let Some(handle) = self.inner.heartbeat.lock().take() {
            handle.stop();
        }
        if self.inner.lifecycle.lock().connection_lost() {
            self.schedule_retry();
        }
    }

    /// One retry timer at a time, fixed delay, re-read from settings each
    /// round.
    fn schedule_retry(&self) {
        let delay = self.inner.settings.reconnect_delay_seconds();
        let session = self.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(delay)).await;
            session.inner.lifecycle.lock().retry_fired();
            tracing::info!("retrying broker connection");
            if let Err(err) = session.connect().await {
                tracing::warn!("reconnect attempt failed: {err:#}");
            }
        });
        tracing::info!(delay_seconds = delay, "scheduling broker reconnect");
        if let Some(previous) = self.inner.retry_task.lock().replace(task) {
            previous.abort();
        }
    }

    /// Orderly shutdown: cancel timers, announce offline, close the
    /// transport. Safe to call in any state.
    pub async fn disconnect(&self) {
        if self.inner.lifecycle.lock().shutdown() {
            if let Some(task) = self.inner.retry_task.lock().take() {
                task.abort();
            }
        }
        if let Some(handle) = self.inner.heartbeat.lock().take() {
            handle.stop();
        }
        let connection = self.inner.connection.lock().take();
        if let Some(connection) = connection {
            let offline = messages::presence(
                &self.inner.identity,
                PresenceStatus::Offline,
                &self.inner.provider.device_info(),
            );
            if let Ok(payload) = offline.to_payload() {
                let _ = connection
                    .client
                    .publish(topics::TOPIC_STATUS, QoS::AtLeastOnce, false, payload)
                    .await;
            }
            // Give the offline status a moment on the wire before closing.
            tokio::time::sleep(Duration::from_millis(200)).await;
            connection.alive.store(false, Ordering::SeqCst);
            let _ = connection.client.disconnect().await;
            tracing::info!("disconnected from broker");
        }
    }

    /// Publish one envelope at QoS 1. Messages are dropped with a warning
    /// while disconnected rather than queued.
    pub async fn publish(&self, topic: &str, envelope: &Envelope) -> Result<()> {
        let client = self
            .inner
            .connection
            .lock()
            .as_ref()
            .map(|connection| connection.client.clone());
        let Some(client) = client else {
            tracing::warn!(topic, kind = %envelope.kind, "dropping publish while disconnected");
            return Ok(());
        };
        let payload = envelope.to_payload()?;
        client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .with_context(|| format!("publish {topic}"))?;
        Ok(())
    }

    pub async fn publish_presence(&self, status: PresenceStatus) -> Result<()> {
        let envelope = messages::presence(
            &self.inner.identity,
            status,
            &self.inner.provider.device_info(),
        );
        self.publish(topics::TOPIC_STATUS, &envelope).await
    }

    /// Sample device status off the runtime and publish a heartbeat.
    pub(crate) async fn send_heartbeat(&self) {
        self.inner.heartbeats_sent.fetch_add(1, Ordering::Relaxed);
        let snapshot = match tokio::task::spawn_blocking(|| StatusProvider::new().snapshot()).await
        {
            Ok(snapshot) => snapshot,
            Err(err) => {
                tracing::warn!("status sampling failed: {err}");
                return;
            }
        };
        let envelope = messages::heartbeat(&self.inner.identity, &snapshot);
        if let Err(err) = self.publish(topics::TOPIC_HEARTBEAT, &envelope).await {
            tracing::warn!("heartbeat publish failed: {err:#}");
        }
    }
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<()> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    return Ok(());
                }
                bail!("broker refused connection: {:?}", ack.code);
            }
            Ok(_) => {}
            Err(err) => bail!("mqtt transport error: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::AgentConfig;

    fn session() -> SessionManager {
        let settings = Settings::new(AgentConfig::default());
        let identity = DeviceIdentity {
            device_id: "device_test0001".into(),
            client_id: "agent_test0001".into(),
        };
        SessionManager::new(settings, identity).0
    }

    #[tokio::test]
    async fn test_unresolvable_broker_fails_without_retry() {
        let session = session();
        let mut cfg = session.settings().get();
        cfg.broker_host = "no-such-host.invalid".into();
        session.settings().replace(cfg);

        assert!(session.connect().await.is_err());
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(session.inner.retry_task.lock().is_none());
    }

    #[tokio::test]
    async fn test_publish_while_disconnected_is_dropped_not_error() {
        let session = session();
        let envelope = messages::presence(
            session.identity(),
            PresenceStatus::Online,
            &StatusProvider::new().device_info(),
        );
        session
            .publish(topics::TOPIC_STATUS, &envelope)
            .await
            .unwrap();
        assert!(!session.is_connected());
    }

    fn fake_connection() -> (Connection, EventLoop) {
        let options = MqttOptions::new("agent_test0001", "127.0.0.1", 1883);
        let (client, eventloop) = AsyncClient::new(options, 8);
        (
            Connection {
                client,
                alive: Arc::new(AtomicBool::new(true)),
            },
            eventloop,
        )
    }

    #[tokio::test]
    async fn test_stale_connection_loss_leaves_successor_intact() {
        let session = session();
        {
            let mut lc = session.inner.lifecycle.lock();
            lc.begin_connect();
            assert!(lc.connect_succeeded());
        }
        let (connection, _eventloop) = fake_connection();
        let current = connection.alive.clone();
        *session.inner.connection.lock() = Some(connection);
        assert!(session.is_connected());

        // A poll loop from an earlier, already-replaced transport reports a
        // loss: the current connection must stay untouched.
        let stale = Arc::new(AtomicBool::new(false));
        session.handle_connection_lost(&stale);
        assert!(session.is_connected());
        assert_eq!(session.state(), SessionState::Connected);

        // The owning poll loop's report is honored.
        session.handle_connection_lost(&current);
        assert!(!session.is_connected());
        assert_eq!(session.state(), SessionState::Reconnecting);
    }

    #[tokio::test]
    async fn test_disconnect_in_any_state_is_safe() {
        let session = session();
        session.disconnect().await;
        assert_eq!(session.state(), SessionState::Disconnected);
        session.disconnect().await;
    }

    async fn cycle_through_handle<H: AgentHandle>(handle: &H) -> (String, String) {
        let _ = handle.connect().await;
        handle.disconnect().await;
        (handle.device_id().to_string(), handle.client_id().to_string())
    }

    #[tokio::test]
    async fn test_agent_handle_surface() {
        let session = session();
        let mut cfg = session.settings().get();
        cfg.broker_host = "no-such-host.invalid".into();
        session.settings().replace(cfg);

        let (device_id, client_id) = cycle_through_handle(&session).await;
        assert_eq!(device_id, "device_test0001");
        assert_eq!(client_id, "agent_test0001");
        assert!(!AgentHandle::is_connected(&session));
    }
}
