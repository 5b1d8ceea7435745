//! Session manager: one STOMP connection, one topic, one publish at a time.
//!
//! A [`SessionManager`] is a handle to a background task. Host calls become
//! commands on a channel and the task handles them, together with connect
//! results, inbound frames, heart-beat ticks and the reconnect deadline, one
//! at a time. All session state is owned by that task.

use std::future;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{Instrument, debug, error, info, info_span, trace, warn};

use crate::codec::StompItem;
use crate::frame::{Frame, command};
use crate::message::{InboundMessage, OutboundRequest};
use crate::subscription::SubscriptionSlot;
use crate::transport::{ConnError, ConnectOptions, ServerError, Transport};

/// Delay between a dropped or refused connection and the next attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(5000);

/// Session settings.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub connect: ConnectOptions,
    /// Fixed delay before reconnecting. Zero disables reconnection.
    pub reconnect_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect: ConnectOptions::default(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

impl SessionConfig {
    pub fn with_connect_options(mut self, connect: ConnectOptions) -> Self {
        self.connect = connect;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }
}

/// Notifications from the session to its host.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Connected,
    Disconnected,
    Subscribed { topic: String },
    Unsubscribed { topic: String },
    /// A message arrived on the active topic. Its body is empty when the
    /// payload was not JSON.
    MessageReceived(InboundMessage),
    /// The publish request was handed to the connection; the host may clear
    /// its copy.
    SendCompleted { destination: String },
    /// The broker sent an ERROR frame on a live session.
    BrokerError(ServerError),
}

/// The session task is no longer running.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("session task has exited")]
    Closed,
}

enum Command {
    Start(String),
    Stop(oneshot::Sender<()>),
    SetTopic(Option<String>),
    Send(OutboundRequest),
}

/// Handle to a running session task.
///
/// Dropping the handle disconnects and ends the task.
pub struct SessionManager {
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl SessionManager {
    /// Spawn an idle session task. Must be called inside a tokio runtime.
    ///
    /// Returns the handle and the receiving end of the notification channel.
    pub fn new(config: SessionConfig) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let task = SessionTask::new(config, SessionCore::new(event_tx));
        let task = tokio::spawn(task.run(cmd_rx).instrument(info_span!("stomp_session")));
        (
            Self {
                commands: cmd_tx,
                task,
            },
            event_rx,
        )
    }

    fn command(&self, command: Command) -> Result<(), SessionError> {
        self.commands.send(command).map_err(|_| SessionError::Closed)
    }

    /// Connect to `url` and keep reconnecting until [`stop`](Self::stop).
    /// A no-op while already started.
    pub fn start(&self, url: impl Into<String>) -> Result<(), SessionError> {
        self.command(Command::Start(url.into()))
    }

    /// Unsubscribe, disconnect and cancel any reconnection. No notification
    /// is emitted after this returns until the next `start`. The topic is
    /// kept and resubscribed on the next `start`.
    pub async fn stop(&self) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        self.command(Command::Stop(tx))?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    /// Listen to `topic` instead of the current one. An empty string clears
    /// the subscription. Every call with a topic runs a full unsubscribe and
    /// subscribe cycle, even when the topic is unchanged.
    pub fn set_topic(&self, topic: impl Into<String>) -> Result<(), SessionError> {
        let topic = topic.into();
        self.command(Command::SetTopic((!topic.is_empty()).then_some(topic)))
    }

    /// Drop the subscription, if any. Same as `set_topic("")`.
    pub fn clear_topic(&self) -> Result<(), SessionError> {
        self.command(Command::SetTopic(None))
    }

    /// Publish `request` if the session is live. Requests made while
    /// disconnected are dropped without a [`SessionEvent::SendCompleted`].
    pub fn request_send(&self, request: OutboundRequest) -> Result<(), SessionError> {
        self.command(Command::Send(request))
    }

    /// Whether the background task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Synchronous session state. Every handler runs to completion and leaves
/// the frames it wants written in `outbox`; the task flushes them.
pub(crate) struct SessionCore {
    connected: bool,
    slot: SubscriptionSlot,
    /// Topic to subscribe on the next successful handshake.
    pending_topic: Option<String>,
    outbox: Vec<Frame>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionCore {
    pub(crate) fn new(events: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self {
            connected: false,
            slot: SubscriptionSlot::new(),
            pending_topic: None,
            outbox: Vec::new(),
            events,
        }
    }

    fn emit(&self, event: SessionEvent) {
        // The host may have dropped its receiver.
        let _ = self.events.send(event);
    }

    pub(crate) fn take_outbox(&mut self) -> Vec<Frame> {
        std::mem::take(&mut self.outbox)
    }

    /// Topic in effect: the active subscription, else the one waiting for a
    /// connection.
    fn current_topic(&self) -> Option<&str> {
        self.slot.topic().or(self.pending_topic.as_deref())
    }

    pub(crate) fn on_connected(&mut self) {
        self.connected = true;
        info!("stomp connected");
        self.emit(SessionEvent::Connected);
        if let Some(topic) = self.pending_topic.take() {
            self.subscribe(topic);
        }
    }

    pub(crate) fn on_disconnected(&mut self) {
        if !self.connected {
            return;
        }
        self.connected = false;
        if let Some(topic) = self.slot.invalidate() {
            self.pending_topic = Some(topic);
        }
        self.outbox.clear();
        info!("stomp disconnected");
        self.emit(SessionEvent::Disconnected);
    }

    /// Give up the subscription and the session ahead of a DISCONNECT.
    pub(crate) fn release(&mut self) {
        if let Some(topic) = self.unsubscribe() {
            self.pending_topic = Some(topic);
        }
        if self.connected {
            self.connected = false;
            self.emit(SessionEvent::Disconnected);
        }
    }

    pub(crate) fn set_topic(&mut self, topic: Option<String>) {
        if topic.is_none() && self.current_topic().is_none() {
            debug!("no topic to clear");
            return;
        }
        self.unsubscribe();
        self.pending_topic = None;
        match topic {
            Some(topic) if self.connected => self.subscribe(topic),
            Some(topic) => {
                debug!(%topic, "not connected, subscribing after handshake");
                self.pending_topic = Some(topic);
            }
            None => {}
        }
    }

    fn subscribe(&mut self, topic: String) {
        let frames = self.slot.subscribe(&topic);
        self.outbox.extend(frames);
        info!(%topic, "subscribed");
        self.emit(SessionEvent::Subscribed { topic });
    }

    fn unsubscribe(&mut self) -> Option<String> {
        let (sub, frame) = self.slot.unsubscribe()?;
        self.outbox.push(frame);
        let topic = sub.topic().to_string();
        info!(%topic, "unsubscribed");
        self.emit(SessionEvent::Unsubscribed {
            topic: topic.clone(),
        });
        Some(topic)
    }

    pub(crate) fn request_send(&mut self, request: OutboundRequest) {
        if !self.connected {
            warn!(
                destination = %request.destination,
                "not connected, dropping send request"
            );
            return;
        }
        match request.to_frame() {
            Ok(frame) => self.outbox.push(frame),
            Err(e) => error!(
                destination = %request.destination,
                error = %e,
                "could not serialize message body"
            ),
        }
        self.emit(SessionEvent::SendCompleted {
            destination: request.destination,
        });
    }

    pub(crate) fn on_frame(&mut self, frame: Frame) {
        match frame.command.as_str() {
            command::MESSAGE => {
                if !self.slot.accepts(&frame) {
                    debug!(
                        subscription = ?frame.get_header("subscription"),
                        "discarding message for inactive subscription"
                    );
                    return;
                }
                let message = InboundMessage::from_frame(frame);
                self.emit(SessionEvent::MessageReceived(message));
            }
            command::ERROR => {
                let err = ServerError::from_frame(frame);
                error!(reason = %err.message, body = ?err.body, "broker error");
                self.emit(SessionEvent::BrokerError(err));
            }
            command::RECEIPT => {
                debug!(receipt = ?frame.get_header("receipt-id"), "receipt");
            }
            other => debug!(command = other, "ignoring unexpected frame"),
        }
    }
}

/// What woke the task up.
enum Wake {
    Command(Option<Command>),
    Handshake(Result<Transport, ConnError>),
    Inbound(Option<Result<StompItem, ConnError>>),
    HeartbeatTick,
    Reconnect,
}

struct SessionTask {
    config: SessionConfig,
    core: SessionCore,
    url: Option<String>,
    transport: Option<Transport>,
    connecting: Option<JoinHandle<Result<Transport, ConnError>>>,
    heartbeat: Option<Interval>,
    reconnect_at: Option<Instant>,
}

impl SessionTask {
    fn new(config: SessionConfig, core: SessionCore) -> Self {
        Self {
            config,
            core,
            url: None,
            transport: None,
            connecting: None,
            heartbeat: None,
            reconnect_at: None,
        }
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        loop {
            let wake = {
                let Self {
                    transport,
                    connecting,
                    heartbeat,
                    reconnect_at,
                    ..
                } = &mut self;
                tokio::select! {
                    cmd = commands.recv() => Wake::Command(cmd),
                    res = async move {
                        match connecting.as_mut() {
                            Some(handle) => handle.await.unwrap_or_else(|e| {
                                Err(ConnError::Protocol(format!("connect task failed: {}", e)))
                            }),
                            None => future::pending().await,
                        }
                    } => Wake::Handshake(res),
                    item = async move {
                        match transport.as_mut() {
                            Some(t) => t.next_item().await,
                            None => future::pending().await,
                        }
                    } => Wake::Inbound(item),
                    _ = async move {
                        match heartbeat.as_mut() {
                            Some(tick) => { tick.tick().await; }
                            None => future::pending::<()>().await,
                        }
                    } => Wake::HeartbeatTick,
                    _ = async move {
                        match *reconnect_at {
                            Some(at) => tokio::time::sleep_until(at).await,
                            None => future::pending::<()>().await,
                        }
                    } => Wake::Reconnect,
                }
            };

            match wake {
                Wake::Command(Some(Command::Start(url))) => self.start(url),
                Wake::Command(Some(Command::Stop(done))) => {
                    self.stop().await;
                    let _ = done.send(());
                }
                Wake::Command(Some(Command::SetTopic(topic))) => {
                    self.core.set_topic(topic);
                    self.flush().await;
                }
                Wake::Command(Some(Command::Send(request))) => {
                    self.core.request_send(request);
                    self.flush().await;
                }
                Wake::Command(None) => {
                    self.stop().await;
                    debug!("session handle dropped");
                    break;
                }
                Wake::Handshake(result) => {
                    self.connecting = None;
                    self.on_handshake(result).await;
                }
                Wake::Inbound(Some(Ok(StompItem::Frame(frame)))) => {
                    trace!(command = %frame.command, "received frame");
                    self.core.on_frame(frame);
                    self.flush().await;
                }
                Wake::Inbound(Some(Ok(StompItem::Heartbeat))) => trace!("heart-beat"),
                Wake::Inbound(Some(Err(e))) => self.connection_lost(&e.to_string()),
                Wake::Inbound(None) => self.connection_lost("closed by broker"),
                Wake::HeartbeatTick => self.on_heartbeat_tick().await,
                Wake::Reconnect => {
                    self.reconnect_at = None;
                    if self.url.is_some() && self.transport.is_none() && self.connecting.is_none() {
                        self.begin_connect();
                    }
                }
            }
        }
    }

    fn start(&mut self, url: String) {
        if let Some(current) = &self.url {
            debug!(url = %current, "already started");
            return;
        }
        self.url = Some(url);
        self.begin_connect();
    }

    fn begin_connect(&mut self) {
        let Some(url) = self.url.clone() else {
            return;
        };
        info!(%url, "connecting");
        let options = self.config.connect.clone();
        self.connecting = Some(tokio::spawn(
            async move { Transport::connect(&url, &options).await }.in_current_span(),
        ));
    }

    async fn on_handshake(&mut self, result: Result<Transport, ConnError>) {
        match result {
            Ok(transport) => {
                self.heartbeat = heartbeat_interval(&transport);
                self.transport = Some(transport);
                self.core.on_connected();
                self.flush().await;
            }
            Err(e) => {
                warn!(error = %e, "connection attempt failed");
                self.schedule_reconnect();
            }
        }
    }

    async fn on_heartbeat_tick(&mut self) {
        let Some(transport) = self.transport.as_mut() else {
            return;
        };
        if transport.peer_silent() {
            self.connection_lost("no heart-beat from broker");
            return;
        }
        if transport.heartbeat_due() {
            if let Err(e) = transport.send_heartbeat().await {
                self.connection_lost(&e.to_string());
            }
        }
    }

    /// Write whatever the last handler queued.
    async fn flush(&mut self) {
        let frames = self.core.take_outbox();
        let Some(transport) = self.transport.as_mut() else {
            return;
        };
        let mut failure = None;
        for frame in frames {
            if let Err(e) = transport.send_frame(frame).await {
                failure = Some(e);
                break;
            }
        }
        if let Some(e) = failure {
            self.connection_lost(&e.to_string());
        }
    }

    fn connection_lost(&mut self, reason: &str) {
        warn!(reason, "connection lost");
        self.transport = None;
        self.heartbeat = None;
        self.core.on_disconnected();
        self.schedule_reconnect();
    }

    fn schedule_reconnect(&mut self) {
        let delay = self.config.reconnect_delay;
        if self.url.is_none() {
            return;
        }
        if delay.is_zero() {
            info!("reconnection disabled");
            return;
        }
        debug!(?delay, "scheduling reconnect");
        self.reconnect_at = Some(Instant::now() + delay);
    }

    async fn stop(&mut self) {
        self.url = None;
        self.reconnect_at = None;
        self.heartbeat = None;
        if let Some(handle) = self.connecting.take() {
            handle.abort();
        }
        self.core.release();
        let frames = self.core.take_outbox();
        if let Some(mut transport) = self.transport.take() {
            for frame in frames {
                if transport.send_frame(frame).await.is_err() {
                    break;
                }
            }
            if let Err(e) = transport.disconnect().await {
                debug!(error = %e, "disconnect did not complete cleanly");
            }
            info!("stomp session stopped");
        }
    }
}

/// Tick often enough to honour both negotiated directions.
fn heartbeat_interval(transport: &Transport) -> Option<Interval> {
    let (outgoing, incoming) = transport.heartbeats();
    let period = [outgoing, incoming].into_iter().flatten().min()?;
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Some(interval)
}
