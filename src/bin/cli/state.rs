use chrono::{DateTime, Local};
use serde_json::Value;
use std::sync::Arc;
use stomp_websocket::{InboundMessage, SessionEvent};
use tokio::sync::Mutex;

/// What the CLI remembers about the session.
pub struct AppState {
    pub start_time: DateTime<Local>,
    pub url: String,
    pub connected: bool,
    pub topic: Option<String>,
    pub connects: u64,
    pub messages_received: u64,
    pub undecodable: u64,
    pub sends_completed: u64,
    pub broker_errors: u64,
    /// Most recent message, until `last` consumes it.
    pub latest: Option<(DateTime<Local>, InboundMessage)>,
}

impl AppState {
    pub fn new(url: String) -> Self {
        Self {
            start_time: Local::now(),
            url,
            connected: false,
            topic: None,
            connects: 0,
            messages_received: 0,
            undecodable: 0,
            sends_completed: 0,
            broker_errors: 0,
            latest: None,
        }
    }

    /// Fold a session notification into the counters.
    pub fn record(&mut self, event: &SessionEvent) {
        match event {
            SessionEvent::Connected => {
                self.connected = true;
                self.connects += 1;
            }
            SessionEvent::Disconnected => self.connected = false,
            SessionEvent::Subscribed { topic } => self.topic = Some(topic.clone()),
            SessionEvent::Unsubscribed { .. } => self.topic = None,
            SessionEvent::MessageReceived(msg) => {
                self.messages_received += 1;
                if msg.is_empty() {
                    self.undecodable += 1;
                }
                self.latest = Some((Local::now(), msg.clone()));
            }
            SessionEvent::SendCompleted { .. } => self.sends_completed += 1,
            SessionEvent::BrokerError(_) => self.broker_errors += 1,
        }
    }

    /// Hand out the latest value and forget it.
    pub fn take_latest(&mut self) -> Option<(DateTime<Local>, Option<Value>)> {
        self.latest
            .take()
            .map(|(at, mut msg)| (at, msg.take()))
    }

    pub fn generate_summary(&self) -> String {
        let elapsed = Local::now().signed_duration_since(self.start_time);
        let mut out = String::new();
        out.push_str("Session summary\n");
        out.push_str(&format!("  endpoint:      {}\n", self.url));
        out.push_str(&format!(
            "  started:       {}\n",
            self.start_time.format("%Y-%m-%d %H:%M:%S")
        ));
        out.push_str(&format!("  duration:      {}s\n", elapsed.num_seconds()));
        out.push_str(&format!(
            "  state:         {}\n",
            if self.connected { "connected" } else { "disconnected" }
        ));
        out.push_str(&format!(
            "  topic:         {}\n",
            self.topic.as_deref().unwrap_or("-")
        ));
        out.push_str(&format!("  connects:      {}\n", self.connects));
        out.push_str(&format!(
            "  messages:      {} ({} not JSON)\n",
            self.messages_received, self.undecodable
        ));
        out.push_str(&format!("  sends:         {}\n", self.sends_completed));
        out.push_str(&format!("  broker errors: {}", self.broker_errors));
        out
    }
}

pub type SharedState = Arc<Mutex<AppState>>;

pub fn new_shared_state(url: String) -> SharedState {
    Arc::new(Mutex::new(AppState::new(url)))
}
