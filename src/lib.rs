//! Single-topic STOMP session client over WebSocket.
//!
//! [`SessionManager`] keeps one connection to a STOMP broker alive, holds at
//! most one subscription, and publishes JSON requests. Messages arriving on
//! the subscribed topic are decoded as JSON and delivered as
//! [`SessionEvent::MessageReceived`].
//!
//! ```no_run
//! use serde_json::json;
//! use stomp_websocket::{OutboundRequest, SessionConfig, SessionEvent, SessionManager};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let (session, mut events) = SessionManager::new(SessionConfig::default());
//! session.start("ws://localhost:15674/ws")?;
//! session.set_topic("/topic/prices")?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         SessionEvent::Subscribed { .. } => {
//!             session.request_send(OutboundRequest::new("/app/echo", json!({"x": 1})))?;
//!         }
//!         SessionEvent::MessageReceived(msg) => println!("{:?}", msg.body),
//!         _ => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod frame;
pub mod message;
pub mod parser;
pub mod session;
pub mod subscription;
pub mod transport;

pub use codec::{StompCodec, StompItem};
pub use frame::Frame;
pub use message::{DecodeError, InboundMessage, OutboundRequest};
pub use parser::FrameError;
pub use session::{SessionConfig, SessionError, SessionEvent, SessionManager};
pub use subscription::{Subscription, SubscriptionSlot};
pub use transport::{
    ConnError, ConnectOptions, ServerError, Transport, negotiate_heartbeats,
    parse_heartbeat_header,
};
