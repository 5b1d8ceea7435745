use crate::frame::{Frame, command};

/// Handle for the active subscription: the topic plus the id it was
/// registered under with the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    id: String,
    topic: String,
}

impl Subscription {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

/// Holds at most one [`Subscription`].
///
/// The slot only tracks state and produces the frames that change it; the
/// session decides when the connection is live enough to send them.
#[derive(Debug, Default)]
pub struct SubscriptionSlot {
    active: Option<Subscription>,
    next_id: u64,
}

impl SubscriptionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Option<&Subscription> {
        self.active.as_ref()
    }

    pub fn topic(&self) -> Option<&str> {
        self.active.as_ref().map(Subscription::topic)
    }

    /// Register `topic` under a fresh id. An existing subscription is
    /// replaced, and its UNSUBSCRIBE precedes the new SUBSCRIBE.
    pub fn subscribe(&mut self, topic: &str) -> Vec<Frame> {
        let mut frames = Vec::with_capacity(2);
        if let Some((_, unsubscribe)) = self.unsubscribe() {
            frames.push(unsubscribe);
        }

        let id = format!("sub-{}", self.next_id);
        self.next_id += 1;
        frames.push(Frame::subscribe(&id, topic));
        self.active = Some(Subscription {
            id,
            topic: topic.to_string(),
        });
        frames
    }

    /// Clear the slot, returning the released handle and its UNSUBSCRIBE.
    pub fn unsubscribe(&mut self) -> Option<(Subscription, Frame)> {
        let sub = self.active.take()?;
        let frame = Frame::unsubscribe(&sub.id);
        Some((sub, frame))
    }

    /// The connection under the subscription is gone: clear the slot without
    /// a frame and hand back the topic so it can be replayed.
    pub fn invalidate(&mut self) -> Option<String> {
        self.active.take().map(|sub| sub.topic)
    }

    /// Whether `frame` is a MESSAGE for the active subscription.
    ///
    /// Brokers name the subscription id in every MESSAGE; ones that omit it
    /// are matched on destination instead.
    pub fn accepts(&self, frame: &Frame) -> bool {
        let Some(sub) = &self.active else {
            return false;
        };
        if !frame.is(command::MESSAGE) {
            return false;
        }
        match frame.get_header("subscription") {
            Some(id) => id == sub.id,
            None => frame.get_header("destination") == Some(sub.topic.as_str()),
        }
    }
}
