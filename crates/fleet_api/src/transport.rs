use crate::messages::{
    ModeRequest, NavigationRequest, RelocalizationRequest, RobotState,
};

/// Errors surfaced by broker-style transports.
///
/// The core layers log these and continue: a failed send of a registered
/// request is retried on the next poll iteration anyway, and ad hoc sends
/// (state publication) are simply dropped.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("publish to topic '{topic}' failed: {reason}")]
    Publish { topic: String, reason: String },
    #[error("subscribe to topic '{topic}' failed: {reason}")]
    Subscribe { topic: String, reason: String },
}

/// Message transport between the manager and its robots.
///
/// Implementations give no delivery guarantees of their own; reliability
/// comes from the manager's application-level retry loop. All operations
/// are expected to be non-blocking or bounded-latency: reads drain whatever
/// has already arrived, sends are fire-and-forget.
pub trait Transport: Send + Sync {
    /// Drains all newly arrived robot state reports. Manager side.
    fn read_states(&self) -> Vec<RobotState>;

    /// Publishes a robot's state report. Robot side.
    fn send_state(&self, state: &RobotState);

    fn send_mode_request(&self, request: &ModeRequest);
    fn send_navigation_request(&self, request: &NavigationRequest);
    fn send_relocalization_request(&self, request: &RelocalizationRequest);

    /// Drains newly arrived mode requests. Robot side.
    fn read_mode_requests(&self) -> Vec<ModeRequest>;
    fn read_navigation_requests(&self) -> Vec<NavigationRequest>;
    fn read_relocalization_requests(&self) -> Vec<RelocalizationRequest>;
}

/// Callback invoked with the raw payload of every message arriving on a
/// subscribed topic.
pub type SubscribeCallback = Box<dyn Fn(&[u8]) + Send + Sync>;

/// Topic-based publish/subscribe surface for broker-backed transports
/// (MQTT, Zenoh, an in-process broker in tests).
///
/// [`crate::topic::TopicTransport`] adapts any `PubSub` into a typed
/// [`Transport`].
pub trait PubSub: Send + Sync {
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), TransportError>;
    fn subscribe(
        &self,
        topic: &str,
        callback: SubscribeCallback,
    ) -> Result<(), TransportError>;
}
