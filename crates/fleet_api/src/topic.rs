//! Adapter from the generic [`PubSub`] surface to the typed [`Transport`]
//! contract, using JSON payloads on per-fleet topics.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::messages::{
    ModeRequest, NavigationRequest, RelocalizationRequest, RobotState,
};
use crate::transport::{PubSub, Transport, TransportError};

/// Topic names used by the fleet, namespaced by fleet name so multiple
/// fleets can share one broker.
pub mod topics {
    pub fn robot_state(fleet_name: &str) -> String {
        format!("{fleet_name}/robot_state")
    }

    pub fn mode_request(fleet_name: &str) -> String {
        format!("{fleet_name}/mode_request")
    }

    pub fn navigation_request(fleet_name: &str) -> String {
        format!("{fleet_name}/navigation_request")
    }

    pub fn relocalization_request(fleet_name: &str) -> String {
        format!("{fleet_name}/relocalization_request")
    }
}

#[derive(Default)]
struct Inbound {
    states: Mutex<VecDeque<RobotState>>,
    mode_requests: Mutex<VecDeque<ModeRequest>>,
    navigation_requests: Mutex<VecDeque<NavigationRequest>>,
    relocalization_requests: Mutex<VecDeque<RelocalizationRequest>>,
}

/// A [`Transport`] over any [`PubSub`] broker.
///
/// Each side of the system builds its own instance and subscribes only to
/// the topics it consumes: the manager reads robot states, robots read the
/// three request kinds. Inbound messages are decoded as they arrive and
/// queued until the owner drains them with the `read_*` operations.
pub struct TopicTransport<P> {
    pubsub: Arc<P>,
    fleet_name: String,
    inbound: Arc<Inbound>,
}

fn decode<T: DeserializeOwned>(topic: &str, payload: &[u8]) -> Option<T> {
    match serde_json::from_slice(payload) {
        Ok(message) => Some(message),
        Err(error) => {
            // A malformed payload must not affect the rest of the batch.
            tracing::warn!(topic, error = %error, "Dropping malformed payload");
            None
        }
    }
}

impl<P: PubSub> TopicTransport<P> {
    /// Builds the manager-side transport: subscribed to robot states,
    /// publishing the three request kinds.
    pub fn manager_side(
        pubsub: Arc<P>,
        fleet_name: impl Into<String>,
    ) -> Result<Self, TransportError> {
        let fleet_name = fleet_name.into();
        let inbound = Arc::new(Inbound::default());

        let topic = topics::robot_state(&fleet_name);
        let queue = Arc::clone(&inbound);
        let cb_topic = topic.clone();
        pubsub.subscribe(
            &topic,
            Box::new(move |payload| {
                if let Some(state) = decode::<RobotState>(&cb_topic, payload) {
                    queue.states.lock().push_back(state);
                }
            }),
        )?;

        Ok(Self {
            pubsub,
            fleet_name,
            inbound,
        })
    }

    /// Builds the robot-side transport: subscribed to the three request
    /// kinds, publishing robot states.
    pub fn robot_side(
        pubsub: Arc<P>,
        fleet_name: impl Into<String>,
    ) -> Result<Self, TransportError> {
        let fleet_name = fleet_name.into();
        let inbound = Arc::new(Inbound::default());

        let topic = topics::mode_request(&fleet_name);
        let queue = Arc::clone(&inbound);
        let cb_topic = topic.clone();
        pubsub.subscribe(
            &topic,
            Box::new(move |payload| {
                if let Some(request) = decode::<ModeRequest>(&cb_topic, payload) {
                    queue.mode_requests.lock().push_back(request);
                }
            }),
        )?;

        let topic = topics::navigation_request(&fleet_name);
        let queue = Arc::clone(&inbound);
        let cb_topic = topic.clone();
        pubsub.subscribe(
            &topic,
            Box::new(move |payload| {
                if let Some(request) = decode::<NavigationRequest>(&cb_topic, payload) {
                    queue.navigation_requests.lock().push_back(request);
                }
            }),
        )?;

        let topic = topics::relocalization_request(&fleet_name);
        let queue = Arc::clone(&inbound);
        let cb_topic = topic.clone();
        pubsub.subscribe(
            &topic,
            Box::new(move |payload| {
                if let Some(request) =
                    decode::<RelocalizationRequest>(&cb_topic, payload)
                {
                    queue.relocalization_requests.lock().push_back(request);
                }
            }),
        )?;

        Ok(Self {
            pubsub,
            fleet_name,
            inbound,
        })
    }

    pub fn fleet_name(&self) -> &str {
        &self.fleet_name
    }

    fn publish<T: Serialize>(&self, topic: &str, message: &T) {
        let payload = match serde_json::to_vec(message) {
            Ok(payload) => payload,
            Err(error) => {
                tracing::warn!(topic, error = %error, "Failed to encode message");
                return;
            }
        };
        if let Err(error) = self.pubsub.publish(topic, &payload) {
            // Registered requests are re-sent by the retry loop; one-off
            // sends are dropped here.
            tracing::warn!(topic, error = %error, "Failed to publish message");
        }
    }
}

impl<P: PubSub> Transport for TopicTransport<P> {
    fn read_states(&self) -> Vec<RobotState> {
        self.inbound.states.lock().drain(..).collect()
    }

    fn send_state(&self, state: &RobotState) {
        self.publish(&topics::robot_state(&self.fleet_name), state);
    }

    fn send_mode_request(&self, request: &ModeRequest) {
        self.publish(&topics::mode_request(&self.fleet_name), request);
    }

    fn send_navigation_request(&self, request: &NavigationRequest) {
        self.publish(&topics::navigation_request(&self.fleet_name), request);
    }

    fn send_relocalization_request(&self, request: &RelocalizationRequest) {
        self.publish(&topics::relocalization_request(&self.fleet_name), request);
    }

    fn read_mode_requests(&self) -> Vec<ModeRequest> {
        self.inbound.mode_requests.lock().drain(..).collect()
    }

    fn read_navigation_requests(&self) -> Vec<NavigationRequest> {
        self.inbound.navigation_requests.lock().drain(..).collect()
    }

    fn read_relocalization_requests(&self) -> Vec<RelocalizationRequest> {
        self.inbound
            .relocalization_requests
            .lock()
            .drain(..)
            .collect()
    }
}
