//! In-process transport implementations for tests, demos and simulations.
//!
//! [`LoopbackTransport`] is a single shared object acting as both ends of
//! the wire: the manager drains what robots pushed and vice versa.
//! [`InProcBroker`] is a minimal [`PubSub`] for exercising
//! [`crate::topic::TopicTransport`] without a real broker.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::messages::{
    ModeRequest, NavigationRequest, RelocalizationRequest, RobotState,
};
use crate::transport::{PubSub, SubscribeCallback, Transport, TransportError};

/// Shared in-memory transport. Both the manager and its robots hold a clone
/// of the same `Arc<LoopbackTransport>`.
#[derive(Default)]
pub struct LoopbackTransport {
    states: Mutex<VecDeque<RobotState>>,
    mode_requests: Mutex<VecDeque<ModeRequest>>,
    navigation_requests: Mutex<VecDeque<NavigationRequest>>,
    relocalization_requests: Mutex<VecDeque<RelocalizationRequest>>,
}

impl LoopbackTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl Transport for LoopbackTransport {
    fn read_states(&self) -> Vec<RobotState> {
        self.states.lock().drain(..).collect()
    }

    fn send_state(&self, state: &RobotState) {
        self.states.lock().push_back(state.clone());
    }

    fn send_mode_request(&self, request: &ModeRequest) {
        self.mode_requests.lock().push_back(request.clone());
    }

    fn send_navigation_request(&self, request: &NavigationRequest) {
        self.navigation_requests.lock().push_back(request.clone());
    }

    fn send_relocalization_request(&self, request: &RelocalizationRequest) {
        self.relocalization_requests.lock().push_back(request.clone());
    }

    fn read_mode_requests(&self) -> Vec<ModeRequest> {
        self.mode_requests.lock().drain(..).collect()
    }

    fn read_navigation_requests(&self) -> Vec<NavigationRequest> {
        self.navigation_requests.lock().drain(..).collect()
    }

    fn read_relocalization_requests(&self) -> Vec<RelocalizationRequest> {
        self.relocalization_requests.lock().drain(..).collect()
    }
}

/// In-process broker: publishes invoke every subscribed callback
/// synchronously on the caller's thread.
#[derive(Default)]
pub struct InProcBroker {
    subscribers: Mutex<HashMap<String, Vec<SubscribeCallback>>>,
}

impl PubSub for InProcBroker {
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
        let subscribers = self.subscribers.lock();
        if let Some(callbacks) = subscribers.get(topic) {
            for callback in callbacks {
                callback(payload);
            }
        }
        Ok(())
    }

    fn subscribe(
        &self,
        topic: &str,
        callback: SubscribeCallback,
    ) -> Result<(), TransportError> {
        self.subscribers
            .lock()
            .entry(topic.to_owned())
            .or_default()
            .push(callback);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{Location, RobotMode};

    #[test]
    fn reads_drain_the_queue() {
        let transport = LoopbackTransport::new();
        transport.send_mode_request(&ModeRequest {
            robot_name: "r1".to_owned(),
            task_id: 1,
            mode: RobotMode::Paused,
            parameters: vec![],
        });

        assert_eq!(transport.read_mode_requests().len(), 1);
        assert!(transport.read_mode_requests().is_empty());
    }

    #[test]
    fn states_preserve_arrival_order() {
        let transport = LoopbackTransport::new();
        for name in ["r1", "r2", "r3"] {
            transport.send_state(&RobotState {
                name: name.to_owned(),
                model: "testbot".to_owned(),
                task_id: 0,
                mode: RobotMode::Idle,
                battery_percent: 1.0,
                location: Location {
                    map_name: "L1".to_owned(),
                    x: 0.0,
                    y: 0.0,
                    yaw: 0.0,
                },
                path_target_index: 0,
            });
        }

        let names: Vec<_> = transport
            .read_states()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, ["r1", "r2", "r3"]);
    }

    #[test]
    fn broker_delivers_to_all_subscribers_of_a_topic() {
        let broker = InProcBroker::default();
        let hits = Arc::new(Mutex::new(0u32));

        for _ in 0..2 {
            let hits = Arc::clone(&hits);
            broker
                .subscribe("t", Box::new(move |_| *hits.lock() += 1))
                .unwrap();
        }

        broker.publish("t", b"x").unwrap();
        broker.publish("other", b"x").unwrap();
        assert_eq!(*hits.lock(), 2);
    }
}
