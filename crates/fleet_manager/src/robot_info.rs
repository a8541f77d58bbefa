use std::sync::Arc;

use chrono::{DateTime, Utc};
use fleet_api::messages::RobotState;
use glam::DVec2;
use parking_lot::RwLock;

use crate::graph::NavGraph;

struct Inner {
    state: RobotState,
    last_updated: DateTime<Utc>,
}

/// Thread-safe cache of one robot's latest known state.
///
/// Created the first time a robot name is seen and never destroyed while
/// the manager lives; every subsequent report for the same name mutates the
/// same instance in place. Readers always observe a consistent snapshot of
/// state and timestamp. The held location is in the fleet frame.
pub struct RobotInfo {
    name: String,
    graph: Arc<NavGraph>,
    inner: RwLock<Inner>,
}

impl RobotInfo {
    pub(crate) fn new(state: RobotState, graph: Arc<NavGraph>, now: DateTime<Utc>) -> Self {
        Self {
            name: state.name.clone(),
            graph,
            inner: RwLock::new(Inner {
                state,
                last_updated: now,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The most recent state report, fleet frame.
    pub fn state(&self) -> RobotState {
        self.inner.read().state.clone()
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.inner.read().last_updated
    }

    /// State and last-update time read under one lock.
    pub fn snapshot(&self) -> (RobotState, DateTime<Utc>) {
        let inner = self.inner.read();
        (inner.state.clone(), inner.last_updated)
    }

    /// The navigation graph shared across the fleet.
    pub fn graph(&self) -> &Arc<NavGraph> {
        &self.graph
    }

    /// Straight-line distance from the robot's reported position to the
    /// graph waypoint it is currently heading for, if that index is on the
    /// graph.
    pub fn distance_to_target(&self) -> Option<f64> {
        let inner = self.inner.read();
        let target = self
            .graph
            .waypoint(inner.state.path_target_index as usize)?;
        let position = DVec2::new(inner.state.location.x, inner.state.location.y);
        Some(position.distance(target.position))
    }

    pub(crate) fn update_state(&self, state: RobotState, now: DateTime<Utc>) {
        debug_assert_eq!(state.name, self.name);
        let mut inner = self.inner.write();
        inner.state = state;
        inner.last_updated = now;
    }
}
