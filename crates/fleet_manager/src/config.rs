use std::sync::Arc;

use chrono::{DateTime, Utc};
use fleet_api::transport::Transport;

use crate::graph::NavGraph;
use crate::robot_info::RobotInfo;
use crate::transform::CoordinateTransformer;

/// Injectable time source. Production code passes `Utc::now`; tests pass a
/// controllable clock.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Invoked from the poll loop after every ingested state report, with the
/// robot's (possibly freshly created) info handle.
pub type RobotUpdatedCallback = Arc<dyn Fn(&Arc<RobotInfo>) + Send + Sync>;

/// Maximum distance between a declared waypoint location and the graph node
/// at its index for a navigation path to be accepted.
pub const DEFAULT_WAYPOINT_MATCH_TOLERANCE: f64 = 1e-3;

/// Relocalization targets at or beyond this distance from their reference
/// waypoint are rejected as implausible.
pub const DEFAULT_RELOCALIZATION_DISTANCE_THRESHOLD: f64 = 10.0;

/// How many acknowledged requests are retained in the task map before the
/// oldest are evicted. Unacknowledged requests are never evicted.
pub const DEFAULT_COMPLETED_TASK_RETENTION: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("fleet name must not be empty")]
    EmptyFleetName,
}

/// Construction-time configuration for [`crate::Manager`].
pub struct ManagerConfig {
    pub fleet_name: String,
    pub graph: Arc<NavGraph>,
    pub transport: Arc<dyn Transport>,
    pub transformer: Arc<dyn CoordinateTransformer>,
    pub clock: Clock,
    pub robot_updated_callback: Option<RobotUpdatedCallback>,
    pub waypoint_match_tolerance: f64,
    pub relocalization_distance_threshold: f64,
    pub completed_task_retention: usize,
}

impl ManagerConfig {
    /// Builds a configuration with the wall clock, no robot-updated
    /// callback and default thresholds. Override fields as needed before
    /// handing it to [`crate::Manager::new`].
    pub fn new(
        fleet_name: impl Into<String>,
        graph: Arc<NavGraph>,
        transport: Arc<dyn Transport>,
        transformer: Arc<dyn CoordinateTransformer>,
    ) -> Self {
        Self {
            fleet_name: fleet_name.into(),
            graph,
            transport,
            transformer,
            clock: Arc::new(Utc::now),
            robot_updated_callback: None,
            waypoint_match_tolerance: DEFAULT_WAYPOINT_MATCH_TOLERANCE,
            relocalization_distance_threshold: DEFAULT_RELOCALIZATION_DISTANCE_THRESHOLD,
            completed_task_retention: DEFAULT_COMPLETED_TASK_RETENTION,
        }
    }
}
