use serde::{Deserialize, Serialize};

/// Identifier correlating a dispatched command with the robot's later
/// acknowledgment of having received it.
///
/// A 32-bit space lets a manager identify over 4 billion commands, which is
/// more than any fleet is expected to hold outstanding at once; wrap-around
/// is accepted rather than specially handled.
pub type TaskId = u32;

/// Reserved task ID meaning "idle, no active task". Robots report this when
/// they have nothing assigned; it is never allocated to a real request.
pub const IDLE_TASK_ID: TaskId = 0;

/// A pose on a named map. Frame-relative: fleet frame or robot frame
/// depending on which side of the coordinate transform it sits on, but
/// never ambiguous within a single message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub map_name: String,
    pub x: f64,
    pub y: f64,
    pub yaw: f64,
}

/// One node of the navigation graph a robot should visit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    /// Index of this waypoint on the navigation graph.
    pub index: u32,
    pub location: Location,
}

/// Operating mode of a robot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RobotMode {
    Idle,
    Charging,
    Moving,
    Paused,
    Waiting,
    Emergency,
    GoingHome,
    Docking,
    Error,
}

/// Free-form name/value parameter attached to a mode request, for modes
/// that need extra arguments (e.g. a docking target).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeParameter {
    pub name: String,
    pub value: String,
}

/// Periodic status report produced by a robot.
///
/// The location is expressed in the robot's own frame on the wire; the
/// manager transforms it into the fleet frame on ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotState {
    pub name: String,
    pub model: String,
    /// The task the robot last accepted, or [`IDLE_TASK_ID`].
    pub task_id: TaskId,
    pub mode: RobotMode,
    pub battery_percent: f64,
    pub location: Location,
    /// Index into the current navigation path the robot is heading for.
    pub path_target_index: u32,
}

/// Command a robot to change its operating mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeRequest {
    pub robot_name: String,
    pub task_id: TaskId,
    pub mode: RobotMode,
    pub parameters: Vec<ModeParameter>,
}

/// Command a robot to follow a path of navigation-graph waypoints.
///
/// Waypoint locations are in the robot frame by the time this message is
/// on the wire; the manager validates and transforms them before sending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationRequest {
    pub robot_name: String,
    pub task_id: TaskId,
    pub path: Vec<Waypoint>,
}

/// Command a robot to re-initialize its localization at a given location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelocalizationRequest {
    pub robot_name: String,
    pub task_id: TaskId,
    pub location: Location,
    /// The last visited or nearest waypoint on the navigation graph, so the
    /// robot can continue tracking its progress through the graph.
    pub last_visited_waypoint_index: u32,
}
