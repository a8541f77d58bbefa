use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use glam::DVec2;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use fleet_api::messages::{
    Location, ModeParameter, ModeRequest, NavigationRequest, RelocalizationRequest,
    RobotMode, RobotState, TaskId, Waypoint, IDLE_TASK_ID,
};
use fleet_api::transport::Transport;

use crate::config::{Clock, ConfigError, ManagerConfig, RobotUpdatedCallback};
use crate::graph::NavGraph;
use crate::metrics::Metrics;
use crate::requests::{RequestInfo, RequestKind};
use crate::robot_info::RobotInfo;
use crate::transform::CoordinateTransformer;

/// Mutable fleet state. A single mutex guards all of it: the robot map,
/// both task maps and the task-ID counter.
#[derive(Default)]
struct FleetState {
    robots: HashMap<String, Arc<RobotInfo>>,
    tasks: HashMap<TaskId, RequestInfo>,
    unacknowledged: HashSet<TaskId>,
    /// Acknowledged task IDs in acknowledgment order, for bounded retention.
    completed: VecDeque<TaskId>,
    last_task_id: TaskId,
}

impl FleetState {
    /// Allocates the next task ID, skipping the reserved idle sentinel.
    fn allocate_task_id(&mut self) -> TaskId {
        self.last_task_id = self.last_task_id.wrapping_add(1);
        if self.last_task_id == IDLE_TASK_ID {
            self.last_task_id = self.last_task_id.wrapping_add(1);
        }
        self.last_task_id
    }

    fn register(&mut self, info: RequestInfo) {
        let task_id = info.task_id();
        self.tasks.insert(task_id, info);
        self.unacknowledged.insert(task_id);
    }
}

struct ManagerContext {
    fleet_name: String,
    graph: Arc<NavGraph>,
    transport: Arc<dyn Transport>,
    transformer: Arc<dyn CoordinateTransformer>,
    clock: Clock,
    robot_updated_callback: Option<RobotUpdatedCallback>,
    waypoint_match_tolerance: f64,
    relocalization_distance_threshold: f64,
    completed_task_retention: usize,
    metrics: Arc<Metrics>,
    state: Mutex<FleetState>,
}

impl ManagerContext {
    /// One poll iteration: ingest newly arrived state reports, reconcile
    /// the acknowledgments they carry, then re-send everything still
    /// unacknowledged. Reports within one iteration are processed strictly
    /// sequentially, and re-sends happen only after the whole batch has
    /// been reconciled, so a request is never re-sent in the iteration that
    /// acknowledged it.
    fn run_once(&self) {
        let reports = self.transport.read_states();
        let mut state = self.state.lock();

        for report in reports {
            self.metrics.states_received_total.inc();
            let now = (self.clock)();
            let task_id = report.task_id;

            let fleet_frame_state = RobotState {
                location: self.transformer.backward_transform(&report.location),
                ..report
            };

            let robot = match state.robots.get(&fleet_frame_state.name) {
                Some(existing) => {
                    existing.update_state(fleet_frame_state, now);
                    Arc::clone(existing)
                }
                None => {
                    let info = Arc::new(RobotInfo::new(
                        fleet_frame_state,
                        Arc::clone(&self.graph),
                        now,
                    ));
                    tracing::info!(
                        fleet_name = %self.fleet_name,
                        robot_name = %info.name(),
                        "Registered new robot"
                    );
                    state.robots.insert(info.name().to_owned(), Arc::clone(&info));
                    self.metrics.robots_registered_total.inc();
                    self.metrics.robots_known.set(state.robots.len() as i64);
                    info
                }
            };

            if let Some(callback) = &self.robot_updated_callback {
                callback(&robot);
            }

            // The reported task ID acknowledges an outstanding request for
            // this robot, if one matches.
            if task_id != IDLE_TASK_ID && state.unacknowledged.contains(&task_id) {
                let matches_robot = state
                    .tasks
                    .get(&task_id)
                    .is_some_and(|task| task.robot_name() == robot.name());
                if matches_robot {
                    if let Some(task) = state.tasks.get_mut(&task_id) {
                        task.acknowledge(now);
                    }
                    state.unacknowledged.remove(&task_id);
                    state.completed.push_back(task_id);
                    tracing::debug!(
                        task_id,
                        robot_name = %robot.name(),
                        "Request acknowledged"
                    );
                    self.metrics.requests_acknowledged_total.inc();

                    while state.completed.len() > self.completed_task_retention {
                        if let Some(oldest) = state.completed.pop_front() {
                            state.tasks.remove(&oldest);
                        }
                    }
                }
            }
        }

        // Send out everything still unacknowledged.
        for task_id in &state.unacknowledged {
            if let Some(task) = state.tasks.get(task_id) {
                task.send_request();
                self.metrics.requests_resent_total.inc();
            }
        }
        self.metrics
            .unacknowledged_requests
            .set(state.unacknowledged.len() as i64);
    }

    /// Records a freshly validated request, dispatches it immediately and
    /// registers it for retry until acknowledged.
    fn dispatch(&self, state: &mut FleetState, request: RequestKind) {
        let info = RequestInfo::new(request, Arc::clone(&self.transport), (self.clock)());
        info.send_request();
        state.register(info);
        self.metrics.requests_sent_total.inc();
        self.metrics
            .unacknowledged_requests
            .set(state.unacknowledged.len() as i64);
    }
}

/// The fleet manager. See the crate docs for the protocol overview.
///
/// All public operations are safe to call from any thread concurrently with
/// the background poll loop.
pub struct Manager {
    ctx: Arc<ManagerContext>,
    shutdown_tx: watch::Sender<bool>,
    poll_task: Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
}

impl Manager {
    /// Validates the configuration and builds a manager. No background work
    /// starts until [`Manager::start`] is called.
    pub fn new(config: ManagerConfig) -> Result<Self, ConfigError> {
        if config.fleet_name.is_empty() {
            return Err(ConfigError::EmptyFleetName);
        }

        let (shutdown_tx, _) = watch::channel(false);
        Ok(Self {
            ctx: Arc::new(ManagerContext {
                fleet_name: config.fleet_name,
                graph: config.graph,
                transport: config.transport,
                transformer: config.transformer,
                clock: config.clock,
                robot_updated_callback: config.robot_updated_callback,
                waypoint_match_tolerance: config.waypoint_match_tolerance,
                relocalization_distance_threshold: config
                    .relocalization_distance_threshold,
                completed_task_retention: config.completed_task_retention,
                metrics: Arc::new(Metrics::new()),
                state: Mutex::new(FleetState::default()),
            }),
            shutdown_tx,
            poll_task: Mutex::new(None),
            started: AtomicBool::new(false),
        })
    }

    pub fn fleet_name(&self) -> &str {
        &self.ctx.fleet_name
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.ctx.metrics
    }

    /// Begins the background poll loop at `frequency` iterations per
    /// second. Must be called from within a Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if `frequency` is zero or if the manager has already been
    /// started. Both are programmer errors, not runtime conditions to
    /// recover from.
    pub fn start(&self, frequency: u32) {
        assert!(frequency > 0, "poll frequency must be greater than 0");
        assert!(
            !self.started.swap(true, Ordering::SeqCst),
            "manager has already been started"
        );

        let period = Duration::from_secs_f64(1.0 / f64::from(frequency));
        let ctx = Arc::clone(&self.ctx);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let handle = tokio::spawn(async move {
            tracing::info!(
                fleet_name = %ctx.fleet_name,
                frequency,
                "Manager poll loop started"
            );
            let mut interval = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = interval.tick() => ctx.run_once(),
                }
            }
            tracing::info!(fleet_name = %ctx.fleet_name, "Manager poll loop stopped");
        });
        *self.poll_task.lock() = Some(handle);
    }

    /// Signals the poll loop to stop and waits for it to exit. Dropping the
    /// manager signals the loop as well, without waiting.
    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
        let handle = self.poll_task.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Runs one poll iteration synchronously on the caller's thread.
    /// Useful for deterministic stepping in tests or custom schedulers;
    /// the background loop invokes exactly this.
    pub fn run_once(&self) {
        self.ctx.run_once();
    }

    /// Snapshot of the currently known robot names.
    pub fn robot_names(&self) -> Vec<String> {
        self.ctx.state.lock().robots.keys().cloned().collect()
    }

    /// The info handle for a robot, or `None` if the name is unknown.
    pub fn robot(&self, robot_name: &str) -> Option<Arc<RobotInfo>> {
        self.ctx.state.lock().robots.get(robot_name).cloned()
    }

    /// Snapshot of all known robots' info handles.
    pub fn all_robots(&self) -> Vec<Arc<RobotInfo>> {
        self.ctx.state.lock().robots.values().cloned().collect()
    }

    /// Sends a mode request to a robot. Returns the allocated task ID, or
    /// `None` if the robot is unknown.
    pub fn send_mode_request(
        &self,
        robot_name: &str,
        mode: RobotMode,
        parameters: Vec<ModeParameter>,
    ) -> Option<TaskId> {
        let result = self.try_send_mode_request(robot_name, mode, parameters);
        if result.is_none() {
            self.ctx.metrics.requests_rejected_total.inc();
        }
        result
    }

    /// Sends a navigation request. Every waypoint of the path must name an
    /// in-range graph index and match that graph node's map and location
    /// within the configured tolerance; any mismatch rejects the whole
    /// request with `None` and nothing is dispatched. Waypoint locations
    /// are transformed into the robot frame before sending.
    pub fn send_navigation_request(
        &self,
        robot_name: &str,
        path: Vec<Waypoint>,
    ) -> Option<TaskId> {
        let result = self.try_send_navigation_request(robot_name, path);
        if result.is_none() {
            self.ctx.metrics.requests_rejected_total.inc();
        }
        result
    }

    /// Sends a relocalization request. The reference waypoint index must be
    /// on the graph and the target location within the configured distance
    /// of it; otherwise returns `None` and nothing is dispatched.
    pub fn send_relocalization_request(
        &self,
        robot_name: &str,
        location: Location,
        last_visited_waypoint_index: u32,
    ) -> Option<TaskId> {
        let result = self.try_send_relocalization_request(
            robot_name,
            location,
            last_visited_waypoint_index,
        );
        if result.is_none() {
            self.ctx.metrics.requests_rejected_total.inc();
        }
        result
    }

    fn try_send_mode_request(
        &self,
        robot_name: &str,
        mode: RobotMode,
        parameters: Vec<ModeParameter>,
    ) -> Option<TaskId> {
        let mut state = self.ctx.state.lock();
        if !state.robots.contains_key(robot_name) {
            return None;
        }

        let task_id = state.allocate_task_id();
        let request = ModeRequest {
            robot_name: robot_name.to_owned(),
            task_id,
            mode,
            parameters,
        };
        self.ctx.dispatch(&mut state, RequestKind::Mode(request));
        Some(task_id)
    }

    fn try_send_navigation_request(
        &self,
        robot_name: &str,
        path: Vec<Waypoint>,
    ) -> Option<TaskId> {
        let mut state = self.ctx.state.lock();
        if path.is_empty() || !state.robots.contains_key(robot_name) {
            return None;
        }

        let mut transformed_path = Vec::with_capacity(path.len());
        for waypoint in &path {
            let graph_waypoint = self.ctx.graph.waypoint(waypoint.index as usize)?;
            let provided = DVec2::new(waypoint.location.x, waypoint.location.y);
            if graph_waypoint.map_name != waypoint.location.map_name
                || provided.distance(graph_waypoint.position)
                    > self.ctx.waypoint_match_tolerance
            {
                return None;
            }
            transformed_path.push(Waypoint {
                index: waypoint.index,
                location: self.ctx.transformer.forward_transform(&waypoint.location),
            });
        }

        let task_id = state.allocate_task_id();
        let request = NavigationRequest {
            robot_name: robot_name.to_owned(),
            task_id,
            path: transformed_path,
        };
        self.ctx
            .dispatch(&mut state, RequestKind::Navigation(request));
        Some(task_id)
    }

    fn try_send_relocalization_request(
        &self,
        robot_name: &str,
        location: Location,
        last_visited_waypoint_index: u32,
    ) -> Option<TaskId> {
        let mut state = self.ctx.state.lock();
        if !state.robots.contains_key(robot_name) {
            return None;
        }

        let waypoint = self
            .ctx
            .graph
            .waypoint(last_visited_waypoint_index as usize)?;
        let distance = DVec2::new(location.x, location.y).distance(waypoint.position);
        if distance >= self.ctx.relocalization_distance_threshold {
            return None;
        }

        let transformed_location = self.ctx.transformer.forward_transform(&location);
        let task_id = state.allocate_task_id();
        let request = RelocalizationRequest {
            robot_name: robot_name.to_owned(),
            task_id,
            location: transformed_location,
            last_visited_waypoint_index,
        };
        self.ctx
            .dispatch(&mut state, RequestKind::Relocalization(request));
        Some(task_id)
    }
}
