//! Simulation harness: a manager, a handful of simulated robots and a
//! command driver wired over an in-process broker, each side with its own
//! topic transport exactly as they would be over a real message broker.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use glam::DVec2;
use parking_lot::Mutex;
use tracing_subscriber::{fmt, EnvFilter};

use fleet_api::loopback::InProcBroker;
use fleet_api::messages::{
    Location, ModeRequest, NavigationRequest, RelocalizationRequest, RobotMode,
    RobotState, Waypoint, IDLE_TASK_ID,
};
use fleet_api::topic::TopicTransport;
use fleet_client::{Client, CommandHandler, HandlerError};
use fleet_manager::config::ManagerConfig;
use fleet_manager::graph::{GraphWaypoint, NavGraph};
use fleet_manager::transform::FrameTransform;
use fleet_manager::Manager;

/// Holds all configuration for the simulation binary.
#[derive(Debug, Clone)]
struct Config {
    fleet_name: String,
    num_robots: u32,
    manager_frequency_hz: u32,
    robot_frequency_hz: u32,
    command_interval: Duration,
    metrics_listen_addr: SocketAddr,
}

impl Config {
    /// Parses configuration from environment variables.
    fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            fleet_name: std::env::var("FLEET_NAME").unwrap_or_else(|_| "sim_fleet".into()),
            num_robots: std::env::var("NUM_ROBOTS")
                .unwrap_or_else(|_| "3".into())
                .parse()
                .context("Failed to parse NUM_ROBOTS")?,
            manager_frequency_hz: std::env::var("MANAGER_FREQUENCY_HZ")
                .unwrap_or_else(|_| "10".into())
                .parse()
                .context("Failed to parse MANAGER_FREQUENCY_HZ")?,
            robot_frequency_hz: std::env::var("ROBOT_FREQUENCY_HZ")
                .unwrap_or_else(|_| "5".into())
                .parse()
                .context("Failed to parse ROBOT_FREQUENCY_HZ")?,
            command_interval: Duration::from_millis(
                std::env::var("COMMAND_INTERVAL_MS")
                    .unwrap_or_else(|_| "5000".into())
                    .parse()
                    .context("Failed to parse COMMAND_INTERVAL_MS")?,
            ),
            metrics_listen_addr: std::env::var("METRICS_LISTEN_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:9090".into())
                .parse()
                .context("Failed to parse METRICS_LISTEN_ADDR")?,
        })
    }
}

/// A 4x2 grid of waypoints on one map, 10 units apart.
fn demo_graph() -> NavGraph {
    let waypoints = (0..8)
        .map(|i| GraphWaypoint {
            map_name: "demo".to_owned(),
            position: DVec2::new(f64::from(i % 4) * 10.0, f64::from(i / 4) * 10.0),
        })
        .collect();
    NavGraph::new(waypoints)
}

struct SimState {
    state: RobotState,
    path: VecDeque<Waypoint>,
    speed: f64,
}

impl SimState {
    /// Advances the robot one step toward its current path target and
    /// drains the battery a little.
    fn tick(&mut self) {
        self.state.battery_percent =
            (self.state.battery_percent - 0.0005 * rand::random::<f64>()).max(0.05);

        let Some(target) = self.path.front() else {
            return;
        };
        let position = DVec2::new(self.state.location.x, self.state.location.y);
        let goal = DVec2::new(target.location.x, target.location.y);
        let to_goal = goal - position;
        let distance = to_goal.length();

        if distance <= self.speed {
            self.state.location.x = goal.x;
            self.state.location.y = goal.y;
            self.path.pop_front();
            match self.path.front() {
                Some(next) => self.state.path_target_index = next.index,
                None => self.state.mode = RobotMode::Idle,
            }
        } else {
            let step = to_goal / distance * self.speed;
            self.state.location.x += step.x;
            self.state.location.y += step.y;
        }
    }
}

/// Simulated robot: accepts every command and wanders toward the waypoints
/// of its assigned path at a fixed speed.
struct SimRobot {
    inner: Mutex<SimState>,
}

impl SimRobot {
    fn new(name: &str, start: &GraphWaypoint) -> Self {
        Self {
            inner: Mutex::new(SimState {
                state: RobotState {
                    name: name.to_owned(),
                    model: "simbot".to_owned(),
                    task_id: IDLE_TASK_ID,
                    mode: RobotMode::Idle,
                    battery_percent: 1.0,
                    location: Location {
                        map_name: start.map_name.clone(),
                        x: start.position.x,
                        y: start.position.y,
                        yaw: 0.0,
                    },
                    path_target_index: 0,
                },
                path: VecDeque::new(),
                speed: 0.5,
            }),
        }
    }
}

impl CommandHandler for SimRobot {
    fn current_state(&self) -> Result<RobotState, HandlerError> {
        let mut inner = self.inner.lock();
        inner.tick();
        Ok(inner.state.clone())
    }

    fn handle_mode_request(&mut self, request: &ModeRequest) -> Result<(), HandlerError> {
        let mut inner = self.inner.lock();
        inner.state.mode = request.mode;
        inner.state.task_id = request.task_id;
        Ok(())
    }

    fn handle_navigation_request(
        &mut self,
        request: &NavigationRequest,
    ) -> Result<(), HandlerError> {
        let mut inner = self.inner.lock();
        inner.path = request.path.iter().cloned().collect();
        if let Some(first) = inner.path.front() {
            inner.state.path_target_index = first.index;
        }
        inner.state.mode = RobotMode::Moving;
        inner.state.task_id = request.task_id;
        Ok(())
    }

    fn handle_relocalization_request(
        &mut self,
        request: &RelocalizationRequest,
    ) -> Result<(), HandlerError> {
        let mut inner = self.inner.lock();
        inner.state.location = request.location.clone();
        inner.state.task_id = request.task_id;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let config = Config::from_env()?;
    tracing::info!(config = ?config, "Loaded configuration");

    let graph = Arc::new(demo_graph());
    let broker = Arc::new(InProcBroker::default());

    let manager_config = ManagerConfig::new(
        config.fleet_name.clone(),
        Arc::clone(&graph),
        Arc::new(TopicTransport::manager_side(
            Arc::clone(&broker),
            config.fleet_name.clone(),
        )?),
        Arc::new(FrameTransform::identity()),
    );
    let manager = Arc::new(Manager::new(manager_config)?);
    manager.start(config.manager_frequency_hz);

    // Spawn the simulated robots, each with its own subscription to the
    // request topics.
    let mut clients = Vec::new();
    for i in 0..config.num_robots {
        let name = format!("sim_robot_{i}");
        let start = graph
            .waypoint(i as usize % graph.num_waypoints())
            .expect("demo graph is non-empty");
        let transport = Arc::new(TopicTransport::robot_side(
            Arc::clone(&broker),
            config.fleet_name.clone(),
        )?);
        let client = Client::new(
            name.as_str(),
            Box::new(SimRobot::new(&name, start)),
            transport,
        )?;
        client.start(config.robot_frequency_hz);
        clients.push(client);
    }

    // Spawn the metrics server.
    let metrics_handle = {
        let router = manager.metrics().router();
        let addr = config.metrics_listen_addr;
        tokio::spawn(async move {
            let listener = tokio::net::TcpListener::bind(addr).await?;
            tracing::info!(addr = %addr, "Metrics server started");
            axum::serve(listener, router.into_make_service()).await?;
            Ok::<(), anyhow::Error>(())
        })
    };

    // Spawn the command driver: periodically steer a random robot to a
    // random waypoint so the retry/acknowledgment machinery has traffic.
    let driver_handle = {
        let manager = Arc::clone(&manager);
        let graph = Arc::clone(&graph);
        let interval = config.command_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let names = manager.robot_names();
                if names.is_empty() {
                    continue;
                }
                let robot_name = &names[rand::random::<usize>() % names.len()];
                let index = rand::random::<usize>() % graph.num_waypoints();
                let target = graph.waypoint(index).expect("index is in range");
                let path = vec![Waypoint {
                    index: index as u32,
                    location: Location {
                        map_name: target.map_name.clone(),
                        x: target.position.x,
                        y: target.position.y,
                        yaw: 0.0,
                    },
                }];
                match manager.send_navigation_request(robot_name, path) {
                    Some(task_id) => {
                        tracing::info!(robot_name = %robot_name, task_id, waypoint = index, "Dispatched navigation command");
                    }
                    None => {
                        tracing::warn!(robot_name = %robot_name, "Navigation command rejected");
                    }
                }
            }
        })
    };

    tracing::info!("Simulation running. Awaiting shutdown signal...");
    shutdown_signal().await;
    tracing::info!("Shutdown signal received. Terminating...");

    driver_handle.abort();
    metrics_handle.abort();
    for client in &clients {
        client.stop().await;
    }
    manager.stop().await;

    tracing::info!("Simulation shut down gracefully.");
    Ok(())
}

/// Listens for OS shutdown signals (SIGINT, SIGTERM) and resolves when one is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
