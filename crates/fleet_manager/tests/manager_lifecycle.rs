//! Deterministic manager tests, stepped with `run_once` over the loopback
//! transport and a fixed clock.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use glam::DVec2;

use fleet_api::loopback::LoopbackTransport;
use fleet_api::messages::{
    Location, RobotMode, RobotState, TaskId, Waypoint, IDLE_TASK_ID,
};
use fleet_api::transport::Transport;
use fleet_manager::config::{Clock, ManagerConfig};
use fleet_manager::graph::{GraphWaypoint, NavGraph};
use fleet_manager::transform::FrameTransform;
use fleet_manager::{ConfigError, Manager};

/// Three waypoints: two on map L1 ten units apart, one on map L2.
fn test_graph() -> Arc<NavGraph> {
    Arc::new(NavGraph::new(vec![
        GraphWaypoint {
            map_name: "L1".to_owned(),
            position: DVec2::new(0.0, 0.0),
        },
        GraphWaypoint {
            map_name: "L1".to_owned(),
            position: DVec2::new(10.0, 0.0),
        },
        GraphWaypoint {
            map_name: "L2".to_owned(),
            position: DVec2::new(0.0, 10.0),
        },
    ]))
}

fn fixed_clock() -> Clock {
    Arc::new(|| Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
}

/// Manager over the given transport, with a fleet->robot transform that
/// translates by (+5, 0).
fn test_manager(transport: Arc<LoopbackTransport>) -> Manager {
    let mut config = ManagerConfig::new(
        "test_fleet",
        test_graph(),
        transport,
        Arc::new(FrameTransform::new(0.0, 1.0, DVec2::new(5.0, 0.0))),
    );
    config.clock = fixed_clock();
    Manager::new(config).unwrap()
}

/// A state report in the robot frame.
fn report(name: &str, task_id: TaskId, x: f64) -> RobotState {
    RobotState {
        name: name.to_owned(),
        model: "testbot".to_owned(),
        task_id,
        mode: RobotMode::Idle,
        battery_percent: 0.9,
        location: Location {
            map_name: "L1".to_owned(),
            x,
            y: 0.0,
            yaw: 0.0,
        },
        path_target_index: 0,
    }
}

fn graph_waypoint(index: u32, map_name: &str, x: f64, y: f64) -> Waypoint {
    Waypoint {
        index,
        location: Location {
            map_name: map_name.to_owned(),
            x,
            y,
            yaw: 0.0,
        },
    }
}

fn register_robot(manager: &Manager, transport: &LoopbackTransport, name: &str) {
    transport.send_state(&report(name, IDLE_TASK_ID, 0.0));
    manager.run_once();
}

#[test]
fn empty_fleet_name_is_a_config_error() {
    let config = ManagerConfig::new(
        "",
        test_graph(),
        LoopbackTransport::new(),
        Arc::new(FrameTransform::identity()),
    );
    assert!(matches!(
        Manager::new(config),
        Err(ConfigError::EmptyFleetName)
    ));
}

#[test]
fn first_report_creates_one_robot_info_and_later_reports_mutate_it() {
    let transport = LoopbackTransport::new();
    let manager = test_manager(Arc::clone(&transport));

    // Robot frame x=5.0 lands at fleet frame x=0.0 under the (+5, 0)
    // fleet->robot translation.
    transport.send_state(&report("r1", IDLE_TASK_ID, 5.0));
    manager.run_once();

    assert_eq!(manager.robot_names(), ["r1"]);
    let first = manager.robot("r1").unwrap();
    assert!((first.state().location.x - 0.0).abs() < 1e-9);

    transport.send_state(&report("r1", IDLE_TASK_ID, 6.0));
    manager.run_once();

    let second = manager.robot("r1").unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert!((second.state().location.x - 1.0).abs() < 1e-9);
    assert_eq!(manager.robot_names().len(), 1);
    assert_eq!(manager.all_robots().len(), 1);
    assert!(manager.robot("r2").is_none());
}

#[test]
fn robot_updated_callback_fires_for_every_report_including_the_first() {
    let transport = LoopbackTransport::new();
    let updates = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&updates);

    let mut config = ManagerConfig::new(
        "test_fleet",
        test_graph(),
        Arc::clone(&transport) as Arc<dyn Transport>,
        Arc::new(FrameTransform::identity()),
    );
    config.clock = fixed_clock();
    config.robot_updated_callback = Some(Arc::new(move |robot| {
        assert_eq!(robot.name(), "r1");
        counter.fetch_add(1, Ordering::SeqCst);
    }));
    let manager = Manager::new(config).unwrap();

    transport.send_state(&report("r1", IDLE_TASK_ID, 0.0));
    manager.run_once();
    transport.send_state(&report("r1", IDLE_TASK_ID, 1.0));
    manager.run_once();

    assert_eq!(updates.load(Ordering::SeqCst), 2);
}

#[test]
fn requests_to_unknown_robots_are_rejected_without_dispatch() {
    let transport = LoopbackTransport::new();
    let manager = test_manager(Arc::clone(&transport));

    assert!(manager
        .send_mode_request("ghost", RobotMode::Paused, vec![])
        .is_none());
    assert!(manager
        .send_navigation_request("ghost", vec![graph_waypoint(0, "L1", 0.0, 0.0)])
        .is_none());
    assert!(manager
        .send_relocalization_request(
            "ghost",
            Location {
                map_name: "L1".to_owned(),
                x: 0.0,
                y: 0.0,
                yaw: 0.0,
            },
            0,
        )
        .is_none());

    assert!(transport.read_mode_requests().is_empty());
    assert!(transport.read_navigation_requests().is_empty());
    assert!(transport.read_relocalization_requests().is_empty());
    assert_eq!(manager.metrics().requests_sent_total.get(), 0);
    assert_eq!(manager.metrics().requests_rejected_total.get(), 3);
}

#[test]
fn non_conforming_navigation_paths_are_rejected_outright() {
    let transport = LoopbackTransport::new();
    let manager = test_manager(Arc::clone(&transport));
    register_robot(&manager, &transport, "r1");

    // Empty path.
    assert!(manager.send_navigation_request("r1", vec![]).is_none());
    // Waypoint index beyond the graph.
    assert!(manager
        .send_navigation_request("r1", vec![graph_waypoint(7, "L1", 0.0, 0.0)])
        .is_none());
    // Declared map does not match the graph node.
    assert!(manager
        .send_navigation_request("r1", vec![graph_waypoint(0, "L2", 0.0, 0.0)])
        .is_none());
    // A correct first waypoint does not save a second one whose location
    // is a unit off the graph node at its index.
    assert!(manager
        .send_navigation_request(
            "r1",
            vec![
                graph_waypoint(0, "L1", 0.0, 0.0),
                graph_waypoint(1, "L1", 11.0, 0.0),
            ],
        )
        .is_none());

    assert!(transport.read_navigation_requests().is_empty());
    assert_eq!(manager.metrics().requests_sent_total.get(), 0);
}

#[test]
fn conforming_navigation_paths_are_transformed_and_dispatched() {
    let transport = LoopbackTransport::new();
    let manager = test_manager(Arc::clone(&transport));
    register_robot(&manager, &transport, "r1");

    // Within the 1e-3 match tolerance.
    let task_id = manager
        .send_navigation_request(
            "r1",
            vec![
                graph_waypoint(0, "L1", 0.0005, 0.0),
                graph_waypoint(1, "L1", 10.0, 0.0),
            ],
        )
        .expect("path conforms to the graph");
    assert_ne!(task_id, IDLE_TASK_ID);

    let sent = transport.read_navigation_requests();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].robot_name, "r1");
    assert_eq!(sent[0].task_id, task_id);
    // Waypoints are in the robot frame on the wire: fleet x + 5.
    assert!((sent[0].path[0].location.x - 5.0005).abs() < 1e-9);
    assert!((sent[0].path[1].location.x - 15.0).abs() < 1e-9);
}

#[test]
fn relocalization_is_rejected_out_of_range_or_too_far() {
    let transport = LoopbackTransport::new();
    let manager = test_manager(Arc::clone(&transport));
    register_robot(&manager, &transport, "r1");

    let near = Location {
        map_name: "L1".to_owned(),
        x: 3.0,
        y: 4.0,
        yaw: 0.0,
    };
    // Waypoint index off the graph.
    assert!(manager
        .send_relocalization_request("r1", near.clone(), 9)
        .is_none());
    // Exactly at the 10-unit threshold: still rejected.
    let far = Location {
        map_name: "L1".to_owned(),
        x: 10.0,
        y: 0.0,
        yaw: 0.0,
    };
    assert!(manager.send_relocalization_request("r1", far, 0).is_none());
    assert!(transport.read_relocalization_requests().is_empty());

    // Five units from waypoint 0: accepted, transformed to robot frame.
    let task_id = manager
        .send_relocalization_request("r1", near, 0)
        .expect("target is close enough to the reference waypoint");
    let sent = transport.read_relocalization_requests();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].task_id, task_id);
    assert_eq!(sent[0].last_visited_waypoint_index, 0);
    assert!((sent[0].location.x - 8.0).abs() < 1e-9);
}

#[test]
fn unacknowledged_requests_are_resent_until_the_matching_report_arrives() {
    let transport = LoopbackTransport::new();
    let manager = test_manager(Arc::clone(&transport));
    register_robot(&manager, &transport, "r1");

    let task_id = manager
        .send_mode_request("r1", RobotMode::Paused, vec![])
        .expect("robot is known");

    // Initial dispatch happens synchronously.
    assert_eq!(transport.read_mode_requests().len(), 1);

    // Each poll iteration without an acknowledgment re-sends in full.
    manager.run_once();
    assert_eq!(transport.read_mode_requests().len(), 1);
    manager.run_once();
    manager.run_once();
    assert_eq!(transport.read_mode_requests().len(), 2);

    // The robot's next report carries the task ID: acknowledged, and not
    // re-sent in the same iteration.
    transport.send_state(&report("r1", task_id, 0.0));
    manager.run_once();
    assert!(transport.read_mode_requests().is_empty());

    manager.run_once();
    assert!(transport.read_mode_requests().is_empty());

    assert_eq!(manager.metrics().requests_acknowledged_total.get(), 1);
    assert_eq!(manager.metrics().unacknowledged_requests.get(), 0);
    assert_eq!(manager.robot("r1").unwrap().state().task_id, task_id);
}

#[test]
fn consecutive_task_ids_are_distinct_and_never_the_idle_sentinel() {
    let transport = LoopbackTransport::new();
    let manager = test_manager(Arc::clone(&transport));
    register_robot(&manager, &transport, "r1");

    let mut seen = std::collections::HashSet::new();
    for _ in 0..2000 {
        let task_id = manager
            .send_mode_request("r1", RobotMode::Paused, vec![])
            .unwrap();
        assert_ne!(task_id, IDLE_TASK_ID);
        assert!(seen.insert(task_id), "task ID allocated twice");
    }
}

#[test]
#[should_panic(expected = "greater than 0")]
fn zero_frequency_start_panics() {
    let manager = test_manager(LoopbackTransport::new());
    manager.start(0);
}

#[tokio::test]
#[should_panic(expected = "already been started")]
async fn double_start_panics() {
    let manager = test_manager(LoopbackTransport::new());
    manager.start(10);
    manager.start(10);
}
