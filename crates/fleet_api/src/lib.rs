//! Shared wire messages and transport abstractions for the fleet
//! coordination system.
//!
//! Both the manager and the robot-side client depend on this crate: the
//! manager reads [`messages::RobotState`] reports and sends command
//! requests, the client does the reverse. The [`transport::Transport`]
//! trait is the seam where concrete middlewares (MQTT, Zenoh, in-process
//! loopback) plug in.

pub mod loopback;
pub mod messages;
pub mod topic;
pub mod transport;
