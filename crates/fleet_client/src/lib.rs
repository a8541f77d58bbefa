//! Robot-side client for the fleet coordination system.
//!
//! A [`Client`] runs next to the robot's own control software. Each poll
//! iteration it drains the command requests the manager has dispatched,
//! hands fresh ones to the [`CommandHandler`] that drives the hardware, and
//! publishes the robot's current state. The manager re-sends every command
//! until the robot's reported task ID acknowledges it, so the client
//! deduplicates repeated deliveries before they reach the handler.

mod client;
mod handler;

pub use client::{Client, ConfigError};
pub use handler::{CommandHandler, HandlerError};
