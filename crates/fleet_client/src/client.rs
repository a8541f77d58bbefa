use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use fleet_api::messages::TaskId;
use fleet_api::transport::Transport;

use crate::handler::{CommandHandler, HandlerError};

/// How many accepted task IDs are remembered for deduplicating repeated
/// deliveries. The manager stops re-sending once acknowledged, so a small
/// window is plenty.
const ACCEPTED_TASK_HISTORY: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("robot name must not be empty")]
    EmptyRobotName,
}

/// Bounded set of recently accepted task IDs, oldest evicted first.
#[derive(Default)]
struct AcceptedTasks {
    set: HashSet<TaskId>,
    order: VecDeque<TaskId>,
}

impl AcceptedTasks {
    fn contains(&self, task_id: TaskId) -> bool {
        self.set.contains(&task_id)
    }

    fn insert(&mut self, task_id: TaskId) {
        if self.set.insert(task_id) {
            self.order.push_back(task_id);
            while self.order.len() > ACCEPTED_TASK_HISTORY {
                if let Some(oldest) = self.order.pop_front() {
                    self.set.remove(&oldest);
                }
            }
        }
    }

    fn remove(&mut self, task_id: TaskId) {
        if self.set.remove(&task_id) {
            self.order.retain(|id| *id != task_id);
        }
    }
}

struct ClientContext {
    robot_name: String,
    transport: Arc<dyn Transport>,
    handler: Mutex<Box<dyn CommandHandler>>,
    accepted: Mutex<AcceptedTasks>,
}

impl ClientContext {
    /// One poll iteration: drain the three request kinds, dispatch the ones
    /// addressed to this robot that have not been accepted before, then
    /// publish the current state.
    fn run_once(&self) {
        for request in self.transport.read_mode_requests() {
            if request.robot_name != self.robot_name {
                continue;
            }
            self.dispatch(request.task_id, |handler| {
                handler.handle_mode_request(&request)
            });
        }
        for request in self.transport.read_navigation_requests() {
            if request.robot_name != self.robot_name {
                continue;
            }
            self.dispatch(request.task_id, |handler| {
                handler.handle_navigation_request(&request)
            });
        }
        for request in self.transport.read_relocalization_requests() {
            if request.robot_name != self.robot_name {
                continue;
            }
            self.dispatch(request.task_id, |handler| {
                handler.handle_relocalization_request(&request)
            });
        }

        match self.handler.lock().current_state() {
            Ok(state) => {
                if state.name == self.robot_name {
                    self.transport.send_state(&state);
                } else {
                    tracing::warn!(
                        reported = %state.name,
                        expected = %self.robot_name,
                        "Handler reported a state for the wrong robot; not publishing"
                    );
                }
            }
            Err(error) => {
                tracing::warn!(error = %error, "Failed to obtain current robot state");
            }
        }
    }

    /// Runs one command through the handler unless its task ID was already
    /// accepted (the transport delivers at-least-once). A handler error
    /// leaves the task unaccepted so the manager's next retry delivery is
    /// attempted again.
    fn dispatch(
        &self,
        task_id: TaskId,
        run: impl FnOnce(&mut dyn CommandHandler) -> Result<(), HandlerError>,
    ) {
        {
            let mut accepted = self.accepted.lock();
            if accepted.contains(task_id) {
                tracing::debug!(task_id, "Ignoring repeated delivery");
                return;
            }
            accepted.insert(task_id);
        }

        let result = {
            let mut handler = self.handler.lock();
            run(handler.as_mut())
        };
        if let Err(error) = result {
            tracing::warn!(task_id, error = %error, "Command handler rejected request");
            self.accepted.lock().remove(task_id);
        }
    }
}

/// Robot-side counterpart of the fleet manager.
pub struct Client {
    ctx: Arc<ClientContext>,
    shutdown_tx: watch::Sender<bool>,
    poll_task: Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
}

impl Client {
    pub fn new(
        robot_name: impl Into<String>,
        handler: Box<dyn CommandHandler>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ConfigError> {
        let robot_name = robot_name.into();
        if robot_name.is_empty() {
            return Err(ConfigError::EmptyRobotName);
        }

        let (shutdown_tx, _) = watch::channel(false);
        Ok(Self {
            ctx: Arc::new(ClientContext {
                robot_name,
                transport,
                handler: Mutex::new(handler),
                accepted: Mutex::new(AcceptedTasks::default()),
            }),
            shutdown_tx,
            poll_task: Mutex::new(None),
            started: AtomicBool::new(false),
        })
    }

    pub fn robot_name(&self) -> &str {
        &self.ctx.robot_name
    }

    /// Begins the background poll loop at `frequency` iterations per
    /// second. Must be called from within a Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if `frequency` is zero or if the client has already been
    /// started.
    pub fn start(&self, frequency: u32) {
        assert!(frequency > 0, "poll frequency must be greater than 0");
        assert!(
            !self.started.swap(true, Ordering::SeqCst),
            "client has already been started"
        );

        let period = Duration::from_secs_f64(1.0 / f64::from(frequency));
        let ctx = Arc::clone(&self.ctx);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let handle = tokio::spawn(async move {
            tracing::info!(robot_name = %ctx.robot_name, frequency, "Client poll loop started");
            let mut interval = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = interval.tick() => ctx.run_once(),
                }
            }
            tracing::info!(robot_name = %ctx.robot_name, "Client poll loop stopped");
        });
        *self.poll_task.lock() = Some(handle);
    }

    /// Signals the poll loop to stop and waits for it to exit.
    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
        let handle = self.poll_task.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Runs one poll iteration synchronously on the caller's thread.
    pub fn run_once(&self) {
        self.ctx.run_once();
    }
}
