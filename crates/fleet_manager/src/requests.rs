use std::sync::Arc;

use chrono::{DateTime, Utc};
use fleet_api::messages::{
    ModeRequest, NavigationRequest, RelocalizationRequest, TaskId,
};
use fleet_api::transport::Transport;

/// Payload of one outstanding command.
#[derive(Debug, Clone)]
pub enum RequestKind {
    Mode(ModeRequest),
    Navigation(NavigationRequest),
    Relocalization(RelocalizationRequest),
}

impl RequestKind {
    pub fn robot_name(&self) -> &str {
        match self {
            RequestKind::Mode(request) => &request.robot_name,
            RequestKind::Navigation(request) => &request.robot_name,
            RequestKind::Relocalization(request) => &request.robot_name,
        }
    }

    pub fn task_id(&self) -> TaskId {
        match self {
            RequestKind::Mode(request) => request.task_id,
            RequestKind::Navigation(request) => request.task_id,
            RequestKind::Relocalization(request) => request.task_id,
        }
    }
}

/// One outstanding command and its retry bookkeeping.
///
/// The lifecycle is monotonic: dispatched, re-dispatched any number of
/// times, then acknowledged exactly once.
pub struct RequestInfo {
    request: RequestKind,
    transport: Arc<dyn Transport>,
    sent_at: DateTime<Utc>,
    acknowledged_at: Option<DateTime<Utc>>,
}

impl RequestInfo {
    pub fn new(
        request: RequestKind,
        transport: Arc<dyn Transport>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            request,
            transport,
            sent_at: now,
            acknowledged_at: None,
        }
    }

    pub fn robot_name(&self) -> &str {
        self.request.robot_name()
    }

    pub fn task_id(&self) -> TaskId {
        self.request.task_id()
    }

    pub fn sent_at(&self) -> DateTime<Utc> {
        self.sent_at
    }

    pub fn acknowledged_at(&self) -> Option<DateTime<Utc>> {
        self.acknowledged_at
    }

    /// Dispatches the held payload. Every call is a full resend of the
    /// complete request, never a delta.
    pub fn send_request(&self) {
        match &self.request {
            RequestKind::Mode(request) => self.transport.send_mode_request(request),
            RequestKind::Navigation(request) => {
                self.transport.send_navigation_request(request)
            }
            RequestKind::Relocalization(request) => {
                self.transport.send_relocalization_request(request)
            }
        }
    }

    /// Stamps the request as acknowledged. Must be called at most once; a
    /// request is never re-acknowledged.
    pub fn acknowledge(&mut self, now: DateTime<Utc>) {
        debug_assert!(
            self.acknowledged_at.is_none(),
            "request acknowledged more than once"
        );
        if self.acknowledged_at.is_none() {
            self.acknowledged_at = Some(now);
        }
    }
}
