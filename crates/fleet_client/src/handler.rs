use fleet_api::messages::{
    ModeRequest, NavigationRequest, RelocalizationRequest, RobotState,
};

/// Human-readable failure reported by a [`CommandHandler`].
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Contract for the robot-side code that actually drives the hardware.
///
/// Accepting a request obliges the handler to report the request's task ID
/// in every subsequent [`RobotState`] until a newer request is accepted;
/// that report is what acknowledges the command to the manager. Returning
/// an error leaves the request unaccepted, and the manager's next retry
/// delivery will reach the handler again.
pub trait CommandHandler: Send {
    /// The robot's current state, in the robot's own frame.
    fn current_state(&self) -> Result<RobotState, HandlerError>;

    fn handle_mode_request(&mut self, request: &ModeRequest)
        -> Result<(), HandlerError>;

    fn handle_navigation_request(
        &mut self,
        request: &NavigationRequest,
    ) -> Result<(), HandlerError>;

    fn handle_relocalization_request(
        &mut self,
        request: &RelocalizationRequest,
    ) -> Result<(), HandlerError>;
}
