use thiserror::Error;

/// Rejected tunable. The controller is left untouched when this is returned.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ControllerError {
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter {
        name: &'static str,
        reason: &'static str,
    },
}

impl ControllerError {
    pub(crate) fn invalid(name: &'static str, reason: &'static str) -> Self {
        ControllerError::InvalidParameter { name, reason }
    }
}

/// The recurrence produced a non-finite output.
///
/// Rolling state was not advanced; `held_output` is the last valid
/// (clamped) output and is what the actuator should keep receiving.
#[derive(Clone, Copy, Debug, Error, PartialEq)]
#[error("non-finite controller output for feedback {feedback}, holding {held_output}")]
pub struct NumericFault {
    pub feedback: f64,
    pub held_output: f64,
}
