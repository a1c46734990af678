use thiserror::Error;

use crate::{domain::ids::MessageId, flows::FlowTransitionError};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("a poll already exists for prompt `{prompt_message_id}`")]
    DuplicatePoll { prompt_message_id: MessageId },
    #[error(transparent)]
    FlowTransition(#[from] FlowTransitionError),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("integration failure: {0}")]
    Integration(String),
}

impl From<FlowTransitionError> for ApplicationError {
    fn from(value: FlowTransitionError) -> Self {
        Self::Domain(DomainError::FlowTransition(value))
    }
}

impl ApplicationError {
    /// Outbound chat failures are expected from time to time and are logged
    /// as warnings; everything else points at a bug or bad deployment.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Integration(_))
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::ids::MessageId;
    use crate::errors::{ApplicationError, DomainError};
    use crate::flows::{FlowEvent, FlowState, FlowTransitionError};

    #[test]
    fn duplicate_poll_names_the_prompt() {
        let error = DomainError::DuplicatePoll { prompt_message_id: MessageId::from("prompt-9") };

        assert_eq!(error.to_string(), "a poll already exists for prompt `prompt-9`");
    }

    #[test]
    fn flow_transition_error_lifts_into_application_error() {
        let error = ApplicationError::from(FlowTransitionError::InvalidTransition {
            state: FlowState::Idle,
            event: FlowEvent::VoteWindowElapsed,
        });

        assert!(matches!(error, ApplicationError::Domain(DomainError::FlowTransition(_))));
        assert!(!error.is_transient());
    }

    #[test]
    fn integration_failures_are_transient() {
        let error = ApplicationError::Integration("chat backend returned 502".to_owned());

        assert!(error.is_transient());
        assert_eq!(error.to_string(), "integration failure: chat backend returned 502");
    }
}
