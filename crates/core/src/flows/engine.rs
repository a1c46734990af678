use thiserror::Error;

use crate::flows::states::{FlowAction, FlowEvent, FlowState, TransitionOutcome};

pub trait FlowDefinition {
    fn initial_state(&self) -> FlowState;
    fn transition(
        &self,
        current: &FlowState,
        event: &FlowEvent,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
}

/// Mention → prompt → poll → results lifecycle of one channel's meetup.
#[derive(Clone, Debug, Default)]
pub struct MeetupFlow;

impl FlowDefinition for MeetupFlow {
    fn initial_state(&self) -> FlowState {
        FlowState::Idle
    }

    fn transition(
        &self,
        current: &FlowState,
        event: &FlowEvent,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_meetup(current, event)
    }
}

#[derive(Clone, Debug, Default)]
pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn initial_state(&self) -> FlowState {
        self.flow.initial_state()
    }

    pub fn apply(
        &self,
        current: &FlowState,
        event: &FlowEvent,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.flow.transition(current, event)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: FlowState, event: FlowEvent },
}

fn transition_meetup(
    current: &FlowState,
    event: &FlowEvent,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use FlowAction::{
        ArmPollResolution, ArmPromptExpiry, AttachInterestMarker, AttachVoteMarkers,
        ConsumeMention, DiscardMention, PostPoll, PostPrompt, PostResults, ReleasePollReservation,
        TallyVotes,
    };
    use FlowEvent::{
        IdleWindowElapsed, KeywordMentioned, MentionThresholdReached, PollDeliveryFailed,
        PromptDeliveryFailed, PromptExpired, ReactionThresholdReached, ResolutionFailed,
        VoteWindowElapsed,
    };
    use FlowState::{Accumulating, Idle, Polling, Prompted, Resolved};

    let (to, actions) = match (current, event) {
        (Idle, KeywordMentioned) | (Accumulating, KeywordMentioned) => {
            (Accumulating, Vec::new())
        }
        (Prompted, KeywordMentioned) => (Prompted, Vec::new()),
        // The tracker resets stale records itself on the next mention.
        (Accumulating, IdleWindowElapsed) | (Prompted, IdleWindowElapsed) => (Idle, Vec::new()),
        (Accumulating, MentionThresholdReached) => {
            (Prompted, vec![PostPrompt, AttachInterestMarker, ArmPromptExpiry])
        }
        (Prompted, PromptDeliveryFailed) | (Prompted, PromptExpired) => {
            (Idle, vec![DiscardMention])
        }
        (Prompted, ReactionThresholdReached) => {
            (Polling, vec![PostPoll, AttachVoteMarkers, ConsumeMention, ArmPollResolution])
        }
        (Polling, PollDeliveryFailed) => (Prompted, vec![ReleasePollReservation]),
        (Polling, VoteWindowElapsed) => (Resolved, vec![TallyVotes, PostResults]),
        (Polling, ResolutionFailed) => (Resolved, Vec::new()),
        _ => {
            return Err(FlowTransitionError::InvalidTransition {
                state: current.clone(),
                event: event.clone(),
            });
        }
    };

    Ok(TransitionOutcome { from: current.clone(), to, event: event.clone(), actions })
}

#[cfg(test)]
mod tests {
    use crate::flows::engine::{FlowEngine, FlowTransitionError, MeetupFlow};
    use crate::flows::states::{FlowAction, FlowEvent, FlowState};

    #[test]
    fn meetup_happy_path_reaches_resolved() {
        let engine = FlowEngine::new(MeetupFlow);
        let mut state = engine.initial_state();

        state = engine
            .apply(&state, &FlowEvent::KeywordMentioned)
            .expect("idle -> accumulating")
            .to;
        let prompted = engine
            .apply(&state, &FlowEvent::MentionThresholdReached)
            .expect("accumulating -> prompted");
        assert_eq!(prompted.to, FlowState::Prompted);
        assert_eq!(
            prompted.actions,
            vec![
                FlowAction::PostPrompt,
                FlowAction::AttachInterestMarker,
                FlowAction::ArmPromptExpiry
            ]
        );

        let polling = engine
            .apply(&prompted.to, &FlowEvent::ReactionThresholdReached)
            .expect("prompted -> polling");
        assert_eq!(polling.to, FlowState::Polling);
        assert!(polling.actions.contains(&FlowAction::ConsumeMention));

        let resolved = engine
            .apply(&polling.to, &FlowEvent::VoteWindowElapsed)
            .expect("polling -> resolved");
        assert_eq!(resolved.to, FlowState::Resolved);
        assert_eq!(resolved.actions, vec![FlowAction::TallyVotes, FlowAction::PostResults]);
    }

    #[test]
    fn expired_prompt_returns_to_idle_and_discards_mention() {
        let engine = FlowEngine::<MeetupFlow>::default();

        let outcome = engine
            .apply(&FlowState::Prompted, &FlowEvent::PromptExpired)
            .expect("prompted -> idle");

        assert_eq!(outcome.to, FlowState::Idle);
        assert_eq!(outcome.actions, vec![FlowAction::DiscardMention]);
    }

    #[test]
    fn failed_poll_delivery_releases_the_reservation() {
        let engine = FlowEngine::<MeetupFlow>::default();

        let outcome = engine
            .apply(&FlowState::Polling, &FlowEvent::PollDeliveryFailed)
            .expect("polling -> prompted");

        assert_eq!(outcome.to, FlowState::Prompted);
        assert_eq!(outcome.actions, vec![FlowAction::ReleasePollReservation]);
    }

    #[test]
    fn invalid_transition_is_rejected() {
        let engine = FlowEngine::<MeetupFlow>::default();
        let error = engine
            .apply(&FlowState::Idle, &FlowEvent::VoteWindowElapsed)
            .expect_err("idle cannot resolve a poll");

        assert!(matches!(
            error,
            FlowTransitionError::InvalidTransition {
                state: FlowState::Idle,
                event: FlowEvent::VoteWindowElapsed
            }
        ));
    }

    #[test]
    fn resolved_is_terminal() {
        let engine = FlowEngine::<MeetupFlow>::default();
        for event in [
            FlowEvent::KeywordMentioned,
            FlowEvent::PromptExpired,
            FlowEvent::VoteWindowElapsed,
            FlowEvent::ReactionThresholdReached,
        ] {
            assert!(engine.apply(&FlowState::Resolved, &event).is_err());
        }
    }
}
