use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowState {
    Idle,
    Accumulating,
    Prompted,
    Polling,
    Resolved,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowEvent {
    KeywordMentioned,
    MentionThresholdReached,
    IdleWindowElapsed,
    PromptDeliveryFailed,
    PromptExpired,
    ReactionThresholdReached,
    PollDeliveryFailed,
    VoteWindowElapsed,
    ResolutionFailed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowAction {
    PostPrompt,
    AttachInterestMarker,
    ArmPromptExpiry,
    DiscardMention,
    PostPoll,
    AttachVoteMarkers,
    ConsumeMention,
    ArmPollResolution,
    ReleasePollReservation,
    TallyVotes,
    PostResults,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: FlowState,
    pub to: FlowState,
    pub event: FlowEvent,
    pub actions: Vec<FlowAction>,
}
