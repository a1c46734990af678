pub mod engine;
pub mod states;

pub use engine::{FlowDefinition, FlowEngine, FlowTransitionError, MeetupFlow};
pub use states::{FlowAction, FlowEvent, FlowState, TransitionOutcome};
