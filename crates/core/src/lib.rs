pub mod clock;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod keywords;
pub mod mentions;
pub mod polls;
pub mod schedule;
pub mod tally;

pub use clock::{Clock, ManualClock, SystemClock};
pub use domain::ids::{ChannelId, MessageId, ParticipantId};
pub use domain::mention::{MentionRecord, INTEREST_MARKER};
pub use domain::poll::{PollRecord, VOTE_MARKERS};
pub use errors::{ApplicationError, DomainError};
pub use keywords::KeywordMatcher;
pub use mentions::{MentionDecision, MentionSettings, MentionTracker};
pub use polls::{PollDecision, PollManager, PollSettings};
pub use schedule::{format_candidate, CandidateSchedule};
pub use tally::{tally, TallyEntry, TallyOutcome};
