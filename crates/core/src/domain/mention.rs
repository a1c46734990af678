use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::ids::{MessageId, ParticipantId};

/// Marker attached to an interest prompt; participants add it to ask for a poll.
pub const INTEREST_MARKER: &str = "🔥";

/// Per-channel interest state. The participant count is always the size of the
/// participant set, so the two can never drift apart.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MentionRecord {
    participants: BTreeSet<ParticipantId>,
    prompt_message_id: Option<MessageId>,
    last_activity: DateTime<Utc>,
}

impl MentionRecord {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { participants: BTreeSet::new(), prompt_message_id: None, last_activity: now }
    }

    pub fn count(&self) -> usize {
        self.participants.len()
    }

    pub fn contains(&self, participant_id: &ParticipantId) -> bool {
        self.participants.contains(participant_id)
    }

    pub fn prompt_message_id(&self) -> Option<&MessageId> {
        self.prompt_message_id.as_ref()
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }

    /// Returns false when the participant was already counted; activity time
    /// only moves on a new participant.
    pub(crate) fn admit(&mut self, participant_id: ParticipantId, now: DateTime<Utc>) -> bool {
        if !self.participants.insert(participant_id) {
            return false;
        }
        self.last_activity = now;
        true
    }

    pub(crate) fn reset(&mut self) {
        self.participants.clear();
        self.prompt_message_id = None;
    }

    pub(crate) fn set_prompt(&mut self, prompt_message_id: MessageId) {
        self.prompt_message_id = Some(prompt_message_id);
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::MentionRecord;
    use crate::domain::ids::{MessageId, ParticipantId};

    #[test]
    fn repeat_participant_is_not_counted_twice() {
        let start = Utc::now();
        let mut record = MentionRecord::new(start);

        assert!(record.admit(ParticipantId::from("u1"), start));
        assert!(!record.admit(ParticipantId::from("u1"), start + Duration::minutes(5)));
        assert_eq!(record.count(), 1);
        assert_eq!(record.last_activity(), start);
    }

    #[test]
    fn reset_clears_participants_and_prompt() {
        let start = Utc::now();
        let mut record = MentionRecord::new(start);
        record.admit(ParticipantId::from("u1"), start);
        record.set_prompt(MessageId::from("prompt-1"));

        record.reset();

        assert_eq!(record.count(), 0);
        assert!(record.prompt_message_id().is_none());
    }
}
