use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use crate::domain::ids::{ChannelId, MessageId, ParticipantId};
use crate::domain::mention::MentionRecord;
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MentionSettings {
    /// Distinct participants needed before an interest prompt is posted.
    pub threshold: usize,
    /// Quiet period after which a channel's record starts over.
    pub idle_window: Duration,
}

impl Default for MentionSettings {
    fn default() -> Self {
        Self { threshold: 2, idle_window: Duration::minutes(30) }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MentionDecision {
    pub should_prompt: bool,
    pub current_count: usize,
}

/// Channel-keyed interest accumulator.
///
/// `record_mention` answers `should_prompt` exactly once per record: only the
/// mention that moves the count onto the threshold, and only while no prompt
/// is attached. Later participants push the count past the threshold, so a
/// second prompt cannot be requested before the first is posted.
#[derive(Clone, Debug, Default)]
pub struct MentionTracker {
    settings: MentionSettings,
    records: HashMap<ChannelId, MentionRecord>,
}

impl MentionTracker {
    pub fn new(settings: MentionSettings) -> Self {
        Self { settings, records: HashMap::new() }
    }

    pub fn settings(&self) -> MentionSettings {
        self.settings
    }

    pub fn record_mention(
        &mut self,
        channel_id: &ChannelId,
        participant_id: &ParticipantId,
        now: DateTime<Utc>,
    ) -> Result<MentionDecision, DomainError> {
        if participant_id.as_str().trim().is_empty() {
            return Err(DomainError::InvariantViolation(
                "participant id must not be empty".to_owned(),
            ));
        }

        let MentionSettings { threshold, idle_window } = self.settings;
        let record =
            self.records.entry(channel_id.clone()).or_insert_with(|| MentionRecord::new(now));

        if now - record.last_activity() > idle_window {
            record.reset();
        }

        if !record.admit(participant_id.clone(), now) {
            return Ok(MentionDecision { should_prompt: false, current_count: record.count() });
        }

        let current_count = record.count();
        let should_prompt = current_count == threshold && record.prompt_message_id().is_none();
        Ok(MentionDecision { should_prompt, current_count })
    }

    /// Remembers the posted prompt for the channel. Returns false when the
    /// channel has no record.
    pub fn attach_prompt(&mut self, channel_id: &ChannelId, prompt_message_id: &MessageId) -> bool {
        match self.records.get_mut(channel_id) {
            Some(record) => {
                record.set_prompt(prompt_message_id.clone());
                true
            }
            None => false,
        }
    }

    /// Deletes the record only while it still points at `prompt_message_id`;
    /// a record that was reset or re-prompted since is left alone.
    pub fn expire_prompt(&mut self, channel_id: &ChannelId, prompt_message_id: &MessageId) -> bool {
        let still_current = self
            .records
            .get(channel_id)
            .and_then(MentionRecord::prompt_message_id)
            .is_some_and(|current| current == prompt_message_id);
        if still_current {
            self.records.remove(channel_id);
        }
        still_current
    }

    pub fn consume_for_poll(&mut self, channel_id: &ChannelId) -> Option<MentionRecord> {
        self.records.remove(channel_id)
    }

    /// Drops a record whose prompt never made it out. Records that already
    /// carry a prompt are kept.
    pub fn release_prompt(&mut self, channel_id: &ChannelId) -> bool {
        let unprompted = self
            .records
            .get(channel_id)
            .is_some_and(|record| record.prompt_message_id().is_none());
        if unprompted {
            self.records.remove(channel_id);
        }
        unprompted
    }

    pub fn prompt_for(&self, channel_id: &ChannelId) -> Option<MessageId> {
        self.records.get(channel_id).and_then(MentionRecord::prompt_message_id).cloned()
    }

    pub fn get(&self, channel_id: &ChannelId) -> Option<&MentionRecord> {
        self.records.get(channel_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
