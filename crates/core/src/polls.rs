use std::collections::HashMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::domain::ids::{ChannelId, MessageId};
use crate::domain::poll::{PollRecord, VOTE_MARKERS};
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollSettings {
    /// Interest markers (excluding our own) needed to open a poll.
    pub reaction_threshold: u32,
    pub vote_window: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self { reaction_threshold: 1, vote_window: Duration::hours(24) }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollDecision {
    pub should_create: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Reservation {
    channel_id: ChannelId,
    reserved_at: DateTime<Utc>,
}

/// Prompt-keyed poll store.
///
/// A positive `try_create_poll` answer reserves the prompt until
/// `create_poll` or `abandon_reservation`, so concurrent marker events for
/// the same prompt cannot both decide to post a poll.
#[derive(Clone, Debug, Default)]
pub struct PollManager {
    settings: PollSettings,
    polls: HashMap<MessageId, PollRecord>,
    reservations: HashMap<MessageId, Reservation>,
}

impl PollManager {
    pub fn new(settings: PollSettings) -> Self {
        Self { settings, polls: HashMap::new(), reservations: HashMap::new() }
    }

    pub fn settings(&self) -> PollSettings {
        self.settings
    }

    pub fn try_create_poll(
        &mut self,
        prompt_message_id: &MessageId,
        channel_id: &ChannelId,
        marker_count: u32,
        now: DateTime<Utc>,
    ) -> PollDecision {
        let taken = self.polls.contains_key(prompt_message_id)
            || self.reservations.contains_key(prompt_message_id);
        let should_create = marker_count >= self.settings.reaction_threshold && !taken;
        if should_create {
            self.reservations.insert(
                prompt_message_id.clone(),
                Reservation { channel_id: channel_id.clone(), reserved_at: now },
            );
        }
        PollDecision { should_create }
    }

    pub fn create_poll(
        &mut self,
        prompt_message_id: &MessageId,
        poll_message_id: &MessageId,
        channel_id: &ChannelId,
        candidates: Vec<NaiveDate>,
        now: DateTime<Utc>,
    ) -> Result<PollRecord, DomainError> {
        if self.polls.contains_key(prompt_message_id) {
            return Err(DomainError::DuplicatePoll {
                prompt_message_id: prompt_message_id.clone(),
            });
        }
        if candidates.len() != VOTE_MARKERS.len() {
            return Err(DomainError::InvariantViolation(format!(
                "a poll needs exactly {} candidate dates, got {}",
                VOTE_MARKERS.len(),
                candidates.len()
            )));
        }
        if let Some(reservation) = self.reservations.get(prompt_message_id) {
            if &reservation.channel_id != channel_id {
                return Err(DomainError::InvariantViolation(format!(
                    "prompt `{prompt_message_id}` was reserved in channel `{}`",
                    reservation.channel_id
                )));
            }
        }

        self.reservations.remove(prompt_message_id);
        let record = PollRecord {
            prompt_message_id: prompt_message_id.clone(),
            poll_message_id: poll_message_id.clone(),
            channel_id: channel_id.clone(),
            candidates,
            created_at: now,
            expires_at: now + self.settings.vote_window,
        };
        self.polls.insert(prompt_message_id.clone(), record.clone());
        Ok(record)
    }

    pub fn resolve_poll(&mut self, prompt_message_id: &MessageId) -> Option<PollRecord> {
        self.polls.remove(prompt_message_id)
    }

    /// Releases a reservation whose poll could not be posted. Returns when
    /// the reservation had been taken, if any.
    pub fn abandon_reservation(&mut self, prompt_message_id: &MessageId) -> Option<DateTime<Utc>> {
        self.reservations.remove(prompt_message_id).map(|reservation| reservation.reserved_at)
    }

    pub fn get(&self, prompt_message_id: &MessageId) -> Option<&PollRecord> {
        self.polls.get(prompt_message_id)
    }

    pub fn len(&self) -> usize {
        self.polls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.polls.is_empty()
    }

    pub fn pending_reservations(&self) -> usize {
        self.reservations.len()
    }
}
