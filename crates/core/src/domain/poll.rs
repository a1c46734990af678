use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::ids::{ChannelId, MessageId};

/// Vote markers, one per candidate date, in candidate order.
pub const VOTE_MARKERS: [&str; 4] = ["1️⃣", "2️⃣", "3️⃣", "4️⃣"];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollRecord {
    pub prompt_message_id: MessageId,
    pub poll_message_id: MessageId,
    pub channel_id: ChannelId,
    pub candidates: Vec<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PollRecord {
    /// Pairs each candidate date with the vote marker that selects it.
    pub fn ballot(&self) -> impl Iterator<Item = (&'static str, NaiveDate)> + '_ {
        VOTE_MARKERS.iter().copied().zip(self.candidates.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, TimeZone, Utc};

    use super::PollRecord;
    use crate::domain::ids::{ChannelId, MessageId};

    #[test]
    fn ballot_pairs_markers_with_candidates_in_order() {
        let created_at = Utc.with_ymd_and_hms(2025, 3, 5, 12, 0, 0).single().expect("valid");
        let first = NaiveDate::from_ymd_opt(2025, 3, 7).expect("valid");
        let second = NaiveDate::from_ymd_opt(2025, 3, 14).expect("valid");
        let poll = PollRecord {
            prompt_message_id: MessageId::from("prompt"),
            poll_message_id: MessageId::from("poll"),
            channel_id: ChannelId::from("general"),
            candidates: vec![first, second],
            created_at,
            expires_at: created_at + Duration::hours(24),
        };

        let ballot: Vec<_> = poll.ballot().collect();

        assert_eq!(ballot, vec![("1️⃣", first), ("2️⃣", second)]);
    }
}
