use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyEntry {
    /// Position of the candidate in the poll, i.e. which vote marker it had.
    pub index: usize,
    pub date: NaiveDate,
    pub votes: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyOutcome {
    pub entries: Vec<TallyEntry>,
}

impl TallyOutcome {
    pub fn winner(&self) -> Option<&TallyEntry> {
        self.entries.first().filter(|entry| entry.votes > 0)
    }

    pub fn total_votes(&self) -> u32 {
        self.entries.iter().map(|entry| entry.votes).sum()
    }
}

/// Orders candidates by votes, highest first. Ties keep poll order and a
/// missing count is treated as zero votes.
pub fn tally(candidates: &[NaiveDate], counts_by_index: &[u32]) -> TallyOutcome {
    let mut entries: Vec<TallyEntry> = candidates
        .iter()
        .enumerate()
        .map(|(index, date)| TallyEntry {
            index,
            date: *date,
            votes: counts_by_index.get(index).copied().unwrap_or(0),
        })
        .collect();
    entries.sort_by(|left, right| right.votes.cmp(&left.votes));
    TallyOutcome { entries }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::tally;

    fn candidates() -> Vec<NaiveDate> {
        [7, 14, 21, 28]
            .into_iter()
            .map(|day| NaiveDate::from_ymd_opt(2025, 3, day).expect("valid date"))
            .collect()
    }

    fn order(counts: &[u32]) -> Vec<usize> {
        tally(&candidates(), counts).entries.iter().map(|entry| entry.index).collect()
    }

    #[test]
    fn sorts_by_votes_descending_with_stable_ties() {
        assert_eq!(order(&[2, 0, 1, 0]), vec![0, 2, 1, 3]);
        assert_eq!(order(&[1, 3, 3, 0]), vec![1, 2, 0, 3]);
    }

    #[test]
    fn winner_is_the_top_entry_when_it_has_votes() {
        let outcome = tally(&candidates(), &[0, 0, 4, 1]);

        let winner = outcome.winner().expect("winner");
        assert_eq!(winner.index, 2);
        assert_eq!(winner.votes, 4);
        assert_eq!(outcome.total_votes(), 5);
    }

    #[test]
    fn all_zero_votes_is_a_valid_outcome_without_winner() {
        let outcome = tally(&candidates(), &[0, 0, 0, 0]);

        assert!(outcome.winner().is_none());
        assert_eq!(outcome.entries.len(), 4);
        assert_eq!(order(&[0, 0, 0, 0]), vec![0, 1, 2, 3]);
    }

    #[test]
    fn missing_counts_are_zero() {
        let outcome = tally(&candidates(), &[0, 2]);

        assert_eq!(outcome.entries[0].index, 1);
        assert_eq!(outcome.entries[0].votes, 2);
        assert!(outcome.entries[1..].iter().all(|entry| entry.votes == 0));
    }
}
