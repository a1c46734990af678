use chrono::{DateTime, NaiveDate, Utc, Weekday};
use hotbot_core::schedule::format_candidate;
use hotbot_core::tally::TallyOutcome;
use serde::Serialize;

pub const PROMPT_COLOR: u32 = 0xFF6B35;
pub const POLL_COLOR: u32 = 0x4CAF50;
pub const RESULTS_COLOR: u32 = 0xFFD700;

const FOOTER_BRAND: &str = "HotBot";
const MEDALS: [&str; 3] = ["🥇", "🥈", "🥉"];
const UNPLACED: &str = "📍";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CardField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// Backend-neutral rich message. Backends map it onto their own format.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageCard {
    pub title: String,
    pub description: String,
    pub color: u32,
    pub fields: Vec<CardField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

pub struct CardBuilder {
    card: MessageCard,
}

impl CardBuilder {
    pub fn new(title: impl Into<String>, color: u32) -> Self {
        Self {
            card: MessageCard {
                title: title.into(),
                description: String::new(),
                color,
                fields: Vec::new(),
                footer: None,
                timestamp: None,
            },
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.card.description = description.into();
        self
    }

    pub fn field<F>(mut self, name: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut FieldBuilder),
    {
        let mut builder = FieldBuilder::default();
        build(&mut builder);
        self.card.fields.push(builder.build(name.into()));
        self
    }

    pub fn footer(mut self, footer: impl Into<String>) -> Self {
        self.card.footer = Some(format!("{FOOTER_BRAND} • {}", footer.into()));
        self
    }

    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.card.timestamp = Some(timestamp);
        self
    }

    pub fn build(self) -> MessageCard {
        self.card
    }
}

#[derive(Default)]
pub struct FieldBuilder {
    lines: Vec<String>,
    inline: bool,
}

impl FieldBuilder {
    pub fn line(&mut self, text: impl Into<String>) -> &mut Self {
        self.lines.push(text.into());
        self
    }

    pub fn inline(&mut self) -> &mut Self {
        self.inline = true;
        self
    }

    fn build(self, name: String) -> CardField {
        CardField { name, value: self.lines.join("\n"), inline: self.inline }
    }
}

pub fn interest_prompt_card(
    participant_count: usize,
    reaction_threshold: u32,
    weekday: Weekday,
    expiry_minutes: u64,
    now: DateTime<Utc>,
) -> MessageCard {
    CardBuilder::new("🍲 Hotpot Interest Detected!", PROMPT_COLOR)
        .description(format!(
            "I see {participant_count} people are interested in hotpot! React with 🔥 if you want to join a hotpot meetup!"
        ))
        .field("Next Steps", |field| {
            field.line(format!(
                "Need {reaction_threshold} {} to create a scheduling poll for upcoming {}s!",
                plural(u64::from(reaction_threshold), "reaction", "reactions"),
                weekday_name(weekday)
            ));
        })
        .footer(format!(
            "React within {expiry_minutes} {}!",
            plural(expiry_minutes, "minute", "minutes")
        ))
        .timestamp(now)
        .build()
}

pub fn poll_card(
    candidates: &[NaiveDate],
    weekday: Weekday,
    vote_window_hours: u64,
    now: DateTime<Utc>,
) -> MessageCard {
    let builder = CardBuilder::new("🗓️ Hotpot Meetup Poll", POLL_COLOR).description(format!(
        "Great! Enough people are interested. Please vote for your preferred {}:",
        weekday_name(weekday)
    ));

    candidates
        .iter()
        .enumerate()
        .fold(builder, |builder, (index, date)| {
            builder.field(format!("Option {}", index + 1), |field| {
                field.line(format_candidate(*date)).inline();
            })
        })
        .footer(format!(
            "Vote ends in {vote_window_hours} {}",
            plural(vote_window_hours, "hour", "hours")
        ))
        .timestamp(now)
        .build()
}

pub fn results_card(outcome: &TallyOutcome, now: DateTime<Utc>) -> MessageCard {
    let description = match outcome.winner() {
        Some(winner) => format!(
            "**Winner:** {} with {} {}!",
            format_candidate(winner.date),
            winner.votes,
            plural(u64::from(winner.votes), "vote", "votes")
        ),
        None => "No votes were cast for any option.".to_owned(),
    };

    let mut builder = CardBuilder::new("🎉 Hotpot Poll Results!", RESULTS_COLOR)
        .description(description)
        .field("All Results", |field| {
            for (rank, entry) in outcome.entries.iter().enumerate() {
                let medal = MEDALS.get(rank).copied().unwrap_or(UNPLACED);
                field.line(format!(
                    "{medal} {}: {} {}",
                    format_candidate(entry.date),
                    entry.votes,
                    plural(u64::from(entry.votes), "vote", "votes")
                ));
            }
        });

    if outcome.winner().is_some() {
        builder = builder.field("Next Steps", |field| {
            field.line("Coordinate the details in this channel. Enjoy your hotpot! 🍲");
        });
    }

    builder.footer("Time to plan your hotpot meetup!").timestamp(now).build()
}

fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

fn plural(count: u64, one: &'static str, many: &'static str) -> &'static str {
    if count == 1 {
        one
    } else {
        many
    }
}
