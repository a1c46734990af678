use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc, Weekday};
use hotbot_core::clock::Clock;
use hotbot_core::config::FlowConfig;
use hotbot_core::domain::ids::{ChannelId, MessageId};
use hotbot_core::domain::mention::{MentionRecord, INTEREST_MARKER};
use hotbot_core::domain::poll::{PollRecord, VOTE_MARKERS};
use hotbot_core::errors::{ApplicationError, DomainError};
use hotbot_core::flows::{
    FlowAction, FlowEngine, FlowEvent, FlowState, MeetupFlow, TransitionOutcome,
};
use hotbot_core::keywords::KeywordMatcher;
use hotbot_core::mentions::MentionTracker;
use hotbot_core::polls::PollManager;
use hotbot_core::schedule::{format_candidate, CandidateSchedule};
use hotbot_core::tally::{tally, TallyOutcome};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::backend::ChatBackend;
use crate::cards::{interest_prompt_card, poll_card, results_card};
use crate::events::{
    EventContext, EventHandlerError, HandlerResult, MessageCreatedEvent, MessageService,
    ReactionAddedEvent, ReactionService,
};
use crate::scheduler::{FiredTask, ScheduledTask, Scheduler, TimerService};

/// Number of live records, exposed through the health endpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FlowSnapshot {
    pub active_mentions: usize,
    pub active_polls: usize,
}

#[derive(Clone, Copy, Debug)]
struct FlowTimings {
    idle_window: chrono::Duration,
    prompt_expiry: Duration,
    vote_window: Duration,
    reaction_threshold: u32,
    weekday: Weekday,
}

#[derive(Debug)]
struct FlowStores {
    mentions: MentionTracker,
    polls: PollManager,
}

/// Working data threaded through the actions of one transition.
#[derive(Debug)]
struct FlowRun {
    channel_id: ChannelId,
    now: DateTime<Utc>,
    participant_count: usize,
    prompt_message_id: Option<MessageId>,
    candidates: Vec<NaiveDate>,
    poll: Option<PollRecord>,
    outcome: Option<TallyOutcome>,
}

impl FlowRun {
    fn new(channel_id: ChannelId, now: DateTime<Utc>) -> Self {
        Self {
            channel_id,
            now,
            participant_count: 0,
            prompt_message_id: None,
            candidates: Vec::new(),
            poll: None,
            outcome: None,
        }
    }

    fn prompt(&self) -> Result<&MessageId, ApplicationError> {
        self.prompt_message_id.as_ref().ok_or_else(|| missing("prompt message id"))
    }

    fn poll(&self) -> Result<&PollRecord, ApplicationError> {
        self.poll.as_ref().ok_or_else(|| missing("poll record"))
    }
}

fn missing(what: &str) -> ApplicationError {
    DomainError::InvariantViolation(format!("{what} is not available for this action")).into()
}

/// Rounded up so a window shorter than one unit never reads as zero.
fn whole_minutes(window: Duration) -> u64 {
    window.as_secs().div_ceil(60)
}

fn whole_hours(window: Duration) -> u64 {
    window.as_secs().div_ceil(3600)
}

/// Owns the mention and poll stores and turns inbound events and fired
/// timers into flow transitions.
///
/// Store access always happens inside `with_stores`, so no lock is held
/// while a chat request is in flight. Decisions that must not race
/// (prompting, opening a poll, resolving) are latched in the stores before
/// the first await.
pub struct FlowCoordinator {
    backend: Arc<dyn ChatBackend>,
    clock: Arc<dyn Clock>,
    scheduler: Scheduler,
    engine: FlowEngine<MeetupFlow>,
    keywords: KeywordMatcher,
    schedule: CandidateSchedule,
    timings: FlowTimings,
    stores: Mutex<FlowStores>,
}

impl FlowCoordinator {
    pub fn new(
        config: &FlowConfig,
        backend: Arc<dyn ChatBackend>,
        clock: Arc<dyn Clock>,
        scheduler: Scheduler,
    ) -> Self {
        let mention_settings = config.mention_settings();
        Self {
            backend,
            clock,
            scheduler,
            engine: FlowEngine::new(MeetupFlow),
            keywords: config.keyword_matcher(),
            schedule: config.candidate_schedule(),
            timings: FlowTimings {
                idle_window: mention_settings.idle_window,
                prompt_expiry: config.prompt_expiry(),
                vote_window: config.vote_window(),
                reaction_threshold: config.reaction_threshold,
                weekday: config.weekday,
            },
            stores: Mutex::new(FlowStores {
                mentions: MentionTracker::new(mention_settings),
                polls: PollManager::new(config.poll_settings()),
            }),
        }
    }

    pub fn snapshot(&self) -> FlowSnapshot {
        self.with_stores(|stores| FlowSnapshot {
            active_mentions: stores.mentions.len(),
            active_polls: stores.polls.len(),
        })
    }

    fn with_stores<T>(&self, apply: impl FnOnce(&mut FlowStores) -> T) -> T {
        match self.stores.lock() {
            Ok(mut stores) => apply(&mut stores),
            Err(poisoned) => apply(&mut poisoned.into_inner()),
        }
    }

    /// Flow state implied by a channel's record, and whether the record has
    /// gone idle.
    fn mention_state(
        &self,
        record: Option<&MentionRecord>,
        now: DateTime<Utc>,
    ) -> (FlowState, bool) {
        match record {
            None => (FlowState::Idle, false),
            Some(record) => {
                let state = if record.prompt_message_id().is_some() {
                    FlowState::Prompted
                } else {
                    FlowState::Accumulating
                };
                (state, now - record.last_activity() > self.timings.idle_window)
            }
        }
    }

    async fn execute(
        &self,
        outcome: &TransitionOutcome,
        run: &mut FlowRun,
        ctx: &EventContext,
    ) -> Result<(), ApplicationError> {
        debug!(
            correlation_id = %ctx.correlation_id,
            channel_id = %run.channel_id,
            from = ?outcome.from,
            to = ?outcome.to,
            event = ?outcome.event,
            "applying flow transition"
        );
        for action in &outcome.actions {
            self.execute_action(action, run, ctx).await?;
        }
        Ok(())
    }

    async fn execute_action(
        &self,
        action: &FlowAction,
        run: &mut FlowRun,
        ctx: &EventContext,
    ) -> Result<(), ApplicationError> {
        match action {
            FlowAction::PostPrompt => {
                let card = interest_prompt_card(
                    run.participant_count,
                    self.timings.reaction_threshold,
                    self.timings.weekday,
                    whole_minutes(self.timings.prompt_expiry),
                    run.now,
                );
                let prompt_message_id = self.backend.post_card(&run.channel_id, &card).await?;
                let attached = self.with_stores(|stores| {
                    stores.mentions.attach_prompt(&run.channel_id, &prompt_message_id)
                });
                if !attached {
                    warn!(
                        correlation_id = %ctx.correlation_id,
                        channel_id = %run.channel_id,
                        prompt_message_id = %prompt_message_id,
                        "mention record vanished before its prompt was attached"
                    );
                }
                info!(
                    event_name = "flow.prompt_posted",
                    correlation_id = %ctx.correlation_id,
                    channel_id = %run.channel_id,
                    prompt_message_id = %prompt_message_id,
                    participants = run.participant_count,
                    "interest prompt posted"
                );
                run.prompt_message_id = Some(prompt_message_id);
            }
            FlowAction::AttachInterestMarker => {
                let prompt = run.prompt()?;
                if let Err(error) =
                    self.backend.add_reaction(&run.channel_id, prompt, INTEREST_MARKER).await
                {
                    warn!(
                        correlation_id = %ctx.correlation_id,
                        channel_id = %run.channel_id,
                        prompt_message_id = %prompt,
                        error = %error,
                        "failed to attach interest marker"
                    );
                }
            }
            FlowAction::ArmPromptExpiry => {
                let task = ScheduledTask::ExpirePrompt {
                    channel_id: run.channel_id.clone(),
                    prompt_message_id: run.prompt()?.clone(),
                };
                let task_id = self.scheduler.schedule(self.timings.prompt_expiry, task);
                debug!(
                    correlation_id = %ctx.correlation_id,
                    task_id = %task_id,
                    delay_secs = self.timings.prompt_expiry.as_secs(),
                    "prompt expiry armed"
                );
            }
            FlowAction::DiscardMention => {
                let discarded = self.with_stores(|stores| match &run.prompt_message_id {
                    Some(prompt) => stores.mentions.expire_prompt(&run.channel_id, prompt),
                    None => stores.mentions.release_prompt(&run.channel_id),
                });
                debug!(
                    correlation_id = %ctx.correlation_id,
                    channel_id = %run.channel_id,
                    discarded,
                    "mention record discarded"
                );
            }
            FlowAction::PostPoll => {
                let prompt = run.prompt()?.clone();
                let card = poll_card(
                    &run.candidates,
                    self.timings.weekday,
                    whole_hours(self.timings.vote_window),
                    run.now,
                );
                let poll_message_id = self.backend.post_card(&run.channel_id, &card).await?;
                let record = self.with_stores(|stores| {
                    stores.polls.create_poll(
                        &prompt,
                        &poll_message_id,
                        &run.channel_id,
                        run.candidates.clone(),
                        run.now,
                    )
                })?;
                info!(
                    event_name = "flow.poll_created",
                    correlation_id = %ctx.correlation_id,
                    channel_id = %run.channel_id,
                    prompt_message_id = %prompt,
                    poll_message_id = %poll_message_id,
                    expires_at = %record.expires_at,
                    "scheduling poll posted"
                );
                run.poll = Some(record);
            }
            FlowAction::AttachVoteMarkers => {
                let poll = run.poll()?;
                for marker in VOTE_MARKERS {
                    if let Err(error) = self
                        .backend
                        .add_reaction(&poll.channel_id, &poll.poll_message_id, marker)
                        .await
                    {
                        warn!(
                            correlation_id = %ctx.correlation_id,
                            poll_message_id = %poll.poll_message_id,
                            marker,
                            error = %error,
                            "failed to attach vote marker"
                        );
                    }
                }
            }
            FlowAction::ConsumeMention => {
                let consumed =
                    self.with_stores(|stores| stores.mentions.consume_for_poll(&run.channel_id));
                debug!(
                    correlation_id = %ctx.correlation_id,
                    channel_id = %run.channel_id,
                    consumed = consumed.is_some(),
                    "mention record consumed by poll"
                );
            }
            FlowAction::ArmPollResolution => {
                let task =
                    ScheduledTask::ResolvePoll { prompt_message_id: run.prompt()?.clone() };
                let task_id = self.scheduler.schedule(self.timings.vote_window, task);
                debug!(
                    correlation_id = %ctx.correlation_id,
                    task_id = %task_id,
                    delay_secs = self.timings.vote_window.as_secs(),
                    "poll resolution armed"
                );
            }
            FlowAction::ReleasePollReservation => {
                let prompt = run.prompt()?.clone();
                let reserved_at =
                    self.with_stores(|stores| stores.polls.abandon_reservation(&prompt));
                debug!(
                    correlation_id = %ctx.correlation_id,
                    prompt_message_id = %prompt,
                    released = reserved_at.is_some(),
                    "poll reservation released"
                );
            }
            FlowAction::TallyVotes => {
                let poll = run.poll()?;
                let channel = self.backend.fetch_channel(&poll.channel_id).await?;
                let reactions =
                    self.backend.fetch_reactions(&channel.id, &poll.poll_message_id).await?;
                let counts: Vec<u32> = poll
                    .ballot()
                    .map(|(marker, _)| {
                        reactions.get(marker).map(|count| count.excluding_own()).unwrap_or(0)
                    })
                    .collect();
                debug!(
                    correlation_id = %ctx.correlation_id,
                    channel_id = %channel.id,
                    channel_name = channel.name.as_deref().unwrap_or("unknown"),
                    counts = ?counts,
                    "poll votes counted"
                );
                run.outcome = Some(tally(&poll.candidates, &counts));
            }
            FlowAction::PostResults => {
                let poll = run.poll()?;
                let outcome = run.outcome.as_ref().ok_or_else(|| missing("tally outcome"))?;
                let card = results_card(outcome, run.now);
                let results_message_id = self.backend.post_card(&poll.channel_id, &card).await?;
                let winner = outcome.winner().map(|entry| format_candidate(entry.date));
                info!(
                    event_name = "flow.poll_resolved",
                    correlation_id = %ctx.correlation_id,
                    channel_id = %poll.channel_id,
                    prompt_message_id = %poll.prompt_message_id,
                    results_message_id = %results_message_id,
                    winner = winner.as_deref().unwrap_or("none"),
                    total_votes = outcome.total_votes(),
                    "poll results posted"
                );
            }
        }
        Ok(())
    }

    fn report_failure(
        &self,
        stage: &str,
        error: &ApplicationError,
        run: &FlowRun,
        ctx: &EventContext,
    ) {
        if error.is_transient() {
            warn!(
                correlation_id = %ctx.correlation_id,
                channel_id = %run.channel_id,
                stage,
                error = %error,
                "flow step failed; cleaning up"
            );
        } else {
            error!(
                correlation_id = %ctx.correlation_id,
                channel_id = %run.channel_id,
                stage,
                error = %error,
                "flow step failed unexpectedly; cleaning up"
            );
        }
    }

    async fn expire_prompt(
        &self,
        channel_id: &ChannelId,
        prompt_message_id: &MessageId,
        ctx: &EventContext,
    ) -> Result<HandlerResult, ApplicationError> {
        let current = self.with_stores(|stores| stores.mentions.prompt_for(channel_id));
        if current.as_ref() != Some(prompt_message_id) {
            debug!(
                correlation_id = %ctx.correlation_id,
                channel_id = %channel_id,
                prompt_message_id = %prompt_message_id,
                "prompt already consumed or replaced; expiry ignored"
            );
            return Ok(HandlerResult::Ignored);
        }

        let outcome = self.engine.apply(&FlowState::Prompted, &FlowEvent::PromptExpired)?;
        let mut run = FlowRun::new(channel_id.clone(), self.clock.now());
        run.prompt_message_id = Some(prompt_message_id.clone());
        self.execute(&outcome, &mut run, ctx).await?;

        info!(
            event_name = "flow.prompt_expired",
            correlation_id = %ctx.correlation_id,
            channel_id = %channel_id,
            prompt_message_id = %prompt_message_id,
            "interest prompt expired without enough reactions"
        );
        Ok(HandlerResult::Processed)
    }

    async fn resolve_poll(
        &self,
        prompt_message_id: &MessageId,
        ctx: &EventContext,
    ) -> Result<HandlerResult, ApplicationError> {
        let poll = self.with_stores(|stores| stores.polls.resolve_poll(prompt_message_id));
        let Some(poll) = poll else {
            debug!(
                correlation_id = %ctx.correlation_id,
                prompt_message_id = %prompt_message_id,
                "poll already resolved; timer ignored"
            );
            return Ok(HandlerResult::Ignored);
        };

        let outcome = self.engine.apply(&FlowState::Polling, &FlowEvent::VoteWindowElapsed)?;
        let mut run = FlowRun::new(poll.channel_id.clone(), self.clock.now());
        run.prompt_message_id = Some(poll.prompt_message_id.clone());
        run.poll = Some(poll);

        if let Err(error) = self.execute(&outcome, &mut run, ctx).await {
            self.report_failure("resolve_poll", &error, &run, ctx);
            self.engine.apply(&outcome.from, &FlowEvent::ResolutionFailed)?;
        }
        Ok(HandlerResult::Processed)
    }
}

#[async_trait]
impl MessageService for FlowCoordinator {
    async fn handle_message(
        &self,
        event: &MessageCreatedEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        if !self.keywords.matches(&event.content) {
            return Ok(HandlerResult::Ignored);
        }

        let now = self.clock.now();
        let (prior, stale, decision) = self.with_stores(|stores| {
            let (prior, stale) = self.mention_state(stores.mentions.get(&event.channel_id), now);
            let decision = stores.mentions.record_mention(&event.channel_id, &event.author_id, now);
            (prior, stale, decision)
        });
        let decision = decision.map_err(ApplicationError::from)?;

        let mut state = prior;
        if stale {
            state = self
                .engine
                .apply(&state, &FlowEvent::IdleWindowElapsed)
                .map_err(ApplicationError::from)?
                .to;
        }
        state = self
            .engine
            .apply(&state, &FlowEvent::KeywordMentioned)
            .map_err(ApplicationError::from)?
            .to;

        info!(
            event_name = "flow.mention_recorded",
            correlation_id = %ctx.correlation_id,
            channel_id = %event.channel_id,
            participant_id = %event.author_id,
            participants = decision.current_count,
            state = ?state,
            "keyword mention recorded"
        );

        if !decision.should_prompt {
            return Ok(HandlerResult::Processed);
        }

        let outcome = self
            .engine
            .apply(&state, &FlowEvent::MentionThresholdReached)
            .map_err(ApplicationError::from)?;
        let mut run = FlowRun::new(event.channel_id.clone(), now);
        run.participant_count = decision.current_count;

        if let Err(error) = self.execute(&outcome, &mut run, ctx).await {
            self.report_failure("post_prompt", &error, &run, ctx);
            let recovery = self
                .engine
                .apply(&outcome.to, &FlowEvent::PromptDeliveryFailed)
                .map_err(ApplicationError::from)?;
            self.execute(&recovery, &mut run, ctx).await?;
        }
        Ok(HandlerResult::Processed)
    }
}

#[async_trait]
impl ReactionService for FlowCoordinator {
    async fn handle_reaction(
        &self,
        event: &ReactionAddedEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        if event.emoji != INTEREST_MARKER {
            return Ok(HandlerResult::Ignored);
        }
        let prompt = self.with_stores(|stores| stores.mentions.prompt_for(&event.channel_id));
        let Some(prompt) = prompt.filter(|prompt| prompt == &event.message_id) else {
            return Ok(HandlerResult::Ignored);
        };

        let marker_count = match event.count {
            Some(count) => count.excluding_own(),
            None => match self.backend.fetch_reactions(&event.channel_id, &prompt).await {
                Ok(reactions) => reactions
                    .get(INTEREST_MARKER)
                    .map(|count| count.excluding_own())
                    .unwrap_or(0),
                Err(error) => {
                    warn!(
                        correlation_id = %ctx.correlation_id,
                        channel_id = %event.channel_id,
                        prompt_message_id = %prompt,
                        error = %error,
                        "could not fetch interest markers; reaction skipped"
                    );
                    return Ok(HandlerResult::Processed);
                }
            },
        };

        let now = self.clock.now();
        let decision = self.with_stores(|stores| {
            stores.polls.try_create_poll(&prompt, &event.channel_id, marker_count, now)
        });
        if !decision.should_create {
            debug!(
                correlation_id = %ctx.correlation_id,
                prompt_message_id = %prompt,
                marker_count,
                "interest marker counted; no poll yet"
            );
            return Ok(HandlerResult::Processed);
        }

        let outcome = self
            .engine
            .apply(&FlowState::Prompted, &FlowEvent::ReactionThresholdReached)
            .map_err(ApplicationError::from)?;
        let mut run = FlowRun::new(event.channel_id.clone(), now);
        run.prompt_message_id = Some(prompt);
        run.candidates = self.schedule.next_candidates(now);

        if let Err(error) = self.execute(&outcome, &mut run, ctx).await {
            self.report_failure("post_poll", &error, &run, ctx);
            let recovery = self
                .engine
                .apply(&outcome.to, &FlowEvent::PollDeliveryFailed)
                .map_err(ApplicationError::from)?;
            self.execute(&recovery, &mut run, ctx).await?;
        }
        Ok(HandlerResult::Processed)
    }
}

#[async_trait]
impl TimerService for FlowCoordinator {
    async fn handle_timer(
        &self,
        fired: &FiredTask,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let result = match &fired.task {
            ScheduledTask::ExpirePrompt { channel_id, prompt_message_id } => {
                self.expire_prompt(channel_id, prompt_message_id, ctx).await
            }
            ScheduledTask::ResolvePoll { prompt_message_id } => {
                self.resolve_poll(prompt_message_id, ctx).await
            }
        };
        result.map_err(EventHandlerError::from)
    }
}
