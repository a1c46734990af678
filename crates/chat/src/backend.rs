use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use hotbot_core::domain::ids::{ChannelId, MessageId};
use hotbot_core::errors::ApplicationError;
use serde::Serialize;
use thiserror::Error;

use crate::cards::MessageCard;

/// Count for one marker on a message. `me` is set when the bot itself is
/// among the reactors.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReactionCount {
    pub count: u32,
    pub me: bool,
}

impl ReactionCount {
    pub fn excluding_own(&self) -> u32 {
        self.count.saturating_sub(u32::from(self.me))
    }
}

pub type ReactionCounts = HashMap<String, ReactionCount>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelInfo {
    pub id: ChannelId,
    pub name: Option<String>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("chat request failed: {0}")]
    Request(String),
    #[error("chat api returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("chat resource not found: {0}")]
    NotFound(String),
    #[error("chat response could not be decoded: {0}")]
    Decode(String),
}

impl From<BackendError> for ApplicationError {
    fn from(value: BackendError) -> Self {
        Self::Integration(value.to_string())
    }
}

#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn post_card(
        &self,
        channel_id: &ChannelId,
        card: &MessageCard,
    ) -> Result<MessageId, BackendError>;
    async fn add_reaction(
        &self,
        channel_id: &ChannelId,
        message_id: &MessageId,
        emoji: &str,
    ) -> Result<(), BackendError>;
    async fn fetch_reactions(
        &self,
        channel_id: &ChannelId,
        message_id: &MessageId,
    ) -> Result<ReactionCounts, BackendError>;
    async fn fetch_channel(&self, channel_id: &ChannelId) -> Result<ChannelInfo, BackendError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PostedCard {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
    pub card: MessageCard,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendCall {
    PostCard,
    AddReaction,
    FetchReactions,
    FetchChannel,
}

/// Backend that keeps everything in memory. Failures can be queued per call
/// kind to exercise cleanup paths.
#[derive(Debug, Default)]
pub struct InMemoryChatBackend {
    state: Mutex<InMemoryState>,
}

#[derive(Debug, Default)]
struct InMemoryState {
    next_message: u64,
    posts: Vec<PostedCard>,
    reactions: HashMap<MessageId, BTreeMap<String, ReactionCount>>,
    failures: VecDeque<(BackendCall, BackendError)>,
}

impl InMemoryChatBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, apply: impl FnOnce(&mut InMemoryState) -> T) -> T {
        match self.state.lock() {
            Ok(mut state) => apply(&mut state),
            Err(poisoned) => apply(&mut poisoned.into_inner()),
        }
    }

    pub fn posted(&self) -> Vec<PostedCard> {
        self.with_state(|state| state.posts.clone())
    }

    pub fn reactions_on(&self, message_id: &MessageId) -> BTreeMap<String, ReactionCount> {
        self.with_state(|state| state.reactions.get(message_id).cloned().unwrap_or_default())
    }

    /// Records `times` reactions from other participants.
    pub fn add_user_reaction(&self, message_id: &MessageId, emoji: &str, times: u32) {
        self.with_state(|state| {
            let entry = state
                .reactions
                .entry(message_id.clone())
                .or_default()
                .entry(emoji.to_owned())
                .or_default();
            entry.count += times;
        });
    }

    pub fn fail_next(&self, call: BackendCall, error: BackendError) {
        self.with_state(|state| state.failures.push_back((call, error)));
    }

    fn take_failure(state: &mut InMemoryState, call: BackendCall) -> Result<(), BackendError> {
        let position = state.failures.iter().position(|(queued, _)| *queued == call);
        match position.and_then(|index| state.failures.remove(index)) {
            Some((_, error)) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ChatBackend for InMemoryChatBackend {
    async fn post_card(
        &self,
        channel_id: &ChannelId,
        card: &MessageCard,
    ) -> Result<MessageId, BackendError> {
        self.with_state(|state| {
            Self::take_failure(state, BackendCall::PostCard)?;
            state.next_message += 1;
            let message_id = MessageId(format!("message-{}", state.next_message));
            state.posts.push(PostedCard {
                channel_id: channel_id.clone(),
                message_id: message_id.clone(),
                card: card.clone(),
            });
            Ok(message_id)
        })
    }

    async fn add_reaction(
        &self,
        _channel_id: &ChannelId,
        message_id: &MessageId,
        emoji: &str,
    ) -> Result<(), BackendError> {
        self.with_state(|state| {
            Self::take_failure(state, BackendCall::AddReaction)?;
            let entry = state
                .reactions
                .entry(message_id.clone())
                .or_default()
                .entry(emoji.to_owned())
                .or_default();
            if !entry.me {
                entry.me = true;
                entry.count += 1;
            }
            Ok(())
        })
    }

    async fn fetch_reactions(
        &self,
        _channel_id: &ChannelId,
        message_id: &MessageId,
    ) -> Result<ReactionCounts, BackendError> {
        self.with_state(|state| {
            Self::take_failure(state, BackendCall::FetchReactions)?;
            if !state.posts.iter().any(|post| &post.message_id == message_id) {
                return Err(BackendError::NotFound(format!("message `{message_id}`")));
            }
            Ok(state
                .reactions
                .get(message_id)
                .map(|counts| counts.iter().map(|(emoji, count)| (emoji.clone(), *count)).collect())
                .unwrap_or_default())
        })
    }

    async fn fetch_channel(&self, channel_id: &ChannelId) -> Result<ChannelInfo, BackendError> {
        self.with_state(|state| {
            Self::take_failure(state, BackendCall::FetchChannel)?;
            Ok(ChannelInfo {
                id: channel_id.clone(),
                name: None,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use hotbot_core::domain::ids::{ChannelId, MessageId};

    use super::{BackendCall, BackendError, ChatBackend, InMemoryChatBackend, ReactionCount};
    use crate::cards::CardBuilder;

    #[test]
    fn own_reaction_is_excluded_from_the_count() {
        assert_eq!(ReactionCount { count: 3, me: true }.excluding_own(), 2);
        assert_eq!(ReactionCount { count: 3, me: false }.excluding_own(), 3);
        assert_eq!(ReactionCount { count: 0, me: true }.excluding_own(), 0);
    }

    #[tokio::test]
    async fn in_memory_backend_tracks_own_and_user_reactions() {
        let backend = InMemoryChatBackend::new();
        let channel = ChannelId::from("c1");
        let message = backend
            .post_card(&channel, &CardBuilder::new("hello", 0).build())
            .await
            .expect("post");

        backend.add_reaction(&channel, &message, "🔥").await.expect("react");
        backend.add_reaction(&channel, &message, "🔥").await.expect("react twice");
        backend.add_user_reaction(&message, "🔥", 2);

        let counts = backend.fetch_reactions(&channel, &message).await.expect("fetch");
        assert_eq!(counts.get("🔥"), Some(&ReactionCount { count: 3, me: true }));
        assert_eq!(message, MessageId::from("message-1"));
    }

    #[tokio::test]
    async fn queued_failures_apply_to_their_call_only() {
        let backend = InMemoryChatBackend::new();
        let channel = ChannelId::from("c1");
        backend.fail_next(BackendCall::FetchChannel, BackendError::Request("timeout".to_owned()));

        let posted = backend.post_card(&channel, &CardBuilder::new("hello", 0).build()).await;
        let fetched = backend.fetch_channel(&channel).await;
        let retried = backend.fetch_channel(&channel).await;

        assert!(posted.is_ok());
        assert_eq!(fetched, Err(BackendError::Request("timeout".to_owned())));
        assert!(retried.is_ok());
    }

    #[tokio::test]
    async fn fetching_reactions_for_an_unknown_message_is_not_found() {
        let backend = InMemoryChatBackend::new();

        let result =
            backend.fetch_reactions(&ChannelId::from("c1"), &MessageId::from("missing")).await;

        assert!(matches!(result, Err(BackendError::NotFound(_))));
    }
}
