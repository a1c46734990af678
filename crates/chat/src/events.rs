use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use hotbot_core::domain::ids::{ChannelId, MessageId, ParticipantId};
use hotbot_core::errors::ApplicationError;
use thiserror::Error;

use crate::backend::ReactionCount;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatEnvelope {
    pub envelope_id: String,
    pub event: ChatEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChatEvent {
    MessageCreated(MessageCreatedEvent),
    ReactionAdded(ReactionAddedEvent),
    Unsupported { event_type: String },
}

impl ChatEvent {
    pub fn event_type(&self) -> ChatEventType {
        match self {
            Self::MessageCreated(_) => ChatEventType::MessageCreated,
            Self::ReactionAdded(_) => ChatEventType::ReactionAdded,
            Self::Unsupported { .. } => ChatEventType::Unsupported,
        }
    }

    pub fn channel_id(&self) -> Option<&ChannelId> {
        match self {
            Self::MessageCreated(event) => Some(&event.channel_id),
            Self::ReactionAdded(event) => Some(&event.channel_id),
            Self::Unsupported { .. } => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ChatEventType {
    MessageCreated,
    ReactionAdded,
    Unsupported,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageCreatedEvent {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
    pub author_id: ParticipantId,
    pub author_is_bot: bool,
    pub content: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReactionAddedEvent {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
    pub user_id: ParticipantId,
    pub user_is_bot: bool,
    pub emoji: String,
    /// Current count for `emoji`; `None` when the event arrived partial and
    /// the count has to be fetched.
    pub count: Option<ReactionCount>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Processed,
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error(transparent)]
    Application(#[from] ApplicationError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> ChatEventType;
    async fn handle(
        &self,
        envelope: &ChatEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<ChatEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &ChatEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

/// Routes both inbound event kinds to one service.
pub fn flow_dispatcher<S>(service: Arc<S>) -> EventDispatcher
where
    S: MessageService + ReactionService + 'static,
{
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(MessageCreatedHandler::new(service.clone()));
    dispatcher.register(ReactionAddedHandler::new(service));
    dispatcher
}

#[async_trait]
pub trait MessageService: Send + Sync {
    async fn handle_message(
        &self,
        event: &MessageCreatedEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[async_trait]
impl<S> MessageService for Arc<S>
where
    S: MessageService + ?Sized,
{
    async fn handle_message(
        &self,
        event: &MessageCreatedEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        (**self).handle_message(event, ctx).await
    }
}

pub struct MessageCreatedHandler<S> {
    service: S,
}

impl<S> MessageCreatedHandler<S>
where
    S: MessageService,
{
    pub fn new(service: S) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> EventHandler for MessageCreatedHandler<S>
where
    S: MessageService + 'static,
{
    fn event_type(&self) -> ChatEventType {
        ChatEventType::MessageCreated
    }

    async fn handle(
        &self,
        envelope: &ChatEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let ChatEvent::MessageCreated(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        if event.author_is_bot {
            return Ok(HandlerResult::Ignored);
        }

        self.service.handle_message(event, ctx).await
    }
}

#[async_trait]
pub trait ReactionService: Send + Sync {
    async fn handle_reaction(
        &self,
        event: &ReactionAddedEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[async_trait]
impl<S> ReactionService for Arc<S>
where
    S: ReactionService + ?Sized,
{
    async fn handle_reaction(
        &self,
        event: &ReactionAddedEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        (**self).handle_reaction(event, ctx).await
    }
}

pub struct ReactionAddedHandler<S> {
    service: S,
}

impl<S> ReactionAddedHandler<S>
where
    S: ReactionService,
{
    pub fn new(service: S) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> EventHandler for ReactionAddedHandler<S>
where
    S: ReactionService + 'static,
{
    fn event_type(&self) -> ChatEventType {
        ChatEventType::ReactionAdded
    }

    async fn handle(
        &self,
        envelope: &ChatEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let ChatEvent::ReactionAdded(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        if event.user_is_bot {
            return Ok(HandlerResult::Ignored);
        }

        self.service.handle_reaction(event, ctx).await
    }
}
