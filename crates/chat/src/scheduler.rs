use std::time::Duration;

use async_trait::async_trait;
use hotbot_core::domain::ids::{ChannelId, MessageId};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::events::{EventContext, EventHandlerError, HandlerResult};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScheduledTask {
    ExpirePrompt { channel_id: ChannelId, prompt_message_id: MessageId },
    ResolvePoll { prompt_message_id: MessageId },
}

impl ScheduledTask {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ExpirePrompt { .. } => "expire_prompt",
            Self::ResolvePoll { .. } => "resolve_poll",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FiredTask {
    pub task_id: String,
    pub task: ScheduledTask,
}

/// Handle that arms one-shot timers. Timers are never cancelled; whoever
/// handles a fired task must re-check that its record still exists.
#[derive(Clone, Debug)]
pub struct Scheduler {
    sender: mpsc::UnboundedSender<FiredTask>,
}

/// Receiving end drained by the gateway loop.
#[derive(Debug)]
pub struct SchedulerQueue {
    receiver: mpsc::UnboundedReceiver<FiredTask>,
}

pub fn channel() -> (Scheduler, SchedulerQueue) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (Scheduler { sender }, SchedulerQueue { receiver })
}

impl Scheduler {
    /// Arms `task` to fire after `delay` and returns its task id.
    pub fn schedule(&self, delay: Duration, task: ScheduledTask) -> String {
        let task_id = Uuid::new_v4().to_string();
        let fired = FiredTask { task_id: task_id.clone(), task };
        let sender = self.sender.clone();

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(unsent) = sender.send(fired) {
                debug!(
                    task_id = %unsent.0.task_id,
                    task = unsent.0.task.name(),
                    "scheduler queue closed before timer fired"
                );
            }
        });

        task_id
    }
}

impl SchedulerQueue {
    pub async fn next_due(&mut self) -> Option<FiredTask> {
        self.receiver.recv().await
    }
}

#[async_trait]
pub trait TimerService: Send + Sync {
    async fn handle_timer(
        &self,
        fired: &FiredTask,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}
