use std::{future::Future, sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::events::{ChatEnvelope, EventContext, EventDispatcher};
use crate::scheduler::{FiredTask, SchedulerQueue, TimerService};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read failed: {0}")]
    Receive(String),
    #[error("transport ack failed: {0}")]
    Acknowledge(String),
    #[error("transport disconnect failed: {0}")]
    Disconnect(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

/// Inbound event stream. `next_envelope` must be cancel-safe: the runner
/// polls it alongside the timer queue and drops it when a timer wins.
#[async_trait]
pub trait GatewayTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    async fn next_envelope(&self) -> Result<Option<ChatEnvelope>, TransportError>;
    async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

#[derive(Default)]
pub struct NoopGatewayTransport;

#[async_trait]
impl GatewayTransport for NoopGatewayTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn next_envelope(&self) -> Result<Option<ChatEnvelope>, TransportError> {
        Ok(None)
    }

    async fn acknowledge(&self, _envelope_id: &str) -> Result<(), TransportError> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Single event loop over inbound envelopes and fired timers.
pub struct GatewayRunner {
    transport: Arc<dyn GatewayTransport>,
    dispatcher: EventDispatcher,
    timers: Arc<dyn TimerService>,
    queue: Mutex<SchedulerQueue>,
    reconnect_policy: ReconnectPolicy,
}

impl GatewayRunner {
    pub fn new(
        transport: Arc<dyn GatewayTransport>,
        dispatcher: EventDispatcher,
        timers: Arc<dyn TimerService>,
        queue: SchedulerQueue,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { transport, dispatcher, timers, queue: Mutex::new(queue), reconnect_policy }
    }

    /// Pumps the gateway until it closes, then keeps firing timers until
    /// `shutdown` resolves.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        tokio::select! {
            result = self.start() => result?,
            () = &mut shutdown => {
                info!("shutdown requested; closing gateway");
                if let Err(error) = self.transport.disconnect().await {
                    warn!(error = %error, "gateway disconnect failed during shutdown");
                }
                return Ok(());
            }
        }

        info!("gateway stream ended; servicing timers until shutdown");
        self.service_timers_until(shutdown).await;
        Ok(())
    }

    pub async fn start(&self) -> Result<()> {
        for attempt in 0..=self.reconnect_policy.max_retries {
            match self.connect_and_pump(attempt).await {
                Ok(()) => return Ok(()),
                Err(transport_error) => {
                    warn!(
                        attempt,
                        max_retries = self.reconnect_policy.max_retries,
                        error = %transport_error,
                        "gateway transport failed"
                    );

                    if attempt >= self.reconnect_policy.max_retries {
                        warn!(
                            max_retries = self.reconnect_policy.max_retries,
                            "gateway retries exhausted; continuing process without crash"
                        );
                        return Ok(());
                    }

                    let delay = self.reconnect_policy.backoff(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Ok(())
    }

    pub async fn service_timers_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut queue = self.queue.lock().await;

        loop {
            tokio::select! {
                () = &mut shutdown => return,
                fired = queue.next_due() => match fired {
                    Some(fired) => self.handle_fired(fired).await,
                    None => {
                        debug!("scheduler closed; waiting for shutdown");
                        (&mut shutdown).await;
                        return;
                    }
                },
            }
        }
    }

    async fn connect_and_pump(&self, attempt: u32) -> Result<(), TransportError> {
        info!(attempt, "opening gateway transport connection");
        self.transport.connect().await?;
        info!(attempt, "gateway transport connected");

        let mut queue = self.queue.lock().await;
        loop {
            tokio::select! {
                next = self.transport.next_envelope() => {
                    let Some(envelope) = next? else {
                        info!(attempt, "gateway transport stream closed");
                        self.transport.disconnect().await?;
                        return Ok(());
                    };
                    self.handle_envelope(envelope).await;
                }
                Some(fired) = queue.next_due() => self.handle_fired(fired).await,
            }
        }
    }

    async fn handle_envelope(&self, envelope: ChatEnvelope) {
        let channel_id = envelope.event.channel_id().map(ToString::to_string);
        info!(
            event_name = "ingress.chat.envelope_received",
            envelope_id = %envelope.envelope_id,
            event_type = ?envelope.event.event_type(),
            correlation_id = %envelope.envelope_id,
            channel_id = channel_id.as_deref().unwrap_or("unknown"),
            "received chat envelope"
        );

        if let Err(error) = self.transport.acknowledge(&envelope.envelope_id).await {
            warn!(
                event_name = "ingress.chat.ack_sent",
                envelope_id = %envelope.envelope_id,
                correlation_id = %envelope.envelope_id,
                error = %error,
                "failed to acknowledge chat envelope"
            );
        } else {
            debug!(
                event_name = "ingress.chat.ack_sent",
                envelope_id = %envelope.envelope_id,
                correlation_id = %envelope.envelope_id,
                "acknowledged chat envelope"
            );
        }

        let context = EventContext { correlation_id: envelope.envelope_id.clone() };
        if let Err(error) = self.dispatcher.dispatch(&envelope, &context).await {
            warn!(
                envelope_id = %envelope.envelope_id,
                correlation_id = %envelope.envelope_id,
                channel_id = channel_id.as_deref().unwrap_or("unknown"),
                error = %error,
                "event dispatch failed; continuing gateway loop"
            );
        }
    }

    async fn handle_fired(&self, fired: FiredTask) {
        info!(
            event_name = "scheduler.task_fired",
            task_id = %fired.task_id,
            task = fired.task.name(),
            correlation_id = %fired.task_id,
            "scheduled task fired"
        );

        let context = EventContext { correlation_id: fired.task_id.clone() };
        if let Err(error) = self.timers.handle_timer(&fired, &context).await {
            warn!(
                task_id = %fired.task_id,
                correlation_id = %fired.task_id,
                error = %error,
                "scheduled task failed; continuing gateway loop"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use hotbot_core::domain::ids::MessageId;
    use tokio::sync::Mutex;

    use super::{GatewayRunner, GatewayTransport, ReconnectPolicy, TransportError};
    use crate::events::{
        ChatEnvelope, ChatEvent, EventContext, EventDispatcher, EventHandlerError, HandlerResult,
    };
    use crate::scheduler::{self, FiredTask, ScheduledTask, SchedulerQueue, TimerService};

    #[derive(Default)]
    struct ScriptedTransport {
        state: Mutex<ScriptedState>,
    }

    #[derive(Default)]
    struct ScriptedState {
        connect_results: VecDeque<Result<(), TransportError>>,
        envelopes: VecDeque<Result<Option<ChatEnvelope>, TransportError>>,
        connect_attempts: usize,
        acknowledgements: Vec<String>,
        disconnect_calls: usize,
    }

    impl ScriptedTransport {
        fn with_script(
            connect_results: Vec<Result<(), TransportError>>,
            envelopes: Vec<Result<Option<ChatEnvelope>, TransportError>>,
        ) -> Self {
            Self {
                state: Mutex::new(ScriptedState {
                    connect_results: connect_results.into(),
                    envelopes: envelopes.into(),
                    ..ScriptedState::default()
                }),
            }
        }

        async fn connect_attempts(&self) -> usize {
            self.state.lock().await.connect_attempts
        }

        async fn acknowledgements(&self) -> Vec<String> {
            self.state.lock().await.acknowledgements.clone()
        }

        async fn disconnect_calls(&self) -> usize {
            self.state.lock().await.disconnect_calls
        }
    }

    #[async_trait]
    impl GatewayTransport for ScriptedTransport {
        async fn connect(&self) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.connect_attempts += 1;
            state.connect_results.pop_front().unwrap_or(Ok(()))
        }

        async fn next_envelope(&self) -> Result<Option<ChatEnvelope>, TransportError> {
            let mut state = self.state.lock().await;
            state.envelopes.pop_front().unwrap_or(Ok(None))
        }

        async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.acknowledgements.push(envelope_id.to_owned());
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.disconnect_calls += 1;
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingTimers {
        fired: Mutex<Vec<FiredTask>>,
    }

    #[async_trait]
    impl TimerService for RecordingTimers {
        async fn handle_timer(
            &self,
            fired: &FiredTask,
            _ctx: &EventContext,
        ) -> Result<HandlerResult, EventHandlerError> {
            self.fired.lock().await.push(fired.clone());
            Ok(HandlerResult::Processed)
        }
    }

    fn runner(
        transport: Arc<ScriptedTransport>,
        timers: Arc<RecordingTimers>,
        queue: SchedulerQueue,
    ) -> GatewayRunner {
        GatewayRunner::new(
            transport,
            EventDispatcher::default(),
            timers,
            queue,
            ReconnectPolicy { max_retries: 2, base_delay_ms: 0, max_delay_ms: 0 },
        )
    }

    #[tokio::test]
    async fn reconnects_after_initial_connect_failure() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Err(TransportError::Connect("network down".to_owned())), Ok(())],
            vec![
                Ok(Some(ChatEnvelope {
                    envelope_id: "env-1".to_owned(),
                    event: ChatEvent::Unsupported { event_type: "test".to_owned() },
                })),
                Ok(None),
            ],
        ));
        let (_scheduler, queue) = scheduler::channel();

        let runner = runner(transport.clone(), Arc::default(), queue);
        runner.start().await.expect("runner should not fail");

        assert_eq!(transport.connect_attempts().await, 2);
        assert_eq!(transport.acknowledgements().await, vec!["env-1"]);
        assert_eq!(transport.disconnect_calls().await, 1);
    }

    #[tokio::test]
    async fn exhausts_retries_without_crashing() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![
                Err(TransportError::Connect("fail-1".to_owned())),
                Err(TransportError::Connect("fail-2".to_owned())),
                Err(TransportError::Connect("fail-3".to_owned())),
            ],
            vec![],
        ));
        let (_scheduler, queue) = scheduler::channel();

        let runner = runner(transport.clone(), Arc::default(), queue);
        runner.start().await.expect("runner should degrade gracefully");

        assert_eq!(transport.connect_attempts().await, 3);
    }

    #[tokio::test]
    async fn receive_error_triggers_a_reconnect() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Ok(()), Ok(())],
            vec![Err(TransportError::Receive("socket reset".to_owned())), Ok(None)],
        ));
        let (_scheduler, queue) = scheduler::channel();

        let runner = runner(transport.clone(), Arc::default(), queue);
        runner.start().await.expect("runner should recover");

        assert_eq!(transport.connect_attempts().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn timers_keep_firing_after_the_gateway_closes() {
        let transport = Arc::new(ScriptedTransport::with_script(vec![Ok(())], vec![Ok(None)]));
        let timers = Arc::new(RecordingTimers::default());
        let (scheduler, queue) = scheduler::channel();
        let task = ScheduledTask::ResolvePoll { prompt_message_id: MessageId::from("p1") };
        scheduler.schedule(Duration::from_secs(60), task.clone());

        let runner = runner(transport, timers.clone(), queue);
        runner
            .run_until(tokio::time::sleep(Duration::from_secs(120)))
            .await
            .expect("runner should stop on shutdown");

        let fired = timers.fired.lock().await.clone();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].task, task);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_before_a_timer_is_due_skips_it() {
        let transport = Arc::new(ScriptedTransport::with_script(vec![Ok(())], vec![Ok(None)]));
        let timers = Arc::new(RecordingTimers::default());
        let (scheduler, queue) = scheduler::channel();
        scheduler.schedule(
            Duration::from_secs(600),
            ScheduledTask::ResolvePoll { prompt_message_id: MessageId::from("p1") },
        );

        let runner = runner(transport, timers.clone(), queue);
        runner
            .run_until(tokio::time::sleep(Duration::from_secs(10)))
            .await
            .expect("runner should stop on shutdown");

        assert!(timers.fired.lock().await.is_empty());
    }
}
