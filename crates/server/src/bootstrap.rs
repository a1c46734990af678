use std::sync::Arc;

use hotbot_chat::backend::BackendError;
use hotbot_chat::coordinator::FlowCoordinator;
use hotbot_chat::discord::DiscordRestBackend;
use hotbot_chat::events::flow_dispatcher;
use hotbot_chat::gateway::{GatewayRunner, NoopGatewayTransport, ReconnectPolicy};
use hotbot_chat::scheduler;
use hotbot_core::clock::SystemClock;
use hotbot_core::config::AppConfig;
use thiserror::Error;
use tracing::{info, warn};

pub struct Application {
    pub config: AppConfig,
    pub coordinator: Arc<FlowCoordinator>,
    pub runner: GatewayRunner,
    pub transport_mode: &'static str,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("chat backend setup failed: {0}")]
    Backend(#[source] BackendError),
}

/// Wires the meetup flow from an already loaded config.
///
/// The gateway runs on `NoopGatewayTransport`: outbound REST calls and timers
/// work, but no inbound chat events arrive until a real transport replaces it.
pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let backend =
        DiscordRestBackend::from_config(&config.chat).map_err(BootstrapError::Backend)?;
    info!(
        event_name = "system.bootstrap.backend_ready",
        correlation_id = "bootstrap",
        api_base_url = %config.chat.api_base_url,
        "chat backend configured"
    );

    let (scheduler, queue) = scheduler::channel();
    let coordinator = Arc::new(FlowCoordinator::new(
        &config.flow,
        Arc::new(backend),
        Arc::new(SystemClock),
        scheduler,
    ));
    let runner = GatewayRunner::new(
        Arc::new(NoopGatewayTransport),
        flow_dispatcher(coordinator.clone()),
        coordinator.clone(),
        queue,
        ReconnectPolicy::default(),
    );
    warn!(
        event_name = "system.bootstrap.noop_transport",
        correlation_id = "bootstrap",
        "gateway uses the noop transport; inbound chat events will not be received"
    );
    info!(
        event_name = "system.bootstrap.flow_ready",
        correlation_id = "bootstrap",
        mention_threshold = config.flow.mention_threshold,
        reaction_threshold = config.flow.reaction_threshold,
        "meetup flow wired to gateway"
    );

    Ok(Application { config, coordinator, runner, transport_mode: "noop" })
}
