//! Chat integration for hotbot
//!
//! This crate connects the meetup flow to a chat service:
//! - **Gateway** (`gateway`) - inbound event loop with reconnection logic
//! - **Events** (`events`) - message-created and reaction-added routing
//! - **Cards** (`cards`) - rich message builders for prompt, poll and results
//! - **Backend** (`backend`, `discord`) - outbound posting and marker counts
//! - **Scheduler** (`scheduler`) - one-shot prompt expiry and poll resolution timers
//! - **Coordinator** (`coordinator`) - owns the mention and poll stores and drives the flow
//!
//! # Architecture
//!
//! ```text
//! Gateway → EventDispatcher → FlowCoordinator → ChatBackend
//!    ↑                            ↓
//!    └──── SchedulerQueue ←── Scheduler
//! ```
//!
//! Timer firings and inbound events are drained by the same `GatewayRunner`
//! loop, so the coordinator sees them one at a time.

pub mod backend;
pub mod cards;
pub mod coordinator;
pub mod discord;
pub mod events;
pub mod gateway;
pub mod scheduler;
