//! `recon-runtime`: the asynchronous agent loop built on top of
//! `recon-core`'s pure planning kernel.
//!
//! Wires the planner to live, I/O-performing execution: an [`agent::Agent`]
//! drives `{idle, planning, executing, waiting, stopped}` transitions,
//! consuming [`sensor::Sensor`] updates and emitting a well-defined
//! [`events::Event`] stream as it pursues a [`recon_core::Target`].

pub mod agent;
pub mod cancel;
pub mod config;
pub mod error;
pub mod events;
pub mod executor;
pub mod observable;
pub mod retry;
pub mod sensor;

pub use agent::{Agent, AgentOptions, AgentPhase};
pub use cancel::CancellationToken;
pub use config::{AgentOptionsFile, ConfigError};
pub use error::{RuntimeError, RuntimeReport, RuntimeResult};
pub use events::Event;
pub use executor::ExecutionContext;
pub use observable::{LagPolicy, Observable};
pub use retry::RetryPolicy;
pub use sensor::{ChannelSensor, Sensor};

/// The failure type returned by [`Agent::wait`], per the external API
/// surface.
pub type AgentFailure = RuntimeError;
