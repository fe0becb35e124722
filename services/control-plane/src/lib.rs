//! Switchyard control plane library.
//!
//! The control plane keeps one persistent channel per worker domain, routes
//! requests to domains and correlates their responses, and supervises the
//! worker processes it launches. It ships a `switchyard` binary; the library
//! surface exists for embedding and integration testing.
//!
//! - [`registry`]: which channel speaks for each domain
//! - [`correlator`]: pending requests and their completion
//! - [`dispatch`]: the per-channel read loop
//! - [`call`]: the outbound request path
//! - [`supervisor`]: worker process lifecycle

pub mod api;
pub mod call;
pub mod config;
pub mod correlator;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod registry;
pub mod state;
pub mod supervisor;

pub use call::{CallOptions, CallResponse, DomainClient};
pub use correlator::Correlator;
pub use dispatch::Dispatcher;
pub use error::{CallError, SupervisorError};
pub use registry::{DomainChannel, DomainRegistry, RegistryEvent};
pub use supervisor::{ProcessSupervisor, WorkerSpec, WorkerState};
