//! A client-side runtime for feature flags: a local, versioned cache of per-user flag evaluations
//! kept in sync with a remote service, and a durable queue of telemetry events delivered to an
//! ingestion endpoint in batches.
//!
//! # Overview
//!
//! The SDK revolves around a [`Client`] created from a [`ClientConfig`]. After
//! [`Client::initialize`], two background tasks run on the current Tokio runtime: one polls for
//! evaluation changes (with bounded retry on failure), the other flushes queued events on an
//! interval or as soon as the queue holds a full batch.
//!
//! Flag lookups are served from the cache and never fail. Each lookup records an evaluation event;
//! a missing or mistyped value records a default evaluation event and returns the caller's
//! default.
//!
//! # Shared storage
//!
//! Cache and queue are persisted through a [`KeyValueStore`](storage::KeyValueStore). Several
//! execution contexts (processes, tabs, workers) may share one store: event queue updates are then
//! guarded by a storage-backed [`FastMutex`](mutex::FastMutex).
//!
//! # Error Handling
//!
//! Errors are represented by the [`Error`] enum. Network and HTTP failures are also recorded as
//! metrics events, except authentication failures, which are only logged.
//!
//! # Logging
//!
//! The package uses the [`log`](https://docs.rs/log/latest/log/) crate for logging messages, all
//! under the `flagsync` target. Consider integrating a `log`-compatible logger implementation for
//! better visibility into SDK operations.

#![warn(rustdoc::missing_crate_level_docs)]

mod api_client;
mod client;
mod config;
mod context;
mod error;
mod listener;
mod scheduler;

pub mod clock;
pub mod evaluation;
pub mod event;
pub mod id;
pub mod model;
pub mod mutex;
pub mod retry;
pub mod storage;
pub mod transport;
pub mod variation;

pub use client::Client;
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use listener::ListenerId;
pub use model::User;
pub use variation::{VariationKind, VariationValue};
