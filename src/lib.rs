//! # watchplex - resumable resource watches and stream multiplexing
//!
//! watchplex lets operational tooling subscribe to live change events for cluster
//! resources and merge several such subscriptions into one ordered stream.
//!
//! ## Core Concepts
//!
//! - **Watcher**: a watch session for one resource kind with a resumable cursor
//! - **WatchEvent**: one resource change (`ADDED`, `MODIFIED`, `DELETED`)
//! - **MultiplexingWatcher**: runs several watchers concurrently and merges their events
//! - **WatchTransport**: the pluggable streaming transport that delivers raw envelopes
//! - **KindCatalog**: registration table of watchable kinds and their endpoints
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use watchplex::{KindCatalog, MultiplexingWatcher, StreamOptions, Watcher};
//!
//! let catalog = KindCatalog::shared();
//! let pods: Watcher = Watcher::builder("Pod").namespace("default").build(catalog, transport.clone())?;
//! let nodes: Watcher = Watcher::builder("Node").build(catalog, transport)?;
//!
//! let mux = MultiplexingWatcher::new();
//! mux.add(pods)?;
//! mux.add(nodes)?;
//!
//! for event in mux.stream(StreamOptions::managed())? {
//!     println!("{} {:?}", event.etype, event.resource.metadata.name);
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Descriptors and resolution
pub mod catalog;
pub mod error;
pub mod kind;
pub mod operation;

// Payloads
pub mod event;
pub mod resource;

// Streaming
pub mod multiplex;
pub mod transport;
pub mod watch;

// Re-export primary types at crate root for convenience
pub use catalog::{KindCatalog, ResolvedWatch};
pub use error::{ConfigurationError, TransportError, WatchError, WatchResult};
pub use event::{decode_event, DecodeOptions, DecodedEvent, EventType, RawEvent, WatchEvent};
pub use kind::{EndpointKey, KindId, ResourceKind, WatchScope};
pub use multiplex::{FailureAction, FailurePolicy, MultiplexConfig, MultiplexStream, MultiplexingWatcher};
pub use operation::{ApiPathOperation, WatchOperation};
pub use resource::{DynamicResource, ObjectMeta, WatchResource};
pub use transport::{InMemoryTransport, InMemoryTransportConfig, RawEventStream, StopHandle, WatchTransport};
pub use watch::{StreamOptions, WatchParams, WatchStream, Watcher, WatcherBuilder};
