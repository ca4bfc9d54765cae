//! Connection Binding (spec §2, §4.2): abstracts read vs write binding, selects a server per
//! read-preference, and hands out reference-counted `ConnectionSource`s and `Connection`s.
//!
//! Full server-selection and connection-pool internals are out of scope (spec §1); this module
//! only defines the contracts an embedding driver's SDAM/connection-pool layer must satisfy for
//! the operation execution core to drive commands against a server.

use std::time::Duration;

use async_trait::async_trait;
use bson::{Document, RawDocumentBuf};
use serde::de::DeserializeOwned;

use crate::{
    error::Result,
    read_preference::ReadPreference,
    session::SessionContext,
};

/// Server type tag (spec §3 "Server Description"), used to gate pinning and retry eligibility.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServerType {
    Standalone,
    ReplicaSetPrimary,
    ReplicaSetSecondary,
    ShardRouter,
    LoadBalancer,
    Unknown,
}

impl ServerType {
    pub fn is_load_balancer(&self) -> bool {
        matches!(self, ServerType::LoadBalancer)
    }

    pub fn is_standalone(&self) -> bool {
        matches!(self, ServerType::Standalone)
    }
}

/// Snapshot of the server a connection source is bound to (spec §3).
#[derive(Clone, Debug)]
pub struct ServerDescription {
    pub server_type: ServerType,
    pub address: String,
    pub logical_session_timeout: Option<Duration>,
}

/// Per-connection facts needed for version-gated command shaping and retryable-write labeling
/// (spec §3 "Connection Description"). The three `max_*` limits are the server's advertised
/// `hello` batching limits, needed by the Bulk Write Engine to split a request list into batches
/// that fit a single command (spec §4.6).
#[derive(Clone, Debug)]
pub struct ConnectionDescription {
    pub max_wire_version: i32,
    pub server_address: String,
    pub max_write_batch_size: i64,
    pub max_bson_object_size: i64,
    pub max_message_size_bytes: i64,
}

/// Aggregates the ambient facts every command send needs (spec §3 "Operation Context"): a
/// request id for command-monitoring correlation. Session and timeout context are threaded
/// separately since they are mutated independently of the per-attempt request id.
#[derive(Clone, Copy, Debug, Default)]
pub struct OperationContext {
    pub request_id: i32,
}

/// A raw server reply, deserializable into any response shape an operation expects.
#[derive(Debug, Clone)]
pub struct Response {
    raw: RawDocumentBuf,
}

impl Response {
    pub fn new(raw: RawDocumentBuf) -> Self {
        Self { raw }
    }

    pub fn raw(&self) -> &RawDocumentBuf {
        &self.raw
    }

    pub fn body<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(bson::from_slice(self.raw.as_bytes())?)
    }
}

/// A single checked-out connection to a specific server.
#[async_trait]
pub trait Connection: Send {
    fn description(&self) -> &ConnectionDescription;

    /// A stable identifier for this connection, used to detect whether a retry landed on the
    /// same connection it should not have (spec §3 invariant 4).
    fn id(&self) -> u64;

    async fn command(
        &mut self,
        target_db: &str,
        command: Document,
        context: OperationContext,
    ) -> Result<Response>;

    /// Marks the connection as corrupted (spec §5): once marked, the Cursor Resource Manager
    /// must not attempt to `killCursors` on it and must treat it as unusable for anything else.
    fn mark_corrupted(&mut self);

    fn is_corrupted(&self) -> bool;
}

/// A reference-counted handle from which individual connections can be checked out; tied to one
/// server for its lifetime (spec §3, GLOSSARY).
#[async_trait]
pub trait ConnectionSource: Send + Sync {
    fn server_description(&self) -> &ServerDescription;

    async fn checkout_connection(&self) -> Result<Box<dyn Connection>>;

    /// For load-balanced topology, a cursor must pin a single connection for its entire
    /// lifetime (spec §4.3, GLOSSARY "Pinning"). Returns `None` outside load-balanced mode.
    async fn pin_connection(&self) -> Result<Option<Box<dyn Connection>>> {
        Ok(None)
    }

    /// Clones this handle, incrementing its reference count (spec §3 invariant, §5 "Shared
    /// resources"). The returned handle must be released independently of `self`.
    fn clone_source(&self) -> Box<dyn ConnectionSource>;
}

/// Binding used by read operations: selects a server per `ReadPreference` (spec §4.2).
#[async_trait]
pub trait ReadBinding: Send + Sync {
    async fn acquire_connection_source(
        &self,
        read_preference: &ReadPreference,
    ) -> Result<Box<dyn ConnectionSource>>;

    fn session(&self) -> Option<&SessionContext>;

    fn session_mut(&mut self) -> Option<&mut SessionContext>;

    fn retry_reads(&self) -> bool;
}

/// Binding used by write operations: always targets the primary (spec §4.2).
#[async_trait]
pub trait WriteBinding: Send + Sync {
    async fn acquire_connection_source(&self) -> Result<Box<dyn ConnectionSource>>;

    fn session(&self) -> Option<&SessionContext>;

    fn session_mut(&mut self) -> Option<&mut SessionContext>;

    fn retry_writes(&self) -> bool;
}
