#![warn(clippy::cast_possible_truncation)]
#![warn(clippy::cast_possible_wrap)]

//! A driver-internal crate implementing the operation-execution core of a MongoDB wire-protocol
//! client: building commands, binding them to a connection, retrying at most once on a retryable
//! failure, and managing the server-side cursors those commands create.

pub use ::bson;

pub mod binding;
mod bson_util;
pub mod change_stream;
mod collation;
mod concern;
pub mod cursor;
pub mod error;
mod executor;
pub mod event;
mod index;
mod namespace;
mod operation;
pub mod options;
mod read_preference;
pub mod results;
pub(crate) mod retry;
pub(crate) mod runtime;
mod serde_util;
mod session;
#[cfg(feature = "sync")]
pub mod sync;
mod timeout;

pub use crate::{
    namespace::Namespace,
    read_preference::ReadPreference,
    session::ClusterTime,
};
pub use index::IndexModel;

/// A boxed future.
pub(crate) type BoxFuture<'a, T> = std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;
