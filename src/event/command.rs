//! Events monitoring the commands this crate's executor sends to, and the replies it receives
//! from, a bound connection (spec §4.2 "Command Executor").

use std::time::Duration;

use bson::Document;

use crate::error::Error;

/// Identifies the connection a command-monitoring event was raised on, grounded on the facts
/// [`crate::binding::Connection`]/[`crate::binding::ConnectionDescription`] already expose;
/// defined locally rather than reused from a connection-pool crate since pool internals are out
/// of scope here (spec §1).
#[derive(Clone, Debug)]
pub struct ConnectionInfo {
    /// The address of the server this connection is connected to.
    pub address: String,

    /// A driver-generated identifier for the connection.
    pub connection_id: u64,
}

/// An event that triggers when a database command is initiated.
#[derive(Clone, Debug)]
pub struct CommandStartedEvent {
    /// The command being run.
    pub command: Document,

    /// The name of the database the command is being run against.
    pub db: String,

    /// The type of command being run, e.g. "find" or "aggregate".
    pub command_name: String,

    /// The driver-generated identifier for the request. Applications can use this to identify the
    /// corresponding event triggered by the completion of this command (i.e. either
    /// [`CommandSucceededEvent`] or [`CommandFailedEvent`]).
    pub request_id: i32,

    /// Information about the connection the command will be run on.
    pub connection: ConnectionInfo,
}

/// An event that triggers when a database command completes without an error.
#[derive(Clone, Debug)]
pub struct CommandSucceededEvent {
    /// The total execution time of the command (including the network round-trip).
    pub duration: Duration,

    /// The server's reply to the command.
    pub reply: Document,

    /// The type of command that was run, e.g. "find" or "aggregate".
    pub command_name: String,

    /// The driver-generated identifier for the request. Applications can use this to identify the
    /// corresponding [`CommandStartedEvent`] that triggered earlier.
    pub request_id: i32,

    /// Information about the connection the command was run on.
    pub connection: ConnectionInfo,
}

/// An event that triggers when a command failed to complete successfully.
#[derive(Clone, Debug)]
pub struct CommandFailedEvent {
    /// The total execution time of the command (including the network round-trip).
    pub duration: Duration,

    /// The type of command that was run, e.g. "find" or "aggregate".
    pub command_name: String,

    /// The error the driver returned due to the command failing.
    pub failure: Error,

    /// The driver-generated identifier for the request. Applications can use this to identify the
    /// corresponding [`CommandStartedEvent`] that triggered earlier.
    pub request_id: i32,

    /// Information about the connection the command was run on.
    pub connection: ConnectionInfo,
}

/// The three command-monitoring events, unified so a single [`crate::event::EventHandler`] can
/// dispatch all of them.
#[derive(Clone, Debug)]
pub enum CommandEvent {
    Started(CommandStartedEvent),
    Succeeded(CommandSucceededEvent),
    Failed(CommandFailedEvent),
}

/// Applications can implement this trait to specify custom logic to run on each command event the
/// executor raises.
///
/// ```rust
/// # use std::sync::Arc;
/// #
/// use mongodb_op_core::event::command::{CommandEventHandler, CommandFailedEvent};
///
/// struct FailedCommandLogger;
///
/// impl CommandEventHandler for FailedCommandLogger {
///     fn handle_command_failed_event(&self, event: CommandFailedEvent) {
///         eprintln!("Failed command: {:?}", event);
///     }
/// }
///
/// // Register `Arc::new(FailedCommandLogger)` with the embedding driver's command-event sink;
/// // failed command events will then be logged to stderr.
/// let _handler: Arc<dyn CommandEventHandler> = Arc::new(FailedCommandLogger);
/// ```
pub trait CommandEventHandler: Send + Sync {
    /// Called on each registered handler whenever a database command is initiated.
    fn handle_command_started_event(&self, _event: CommandStartedEvent) {}

    /// Called on each registered handler whenever a database command successfully completes.
    fn handle_command_succeeded_event(&self, _event: CommandSucceededEvent) {}

    /// Called on each registered handler whenever a database command fails to complete
    /// successfully.
    fn handle_command_failed_event(&self, _event: CommandFailedEvent) {}
}
