pub(crate) mod aggregate;
pub(crate) mod bulk_write;
mod count;
pub(crate) mod create;
mod create_indexes;
mod delete;
mod find;
mod get_more;
mod insert;
pub(crate) mod kill_cursors;
pub(crate) mod list_collections;
pub(crate) mod list_databases;
mod list_indexes;
pub(crate) mod list_search_indexes;
mod map_reduce;
pub(crate) mod run_command;
mod update;

#[cfg(test)]
mod test;

use std::{collections::VecDeque, fmt::Debug, ops::Deref};

use bson::{RawBsonRef, RawDocument, RawDocumentBuf, Timestamp};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{
    binding::{ConnectionDescription, Response},
    bson::{self, Bson, Document},
    bson_util,
    concern::{ReadConcern, WriteConcern},
    error::{
        BulkWriteError,
        BulkWriteFailure,
        CommandError,
        Error,
        ErrorKind,
        Result,
        WriteConcernError,
        WriteFailure,
    },
    read_preference::ReadPreference,
    session::ClusterTime,
    Namespace,
};

pub(crate) use count::Count;
pub(crate) use create_indexes::CreateIndexes;
pub(crate) use delete::Delete;
pub(crate) use find::Find;
pub(crate) use get_more::GetMore;
pub(crate) use insert::Insert;
pub(crate) use list_indexes::ListIndexes;
pub(crate) use map_reduce::MapReduce;
pub(crate) use update::{Update, UpdateOrReplace};

pub(crate) const SERVER_4_2_0_WIRE_VERSION: i32 = 8;
pub(crate) const SERVER_4_4_0_WIRE_VERSION: i32 = 9;

/// Commands whose body must never be logged/traced verbatim (spec §11, grounded in the teacher's
/// `client::REDACTED_COMMANDS`): they may carry credentials.
const REDACTED_COMMANDS: &[&str] = &[
    "authenticate",
    "saslstart",
    "saslcontinue",
    "getnonce",
    "createuser",
    "updateuser",
    "copydbgetnonce",
    "copydbsaslstart",
    "copydb",
];

const HELLO_COMMAND_NAMES: &[&str] = &["hello", "ismaster", "isMaster"];

/// Reserved headroom subtracted from `max_message_size_bytes` before packing a batch of write
/// entries into a single command (spec §4.6), so the encoded command plus driver-added framing
/// never risks exceeding the server's hard message-size limit.
pub(crate) const COMMAND_OVERHEAD_SIZE: u64 = 16_000;

/// A command together with the target database it must be sent against (spec §4.1 "Command
/// Object"). `read_concern`/`read_preference` travel alongside the body since they are appended
/// to the wire command just before send, once the bound connection's wire version is known.
#[derive(Debug, Clone)]
pub(crate) struct Command<T> {
    pub(crate) name: String,
    pub(crate) target_db: String,
    pub(crate) body: T,
}

impl<T: CommandBody> Command<T> {
    pub(crate) fn new(name: impl Into<String>, target_db: impl Into<String>, body: T) -> Self {
        Self {
            name: name.into(),
            target_db: target_db.into(),
            body,
        }
    }

    pub(crate) fn should_redact(&self) -> bool {
        let name = self.name.to_lowercase();
        REDACTED_COMMANDS.contains(&name.as_str()) || self.body.should_redact()
    }
}

/// A trait modeling the behavior of a server side operation (spec §4.7 "Operation Object").
///
/// No methods in this trait should have default behaviors to ensure that wrapper operations
/// replicate all behavior. Default behavior is provided by the `OperationWithDefaults` trait.
pub(crate) trait Operation {
    /// The output type of this operation.
    type O;

    /// The format of the command body constructed in `build`.
    type Command: CommandBody;

    /// The name of the server side command associated with this operation.
    const NAME: &'static str;

    /// Returns the command that should be sent to the server as part of this operation. The
    /// operation may store some additional state that is required for handling the response.
    fn build(&mut self, description: &ConnectionDescription) -> Result<Command<Self::Command>>;

    /// Parse the response for the atClusterTime field. Depending on the operation, this may be
    /// found in different locations.
    fn extract_at_cluster_time(&self, _response: &RawDocument) -> Result<Option<Timestamp>>;

    /// Interprets the server response to the command.
    fn handle_response(
        &self,
        response: Response,
        description: &ConnectionDescription,
    ) -> Result<Self::O>;

    /// Interpret an error encountered while sending the built command to the server, potentially
    /// recovering.
    fn handle_error(&self, error: Error) -> Result<Self::O>;

    /// The read preference to use for selecting the server this operation will run on, if it is a
    /// read operation.
    fn read_preference(&self) -> Option<&ReadPreference>;

    /// Whether or not this operation will request acknowledgment from the server.
    fn is_acknowledged(&self) -> bool;

    /// The write concern to use for this operation, if any.
    fn write_concern(&self) -> Option<&WriteConcern>;

    /// Returns whether or not this command supports the `readConcern` field.
    fn supports_read_concern(&self, _description: &ConnectionDescription) -> bool;

    /// The read concern to attach to the outgoing command, if this is a read operation with one
    /// configured (spec §4.1 "Attach readConcern when non-default and the session allows it").
    /// Attachment itself is centralized in the executor rather than handled per-operation.
    fn read_concern(&self) -> Option<&ReadConcern>;

    /// Whether this operation supports sessions or not.
    fn supports_sessions(&self) -> bool;

    /// The level of retryability the operation supports.
    fn retryability(&self) -> Retryability;

    /// Updates this operation as needed for a retry.
    fn update_for_retry(&mut self);

    fn name(&self) -> &str;
}

pub(crate) trait CommandBody: Serialize {
    fn should_redact(&self) -> bool {
        false
    }
}

impl CommandBody for Document {
    fn should_redact(&self) -> bool {
        if let Some(command_name) = bson_util::first_key(self) {
            HELLO_COMMAND_NAMES.contains(&command_name.to_lowercase().as_str())
                && self.contains_key("speculativeAuthenticate")
        } else {
            false
        }
    }
}

impl CommandBody for RawDocumentBuf {
    fn should_redact(&self) -> bool {
        if let Some(Ok((command_name, _))) = self.into_iter().next() {
            HELLO_COMMAND_NAMES.contains(&command_name.to_lowercase().as_str())
                && self.get("speculativeAuthenticate").ok().flatten().is_some()
        } else {
            false
        }
    }
}

/// A response to a command with a body deserialized to a `T`.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CommandResponse<T> {
    pub(crate) ok: Bson,

    #[serde(rename = "$clusterTime")]
    pub(crate) cluster_time: Option<ClusterTime>,

    #[serde(flatten)]
    pub(crate) body: T,
}

impl<T: DeserializeOwned> CommandResponse<T> {
    /// Whether the command succeeded or not (i.e. if this response is ok: 1).
    pub(crate) fn is_success(&self) -> bool {
        bson_util::get_int(&self.ok) == Some(1)
    }

    pub(crate) fn cluster_time(&self) -> Option<&ClusterTime> {
        self.cluster_time.as_ref()
    }
}

/// Helper body used only to pull `$clusterTime` out of an arbitrary reply so the executor can
/// advance the session's gossiped cluster time (spec §4.1) without requiring every operation's
/// own response type to carry the field.
#[derive(Debug, Deserialize, Default)]
pub(crate) struct ClusterTimeOnly {
    #[serde(rename = "$clusterTime")]
    pub(crate) cluster_time: Option<ClusterTime>,
}

pub(crate) fn extract_cluster_time(response: &Response) -> Option<ClusterTime> {
    response.body::<ClusterTimeOnly>().ok()?.cluster_time
}

/// A response body useful for deserializing command errors.
#[derive(Deserialize, Debug)]
pub(crate) struct CommandErrorBody {
    #[serde(rename = "errorLabels")]
    pub(crate) error_labels: Option<Vec<String>>,

    #[serde(flatten)]
    pub(crate) command_error: CommandError,
}

impl From<CommandErrorBody> for Error {
    fn from(command_error_response: CommandErrorBody) -> Error {
        Error::new(
            ErrorKind::Command(command_error_response.command_error),
            command_error_response.error_labels,
        )
    }
}

/// Appends a serializable struct to the input document. The serializable struct MUST serialize to
/// a Document; otherwise, an error will be thrown.
pub(crate) fn append_options<T: Serialize + Debug>(
    doc: &mut Document,
    options: Option<&T>,
) -> Result<()> {
    if let Some(options) = options {
        let options_doc = bson::to_document(options)?;
        doc.extend(options_doc);
    }
    Ok(())
}

#[derive(Deserialize, Debug)]
pub(crate) struct EmptyBody {}

/// Body of a write response that could possibly have a write concern error but not write errors.
#[derive(Debug, Deserialize, Default, Clone)]
pub(crate) struct WriteConcernOnlyBody {
    #[serde(rename = "writeConcernError")]
    write_concern_error: Option<WriteConcernError>,

    #[serde(rename = "errorLabels")]
    labels: Option<Vec<String>>,
}

impl WriteConcernOnlyBody {
    fn validate(&self) -> Result<()> {
        match self.write_concern_error {
            Some(ref wc_error) => Err(Error::new(
                ErrorKind::Write(WriteFailure::WriteConcernError(wc_error.clone())),
                self.labels.clone(),
            )),
            None => Ok(()),
        }
    }
}

#[derive(Deserialize, Debug)]
pub(crate) struct WriteResponseBody<T = EmptyBody> {
    #[serde(flatten)]
    body: T,

    #[allow(dead_code)]
    n: u64,

    #[serde(rename = "writeErrors")]
    write_errors: Option<Vec<BulkWriteError>>,

    #[serde(rename = "writeConcernError")]
    write_concern_error: Option<WriteConcernError>,

    #[serde(rename = "errorLabels")]
    labels: Option<Vec<String>>,
}

impl<T> WriteResponseBody<T> {
    fn validate(&self) -> Result<()> {
        if self.write_errors.is_none() && self.write_concern_error.is_none() {
            return Ok(());
        };

        let failure = BulkWriteFailure {
            write_errors: self.write_errors.clone(),
            write_concern_error: self.write_concern_error.clone(),
        };

        Err(Error::new(
            ErrorKind::BulkWrite(failure),
            self.labels.clone(),
        ))
    }
}

impl<T> Deref for WriteResponseBody<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.body
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CursorBody {
    cursor: CursorInfo,
}

impl CursorBody {
    fn extract_at_cluster_time(response: &RawDocument) -> Result<Option<Timestamp>> {
        Ok(response
            .get("cursor")?
            .and_then(RawBsonRef::as_document)
            .map(|d| d.get("atClusterTime"))
            .transpose()?
            .flatten()
            .and_then(RawBsonRef::as_timestamp))
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CursorInfo {
    pub(crate) id: i64,

    pub(crate) ns: Namespace,

    pub(crate) first_batch: VecDeque<RawDocumentBuf>,

    pub(crate) post_batch_resume_token: Option<RawDocumentBuf>,
}

/// The level of retryability an operation supports (spec §4.7).
#[derive(Debug, PartialEq, Clone, Copy)]
pub(crate) enum Retryability {
    Write,
    Read,
    None,
}

macro_rules! remove_empty_write_concern {
    ($opts:expr) => {
        if let Some(ref mut options) = $opts {
            if let Some(ref write_concern) = options.write_concern {
                if write_concern.is_server_default() {
                    options.write_concern = None;
                }
            }
        }
    };
}

pub(crate) use remove_empty_write_concern;

/// A mirror of the `Operation` trait, with default behavior where appropriate. Should only be
/// implemented by operation types that do not delegate to other operations.
pub(crate) trait OperationWithDefaults {
    /// The output type of this operation.
    type O;

    /// The format of the command body constructed in `build`.
    type Command: CommandBody;

    /// The name of the server side command associated with this operation.
    const NAME: &'static str;

    /// Returns the command that should be sent to the server as part of this operation. The
    /// operation may store some additional state that is required for handling the response.
    fn build(&mut self, description: &ConnectionDescription) -> Result<Command<Self::Command>>;

    /// Parse the response for the atClusterTime field. Depending on the operation, this may be
    /// found in different locations.
    fn extract_at_cluster_time(&self, _response: &RawDocument) -> Result<Option<Timestamp>> {
        Ok(None)
    }

    /// Interprets the server response to the command.
    fn handle_response(
        &self,
        response: Response,
        description: &ConnectionDescription,
    ) -> Result<Self::O>;

    /// Interpret an error encountered while sending the built command to the server, potentially
    /// recovering.
    fn handle_error(&self, error: Error) -> Result<Self::O> {
        Err(error)
    }

    /// The read preference to use for selecting the server this operation will run on, if it is a
    /// read operation.
    fn read_preference(&self) -> Option<&ReadPreference> {
        None
    }

    /// Whether or not this operation will request acknowledgment from the server.
    fn is_acknowledged(&self) -> bool {
        self.write_concern()
            .map(WriteConcern::is_acknowledged)
            .unwrap_or(true)
    }

    /// The write concern to use for this operation, if any.
    fn write_concern(&self) -> Option<&WriteConcern> {
        None
    }

    /// Returns whether or not this command supports the `readConcern` field.
    fn supports_read_concern(&self, _description: &ConnectionDescription) -> bool {
        false
    }

    /// The read concern to attach to the outgoing command, if any.
    fn read_concern(&self) -> Option<&ReadConcern> {
        None
    }

    /// Whether this operation supports sessions or not.
    fn supports_sessions(&self) -> bool {
        true
    }

    /// The level of retryability the operation supports.
    fn retryability(&self) -> Retryability {
        Retryability::None
    }

    /// Updates this operation as needed for a retry.
    fn update_for_retry(&mut self) {}

    fn name(&self) -> &str {
        Self::NAME
    }
}

impl<T: OperationWithDefaults> Operation for T {
    type O = T::O;
    type Command = T::Command;
    const NAME: &'static str = T::NAME;
    fn build(&mut self, description: &ConnectionDescription) -> Result<Command<Self::Command>> {
        self.build(description)
    }
    fn extract_at_cluster_time(&self, response: &RawDocument) -> Result<Option<Timestamp>> {
        self.extract_at_cluster_time(response)
    }
    fn handle_response(
        &self,
        response: Response,
        description: &ConnectionDescription,
    ) -> Result<Self::O> {
        self.handle_response(response, description)
    }
    fn handle_error(&self, error: Error) -> Result<Self::O> {
        self.handle_error(error)
    }
    fn read_preference(&self) -> Option<&ReadPreference> {
        self.read_preference()
    }
    fn is_acknowledged(&self) -> bool {
        self.is_acknowledged()
    }
    fn write_concern(&self) -> Option<&WriteConcern> {
        self.write_concern()
    }
    fn supports_read_concern(&self, description: &ConnectionDescription) -> bool {
        self.supports_read_concern(description)
    }
    fn read_concern(&self) -> Option<&ReadConcern> {
        self.read_concern()
    }
    fn supports_sessions(&self) -> bool {
        self.supports_sessions()
    }
    fn retryability(&self) -> Retryability {
        self.retryability()
    }
    fn update_for_retry(&mut self) {
        self.update_for_retry()
    }
    fn name(&self) -> &str {
        self.name()
    }
}
