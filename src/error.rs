//! Contains the `Error` and `Result` types this crate uses (spec §7 "Error Handling Design").

pub(crate) mod bulk_write;

use std::{any::Any, collections::HashSet, fmt, sync::Arc};

use bson::Document;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Retryable write error label. Added to an error when it is write-retryable (spec §7).
pub const RETRYABLE_WRITE_ERROR: &str = "RetryableWriteError";
/// Resumable change-stream error label (spec §4.5, §7).
pub const RESUMABLE_CHANGE_STREAM_ERROR: &str = "ResumableChangeStreamError";

const RECOVERING_CODES: [i32; 5] = [11600, 11602, 13436, 189, 91];
const NOTWRITABLEPRIMARY_CODES: [i32; 3] = [10107, 13435, 10058];
const RETRYABLE_READ_CODES: [i32; 13] = [
    11600, 11602, 10107, 13435, 13436, 189, 91, 7, 6, 89, 9001, 134, 262,
];
const RETRYABLE_WRITE_CODES: [i32; 12] = [
    11600, 11602, 10107, 13435, 13436, 189, 91, 7, 6, 89, 9001, 262,
];
// Resumable error codes for servers below wire version 9 (4.4), per the current change-streams
// spec; 4.4+ servers instead label the error with `ResumableChangeStreamError` directly.
const LEGACY_RESUMABLE_CHANGE_STREAM_CODES: [i32; 16] = [
    6, 7, 89, 91, 189, 262, 9001, 10107, 11600, 11602, 13435, 13436, 63, 150, 13388, 234,
];

/// The result type for all methods in this crate that can fail.
pub type Result<T> = std::result::Result<T, Error>;

/// An error that can occur in this crate. The inner [`ErrorKind`] is boxed to keep `Error`
/// cheap to move, and errors are cloneable so the same failure can be observed by multiple
/// waiters on a cursor (spec §4.3 "concurrent `next`/`close`").
#[derive(Clone, Debug, Error)]
#[error("Kind: {kind}, labels: {labels:?}")]
#[non_exhaustive]
pub struct Error {
    pub kind: Box<ErrorKind>,
    labels: HashSet<String>,
    pub(crate) wire_version: Option<i32>,
    #[source]
    pub(crate) source: Option<Box<Error>>,
}

impl Error {
    pub fn custom(e: impl Any + Send + Sync) -> Self {
        Self::new(ErrorKind::Custom(Arc::new(e)), None::<Option<String>>)
    }

    pub fn get_custom<E: Any>(&self) -> Option<&E> {
        if let ErrorKind::Custom(c) = &*self.kind {
            c.downcast_ref()
        } else {
            None
        }
    }

    pub(crate) fn new(kind: ErrorKind, labels: Option<impl IntoIterator<Item = String>>) -> Self {
        let mut labels: HashSet<String> = labels
            .map(|labels| labels.into_iter().collect())
            .unwrap_or_default();
        if let Some(wc) = kind.get_write_concern_error() {
            labels.extend(wc.labels.clone());
        }
        Self {
            kind: Box::new(kind),
            labels,
            wire_version: None,
            source: None,
        }
    }

    pub(crate) fn internal(message: impl Into<String>) -> Error {
        ErrorKind::Internal {
            message: message.into(),
        }
        .into()
    }

    pub(crate) fn invalid_argument(message: impl Into<String>) -> Error {
        ErrorKind::InvalidArgument {
            message: message.into(),
        }
        .into()
    }

    pub(crate) fn operation_timeout(message: impl Into<String>) -> Error {
        ErrorKind::OperationTimeout {
            message: message.into(),
        }
        .into()
    }

    pub(crate) fn server_selection(message: impl Into<String>) -> Error {
        ErrorKind::ServerSelection {
            message: message.into(),
        }
        .into()
    }

    pub(crate) fn with_wire_version(mut self, wire_version: i32) -> Self {
        self.wire_version = Some(wire_version);
        self
    }

    pub(crate) fn with_source<E: Into<Option<Error>>>(mut self, source: E) -> Self {
        self.source = source.into().map(Box::new);
        self
    }

    pub(crate) fn is_network_error(&self) -> bool {
        matches!(self.kind.as_ref(), ErrorKind::Io(..))
    }

    pub(crate) fn is_network_timeout(&self) -> bool {
        matches!(self.kind.as_ref(), ErrorKind::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::TimedOut)
    }

    /// Whether this is a client-side `OperationTimeout` *not* bound to the client-side deadline
    /// (spec §4.2 read-retry predicate excludes client-deadline timeouts from retry).
    pub(crate) fn is_client_side_timeout(&self) -> bool {
        matches!(self.kind.as_ref(), ErrorKind::OperationTimeout { .. })
    }

    pub(crate) fn is_ns_not_found(&self) -> bool {
        matches!(self.kind.as_ref(), ErrorKind::Command(ref err) if err.code == 26)
    }

    pub(crate) fn is_command_error(&self) -> bool {
        matches!(self.kind.as_ref(), ErrorKind::Command(_))
    }

    pub(crate) fn is_server_error(&self) -> bool {
        matches!(
            self.kind.as_ref(),
            ErrorKind::BulkWrite(_)
                | ErrorKind::BulkWriteDetailed(_)
                | ErrorKind::Command(_)
                | ErrorKind::Write(_)
        )
    }

    fn sdam_code(&self) -> Option<i32> {
        match self.kind.as_ref() {
            ErrorKind::Command(command_error) => Some(command_error.code),
            ErrorKind::BulkWrite(BulkWriteFailure {
                write_concern_error: Some(wc_error),
                ..
            }) => Some(wc_error.code),
            ErrorKind::Write(WriteFailure::WriteConcernError(wc_error)) => Some(wc_error.code),
            _ => None,
        }
        .or_else(|| self.source.as_ref().and_then(|s| s.sdam_code()))
    }

    pub(crate) fn code(&self) -> Option<i32> {
        self.sdam_code()
    }

    pub(crate) fn is_notwritableprimary(&self) -> bool {
        self.sdam_code()
            .map(|code| NOTWRITABLEPRIMARY_CODES.contains(&code))
            .unwrap_or(false)
    }

    pub(crate) fn is_recovering(&self) -> bool {
        self.sdam_code()
            .map(|code| RECOVERING_CODES.contains(&code))
            .unwrap_or(false)
    }

    pub(crate) fn is_state_change_error(&self) -> bool {
        self.is_recovering() || self.is_notwritableprimary()
    }

    /// Whether a read operation should be retried if this error occurs (spec §4.2).
    pub(crate) fn is_read_retryable(&self) -> bool {
        if self.is_network_error() {
            return true;
        }
        if self.is_client_side_timeout() {
            return false;
        }
        match self.sdam_code() {
            Some(code) => RETRYABLE_READ_CODES.contains(&code),
            None => false,
        }
    }

    /// Whether this error already carries the `RetryableWriteError` label, either because the
    /// server set it or because a prior classification pass synthesized it from a network error
    /// (spec §4.2).
    pub(crate) fn is_write_retryable(&self) -> bool {
        self.contains_label(RETRYABLE_WRITE_ERROR)
    }

    /// Whether a `RetryableWriteError` label should be added to this error. On 4.4+ servers
    /// (wire version > 8) a label is added only for network errors, since the server itself
    /// labels everything else; on older servers the driver also checks the retryable-write
    /// code list (spec §4.2).
    pub(crate) fn should_add_retryable_write_label(&self, max_wire_version: i32) -> bool {
        if max_wire_version > 8 {
            return self.is_network_error();
        }
        if self.is_network_error() {
            return true;
        }
        match self.sdam_code() {
            Some(code) => RETRYABLE_WRITE_CODES.contains(&code),
            None => false,
        }
    }

    /// Whether this error is resumable as per the change-streams specification (spec §4.5, §9
    /// open question: "follow the current change-streams specification").
    pub(crate) fn is_resumable(&self) -> bool {
        if !self.is_server_error() {
            return true;
        }
        let code = self.sdam_code();
        // CursorNotFound is always resumable regardless of wire version.
        if code == Some(43) {
            return true;
        }
        if matches!(self.wire_version, Some(v) if v >= 9) {
            return self.contains_label(RESUMABLE_CHANGE_STREAM_ERROR);
        }
        if let Some(code) = code {
            if matches!(self.wire_version, Some(v) if v < 9)
                && LEGACY_RESUMABLE_CHANGE_STREAM_CODES.contains(&code)
            {
                return true;
            }
        }
        false
    }

    pub fn labels(&self) -> &HashSet<String> {
        &self.labels
    }

    pub fn contains_label<T: AsRef<str>>(&self, label: T) -> bool {
        self.labels().contains(label.as_ref())
    }

    pub(crate) fn add_label<T: AsRef<str>>(&mut self, label: T) {
        self.labels.insert(label.as_ref().to_string());
    }
}

impl<E> From<E> for Error
where
    ErrorKind: From<E>,
{
    fn from(err: E) -> Self {
        Error::new(err.into(), None::<Option<String>>)
    }
}

impl From<bson::de::Error> for ErrorKind {
    fn from(err: bson::de::Error) -> Self {
        Self::BsonDeserialization(err)
    }
}

impl From<bson::ser::Error> for ErrorKind {
    fn from(err: bson::ser::Error) -> Self {
        Self::BsonSerialization(err)
    }
}

impl From<bson::raw::Error> for ErrorKind {
    fn from(err: bson::raw::Error) -> Self {
        Self::InvalidResponse {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for ErrorKind {
    fn from(err: std::io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

/// The taxonomy of errors the core can produce (spec §7), kept as variant *kinds* rather than
/// distinct public types so retry classification stays centralized in [`crate::retry`].
#[allow(missing_docs)]
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum ErrorKind {
    #[error("An invalid argument was provided: {message}")]
    InvalidArgument { message: String },

    #[error("{0}")]
    BsonDeserialization(bson::de::Error),

    #[error("{0}")]
    BsonSerialization(bson::ser::Error),

    /// §7 BulkWriteError: aggregated per-item errors plus an optional write-concern error.
    #[error("An error occurred when trying to execute a write operation: {0:?}")]
    BulkWrite(BulkWriteFailure),

    /// The result of a Bulk Write Engine run that did not fully succeed (spec §3 "Bulk Write
    /// Batch", §4.6): per-item errors keyed by the request's original index, write-concern errors
    /// from any batch, and the partial result the engine had assembled before giving up.
    #[error("A bulk write operation failed to complete successfully: {0:?}")]
    BulkWriteDetailed(bulk_write::BulkWriteError),

    /// §7 CommandError: structured server error.
    #[error("Command failed: {0}")]
    Command(CommandError),

    #[error("Internal error: {message}")]
    Internal { message: String },

    /// §7 NetworkError: transport failure.
    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("The server returned an invalid reply to a database operation: {message}")]
    InvalidResponse { message: String },

    /// §7: the client-side deadline was reached.
    #[error("{message}")]
    OperationTimeout { message: String },

    /// Raised by a `Binding` implementation when no suitable server could be selected.
    #[error("{message}")]
    ServerSelection { message: String },

    /// §7 WriteError wrapper for a single (non-bulk) write.
    #[error("An error occurred when trying to execute a write operation: {0:?}")]
    Write(WriteFailure),

    #[error("The server does not support a database operation: {message}")]
    IncompatibleServer { message: String },

    /// §7 ChangeStreamTokenMissing: a document without `_id` was returned.
    #[error("Cannot provide resume functionality when the resume token is missing")]
    MissingResumeToken,

    /// §7 ConcurrentOperation: a client-side contract violation on a cursor.
    #[error("A `next` call was attempted on a cursor that already has an operation in progress")]
    ConcurrentOperation,

    /// Cursor methods were called after the cursor was closed.
    #[error("Cursor is closed")]
    CursorClosed,

    #[error("Custom user error")]
    Custom(Arc<dyn Any + Send + Sync>),
}

impl ErrorKind {
    fn get_write_concern_error(&self) -> Option<&WriteConcernError> {
        match self {
            ErrorKind::BulkWrite(BulkWriteFailure {
                write_concern_error,
                ..
            }) => write_concern_error.as_ref(),
            ErrorKind::Write(WriteFailure::WriteConcernError(err)) => Some(err),
            _ => None,
        }
    }
}

/// §7 CommandError: `{code, codeName, errmsg, errorLabels}`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[non_exhaustive]
pub struct CommandError {
    pub code: i32,
    #[serde(rename = "codeName", default)]
    pub code_name: String,
    #[serde(rename = "errmsg", default = "String::new")]
    pub message: String,
}

impl fmt::Display for CommandError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(
            fmt,
            "Error code {} ({}): {}",
            self.code, self.code_name, self.message
        )
    }
}

/// §7 WriteConcernError: the server accepted the write but couldn't meet the write concern.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[non_exhaustive]
pub struct WriteConcernError {
    pub code: i32,
    #[serde(rename = "codeName", default)]
    pub code_name: String,
    #[serde(rename = "errmsg", default = "String::new")]
    pub message: String,
    #[serde(rename = "errInfo")]
    pub details: Option<Document>,
    #[serde(rename = "errorLabels", default)]
    pub(crate) labels: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct WriteError {
    pub code: i32,
    #[serde(rename = "codeName", default)]
    pub code_name: Option<String>,
    #[serde(rename = "errmsg", default = "String::new")]
    pub message: String,
    #[serde(rename = "errInfo")]
    pub details: Option<Document>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub struct BulkWriteError {
    #[serde(default)]
    pub index: usize,
    pub code: i32,
    #[serde(rename = "codeName", default)]
    pub code_name: Option<String>,
    #[serde(rename = "errmsg", default = "String::new")]
    pub message: String,
    #[serde(rename = "errInfo")]
    pub details: Option<Document>,
}

/// §7 BulkWriteError aggregate.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct BulkWriteFailure {
    pub write_errors: Option<Vec<BulkWriteError>>,
    pub write_concern_error: Option<WriteConcernError>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[non_exhaustive]
pub enum WriteFailure {
    WriteConcernError(WriteConcernError),
    WriteError(WriteError),
}

impl WriteFailure {
    pub(crate) fn from_bulk_failure(bulk: BulkWriteFailure) -> Result<Self> {
        if let Some(bulk_write_error) = bulk.write_errors.and_then(|es| es.into_iter().next()) {
            Ok(WriteFailure::WriteError(WriteError {
                code: bulk_write_error.code,
                code_name: bulk_write_error.code_name,
                message: bulk_write_error.message,
                details: bulk_write_error.details,
            }))
        } else if let Some(wc_error) = bulk.write_concern_error {
            Ok(WriteFailure::WriteConcernError(wc_error))
        } else {
            Err(ErrorKind::InvalidResponse {
                message: "error missing write errors and write concern errors".to_string(),
            }
            .into())
        }
    }

    pub(crate) fn code(&self) -> i32 {
        match self {
            Self::WriteConcernError(e) => e.code,
            Self::WriteError(e) => e.code,
        }
    }
}

/// Translates `ErrorKind::BulkWrite` into `ErrorKind::Write`, leaving everything else untouched.
/// Used for single-document writes that are internally expressed as a one-item bulk command.
pub(crate) fn convert_bulk_errors(error: Error) -> Error {
    match *error.kind {
        ErrorKind::BulkWrite(bulk_failure) => match WriteFailure::from_bulk_failure(bulk_failure) {
            Ok(failure) => Error::new(ErrorKind::Write(failure), Some(error.labels)),
            Err(e) => e,
        },
        _ => error,
    }
}
