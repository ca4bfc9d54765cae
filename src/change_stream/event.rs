//! Documents related to a change-stream event.

use bson::{Bson, Document, RawDocumentBuf};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ErrorKind, Result},
    Namespace,
};

/// An opaque token used for resuming an interrupted change stream.
///
/// When starting a new change stream, `resume_after`/`start_after` on
/// [`ChangeStreamOptions`](super::options::ChangeStreamOptions) can be set from a previously
/// observed `ResumeToken`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ResumeToken(pub(crate) Bson);

impl ResumeToken {
    /// Extracts the `_id` field from a raw document, used both for `postBatchResumeToken` (a
    /// top-level token document) and for a document's own `_id` token field.
    pub(crate) fn from_raw(doc: &RawDocumentBuf) -> Self {
        let document: Document = bson::from_slice(doc.as_bytes()).unwrap_or_default();
        Self(Bson::Document(document))
    }

    /// Extracts the `_id` field of a raw event document as its resume token (spec §4.5 invariant
    /// 3). Every change event carries one; a document missing it is a protocol violation.
    pub(crate) fn from_event_id(doc: &RawDocumentBuf) -> Result<Self> {
        match doc.get("_id")? {
            Some(id) => Ok(Self(Bson::try_from(id)?)),
            None => Err(ErrorKind::MissingResumeToken.into()),
        }
    }

    pub(crate) fn into_document(self) -> Document {
        match self.0 {
            Bson::Document(d) => d,
            other => {
                let mut doc = Document::new();
                doc.insert("_data", other);
                doc
            }
        }
    }
}

/// A `ChangeStreamEvent` represents a change event in the associated change stream.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct ChangeStreamEvent<T> {
    /// An opaque token for use when resuming an interrupted change stream.
    #[serde(rename = "_id")]
    pub id: ResumeToken,

    /// Describes the type of operation represented in this change notification.
    pub operation_type: OperationType,

    /// Identifies which collection or database where the event occurred.
    pub ns: Option<ChangeStreamEventSource>,

    /// The new name for the namespace. Only included for `OperationType::Rename`.
    pub to: Option<Namespace>,

    /// For unsharded collections this contains a single field, `_id`, with the id of the document
    /// updated. For sharded collections, this contains all shard key components in order,
    /// followed by the `_id` if it isn't part of the shard key.
    pub document_key: Option<Document>,

    /// A description of updated and removed fields, present for update events.
    pub update_description: Option<UpdateDescription>,

    /// For `insert`/`replace` events, the document being inserted or the new version of the
    /// document that replaced the existing one. For `update` events with `FullDocument::UpdateLookup`,
    /// a copy of the full document from some point after the update, or `None` if it was
    /// subsequently deleted.
    pub full_document: Option<T>,
}

/// Describes which fields have been updated or removed from a document.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct UpdateDescription {
    pub updated_fields: Document,
    pub removed_fields: Vec<String>,
}

/// The operation type represented in a given change notification.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub enum OperationType {
    Insert,
    Update,
    Replace,
    Delete,
    Drop,
    Rename,
    DropDatabase,
    Invalidate,
}

/// Identifies which collection or database where an event occurred.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
pub enum ChangeStreamEventSource {
    Namespace(Namespace),
    Database(String),
}
