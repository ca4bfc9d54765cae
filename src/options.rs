//! Per-operation option structs (spec §6), mirrored one-to-one with the command fields each
//! operation is allowed to set.
//!
//! Most of the options structs in this module use the
//! [`typed-builder`](https://crates.io/crates/typed-builder) crate to derive a type-safe builder
//! API, matching how options are constructed throughout this crate.

use std::time::Duration;

use bson::{Bson, Document};
use serde::Serialize;
use serde_with::skip_serializing_none;
use typed_builder::TypedBuilder;

pub use crate::{collation::Collation, concern::*, read_preference::ReadPreference};

/// Specifies an index to use, either by name or by key pattern.
#[derive(Clone, Debug)]
pub enum Hint {
    Keys(Document),
    Name(String),
}

impl Hint {
    pub(crate) fn into_bson(self) -> Bson {
        match self {
            Hint::Keys(doc) => Bson::Document(doc),
            Hint::Name(s) => Bson::String(s),
        }
    }
}

/// The type of cursor to return from a `find` operation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CursorType {
    #[default]
    NonTailable,
    Tailable,
    TailableAwait,
}

impl CursorType {
    pub(crate) fn is_tailable(&self) -> bool {
        !matches!(self, CursorType::NonTailable)
    }

    pub(crate) fn is_awaitable(&self) -> bool {
        matches!(self, CursorType::TailableAwait)
    }
}

/// Whether a find-and-modify-shaped operation returns the document before or after modification.
#[derive(Clone, Copy, Debug)]
pub enum ReturnDocument {
    Before,
    After,
}

impl ReturnDocument {
    pub(crate) fn is_after(&self) -> bool {
        matches!(self, ReturnDocument::After)
    }
}

#[skip_serializing_none]
#[derive(Clone, Debug, Default, TypedBuilder, Serialize)]
#[builder(field_defaults(default, setter(into)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct FindOptions {
    pub allow_partial_results: Option<bool>,
    pub batch_size: Option<u32>,
    pub comment: Option<Bson>,
    #[serde(skip)]
    pub cursor_type: Option<CursorType>,
    #[serde(skip)]
    pub hint: Option<Hint>,
    pub limit: Option<i64>,
    pub max: Option<Document>,
    #[serde(rename = "maxTimeMS", serialize_with = "crate::serde_util::serialize_duration_option_as_int_millis")]
    pub max_time: Option<Duration>,
    pub min: Option<Document>,
    pub no_cursor_timeout: Option<bool>,
    pub projection: Option<Document>,
    #[serde(skip)]
    pub read_concern: Option<ReadConcern>,
    #[serde(skip)]
    pub read_preference: Option<ReadPreference>,
    pub return_key: Option<bool>,
    pub show_record_id: Option<bool>,
    pub skip: Option<u64>,
    pub sort: Option<Document>,
    pub collation: Option<Collation>,
    #[serde(skip)]
    pub session: Option<()>,
    #[serde(rename = "let")]
    pub let_vars: Option<Document>,
}

#[skip_serializing_none]
#[derive(Clone, Debug, Default, TypedBuilder, Serialize)]
#[builder(field_defaults(default, setter(into)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct CountOptions {
    #[serde(skip)]
    pub hint: Option<Hint>,
    pub limit: Option<i64>,
    #[serde(rename = "maxTimeMS", serialize_with = "crate::serde_util::serialize_duration_option_as_int_millis")]
    pub max_time: Option<Duration>,
    pub skip: Option<u64>,
    pub collation: Option<Collation>,
    #[serde(skip)]
    pub read_concern: Option<ReadConcern>,
    #[serde(skip)]
    pub read_preference: Option<ReadPreference>,
}

#[skip_serializing_none]
#[derive(Clone, Debug, Default, TypedBuilder, Serialize)]
#[builder(field_defaults(default, setter(into)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct EstimatedDocumentCountOptions {
    #[serde(rename = "maxTimeMS", serialize_with = "crate::serde_util::serialize_duration_option_as_int_millis")]
    pub max_time: Option<Duration>,
    #[serde(skip)]
    pub read_concern: Option<ReadConcern>,
    #[serde(skip)]
    pub read_preference: Option<ReadPreference>,
}

#[derive(Clone, Debug, Default, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
#[non_exhaustive]
pub struct InsertOneOptions {
    pub bypass_document_validation: Option<bool>,
    pub write_concern: Option<WriteConcern>,
}

#[skip_serializing_none]
#[derive(Clone, Debug, Default, TypedBuilder, Serialize)]
#[builder(field_defaults(default, setter(into)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct InsertManyOptions {
    pub bypass_document_validation: Option<bool>,
    pub ordered: Option<bool>,
    pub write_concern: Option<WriteConcern>,
}

#[derive(Clone, Debug, Default, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
#[non_exhaustive]
pub struct UpdateOptions {
    pub array_filters: Option<Vec<Document>>,
    pub bypass_document_validation: Option<bool>,
    pub collation: Option<Collation>,
    pub hint: Option<Hint>,
    pub upsert: Option<bool>,
    pub write_concern: Option<WriteConcern>,
    pub let_vars: Option<Document>,
}

#[derive(Clone, Debug, Default, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
#[non_exhaustive]
pub struct ReplaceOptions {
    pub bypass_document_validation: Option<bool>,
    pub collation: Option<Collation>,
    pub hint: Option<Hint>,
    pub upsert: Option<bool>,
    pub write_concern: Option<WriteConcern>,
    pub let_vars: Option<Document>,
}

#[skip_serializing_none]
#[derive(Clone, Debug, Default, TypedBuilder, Serialize)]
#[builder(field_defaults(default, setter(into)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct DeleteOptions {
    #[serde(skip)]
    pub collation: Option<Collation>,
    #[serde(skip)]
    pub hint: Option<Hint>,
    pub write_concern: Option<WriteConcern>,
    #[serde(rename = "let")]
    pub let_vars: Option<Document>,
}

#[skip_serializing_none]
#[derive(Clone, Debug, Default, TypedBuilder, Serialize)]
#[builder(field_defaults(default, setter(into)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct AggregateOptions {
    pub allow_disk_use: Option<bool>,
    #[serde(skip)]
    pub batch_size: Option<u32>,
    pub bypass_document_validation: Option<bool>,
    pub collation: Option<Collation>,
    pub comment: Option<Bson>,
    #[serde(skip)]
    pub hint: Option<Hint>,
    #[serde(rename = "maxTimeMS", serialize_with = "crate::serde_util::serialize_duration_option_as_int_millis")]
    pub max_time: Option<Duration>,
    #[serde(skip)]
    pub max_await_time: Option<Duration>,
    #[serde(skip)]
    pub read_concern: Option<ReadConcern>,
    #[serde(skip)]
    pub read_preference: Option<ReadPreference>,
    pub write_concern: Option<WriteConcern>,
    #[serde(rename = "let")]
    pub let_vars: Option<Document>,
}

#[skip_serializing_none]
#[derive(Clone, Debug, Default, TypedBuilder, Serialize)]
#[builder(field_defaults(default, setter(into)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct ListDatabasesOptions {
    pub filter: Option<Document>,
    pub name_only: Option<bool>,
    pub authorized_databases: Option<bool>,
    pub comment: Option<Bson>,
}

#[skip_serializing_none]
#[derive(Clone, Debug, Default, TypedBuilder, Serialize)]
#[builder(field_defaults(default, setter(into)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct ListCollectionsOptions {
    pub filter: Option<Document>,
    #[serde(skip)]
    pub batch_size: Option<u32>,
    pub comment: Option<Bson>,
}

#[skip_serializing_none]
#[derive(Clone, Debug, Default, TypedBuilder, Serialize)]
#[builder(field_defaults(default, setter(into)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct ListIndexesOptions {
    #[serde(skip)]
    pub batch_size: Option<u32>,
    #[serde(rename = "maxTimeMS", serialize_with = "crate::serde_util::serialize_duration_option_as_int_millis")]
    pub max_time: Option<Duration>,
}

#[skip_serializing_none]
#[derive(Clone, Debug, Default, TypedBuilder, Serialize)]
#[builder(field_defaults(default, setter(into)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct CreateCollectionOptions {
    pub capped: Option<bool>,
    pub size: Option<u64>,
    pub max: Option<u64>,
    pub storage_engine: Option<Document>,
    pub validator: Option<Document>,
    pub validation_level: Option<String>,
    pub validation_action: Option<String>,
    pub write_concern: Option<WriteConcern>,
    pub collation: Option<Collation>,
    pub expire_after_seconds: Option<i64>,
    pub timeseries: Option<Document>,
    pub change_stream_pre_and_post_images: Option<Document>,
    pub clustered_index: Option<Document>,
    /// Fields to automatically encrypt and decrypt, driving the auxiliary-collection sequencing
    /// described in spec §6 (queryable encryption, supplemental feature).
    pub encrypted_fields: Option<Document>,
}

#[skip_serializing_none]
#[derive(Clone, Debug, Default, TypedBuilder, Serialize)]
#[builder(field_defaults(default, setter(into)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct CreateIndexesOptions {
    pub write_concern: Option<WriteConcern>,
    #[serde(rename = "maxTimeMS", serialize_with = "crate::serde_util::serialize_duration_option_as_int_millis")]
    pub max_time: Option<Duration>,
    pub comment: Option<String>,
}

/// Options for a `$listSearchIndexes` aggregation (spec §6 "named in §6").
#[derive(Clone, Debug, Default, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
#[non_exhaustive]
pub struct ListSearchIndexesOptions {
    /// Restricts the listing to the index with this name, rather than all search indexes on the
    /// collection.
    pub name: Option<String>,
    pub batch_size: Option<u32>,
    pub aggregate_options: Option<AggregateOptions>,
}

#[derive(Clone, Debug, Default, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
#[non_exhaustive]
pub struct BulkWriteOptions {
    pub ordered: Option<bool>,
    pub bypass_document_validation: Option<bool>,
    pub write_concern: Option<WriteConcern>,
    pub let_vars: Option<Document>,
}

/// The destination of a `mapReduce` operation's output (spec §6).
#[derive(Clone, Debug)]
pub enum MapReduceOutput {
    Inline,
    Replace { collection: String, db: Option<String> },
    Merge { collection: String, db: Option<String> },
    Reduce { collection: String, db: Option<String> },
}

impl Serialize for MapReduceOutput {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;
        match self {
            MapReduceOutput::Inline => {
                let mut doc = Document::new();
                doc.insert("inline", 1);
                doc.serialize(serializer)
            }
            MapReduceOutput::Replace { collection, db } => {
                let mut map = serializer.serialize_map(Some(if db.is_some() { 2 } else { 1 }))?;
                map.serialize_entry("replace", collection)?;
                if let Some(db) = db {
                    map.serialize_entry("db", db)?;
                }
                map.end()
            }
            MapReduceOutput::Merge { collection, db } => {
                let mut map = serializer.serialize_map(Some(if db.is_some() { 2 } else { 1 }))?;
                map.serialize_entry("merge", collection)?;
                if let Some(db) = db {
                    map.serialize_entry("db", db)?;
                }
                map.end()
            }
            MapReduceOutput::Reduce { collection, db } => {
                let mut map = serializer.serialize_map(Some(if db.is_some() { 2 } else { 1 }))?;
                map.serialize_entry("reduce", collection)?;
                if let Some(db) = db {
                    map.serialize_entry("db", db)?;
                }
                map.end()
            }
        }
    }
}

#[skip_serializing_none]
#[derive(Clone, Debug, Default, TypedBuilder, Serialize)]
#[builder(field_defaults(default, setter(into)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct MapReduceOptions {
    pub sort: Option<Document>,
    pub query: Option<Document>,
    pub finalize: Option<String>,
    pub scope: Option<Document>,
    pub verbose: Option<bool>,
    pub limit: Option<i64>,
    pub js_mode: Option<bool>,
    pub bypass_document_validation: Option<bool>,
    pub write_concern: Option<WriteConcern>,
    pub collation: Option<Collation>,
}
