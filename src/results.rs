//! Contains the types of results returned by the operations in this crate.

mod bulk_write;

use std::collections::{HashMap, VecDeque};

use bson::{Bson, RawDocumentBuf};
use serde::Serialize;
use serde_with::skip_serializing_none;

use crate::{change_stream::event::ResumeToken, serde_util, Namespace};

pub use bulk_write::BulkWriteResult;

/// The result of an `insertOne`-shaped operation.
#[derive(Clone, Debug, Serialize, Default)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct InsertOneResult {
    pub inserted_id: Bson,
}

impl InsertOneResult {
    pub(crate) fn from_insert_many_result(result: InsertManyResult) -> Self {
        Self {
            inserted_id: result.inserted_ids.get(&0).cloned().unwrap_or(Bson::Null),
        }
    }
}

/// The result of an `insertMany`-shaped operation.
#[derive(Debug, Serialize, Default)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct InsertManyResult {
    pub inserted_ids: HashMap<usize, Bson>,
}

/// The result of an `updateOne`/`updateMany`/`replaceOne`-shaped operation.
#[skip_serializing_none]
#[derive(Clone, Debug, Serialize, Default)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct UpdateResult {
    #[serde(serialize_with = "serde_util::serialize_u64_as_i64")]
    pub matched_count: u64,
    #[serde(serialize_with = "serde_util::serialize_u64_as_i64")]
    pub modified_count: u64,
    pub upserted_id: Option<Bson>,
}

/// The result of a `deleteOne`/`deleteMany`-shaped operation.
#[derive(Clone, Debug, Serialize, Default)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct DeleteResult {
    #[serde(serialize_with = "serde_util::serialize_u64_as_i64")]
    pub deleted_count: u64,
}

/// Information about the index(es) created by a `createIndexes` command.
#[derive(Debug, Clone, PartialEq, Default)]
#[non_exhaustive]
pub struct CreateIndexesResult {
    pub index_names: Vec<String>,
}

/// Decoded form of a cursor-bearing reply (spec §3 "Command Cursor Result"): the result of an
/// initial command or a `getMore`.
#[derive(Debug, Clone)]
pub(crate) struct GetMoreResult {
    pub(crate) batch: VecDeque<RawDocumentBuf>,
    pub(crate) exhausted: bool,
    pub(crate) post_batch_resume_token: Option<ResumeToken>,
    pub(crate) ns: Namespace,
    pub(crate) id: i64,
}

/// Describes the type of data store returned by `listCollections`.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub enum CollectionType {
    View,
    #[default]
    Collection,
    Timeseries,
}

/// Info about a collection as reported by `listCollections`, keeping only the fields this crate
/// projects per spec §6/§8 testable property 6 (bare `name`, not the fully qualified namespace).
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize, Default)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct CollectionSpecification {
    pub name: String,
    #[serde(rename = "type")]
    pub collection_type: CollectionType,
    #[serde(default)]
    pub options: bson::Document,
    #[serde(default)]
    pub info: bson::Document,
    pub id_index: Option<bson::Document>,
}

/// Information about a single database, as returned by `listDatabases`.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct DatabaseSpecification {
    pub name: String,
    #[serde(
        deserialize_with = "serde_util::deserialize_u64_from_bson_number",
        serialize_with = "serde_util::serialize_u64_as_i64"
    )]
    pub size_on_disk: u64,
    pub empty: bool,
}
