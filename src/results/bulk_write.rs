#![allow(missing_docs)]

use std::collections::HashMap;

use super::{DeleteResult, InsertOneResult, UpdateResult};

/// The rolling merged result of a Bulk Write Engine run (spec §3 "Bulk Write Batch": "a rolling
/// merged `BulkWriteResult` (counts + per-item errors + write-concern error)").
///
/// Per-item errors and the write-concern error live on
/// [`BulkWriteError`](crate::error::bulk_write::BulkWriteError) rather than here, mirroring the
/// split between a successful result and a failure that still carries a partial result.
#[derive(Clone, Debug, Default)]
#[non_exhaustive]
pub struct BulkWriteResult {
    pub inserted_count: u64,
    pub upserted_count: u64,
    pub matched_count: u64,
    pub modified_count: u64,
    pub deleted_count: u64,
    pub inserted_ids: HashMap<usize, bson::Bson>,
    pub upserted_ids: HashMap<usize, bson::Bson>,
}

impl BulkWriteResult {
    pub(crate) fn merge(&mut self, other: Self) {
        self.inserted_count += other.inserted_count;
        self.upserted_count += other.upserted_count;
        self.matched_count += other.matched_count;
        self.modified_count += other.modified_count;
        self.deleted_count += other.deleted_count;
        self.inserted_ids.extend(other.inserted_ids);
        self.upserted_ids.extend(other.upserted_ids);
    }

    pub(crate) fn add_insert(&mut self, index: usize, result: InsertOneResult) {
        self.inserted_count += 1;
        self.inserted_ids.insert(index, result.inserted_id);
    }

    pub(crate) fn add_update(&mut self, _index: usize, result: UpdateResult) {
        self.matched_count += result.matched_count;
        self.modified_count += result.modified_count;
        if let Some(upserted_id) = result.upserted_id {
            self.upserted_count += 1;
            self.upserted_ids.insert(_index, upserted_id);
        }
    }

    pub(crate) fn add_delete(&mut self, result: DeleteResult) {
        self.deleted_count += result.deleted_count;
    }
}
