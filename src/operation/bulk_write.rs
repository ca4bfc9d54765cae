//! The Bulk Write Engine (spec §3 "Bulk Write Batch", §4.6): groups a heterogeneous list of
//! insert/update/delete requests into maximal same-kind runs, splits each run into batches that
//! fit the server's advertised limits, and drives each batch through the executor independently so
//! every batch gets its own retry budget.
//!
//! Unlike a unified `bulkWrite` server command, this targets the classic per-type commands
//! (`insert`/`update`/`delete`) every server this crate supports understands (spec §6).

use std::collections::{HashMap, HashSet};

use bson::{doc, Bson, Document};
use serde::Deserialize;

use crate::{
    binding::{ConnectionDescription, Response, WriteBinding},
    bson_util,
    collation::Collation,
    error::{self, BulkWriteError as WireBulkWriteError, Error, ErrorKind, Result, WriteConcernError, WriteError},
    executor,
    operation::{self, Command, OperationWithDefaults, Retryability, WriteResponseBody},
    options::{BulkWriteOptions, Hint, WriteConcern},
    results::{BulkWriteResult, InsertOneResult},
    Namespace,
};

use super::UpdateOrReplace;

/// A single write request submitted to the engine, in the caller's original order (spec §3).
#[derive(Debug, Clone)]
pub(crate) enum WriteModel {
    Insert {
        document: Document,
    },
    Update {
        filter: Document,
        update: UpdateOrReplace,
        multi: bool,
        array_filters: Option<Vec<Document>>,
        collation: Option<Collation>,
        hint: Option<Hint>,
        upsert: Option<bool>,
    },
    Delete {
        filter: Document,
        limit: u32,
        collation: Option<Collation>,
        hint: Option<Hint>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestKind {
    Insert,
    Update,
    Delete,
}

impl RequestKind {
    fn verb_and_field(self) -> (&'static str, &'static str) {
        match self {
            RequestKind::Insert => ("insert", "documents"),
            RequestKind::Update => ("update", "updates"),
            RequestKind::Delete => ("delete", "deletes"),
        }
    }
}

impl WriteModel {
    fn kind(&self) -> RequestKind {
        match self {
            WriteModel::Insert { .. } => RequestKind::Insert,
            WriteModel::Update { .. } => RequestKind::Update,
            WriteModel::Delete { .. } => RequestKind::Delete,
        }
    }

    /// Builds this request's entry document for the `documents`/`updates`/`deletes` array. This
    /// mirrors the entry shapes `operation::insert`/`update`/`delete` build for a single request
    /// (spec §6); `UpdateOrReplace`'s own conversion is private to `operation::update`, so its two
    /// variants are matched here instead.
    fn to_entry(&self) -> Document {
        match self {
            WriteModel::Insert { document } => document.clone(),
            WriteModel::Update {
                filter,
                update,
                multi,
                array_filters,
                collation,
                hint,
                upsert,
            } => {
                let u = match update.clone() {
                    UpdateOrReplace::UpdateModifications(d) | UpdateOrReplace::Replacement(d) => {
                        Bson::Document(d)
                    }
                };
                let mut entry = doc! { "q": filter.clone(), "u": u };
                if *multi {
                    entry.insert("multi", true);
                }
                if let Some(upsert) = upsert {
                    entry.insert("upsert", *upsert);
                }
                if let Some(collation) = collation {
                    entry.insert("collation", bson::to_bson(collation).unwrap_or(Bson::Null));
                }
                if let Some(hint) = hint {
                    entry.insert("hint", hint.clone().into_bson());
                }
                if let Some(array_filters) = array_filters {
                    entry.insert("arrayFilters", bson_util::to_bson_array(array_filters));
                }
                entry
            }
            WriteModel::Delete {
                filter,
                limit,
                collation,
                hint,
            } => {
                let mut entry = doc! { "q": filter.clone(), "limit": *limit };
                if let Some(collation) = collation {
                    entry.insert("collation", bson::to_bson(collation).unwrap_or(Bson::Null));
                }
                if let Some(hint) = hint {
                    entry.insert("hint", hint.clone().into_bson());
                }
                entry
            }
        }
    }

    /// Whether this request, on its own, is eligible for a retryable write (spec §4.2): a
    /// multi-document update or an unbounded delete can't be safely retried.
    fn is_individually_retryable(&self) -> bool {
        match self {
            WriteModel::Insert { .. } => true,
            WriteModel::Update { multi, .. } => !*multi,
            WriteModel::Delete { limit, .. } => *limit == 1,
        }
    }
}

/// A maximal run of consecutive same-kind requests (spec §4.6): classic command batching groups
/// entries of one request type into a single command, so a caller's insert/update/insert sequence
/// becomes three runs rather than one, each issued as its own command(s).
struct Run {
    kind: RequestKind,
    start_index: usize,
    entries: Vec<Document>,
    retryable: bool,
}

fn group_into_runs(models: &[WriteModel]) -> Vec<Run> {
    let mut runs: Vec<Run> = Vec::new();
    for (index, model) in models.iter().enumerate() {
        let kind = model.kind();
        let retryable = model.is_individually_retryable();
        match runs.last_mut() {
            Some(run) if run.kind == kind => {
                run.entries.push(model.to_entry());
                run.retryable = run.retryable && retryable;
            }
            _ => runs.push(Run {
                kind,
                start_index: index,
                entries: vec![model.to_entry()],
                retryable,
            }),
        }
    }
    runs
}

/// One server-fitting slice of a [`Run`], built and sent as a single command (spec §4.6). `build`
/// consumes entries from `remaining` up to the connection's advertised batching limits and records
/// how many it took in `consumed`, so the driving loop in [`execute`] knows how far to advance.
///
/// `build` is re-invoked unchanged on a retry (the executor calls it again after
/// `update_for_retry`), so it must compute the same window every time: it always slices from the
/// start of `remaining`, which the driving loop only advances *between* batches, never mid-retry.
struct BulkWriteBatch<'a> {
    kind: RequestKind,
    ns: &'a Namespace,
    remaining: &'a [Document],
    consumed: usize,
    ordered: bool,
    bypass_document_validation: Option<bool>,
    write_concern: Option<WriteConcern>,
    let_vars: Option<Document>,
    retryable: bool,
}

impl<'a> BulkWriteBatch<'a> {
    fn new(run: &Run, remaining: &'a [Document], ns: &'a Namespace, options: &BulkWriteOptions) -> Self {
        Self {
            kind: run.kind,
            ns,
            remaining,
            consumed: 0,
            ordered: options.ordered.unwrap_or(true),
            bypass_document_validation: options.bypass_document_validation,
            write_concern: options.write_concern.clone(),
            let_vars: options.let_vars.clone(),
            retryable: run.retryable,
        }
    }
}

impl<'a> OperationWithDefaults for BulkWriteBatch<'a> {
    type O = BatchOutcome;
    type Command = Document;

    const NAME: &'static str = "bulkWriteBatch";

    fn build(&mut self, description: &ConnectionDescription) -> Result<Command<Document>> {
        let (verb, field) = self.kind.verb_and_field();
        let max_count = (description.max_write_batch_size.max(1)) as usize;
        let max_doc_size = description.max_bson_object_size as u64;
        let max_sequence_size =
            (description.max_message_size_bytes as u64).saturating_sub(operation::COMMAND_OVERHEAD_SIZE);

        let mut entries = Vec::new();
        let mut size = 0u64;
        for entry in self.remaining.iter() {
            if entries.len() >= max_count {
                break;
            }
            let doc_len = bson::to_vec(entry)?.len() as u64;
            if doc_len > max_doc_size {
                return Err(Error::invalid_argument(format!(
                    "a bulk write entry of {} bytes exceeds the server's maximum document size of \
                     {} bytes",
                    doc_len, max_doc_size
                )));
            }
            let entry_size = bson_util::array_entry_size_bytes(entries.len(), doc_len as usize);
            if !entries.is_empty() && size + entry_size > max_sequence_size {
                break;
            }
            size += entry_size;
            entries.push(entry.clone());
        }
        self.consumed = entries.len();

        let mut body = doc! {
            verb: self.ns.coll.clone(),
            field: bson_util::to_bson_array(&entries),
            "ordered": self.ordered,
        };
        if let Some(bypass) = self.bypass_document_validation {
            body.insert("bypassDocumentValidation", bypass);
        }
        if let Some(ref let_vars) = self.let_vars {
            body.insert("let", let_vars.clone());
        }
        if let Some(ref write_concern) = self.write_concern {
            if !write_concern.is_server_default() {
                body.insert("writeConcern", bson::to_bson(write_concern)?);
            }
        }

        Ok(Command::new(verb, &self.ns.db, body))
    }

    fn handle_response(&self, response: Response, _description: &ConnectionDescription) -> Result<Self::O> {
        // Deserialized directly against `WriteResponseBody`'s own fields rather than through its
        // lossy `validate()`, since a batch outcome needs the success counts *and* the per-item
        // errors together (spec §4.6: "a batch can partially succeed").
        let response: WriteResponseBody<BatchBody> = response.body()?;

        // A retryable write-concern error must be raised as an `Err` carrying the full reply, not
        // merged straight into the outcome, so `executor::execute_write`'s retry loop (which only
        // inspects `Err`s via `ErrorClassifier::is_retryable_write`) gets a chance to retry this
        // batch (spec §4.6 "Write-concern errors"). A non-retryable write-concern error is merged
        // into the outcome as before.
        if let Some(wc_error) = response.write_concern_error.clone() {
            let error = Error::new(
                ErrorKind::BulkWrite(error::BulkWriteFailure {
                    write_errors: response.write_errors.clone(),
                    write_concern_error: Some(wc_error),
                }),
                response.labels.clone(),
            );
            if error.is_write_retryable() {
                return Err(error);
            }
        }

        Ok(BatchOutcome {
            n: response.n,
            n_modified: response.n_modified,
            upserted: response.upserted.clone().unwrap_or_default(),
            write_errors: response.write_errors.clone().unwrap_or_default(),
            write_concern_error: response.write_concern_error.clone(),
        })
    }

    fn write_concern(&self) -> Option<&WriteConcern> {
        self.write_concern.as_ref()
    }

    fn supports_sessions(&self) -> bool {
        true
    }

    fn retryability(&self) -> Retryability {
        if self.retryable {
            Retryability::Write
        } else {
            Retryability::None
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct BatchBody {
    #[serde(rename = "nModified", default)]
    n_modified: u64,
    #[serde(default)]
    upserted: Option<Vec<UpsertedEntry>>,
}

#[derive(Debug, Deserialize, Clone)]
struct UpsertedEntry {
    index: usize,
    #[serde(rename = "_id")]
    id: Bson,
}

/// The outcome of sending a single batch: both the success counters and any per-item/write-concern
/// errors the server reported for it (spec §3 "Bulk Write Batch").
#[derive(Debug, Default)]
struct BatchOutcome {
    n: u64,
    n_modified: u64,
    upserted: Vec<UpsertedEntry>,
    write_errors: Vec<WireBulkWriteError>,
    write_concern_error: Option<WriteConcernError>,
}

/// Runs `models` against `binding`, grouping them into same-kind runs and batches that fit the
/// bound connection's advertised limits, accumulating a rolling [`BulkWriteResult`] and
/// [`error::bulk_write::BulkWriteError`] (spec §3, §4.6). Each batch is sent via
/// [`executor::execute_write`], so each batch gets its own independent at-most-one-retry budget
/// rather than sharing one across the whole operation (spec §3 "Bulk Write Batch" tracker).
///
/// Under `ordered: true`, a batch's own document-level write errors stop every subsequent batch
/// and run; a write-concern-only error does not (spec §4.6 "Write-concern errors").
pub(crate) async fn execute(
    ns: &Namespace,
    models: &[WriteModel],
    options: &BulkWriteOptions,
    binding: &mut dyn WriteBinding,
) -> Result<BulkWriteResult> {
    let ordered = options.ordered.unwrap_or(true);
    let runs = group_into_runs(models);

    let mut result = BulkWriteResult::default();
    let mut aggregate_error = error::bulk_write::BulkWriteError::default();
    let mut has_write_error = false;

    'runs: for run in &runs {
        let mut offset = 0usize;
        while offset < run.entries.len() {
            let remaining = &run.entries[offset..];
            let mut batch = BulkWriteBatch::new(run, remaining, ns, options);
            let attempt = executor::execute_write(&mut batch, binding).await;

            let consumed = batch.consumed.max(1);
            let global_start = run.start_index + offset;
            offset += consumed;

            match attempt {
                Ok(outcome) => {
                    let had_write_error = !outcome.write_errors.is_empty();
                    apply_batch_outcome(run.kind, global_start, outcome, &mut result, &mut aggregate_error);
                    has_write_error |= had_write_error;
                }
                Err(err) => {
                    // A transport/command-level failure (not a per-item write error): nothing
                    // more can be attempted, but whatever already succeeded is still reported.
                    if aggregate_error.write_errors.is_empty()
                        && aggregate_error.write_concern_errors.is_empty()
                        && result.inserted_count == 0
                        && result.matched_count == 0
                        && result.deleted_count == 0
                    {
                        return Err(err);
                    }
                    aggregate_error.merge_partial_results(result);
                    return Err(Error::new(
                        error::ErrorKind::BulkWriteDetailed(aggregate_error),
                        None::<Option<String>>,
                    )
                    .with_source(Some(err)));
                }
            }

            if ordered && has_write_error {
                break 'runs;
            }
        }
    }

    if has_write_error || !aggregate_error.write_concern_errors.is_empty() {
        aggregate_error.merge_partial_results(result);
        return Err(Error::new(
            error::ErrorKind::BulkWriteDetailed(aggregate_error),
            None::<Option<String>>,
        ));
    }

    Ok(result)
}

fn apply_batch_outcome(
    kind: RequestKind,
    global_start: usize,
    outcome: BatchOutcome,
    result: &mut BulkWriteResult,
    aggregate_error: &mut error::bulk_write::BulkWriteError,
) {
    let errored_local_indices: HashSet<usize> = outcome.write_errors.iter().map(|e| e.index).collect();

    match kind {
        RequestKind::Insert => {
            for local_index in 0..(outcome.n as usize) {
                if !errored_local_indices.contains(&local_index) {
                    result.add_insert(
                        global_start + local_index,
                        InsertOneResult {
                            inserted_id: Bson::Null,
                        },
                    );
                }
            }
        }
        RequestKind::Update => {
            let upserted_by_index: HashMap<usize, Bson> =
                outcome.upserted.iter().map(|u| (u.index, u.id.clone())).collect();
            let upserted_count = upserted_by_index.len() as u64;
            result.matched_count += outcome.n.saturating_sub(upserted_count);
            result.modified_count += outcome.n_modified;
            for (local_index, id) in upserted_by_index {
                result.upserted_count += 1;
                result.upserted_ids.insert(global_start + local_index, id);
            }
        }
        RequestKind::Delete => {
            result.deleted_count += outcome.n;
        }
    }

    for wire_error in outcome.write_errors {
        aggregate_error.write_errors.insert(
            global_start + wire_error.index,
            WriteError {
                code: wire_error.code,
                code_name: wire_error.code_name,
                message: wire_error.message,
                details: wire_error.details,
            },
        );
    }
    if let Some(wc_error) = outcome.write_concern_error {
        aggregate_error.write_concern_errors.push(wc_error);
    }
}

#[cfg(test)]
mod test {
    use bson::doc;

    use super::*;
    use crate::operation::test as op_test;

    fn ns() -> Namespace {
        Namespace::new("test_db", "test_coll")
    }

    #[test]
    fn groups_consecutive_same_kind_requests_into_runs() {
        let models = vec![
            WriteModel::Insert {
                document: doc! { "_id": 1 },
            },
            WriteModel::Insert {
                document: doc! { "_id": 2 },
            },
            WriteModel::Delete {
                filter: doc! { "_id": 1 },
                limit: 1,
                collation: None,
                hint: None,
            },
            WriteModel::Insert {
                document: doc! { "_id": 3 },
            },
        ];
        let runs = group_into_runs(&models);
        assert_eq!(runs.len(), 3);
        assert_eq!(runs[0].kind, RequestKind::Insert);
        assert_eq!(runs[0].entries.len(), 2);
        assert_eq!(runs[0].start_index, 0);
        assert_eq!(runs[1].kind, RequestKind::Delete);
        assert_eq!(runs[1].start_index, 2);
        assert_eq!(runs[2].kind, RequestKind::Insert);
        assert_eq!(runs[2].start_index, 3);
    }

    #[test]
    fn multi_update_run_is_not_retryable() {
        let models = vec![WriteModel::Update {
            filter: doc! {},
            update: UpdateOrReplace::UpdateModifications(doc! { "$set": { "x": 1 } }),
            multi: true,
            array_filters: None,
            collation: None,
            hint: None,
            upsert: None,
        }];
        let runs = group_into_runs(&models);
        assert!(!runs[0].retryable);
    }

    #[test]
    fn single_document_update_run_is_retryable() {
        let models = vec![WriteModel::Update {
            filter: doc! {},
            update: UpdateOrReplace::UpdateModifications(doc! { "$set": { "x": 1 } }),
            multi: false,
            array_filters: None,
            collation: None,
            hint: None,
            upsert: None,
        }];
        let runs = group_into_runs(&models);
        assert!(runs[0].retryable);
    }

    #[test]
    fn batch_build_splits_by_max_write_batch_size() {
        let ns = ns();
        let entries: Vec<Document> = (0..5).map(|i| doc! { "_id": i }).collect();
        let run = Run {
            kind: RequestKind::Insert,
            start_index: 0,
            entries: entries.clone(),
            retryable: true,
        };
        let options = BulkWriteOptions::default();
        let mut batch = BulkWriteBatch::new(&run, &entries, &ns, &options);

        let mut description = op_test::connection_description(9);
        description.max_write_batch_size = 2;
        let cmd = batch.build(&description).unwrap();

        assert_eq!(batch.consumed, 2);
        let docs = cmd.body.get_array("documents").unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(cmd.body.get_bool("ordered").unwrap(), true);
    }

    #[test]
    fn batch_build_splits_by_message_size_budget() {
        let ns = ns();
        let big_value = "x".repeat(1_000);
        let entries: Vec<Document> = (0..10).map(|i| doc! { "_id": i, "pad": big_value.clone() }).collect();
        let run = Run {
            kind: RequestKind::Insert,
            start_index: 0,
            entries: entries.clone(),
            retryable: true,
        };
        let options = BulkWriteOptions::default();
        let mut batch = BulkWriteBatch::new(&run, &entries, &ns, &options);

        let mut description = op_test::connection_description(9);
        description.max_message_size_bytes = operation::COMMAND_OVERHEAD_SIZE as i64 + 2_500;
        let cmd = batch.build(&description).unwrap();

        assert!(batch.consumed < 10);
        let docs = cmd.body.get_array("documents").unwrap();
        assert_eq!(docs.len(), batch.consumed);
    }

    #[test]
    fn oversized_single_entry_is_rejected() {
        let ns = ns();
        let entries = vec![doc! { "_id": 1, "pad": "x".repeat(200) }];
        let run = Run {
            kind: RequestKind::Insert,
            start_index: 0,
            entries: entries.clone(),
            retryable: true,
        };
        let options = BulkWriteOptions::default();
        let mut batch = BulkWriteBatch::new(&run, &entries, &ns, &options);

        let mut description = op_test::connection_description(9);
        description.max_bson_object_size = 32;
        let result = batch.build(&description);
        assert!(result.is_err());
    }

    #[test]
    fn batch_handle_response_collects_counts_and_errors() {
        let ns = ns();
        let entries = vec![doc! {}];
        let run = Run {
            kind: RequestKind::Update,
            start_index: 0,
            entries: entries.clone(),
            retryable: true,
        };
        let options = BulkWriteOptions::default();
        let batch = BulkWriteBatch::new(&run, &entries, &ns, &options);

        let outcome = op_test::handle_response_test(
            &batch,
            doc! {
                "ok": 1.0,
                "n": 2,
                "nModified": 1,
                "upserted": [{ "index": 1, "_id": 9 }],
                "writeErrors": [{ "index": 0, "code": 11000, "errmsg": "dup key" }],
            },
        )
        .unwrap();

        assert_eq!(outcome.n, 2);
        assert_eq!(outcome.n_modified, 1);
        assert_eq!(outcome.upserted[0].index, 1);
        assert_eq!(outcome.write_errors[0].index, 0);
    }

    #[test]
    fn retryable_write_concern_error_is_raised_not_merged() {
        let ns = ns();
        let entries = vec![doc! {}];
        let run = Run {
            kind: RequestKind::Insert,
            start_index: 0,
            entries: entries.clone(),
            retryable: true,
        };
        let options = BulkWriteOptions::default();
        let batch = BulkWriteBatch::new(&run, &entries, &ns, &options);

        let error = op_test::handle_response_test(
            &batch,
            doc! {
                "ok": 1.0,
                "n": 1,
                "writeConcernError": {
                    "code": 64,
                    "errmsg": "waiting for replication timed out",
                    "errorLabels": ["RetryableWriteError"],
                },
            },
        )
        .unwrap_err();

        assert!(error.is_write_retryable());
    }

    #[test]
    fn non_retryable_write_concern_error_is_merged_into_outcome() {
        let ns = ns();
        let entries = vec![doc! {}];
        let run = Run {
            kind: RequestKind::Insert,
            start_index: 0,
            entries: entries.clone(),
            retryable: true,
        };
        let options = BulkWriteOptions::default();
        let batch = BulkWriteBatch::new(&run, &entries, &ns, &options);

        let outcome = op_test::handle_response_test(
            &batch,
            doc! {
                "ok": 1.0,
                "n": 1,
                "writeConcernError": {
                    "code": 64,
                    "errmsg": "waiting for replication timed out",
                },
            },
        )
        .unwrap();

        assert_eq!(outcome.n, 1);
        assert_eq!(outcome.write_concern_error.unwrap().code, 64);
    }
}
