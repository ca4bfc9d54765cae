pub(crate) mod change_stream;

#[cfg(test)]
mod test;

use bson::{Bson, Document};

use crate::{
    binding::{ConnectionDescription, Response},
    bson::doc,
    bson_util,
    cursor::common::CursorSpecification,
    error::Result,
    operation::{
        append_options,
        CursorBody,
        OperationWithDefaults,
        Retryability,
        WriteConcernOnlyBody,
        SERVER_4_4_0_WIRE_VERSION,
    },
    options::{AggregateOptions, ReadPreference, WriteConcern},
    Namespace,
};

/// `aggregate { aggregate: <collection or 1>, pipeline: [...], cursor: {batchSize?} }` (spec §6).
/// An aggregation whose last stage is `$out`/`$merge` writes to the server and so has different
/// retry/write-concern/cursor rules than a purely read-only aggregation.
#[derive(Debug)]
pub(crate) struct Aggregate {
    target: AggregateTarget,
    pipeline: Vec<Document>,
    options: Option<AggregateOptions>,
}

impl Aggregate {
    pub(crate) fn new(
        target: impl Into<AggregateTarget>,
        pipeline: impl IntoIterator<Item = Document>,
        options: Option<AggregateOptions>,
    ) -> Self {
        Self {
            target: target.into(),
            pipeline: pipeline.into_iter().collect(),
            options,
        }
    }

    /// Returns whether this is a `$out` or `$merge` aggregation operation.
    fn is_out_or_merge(&self) -> bool {
        self.pipeline
            .last()
            .map(|stage| {
                let stage = bson_util::first_key(stage);
                stage == Some("$out") || stage == Some("$merge")
            })
            .unwrap_or(false)
    }
}

// IMPORTANT: if new method implementations are added here, make sure `ChangeStreamAggregate` has
// the equivalent delegations.
impl OperationWithDefaults for Aggregate {
    type O = CursorSpecification;
    type Command = Document;

    const NAME: &'static str = "aggregate";

    fn build(&mut self, _description: &ConnectionDescription) -> Result<Command<Document>> {
        let mut body = doc! {
            Self::NAME: self.target.to_bson(),
            "pipeline": bson_util::to_bson_array(&self.pipeline),
            "cursor": {},
        };

        append_options(&mut body, self.options.as_ref())?;

        if self.is_out_or_merge() {
            if let Ok(cursor_doc) = body.get_document_mut("cursor") {
                cursor_doc.remove("batchSize");
            }
        }

        Ok(Command::new(Self::NAME, self.target.db_name(), body))
    }

    fn extract_at_cluster_time(&self, response: &bson::RawDocument) -> Result<Option<bson::Timestamp>> {
        CursorBody::extract_at_cluster_time(response)
    }

    fn handle_response(
        &self,
        response: Response,
        description: &ConnectionDescription,
    ) -> Result<Self::O> {
        let cursor_response: CursorBody = response.body()?;

        if self.is_out_or_merge() {
            let wc_error_info: WriteConcernOnlyBody = response.body()?;
            wc_error_info.validate()?;
        }

        // The comment should only be propagated to getMore calls on 4.4+.
        let comment = if description.max_wire_version < SERVER_4_4_0_WIRE_VERSION {
            None
        } else {
            self.options.as_ref().and_then(|opts| opts.comment.clone())
        };

        Ok(CursorSpecification::new(
            cursor_response.cursor,
            description.server_address.clone(),
            self.options.as_ref().and_then(|opts| opts.batch_size),
            self.options.as_ref().and_then(|opts| opts.max_await_time),
            comment,
        ))
    }

    fn read_preference(&self) -> Option<&ReadPreference> {
        self.options.as_ref().and_then(|opts| opts.read_preference.as_ref())
    }

    fn supports_read_concern(&self, _description: &ConnectionDescription) -> bool {
        // for aggregates that write, read concern is supported in MongoDB 4.2+.
        true
    }

    fn read_concern(&self) -> Option<&crate::concern::ReadConcern> {
        self.options.as_ref().and_then(|opts| opts.read_concern.as_ref())
    }

    fn write_concern(&self) -> Option<&WriteConcern> {
        self.options.as_ref().and_then(|opts| opts.write_concern.as_ref())
    }

    fn retryability(&self) -> Retryability {
        if self.is_out_or_merge() {
            Retryability::None
        } else {
            Retryability::Read
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) enum AggregateTarget {
    Database(String),
    Collection(Namespace),
}

impl AggregateTarget {
    fn to_bson(&self) -> Bson {
        match self {
            AggregateTarget::Database(_) => Bson::Int32(1),
            AggregateTarget::Collection(ref ns) => Bson::String(ns.coll.to_string()),
        }
    }

    fn db_name(&self) -> &str {
        match self {
            AggregateTarget::Database(ref s) => s.as_str(),
            AggregateTarget::Collection(ref ns) => ns.db.as_str(),
        }
    }
}

impl From<Namespace> for AggregateTarget {
    fn from(ns: Namespace) -> Self {
        AggregateTarget::Collection(ns)
    }
}

impl From<String> for AggregateTarget {
    fn from(db_name: String) -> Self {
        AggregateTarget::Database(db_name)
    }
}
