use std::collections::HashMap;

use bson::{oid::ObjectId, Bson, Document};

use crate::{
    binding::ConnectionDescription,
    bson::doc,
    bson_util,
    error::{convert_bulk_errors, Result},
    operation::{append_options, remove_empty_write_concern, Command, EmptyBody, OperationWithDefaults, Retryability, WriteResponseBody},
    options::{InsertManyOptions, WriteConcern},
    results::InsertManyResult,
    Namespace,
};

/// `insert { insert: <collection>, documents: [...], ordered?, bypassDocumentValidation?,
/// writeConcern? }` (spec §6). Documents missing an `_id` get one generated client-side so the
/// caller can learn the id that was inserted (spec §4.1).
#[derive(Debug)]
pub(crate) struct Insert {
    ns: Namespace,
    documents: Vec<Document>,
    inserted_ids: Vec<Bson>,
    options: Option<InsertManyOptions>,
}

impl Insert {
    pub(crate) fn new(ns: Namespace, documents: Vec<Document>, options: Option<InsertManyOptions>) -> Self {
        let mut inserted_ids = Vec::with_capacity(documents.len());
        let documents = documents
            .into_iter()
            .map(|mut document| {
                let id = document
                    .get("_id")
                    .cloned()
                    .unwrap_or_else(|| Bson::ObjectId(ObjectId::new()));
                document.insert("_id", id.clone());
                inserted_ids.push(id);
                document
            })
            .collect();

        Self {
            ns,
            documents,
            inserted_ids,
            options,
        }
    }
}

impl OperationWithDefaults for Insert {
    type O = InsertManyResult;
    type Command = Document;

    const NAME: &'static str = "insert";

    fn build(&mut self, _description: &ConnectionDescription) -> Result<Command<Document>> {
        remove_empty_write_concern!(self.options);

        let mut body = doc! {
            Self::NAME: self.ns.coll.clone(),
            "documents": bson_util::to_bson_array(&self.documents),
        };
        append_options(&mut body, self.options.as_ref())?;

        Ok(Command::new(Self::NAME, &self.ns.db, body))
    }

    fn handle_response(
        &self,
        response: crate::binding::Response,
        _description: &ConnectionDescription,
    ) -> Result<Self::O> {
        let response: WriteResponseBody<EmptyBody> = response.body()?;
        response.validate()?;

        let inserted_ids = self.inserted_ids.iter().cloned().enumerate().collect();
        Ok(InsertManyResult { inserted_ids })
    }

    fn handle_error(&self, error: crate::error::Error) -> Result<Self::O> {
        Err(convert_bulk_errors(error))
    }

    fn write_concern(&self) -> Option<&WriteConcern> {
        self.options.as_ref().and_then(|opts| opts.write_concern.as_ref())
    }

    fn retryability(&self) -> Retryability {
        Retryability::Write
    }
}

