use bson::{doc, Document};

use crate::{
    binding::ConnectionDescription,
    bson_util,
    error::{convert_bulk_errors, Result},
    operation::{append_options, remove_empty_write_concern, Command, OperationWithDefaults, Retryability, WriteResponseBody},
    options::{DeleteOptions, WriteConcern},
    results::DeleteResult,
    Namespace,
};

/// `delete { delete: <collection>, deletes: [{q, limit, collation?, hint?}] }` (spec §6).
#[derive(Debug)]
pub(crate) struct Delete {
    ns: Namespace,
    filter: Document,
    limit: u32,
    options: Option<DeleteOptions>,
}

impl Delete {
    pub(crate) fn new(ns: Namespace, filter: Document, limit: u32, options: Option<DeleteOptions>) -> Self {
        Self {
            ns,
            filter,
            limit,
            options,
        }
    }
}

impl OperationWithDefaults for Delete {
    type O = DeleteResult;
    type Command = Document;

    const NAME: &'static str = "delete";

    fn build(&mut self, _description: &ConnectionDescription) -> Result<Command<Document>> {
        remove_empty_write_concern!(self.options);

        let mut delete_entry = doc! {
            "q": self.filter.clone(),
            "limit": self.limit,
        };
        if let Some(ref options) = self.options {
            if let Some(ref collation) = options.collation {
                delete_entry.insert("collation", bson::to_bson(collation)?);
            }
            if let Some(ref hint) = options.hint {
                delete_entry.insert("hint", hint.clone().into_bson());
            }
        }

        let mut body = doc! {
            Self::NAME: self.ns.coll.clone(),
            "deletes": bson_util::to_bson_array(&[delete_entry]),
        };
        append_options(&mut body, self.options.as_ref())?;

        Ok(Command::new(Self::NAME, &self.ns.db, body))
    }

    fn handle_response(
        &self,
        response: crate::binding::Response,
        _description: &ConnectionDescription,
    ) -> Result<Self::O> {
        let response: WriteResponseBody<ResponseBody> = response.body()?;
        response.validate()?;
        Ok(DeleteResult {
            deleted_count: response.n,
        })
    }

    fn handle_error(&self, error: crate::error::Error) -> Result<Self::O> {
        Err(convert_bulk_errors(error))
    }

    fn write_concern(&self) -> Option<&WriteConcern> {
        self.options.as_ref().and_then(|opts| opts.write_concern.as_ref())
    }

    fn retryability(&self) -> Retryability {
        if self.limit == 1 {
            Retryability::Write
        } else {
            Retryability::None
        }
    }
}

#[derive(Debug, serde::Deserialize)]
pub(crate) struct ResponseBody {
    n: u64,
}
