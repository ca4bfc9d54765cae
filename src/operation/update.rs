use bson::{Bson, Document};
use serde::Deserialize;

use crate::{
    binding::ConnectionDescription,
    bson::doc,
    bson_util,
    collation::Collation,
    error::{convert_bulk_errors, Result},
    operation::{Command, OperationWithDefaults, Retryability, WriteResponseBody},
    options::{Hint, ReplaceOptions, UpdateOptions, WriteConcern},
    results::UpdateResult,
    Namespace,
};

/// Either an update-operator document (`$set`, ...) or a full replacement document — the two
/// shapes the `u` field of an `update` command entry can take (spec §6).
#[derive(Debug, Clone)]
pub(crate) enum UpdateOrReplace {
    UpdateModifications(Document),
    Replacement(Document),
}

impl UpdateOrReplace {
    fn into_bson(self) -> Bson {
        match self {
            UpdateOrReplace::UpdateModifications(doc) => Bson::Document(doc),
            UpdateOrReplace::Replacement(doc) => Bson::Document(doc),
        }
    }
}

/// `update { update: <collection>, updates: [{q, u, multi?, upsert?, collation?, hint?,
/// arrayFilters?}], writeConcern?, bypassDocumentValidation?, let? }` (spec §6). Backs
/// `updateOne`/`updateMany`/`replaceOne`-shaped calls; the only difference between an update and a
/// replace is the shape of `u` and whether `arrayFilters`/`multi` are meaningful.
#[derive(Debug)]
pub(crate) struct Update {
    ns: Namespace,
    filter: Document,
    update: UpdateOrReplace,
    multi: Option<bool>,
    array_filters: Option<Vec<Document>>,
    collation: Option<Collation>,
    hint: Option<Hint>,
    upsert: Option<bool>,
    bypass_document_validation: Option<bool>,
    write_concern: Option<WriteConcern>,
    let_vars: Option<Document>,
}

impl Update {
    pub(crate) fn with_update(
        ns: Namespace,
        filter: Document,
        update: Document,
        multi: bool,
        options: Option<UpdateOptions>,
    ) -> Self {
        let options = options.unwrap_or_default();
        Self {
            ns,
            filter,
            update: UpdateOrReplace::UpdateModifications(update),
            multi: if multi { Some(true) } else { None },
            array_filters: options.array_filters,
            collation: options.collation,
            hint: options.hint,
            upsert: options.upsert,
            bypass_document_validation: options.bypass_document_validation,
            write_concern: options.write_concern,
            let_vars: options.let_vars,
        }
    }

    pub(crate) fn with_replacement(
        ns: Namespace,
        filter: Document,
        replacement: Document,
        options: Option<ReplaceOptions>,
    ) -> Self {
        let options = options.unwrap_or_default();
        Self {
            ns,
            filter,
            update: UpdateOrReplace::Replacement(replacement),
            multi: None,
            array_filters: None,
            collation: options.collation,
            hint: options.hint,
            upsert: options.upsert,
            bypass_document_validation: options.bypass_document_validation,
            write_concern: options.write_concern,
            let_vars: options.let_vars,
        }
    }

    #[cfg(test)]
    fn empty() -> Self {
        Self::with_update(Namespace::empty(), Document::new(), Document::new(), false, None)
    }
}

impl OperationWithDefaults for Update {
    type O = UpdateResult;
    type Command = Document;

    const NAME: &'static str = "update";

    fn build(&mut self, _description: &ConnectionDescription) -> Result<Command<Document>> {
        let mut update_entry = doc! {
            "q": self.filter.clone(),
            "u": self.update.clone().into_bson(),
        };

        if let Some(multi) = self.multi {
            update_entry.insert("multi", multi);
        }
        if let Some(upsert) = self.upsert {
            update_entry.insert("upsert", upsert);
        }
        if let Some(ref collation) = self.collation {
            update_entry.insert("collation", bson::to_bson(collation)?);
        }
        if let Some(ref hint) = self.hint {
            update_entry.insert("hint", hint.clone().into_bson());
        }
        if let Some(ref array_filters) = self.array_filters {
            update_entry.insert("arrayFilters", bson_util::to_bson_array(array_filters));
        }

        let mut body = doc! {
            Self::NAME: self.ns.coll.clone(),
            "updates": bson_util::to_bson_array(&[update_entry]),
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

        Ok(Command::new(Self::NAME, &self.ns.db, body))
    }

    fn handle_response(
        &self,
        response: crate::binding::Response,
        _description: &ConnectionDescription,
    ) -> Result<Self::O> {
        let response: WriteResponseBody<UpdateBody> = response.body()?;
        response.validate().map_err(convert_bulk_errors)?;

        let upserted_id = response
            .upserted
            .as_ref()
            .and_then(|v| v.first())
            .and_then(|doc| doc.get("_id"))
            .cloned();

        // `n` counts every matched document, upserts included; a true upsert (no pre-existing
        // match) is not itself a "match" from the caller's perspective.
        let upserted_count = response.upserted.as_ref().map_or(0, Vec::len) as u64;
        let matched_count = response.n.saturating_sub(upserted_count);

        Ok(UpdateResult {
            matched_count,
            modified_count: response.n_modified,
            upserted_id,
        })
    }

    fn write_concern(&self) -> Option<&WriteConcern> {
        self.write_concern.as_ref()
    }

    fn retryability(&self) -> Retryability {
        if self.multi == Some(true) {
            Retryability::None
        } else {
            Retryability::Write
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct UpdateBody {
    #[serde(default)]
    n: u64,
    #[serde(rename = "nModified", default)]
    n_modified: u64,
    upserted: Option<Vec<Document>>,
}

#[cfg(test)]
mod test {
    use bson::doc;

    use crate::{
        error::{ErrorKind, WriteError, WriteFailure},
        operation::{test as op_test, OperationWithDefaults, Update},
        options::{Acknowledgment, UpdateOptions, WriteConcern},
        Namespace,
    };

    #[test]
    fn build_update_one() {
        let ns = Namespace::new("test_db", "test_coll");
        let filter = doc! { "x": { "$gt": 1 } };
        let update = doc! { "$inc": { "x": 1 } };
        let wc = WriteConcern {
            w: Some(Acknowledgment::Majority),
            ..Default::default()
        };
        let options = UpdateOptions {
            upsert: Some(false),
            bypass_document_validation: Some(true),
            write_concern: Some(wc),
            ..Default::default()
        };

        let mut op = Update::with_update(ns, filter.clone(), update.clone(), false, Some(options));
        let description = op_test::connection_description(8);
        let cmd = op.build(&description).unwrap();

        assert_eq!(cmd.name.as_str(), "update");
        assert_eq!(cmd.target_db.as_str(), "test_db");
        assert_eq!(cmd.body.get_str("update").unwrap(), "test_coll");
        assert_eq!(cmd.body.get_bool("bypassDocumentValidation").unwrap(), true);
    }

    #[test]
    fn build_update_many() {
        let ns = Namespace::new("test_db", "test_coll");
        let filter = doc! { "x": { "$gt": 1 } };
        let update = doc! { "$inc": { "x": 1 } };

        let mut op = Update::with_update(ns, filter, update, true, None);
        let description = op_test::connection_description(8);
        let cmd = op.build(&description).unwrap();

        let updates = cmd.body.get_array("updates").unwrap();
        let entry = updates[0].as_document().unwrap();
        assert_eq!(entry.get_bool("multi").unwrap(), true);
    }

    #[test]
    fn handle_success() {
        let op = Update::empty();
        let result = op_test::handle_response_test(
            &op,
            doc! {
                "ok": 1.0,
                "n": 3,
                "nModified": 1,
                "upserted": [{ "index": 0, "_id": 1 }],
            },
        )
        .unwrap();

        assert_eq!(result.matched_count, 2);
        assert_eq!(result.modified_count, 1);
        assert_eq!(result.upserted_id, Some(bson::Bson::Int32(1)));
    }

    #[test]
    fn handle_success_no_upsert() {
        let op = Update::empty();
        let result = op_test::handle_response_test(
            &op,
            doc! {
                "ok": 1.0,
                "n": 5,
                "nModified": 2,
            },
        )
        .unwrap();

        assert_eq!(result.matched_count, 5);
        assert_eq!(result.modified_count, 2);
        assert_eq!(result.upserted_id, None);
    }

    #[test]
    fn handle_invalid_response() {
        let op = Update::empty();
        let result = op_test::handle_response_test(&op, doc! { "ok": 1.0, "asdfadsf": 123123 });
        assert!(result.is_err());
    }

    #[test]
    fn handle_command_error() {
        let op = Update::empty();
        assert!(op_test::handle_command_error(&op, 50, "MaxTimeMSExpired", "time limit exceeded").is_err());
    }

    #[test]
    fn handle_write_failure() {
        let op = Update::empty();
        let result = op_test::handle_response_test(
            &op,
            doc! {
                "ok": 1.0,
                "n": 12,
                "nModified": 0,
                "writeErrors": [{ "index": 0, "code": 1234, "errmsg": "my error string" }],
            },
        );
        assert!(result.is_err());
        match *result.unwrap_err().kind {
            ErrorKind::Write(WriteFailure::WriteError(ref error)) => {
                let expected_err = WriteError {
                    code: 1234,
                    code_name: None,
                    message: "my error string".to_string(),
                    details: None,
                };
                assert_eq!(error, &expected_err);
            }
            ref e => panic!("expected write error, got {:?}", e),
        }
    }

    #[test]
    fn handle_write_concern_failure() {
        let op = Update::empty();
        let result = op_test::handle_response_test(
            &op,
            doc! {
                "ok": 1.0,
                "n": 0,
                "nModified": 0,
                "writeConcernError": {
                    "code": 456,
                    "codeName": "wcError",
                    "errmsg": "some message",
                },
            },
        );
        assert!(result.is_err());
        match *result.unwrap_err().kind {
            ErrorKind::Write(WriteFailure::WriteConcernError(ref wc_error)) => {
                assert_eq!(wc_error.code, 456);
                assert_eq!(wc_error.code_name, "wcError");
            }
            ref e => panic!("expected write concern error, got {:?}", e),
        }
    }
}
