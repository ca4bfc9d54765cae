use bson::Document;

use crate::{
    binding::{ConnectionDescription, Response},
    bson::doc,
    cursor::common::CursorSpecification,
    error::{ErrorKind, Result},
    operation::{
        append_options,
        Command,
        CursorBody,
        OperationWithDefaults,
        Retryability,
        SERVER_4_4_0_WIRE_VERSION,
    },
    options::{CursorType, FindOptions, ReadPreference},
    Namespace,
};

/// `find { find: <collection>, filter, ... }` (spec §6).
#[derive(Debug)]
pub(crate) struct Find {
    ns: Namespace,
    filter: Document,
    options: Option<Box<FindOptions>>,
}

impl Find {
    pub(crate) fn new(ns: Namespace, filter: Document, options: Option<FindOptions>) -> Self {
        Self {
            ns,
            filter,
            options: options.map(Box::new),
        }
    }
}

impl OperationWithDefaults for Find {
    type O = CursorSpecification;
    type Command = Document;

    const NAME: &'static str = "find";

    fn build(&mut self, _description: &ConnectionDescription) -> Result<Command<Document>> {
        let mut body = doc! {
            Self::NAME: self.ns.coll.clone(),
        };

        if let Some(ref options) = self.options {
            // negative limits are interpreted as a request for a single batch, per the CRUD spec.
            if options.limit.map(|limit| limit < 0) == Some(true) {
                body.insert("singleBatch", true);
            }

            if options.batch_size.map(|batch_size| batch_size > i32::MAX as u32) == Some(true) {
                return Err(ErrorKind::InvalidArgument {
                    message: "the batch size must fit into a signed 32-bit integer".to_string(),
                }
                .into());
            }

            match options.cursor_type {
                Some(CursorType::Tailable) => {
                    body.insert("tailable", true);
                }
                Some(CursorType::TailableAwait) => {
                    body.insert("tailable", true);
                    body.insert("awaitData", true);
                }
                _ => {}
            }

            if let Some(ref hint) = options.hint {
                body.insert("hint", hint.clone().into_bson());
            }
        }

        append_options(&mut body, self.options.as_ref())?;
        body.insert("filter", self.filter.clone());

        Ok(Command::new(Self::NAME, &self.ns.db, body))
    }

    fn extract_at_cluster_time(&self, response: &bson::RawDocument) -> Result<Option<bson::Timestamp>> {
        CursorBody::extract_at_cluster_time(response)
    }

    fn handle_response(
        &self,
        response: Response,
        description: &ConnectionDescription,
    ) -> Result<Self::O> {
        let response: CursorBody = response.body()?;

        // The comment should only be propagated to getMore calls on 4.4+.
        let comment = if description.max_wire_version < SERVER_4_4_0_WIRE_VERSION {
            None
        } else {
            self.options.as_ref().and_then(|opts| opts.comment.clone())
        };

        Ok(CursorSpecification::new(
            response.cursor,
            description.server_address.clone(),
            self.options.as_ref().and_then(|opts| opts.batch_size),
            self.options.as_ref().and_then(|opts| opts.max_time),
            comment,
        ))
    }

    fn supports_read_concern(&self, _description: &ConnectionDescription) -> bool {
        true
    }

    fn read_concern(&self) -> Option<&crate::concern::ReadConcern> {
        self.options.as_ref().and_then(|opts| opts.read_concern.as_ref())
    }

    fn read_preference(&self) -> Option<&ReadPreference> {
        self.options.as_ref().and_then(|opts| opts.read_preference.as_ref())
    }

    fn retryability(&self) -> Retryability {
        Retryability::Read
    }
}
