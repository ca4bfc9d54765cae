use bson::Document;

use crate::{
    binding::{ConnectionDescription, Response},
    bson::doc,
    cursor::common::CursorSpecification,
    error::{ErrorKind, Result},
    operation::{append_options, Command, CursorBody, OperationWithDefaults, Retryability},
    options::ListIndexesOptions,
    Namespace,
};

/// `listIndexes { listIndexes: <collection>, cursor: { batchSize? }, maxTimeMS? }` (spec §6).
#[derive(Debug)]
pub(crate) struct ListIndexes {
    ns: Namespace,
    options: Option<ListIndexesOptions>,
}

impl ListIndexes {
    pub(crate) fn new(ns: Namespace, options: Option<ListIndexesOptions>) -> Self {
        ListIndexes { ns, options }
    }
}

impl OperationWithDefaults for ListIndexes {
    type O = CursorSpecification;
    type Command = Document;

    const NAME: &'static str = "listIndexes";

    fn build(&mut self, _description: &ConnectionDescription) -> Result<Command<Document>> {
        let mut body = doc! {
            Self::NAME: self.ns.coll.clone(),
        };

        if let Some(size) = self.options.as_ref().and_then(|o| o.batch_size) {
            if size > i32::MAX as u32 {
                return Err(ErrorKind::InvalidArgument {
                    message: "the batch size must fit into a signed 32-bit integer".to_string(),
                }
                .into());
            }
            body.insert("cursor", doc! { "batchSize": size as i32 });
        }

        append_options(&mut body, self.options.as_ref())?;

        Ok(Command::new(Self::NAME, &self.ns.db, body))
    }

    fn handle_response(
        &self,
        response: Response,
        description: &ConnectionDescription,
    ) -> Result<Self::O> {
        let response: CursorBody = response.body()?;
        Ok(CursorSpecification::new(
            response.cursor,
            description.server_address.clone(),
            self.options.as_ref().and_then(|o| o.batch_size),
            self.options.as_ref().and_then(|o| o.max_time),
            None,
        ))
    }

    fn retryability(&self) -> Retryability {
        Retryability::Read
    }
}
