use bson::Document;

use crate::{
    binding::{ConnectionDescription, Response},
    bson::doc,
    cursor::common::CursorSpecification,
    error::Result,
    operation::{append_options, Command, CursorBody, OperationWithDefaults, Retryability},
    options::ListCollectionsOptions,
};

/// `listCollections { listCollections: 1, filter?, nameOnly?, cursor: { batchSize? }, comment? }`
/// (spec §6).
#[derive(Debug)]
pub(crate) struct ListCollections {
    db: String,
    name_only: bool,
    options: Option<ListCollectionsOptions>,
}

impl ListCollections {
    pub(crate) fn new(db: String, name_only: bool, options: Option<ListCollectionsOptions>) -> Self {
        Self {
            db,
            name_only,
            options,
        }
    }
}

impl OperationWithDefaults for ListCollections {
    type O = CursorSpecification;
    type Command = Document;

    const NAME: &'static str = "listCollections";

    fn build(&mut self, _description: &ConnectionDescription) -> Result<Command<Document>> {
        let mut body = doc! {
            Self::NAME: 1,
        };

        // nameOnly only makes sense if the caller did not also filter on fields other than name.
        let mut name_only = self.name_only;
        if let Some(filter) = self.options.as_ref().and_then(|o| o.filter.as_ref()) {
            if name_only && filter.keys().any(|k| k != "name") {
                name_only = false;
            }
        }
        body.insert("nameOnly", name_only);

        append_options(&mut body, self.options.as_ref())?;

        Ok(Command::new(Self::NAME, self.db.clone(), body))
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
            self.options.as_ref().and_then(|opts| opts.batch_size),
            None,
            self.options.as_ref().and_then(|opts| opts.comment.clone()),
        ))
    }

    fn retryability(&self) -> Retryability {
        Retryability::Read
    }
}
