use bson::RawDocumentBuf;
use serde::Deserialize;

use crate::{
    binding::{ConnectionDescription, Response},
    bson::{doc, Document},
    error::Result,
    operation::{append_options, Command, OperationWithDefaults, Retryability},
    options::{ListDatabasesOptions, ReadPreference},
};

/// `listDatabases { listDatabases: 1, filter?, nameOnly?, authorizedDatabases?, maxTimeMS?,
/// comment? }` (spec §6), always run against the `admin` database.
#[derive(Debug)]
pub(crate) struct ListDatabases {
    filter: Option<Document>,
    name_only: bool,
    options: Option<ListDatabasesOptions>,
    read_preference: ReadPreference,
}

impl ListDatabases {
    pub(crate) fn new(
        filter: Option<Document>,
        name_only: bool,
        options: Option<ListDatabasesOptions>,
    ) -> Self {
        ListDatabases {
            filter,
            name_only,
            options,
            read_preference: ReadPreference::primary(),
        }
    }

    #[cfg(test)]
    pub(crate) fn empty() -> Self {
        Self::new(None, false, None)
    }
}

impl OperationWithDefaults for ListDatabases {
    type O = Vec<RawDocumentBuf>;
    type Command = Document;

    const NAME: &'static str = "listDatabases";

    fn build(&mut self, _description: &ConnectionDescription) -> Result<Command<Document>> {
        let mut body: Document = doc! {
            Self::NAME: 1,
            "nameOnly": self.name_only
        };

        if let Some(ref filter) = self.filter {
            body.insert("filter", filter.clone());
        }

        append_options(&mut body, self.options.as_ref())?;

        Ok(Command::new(Self::NAME, "admin", body))
    }

    fn handle_response(
        &self,
        response: Response,
        _description: &ConnectionDescription,
    ) -> Result<Self::O> {
        let response: ResponseBody = response.body()?;
        Ok(response.databases)
    }

    fn read_preference(&self) -> Option<&ReadPreference> {
        Some(&self.read_preference)
    }

    fn retryability(&self) -> Retryability {
        Retryability::Read
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResponseBody {
    databases: Vec<RawDocumentBuf>,
}
