use bson::Document;

use crate::{
    binding::ConnectionDescription,
    bson::doc,
    bson_util,
    error::Result,
    index::IndexModel,
    operation::{append_options, Command, OperationWithDefaults, WriteConcernOnlyBody},
    options::{CreateIndexesOptions, WriteConcern},
    results::CreateIndexesResult,
    Namespace,
};

/// `createIndexes { createIndexes: <collection>, indexes: [...] }` (spec §6).
#[derive(Debug)]
pub(crate) struct CreateIndexes {
    ns: Namespace,
    indexes: Vec<IndexModel>,
    options: Option<CreateIndexesOptions>,
}

impl CreateIndexes {
    pub(crate) fn new(
        ns: Namespace,
        indexes: Vec<IndexModel>,
        options: Option<CreateIndexesOptions>,
    ) -> Self {
        Self {
            ns,
            indexes,
            options,
        }
    }
}

impl OperationWithDefaults for CreateIndexes {
    type O = CreateIndexesResult;
    type Command = Document;

    const NAME: &'static str = "createIndexes";

    fn build(&mut self, _description: &ConnectionDescription) -> Result<Command<Document>> {
        self.indexes.iter_mut().for_each(|i| i.update_name());
        let indexes = bson_util::to_bson_array(&self.indexes);
        let mut body = doc! {
            Self::NAME: self.ns.coll.clone(),
            "indexes": indexes,
        };

        append_options(&mut body, self.options.as_ref())?;

        Ok(Command::new(Self::NAME, &self.ns.db, body))
    }

    fn handle_response(
        &self,
        response: crate::binding::Response,
        _description: &ConnectionDescription,
    ) -> Result<Self::O> {
        let response: WriteConcernOnlyBody = response.body()?;
        response.validate()?;
        let index_names = self.indexes.iter().filter_map(|i| i.get_name()).collect();
        Ok(CreateIndexesResult { index_names })
    }

    fn write_concern(&self) -> Option<&WriteConcern> {
        self.options.as_ref().and_then(|opts| opts.write_concern.as_ref())
    }
}
