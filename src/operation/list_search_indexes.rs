use bson::Document;

use crate::{
    binding::{ConnectionDescription, Response},
    bson::doc,
    cursor::common::CursorSpecification,
    error::Result,
    operation::{aggregate::Aggregate, OperationWithDefaults, Retryability},
    options::{ListSearchIndexesOptions, ReadPreference, WriteConcern},
    Namespace,
};

/// `$listSearchIndexes`, emitted as the first stage of an `aggregate` pipeline against the named
/// collection (spec §6, SPEC_FULL §14). Delegates entirely to the inner [`Aggregate`], the same
/// way `ChangeStreamAggregate` layers `$changeStream` over it.
#[derive(Debug)]
pub(crate) struct ListSearchIndexes(Aggregate);

impl ListSearchIndexes {
    pub(crate) fn new(ns: Namespace, options: Option<ListSearchIndexesOptions>) -> Self {
        let options = options.unwrap_or_default();

        let mut stage_body = Document::new();
        if let Some(name) = options.name {
            stage_body.insert("name", name);
        }

        let pipeline = vec![doc! { "$listSearchIndexes": stage_body }];

        let mut aggregate_options = options.aggregate_options.unwrap_or_default();
        if aggregate_options.batch_size.is_none() {
            aggregate_options.batch_size = options.batch_size;
        }

        Self(Aggregate::new(ns, pipeline, Some(aggregate_options)))
    }
}

impl OperationWithDefaults for ListSearchIndexes {
    type O = CursorSpecification;
    type Command = Document;

    const NAME: &'static str = "aggregate";

    fn build(&mut self, description: &ConnectionDescription) -> Result<crate::operation::Command<Document>> {
        self.0.build(description)
    }

    fn extract_at_cluster_time(&self, response: &bson::RawDocument) -> Result<Option<bson::Timestamp>> {
        self.0.extract_at_cluster_time(response)
    }

    fn handle_response(&self, response: Response, description: &ConnectionDescription) -> Result<Self::O> {
        self.0.handle_response(response, description)
    }

    fn read_preference(&self) -> Option<&ReadPreference> {
        self.0.read_preference()
    }

    fn supports_read_concern(&self, description: &ConnectionDescription) -> bool {
        self.0.supports_read_concern(description)
    }

    fn write_concern(&self) -> Option<&WriteConcern> {
        self.0.write_concern()
    }

    fn retryability(&self) -> Retryability {
        self.0.retryability()
    }
}

#[cfg(test)]
mod test {
    use super::ListSearchIndexes;
    use crate::{operation::{test as op_test, OperationWithDefaults}, options::ListSearchIndexesOptions, Namespace};

    #[test]
    fn build_includes_stage_name() {
        let ns = Namespace::new("test_db", "test_coll");
        let options = ListSearchIndexesOptions::builder().name("my-index").build();
        let mut op = ListSearchIndexes::new(ns, Some(options));
        let description = op_test::connection_description(17);
        let cmd = op.build(&description).unwrap();

        let pipeline = cmd.body.get_array("pipeline").unwrap();
        let stage = pipeline[0].as_document().unwrap();
        let inner = stage.get_document("$listSearchIndexes").unwrap();
        assert_eq!(inner.get_str("name").unwrap(), "my-index");
    }

    #[test]
    fn build_without_name() {
        let ns = Namespace::new("test_db", "test_coll");
        let mut op = ListSearchIndexes::new(ns, None);
        let description = op_test::connection_description(17);
        let cmd = op.build(&description).unwrap();

        let pipeline = cmd.body.get_array("pipeline").unwrap();
        let stage = pipeline[0].as_document().unwrap();
        let inner = stage.get_document("$listSearchIndexes").unwrap();
        assert!(inner.is_empty());
    }
}
