use bson::Document;

use crate::{
    bson::doc,
    change_stream::options::ChangeStreamOptions,
    cursor::common::CursorSpecification,
    error::Result,
    operation::{append_options, aggregate::Aggregate, Command, OperationWithDefaults, Retryability},
    options::{ReadPreference, WriteConcern},
};

use super::AggregateTarget;

/// A `$changeStream`-prefixed aggregation (spec §4.5). Every method just delegates to the inner
/// [`Aggregate`]; the only thing this type adds is prepending the `$changeStream` stage to the
/// caller's pipeline when it's built.
#[derive(Debug)]
pub(crate) struct ChangeStreamAggregate(Aggregate);

impl ChangeStreamAggregate {
    pub(crate) fn new(
        target: &AggregateTarget,
        pipeline: &[Document],
        options: &Option<ChangeStreamOptions>,
    ) -> Result<Self> {
        let mut bson_options = Document::new();
        append_options(&mut bson_options, options.as_ref())?;

        let mut agg_pipeline = vec![doc! { "$changeStream": bson_options }];
        agg_pipeline.extend(pipeline.iter().cloned());
        Ok(Self(Aggregate::new(
            target.clone(),
            agg_pipeline,
            options.as_ref().map(|o| o.aggregate_options()),
        )))
    }
}

// IMPORTANT: must mirror every method `Aggregate` implements on `OperationWithDefaults`, so a
// resumed change stream behaves exactly like the aggregation it wraps.
impl OperationWithDefaults for ChangeStreamAggregate {
    type O = CursorSpecification;
    type Command = Document;

    const NAME: &'static str = "aggregate";

    fn build(&mut self, description: &crate::binding::ConnectionDescription) -> Result<Command<Document>> {
        self.0.build(description)
    }

    fn extract_at_cluster_time(&self, response: &bson::RawDocument) -> Result<Option<bson::Timestamp>> {
        self.0.extract_at_cluster_time(response)
    }

    fn handle_response(
        &self,
        response: crate::binding::Response,
        description: &crate::binding::ConnectionDescription,
    ) -> Result<Self::O> {
        self.0.handle_response(response, description)
    }

    fn read_preference(&self) -> Option<&ReadPreference> {
        self.0.read_preference()
    }

    fn supports_read_concern(&self, description: &crate::binding::ConnectionDescription) -> bool {
        self.0.supports_read_concern(description)
    }

    fn write_concern(&self) -> Option<&WriteConcern> {
        self.0.write_concern()
    }

    fn retryability(&self) -> Retryability {
        self.0.retryability()
    }
}
