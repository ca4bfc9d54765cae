use bson::Document;
use serde::Deserialize;

use crate::{
    binding::ConnectionDescription,
    bson::doc,
    error::Result,
    operation::{append_options, remove_empty_write_concern, Command, OperationWithDefaults, Retryability},
    options::{MapReduceOptions, MapReduceOutput, ReadPreference, WriteConcern},
    Namespace,
};

/// `mapReduce { mapReduce, map, reduce, out, query?, sort?, finalize?, scope?, verbose?, limit?,
/// jsMode?, bypassDocumentValidation?, writeConcern?, collation? }` (spec §6, §9 open question:
/// the command name is cased `mapReduce` on the wire regardless of the client-facing spelling).
#[derive(Debug)]
pub(crate) struct MapReduce {
    ns: Namespace,
    map: String,
    reduce: String,
    out: MapReduceOutput,
    options: Option<MapReduceOptions>,
}

impl MapReduce {
    pub(crate) fn new(
        ns: Namespace,
        map: String,
        reduce: String,
        out: MapReduceOutput,
        options: Option<MapReduceOptions>,
    ) -> Self {
        Self {
            ns,
            map,
            reduce,
            out,
            options,
        }
    }

    fn is_inline_output(&self) -> bool {
        matches!(self.out, MapReduceOutput::Inline)
    }
}

impl OperationWithDefaults for MapReduce {
    type O = MapReduceResult;
    type Command = Document;

    const NAME: &'static str = "mapReduce";

    fn build(&mut self, _description: &ConnectionDescription) -> Result<Command<Document>> {
        remove_empty_write_concern!(self.options);

        let mut body = doc! {
            Self::NAME: self.ns.coll.clone(),
            "map": self.map.clone(),
            "reduce": self.reduce.clone(),
            "out": bson::to_bson(&self.out)?,
        };
        append_options(&mut body, self.options.as_ref())?;

        Ok(Command::new(Self::NAME, &self.ns.db, body))
    }

    fn handle_response(
        &self,
        response: crate::binding::Response,
        _description: &ConnectionDescription,
    ) -> Result<Self::O> {
        if self.is_inline_output() {
            let response: InlineResponseBody = response.body()?;
            Ok(MapReduceResult::Inline {
                results: response.results,
            })
        } else {
            let response: OutputResponseBody = response.body()?;
            let ns = match response.result {
                ResultLocation::Collection(coll) => Namespace::new(self.ns.db.clone(), coll),
                ResultLocation::Namespace { db, collection } => {
                    Namespace::new(db.unwrap_or_else(|| self.ns.db.clone()), collection)
                }
            };
            Ok(MapReduceResult::Output { ns })
        }
    }

    fn supports_read_concern(&self, _description: &ConnectionDescription) -> bool {
        // `MapReduceOptions` carries no read concern of its own; inline map-reduces still read at
        // whatever concern the session/binding attaches by default.
        false
    }

    fn read_preference(&self) -> Option<&ReadPreference> {
        None
    }

    fn write_concern(&self) -> Option<&WriteConcern> {
        if self.is_inline_output() {
            None
        } else {
            self.options.as_ref().and_then(|opts| opts.write_concern.as_ref())
        }
    }

    fn retryability(&self) -> Retryability {
        if self.is_inline_output() {
            Retryability::Read
        } else {
            Retryability::None
        }
    }
}

/// The parsed result of a `mapReduce` command: either the reduced documents themselves (`out:
/// {inline: 1}`) or the namespace the server wrote them to.
#[derive(Debug, Clone)]
pub(crate) enum MapReduceResult {
    Inline { results: Vec<Document> },
    Output { ns: Namespace },
}

#[derive(Debug, Deserialize)]
struct InlineResponseBody {
    results: Vec<Document>,
}

#[derive(Debug, Deserialize)]
struct OutputResponseBody {
    result: ResultLocation,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ResultLocation {
    Collection(String),
    Namespace {
        db: Option<String>,
        collection: String,
    },
}
