use serde::Deserialize;

use crate::{
    binding::ConnectionDescription,
    bson::doc,
    error::{Error, Result},
    operation::{append_options, Command, OperationWithDefaults, Retryability},
    options::{CountOptions, ReadPreference},
    Namespace,
};

/// `count` — spec §6 `count { count, query?, limit?, skip?, hint?, maxTimeMS?, readConcern?,
/// collation? }`. `estimatedDocumentCount` also shapes this command, with no query filter.
pub(crate) struct Count {
    ns: Namespace,
    options: Option<CountOptions>,
}

impl Count {
    pub(crate) fn new(ns: Namespace, options: Option<CountOptions>) -> Self {
        Count { ns, options }
    }
}

impl OperationWithDefaults for Count {
    type O = u64;
    type Command = bson::Document;

    const NAME: &'static str = "count";

    fn build(&mut self, _description: &ConnectionDescription) -> Result<Command<bson::Document>> {
        let mut body = doc! { Self::NAME: self.ns.coll.clone() };
        if let Some(ref options) = self.options {
            if let Some(ref hint) = options.hint {
                body.insert("hint", hint.clone().into_bson());
            }
        }
        append_options(&mut body, self.options.as_ref())?;
        Ok(Command::new(Self::NAME, &self.ns.db, body))
    }

    fn handle_response(
        &self,
        response: crate::binding::Response,
        _description: &ConnectionDescription,
    ) -> Result<Self::O> {
        let response_body: ResponseBody = response.body()?;
        Ok(response_body.n)
    }

    fn handle_error(&self, error: Error) -> Result<Self::O> {
        if error.is_ns_not_found() {
            Ok(0)
        } else {
            Err(error)
        }
    }

    fn read_preference(&self) -> Option<&ReadPreference> {
        self.options.as_ref().and_then(|o| o.read_preference.as_ref())
    }

    fn supports_read_concern(&self, _description: &ConnectionDescription) -> bool {
        true
    }

    fn read_concern(&self) -> Option<&crate::concern::ReadConcern> {
        self.options.as_ref().and_then(|o| o.read_concern.as_ref())
    }

    fn retryability(&self) -> Retryability {
        Retryability::Read
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResponseBody {
    n: u64,
}
