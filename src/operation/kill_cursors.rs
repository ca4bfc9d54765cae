use bson::Document;
use serde::Deserialize;

use crate::{
    binding::{ConnectionDescription, Response},
    bson::doc,
    bson_util,
    error::Result,
    operation::{Command, OperationWithDefaults},
    Namespace,
};

/// `killCursors { killCursors: <coll>, cursors: [<id>] }` (spec §6), issued best-effort when the
/// Cursor Resource Manager closes a cursor (spec §4.4 "Close").
pub(crate) struct KillCursors {
    ns: Namespace,
    cursor_ids: Vec<i64>,
}

impl KillCursors {
    pub(crate) fn new(ns: Namespace, cursor_ids: Vec<i64>) -> Self {
        Self { ns, cursor_ids }
    }
}

impl OperationWithDefaults for KillCursors {
    type O = ();
    type Command = Document;

    const NAME: &'static str = "killCursors";

    fn build(&mut self, _description: &ConnectionDescription) -> Result<Command<Document>> {
        let body = doc! {
            Self::NAME: self.ns.coll.clone(),
            "cursors": bson_util::to_bson_array(&self.cursor_ids),
        };
        Ok(Command::new(Self::NAME, &self.ns.db, body))
    }

    fn handle_response(
        &self,
        _response: Response,
        _description: &ConnectionDescription,
    ) -> Result<Self::O> {
        Ok(())
    }

    fn supports_sessions(&self) -> bool {
        false
    }
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
pub(crate) struct KillCursorsResponseBody {
    cursors_killed: Vec<i64>,
    cursors_not_found: Vec<i64>,
    cursors_alive: Vec<i64>,
    cursors_unknown: Vec<i64>,
}
