use std::{collections::VecDeque, time::Duration};

use bson::{Bson, Document, RawDocumentBuf};
use serde::Deserialize;

use crate::{
    binding::{ConnectionDescription, Response},
    bson::doc,
    change_stream::event::ResumeToken,
    error::{ErrorKind, Result},
    operation::{Command, OperationWithDefaults},
    results::GetMoreResult,
    Namespace,
};

/// `getMore { getMore: <id>, collection, batchSize?, maxTimeMS?, comment? }` (spec §6), driving
/// one batch of the Command Batch Cursor (spec §4.4).
#[derive(Debug)]
pub(crate) struct GetMore {
    ns: Namespace,
    cursor_id: i64,
    batch_size: Option<u32>,
    max_time: Option<Duration>,
    comment: Option<Bson>,
}

impl GetMore {
    pub(crate) fn new(
        ns: Namespace,
        cursor_id: i64,
        batch_size: Option<u32>,
        max_time: Option<Duration>,
        comment: Option<Bson>,
    ) -> Self {
        Self {
            ns,
            cursor_id,
            batch_size,
            max_time,
            comment,
        }
    }
}

impl OperationWithDefaults for GetMore {
    type O = GetMoreResult;
    type Command = Document;

    const NAME: &'static str = "getMore";

    fn build(&mut self, _description: &ConnectionDescription) -> Result<Command<Document>> {
        let mut body = doc! {
            Self::NAME: self.cursor_id,
            "collection": self.ns.coll.clone(),
        };

        if let Some(batch_size) = self.batch_size {
            if batch_size > i32::MAX as u32 {
                return Err(ErrorKind::InvalidArgument {
                    message: "the batch size must fit into a signed 32-bit integer".to_string(),
                }
                .into());
            } else if batch_size != 0 {
                body.insert("batchSize", batch_size as i32);
            }
        }

        if let Some(ref max_time) = self.max_time {
            body.insert(
                "maxTimeMS",
                max_time.as_millis().min(i32::MAX as u128) as i32,
            );
        }

        if let Some(ref comment) = self.comment {
            body.insert("comment", comment.clone());
        }

        Ok(Command::new(Self::NAME, &self.ns.db, body))
    }

    fn handle_response(
        &self,
        response: Response,
        _description: &ConnectionDescription,
    ) -> Result<Self::O> {
        let response: GetMoreResponseBody = response.body()?;
        Ok(GetMoreResult {
            batch: response.cursor.next_batch,
            exhausted: response.cursor.id == 0,
            post_batch_resume_token: response
                .cursor
                .post_batch_resume_token
                .as_ref()
                .map(ResumeToken::from_raw),
            id: response.cursor.id,
            ns: self.ns.clone(),
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct GetMoreResponseBody {
    cursor: NextBatchBody,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NextBatchBody {
    id: i64,
    next_batch: VecDeque<RawDocumentBuf>,
    post_batch_resume_token: Option<RawDocumentBuf>,
}
