//! The public `Cursor` type (spec §4.4): an async iterator over a server-side cursor's documents,
//! deserializing each raw batch document into `T` and driving `getMore`s as the local buffer
//! drains.

pub(crate) mod common;

use std::{collections::VecDeque, marker::PhantomData};

use bson::RawDocumentBuf;
use serde::de::DeserializeOwned;

use crate::{
    binding::{Connection, ConnectionSource},
    change_stream::event::ResumeToken,
    cursor::common::{CommandBatchCursor, CursorSpecification},
    error::Result,
    timeout::TimeoutContext,
    Namespace,
};

/// An async cursor over documents of type `T` (spec §4.4). Each `next`/`try_next` call drains a
/// locally buffered batch before issuing a `getMore`; closing releases the server-side cursor via
/// `killCursors`, best-effort, unless it is already exhausted.
pub struct Cursor<T> {
    wrapped: CommandBatchCursor,
    buffer: VecDeque<RawDocumentBuf>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Cursor<T>
where
    T: DeserializeOwned,
{
    /// Wraps the result of a cursor-producing command (spec §4.2 `execute_read_cursor`) into a
    /// typed, user-facing cursor. `tailable` gates whether `getMore`s carry the general timeout
    /// budget or only the cursor's own static `maxAwaitTimeMS` (spec §3).
    pub(crate) fn new(
        source: Box<dyn ConnectionSource>,
        pinned_connection: Option<Box<dyn Connection>>,
        spec: CursorSpecification,
        timeout: Option<TimeoutContext>,
        tailable: bool,
    ) -> Self {
        Self {
            wrapped: CommandBatchCursor::new(source, pinned_connection, spec, timeout, tailable),
            buffer: VecDeque::new(),
            _marker: PhantomData,
        }
    }

    /// The namespace this cursor iterates.
    pub fn namespace(&self) -> &Namespace {
        self.wrapped.namespace()
    }

    /// The server-side cursor id last reported; `0` once the server has exhausted it.
    pub fn server_cursor_id(&self) -> i64 {
        self.wrapped.server_cursor_id()
    }

    /// Whether this cursor has been closed, or a close is pending an in-flight `next`.
    pub fn is_closed(&self) -> bool {
        self.wrapped.is_closed()
    }

    /// The resume token from the most recently received batch's `postBatchResumeToken`, if any
    /// (spec §4.5 invariant 3).
    pub fn post_batch_resume_token(&self) -> Option<&ResumeToken> {
        self.wrapped.post_batch_resume_token()
    }

    pub fn set_batch_size(&mut self, batch_size: Option<u32>) {
        self.wrapped.set_batch_size(batch_size);
    }

    pub fn get_batch_size(&self) -> Option<u32> {
        self.wrapped.batch_size()
    }

    /// Whether the batch the creating command returned was empty and more may still be fetched
    /// (spec §4.4 step 2 vs. step 3): distinguishes "no results yet" from "exhausted".
    pub fn is_first_batch_empty(&self) -> bool {
        self.buffer.is_empty() && self.wrapped.is_first_batch_empty()
    }

    /// Returns the next document, or `Ok(None)` once the cursor is exhausted (spec §4.4). Only
    /// one `next`/`try_next`/`close` may be in flight at a time; a concurrent call fails with
    /// `ErrorKind::ConcurrentOperation` (spec §4.3).
    pub async fn try_next(&mut self) -> Result<Option<T>> {
        if let Some(raw) = self.buffer.pop_front() {
            return Ok(Some(bson::from_slice(raw.as_bytes())?));
        }
        self.buffer = self.wrapped.next_batch().await?;
        match self.buffer.pop_front() {
            Some(raw) => Ok(Some(bson::from_slice(raw.as_bytes())?)),
            None => Ok(None),
        }
    }

    /// `Iterator`-shaped sibling of [`try_next`](Self::try_next), returning `None` once the
    /// cursor is exhausted rather than `Ok(None)`.
    pub async fn next(&mut self) -> Option<Result<T>> {
        self.try_next().await.transpose()
    }

    /// Whether the document just returned by `try_next` was the last one buffered from its
    /// batch, i.e. the next call will issue a `getMore` (spec §4.5 invariant 3: a change
    /// stream's cached resume token prefers the batch's `postBatchResumeToken` over a
    /// document's own `_id` once its batch is drained).
    pub(crate) fn is_batch_drained(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Closes the cursor, killing the server-side one if it isn't already exhausted (spec §4.3,
    /// §4.4 "Close"). Idempotent.
    pub async fn close(&mut self) {
        self.wrapped.close().await;
    }
}

#[cfg(test)]
mod test {
    use async_trait::async_trait;
    use bson::doc;

    use super::*;
    use crate::{
        binding::{ConnectionDescription, OperationContext, Response, ServerDescription},
        operation::CursorInfo,
    };

    struct PanicsOnUseConnection;

    #[async_trait]
    impl Connection for PanicsOnUseConnection {
        fn description(&self) -> &ConnectionDescription {
            unreachable!("an exhausted cursor must never check out a connection")
        }

        fn id(&self) -> u64 {
            unreachable!()
        }

        async fn command(
            &mut self,
            _target_db: &str,
            _command: bson::Document,
            _context: OperationContext,
        ) -> Result<Response> {
            unreachable!("an exhausted cursor must never send a command")
        }

        fn mark_corrupted(&mut self) {
            unreachable!()
        }

        fn is_corrupted(&self) -> bool {
            false
        }
    }

    struct PanicsOnUseSource;

    #[async_trait]
    impl ConnectionSource for PanicsOnUseSource {
        fn server_description(&self) -> &ServerDescription {
            unreachable!()
        }

        async fn checkout_connection(&self) -> Result<Box<dyn Connection>> {
            unreachable!("an exhausted cursor must never check out a connection")
        }

        fn clone_source(&self) -> Box<dyn ConnectionSource> {
            Box::new(PanicsOnUseSource)
        }
    }

    fn raw(doc: bson::Document) -> RawDocumentBuf {
        RawDocumentBuf::from_document(&doc).unwrap()
    }

    fn exhausted_spec(batch: Vec<bson::Document>) -> CursorSpecification {
        CursorSpecification::new(
            CursorInfo {
                id: 0,
                ns: Namespace::new("db", "coll"),
                first_batch: batch.into_iter().map(raw).collect(),
                post_batch_resume_token: None,
            },
            "localhost:27017".to_string(),
            None,
            None,
            None,
        )
    }

    #[tokio::test]
    async fn already_exhausted_cursor_yields_buffered_documents_without_network() {
        let spec = exhausted_spec(vec![doc! { "x": 1 }, doc! { "x": 2 }]);
        let mut cursor: Cursor<bson::Document> =
            Cursor::new(Box::new(PanicsOnUseSource), None, spec, None, false);

        assert_eq!(cursor.next().await.unwrap().unwrap().get_i32("x").unwrap(), 1);
        assert_eq!(cursor.next().await.unwrap().unwrap().get_i32("x").unwrap(), 2);
        assert!(cursor.next().await.is_none());
    }

    #[tokio::test]
    async fn closing_an_exhausted_cursor_never_touches_the_connection() {
        let spec = exhausted_spec(vec![]);
        let mut cursor: Cursor<bson::Document> =
            Cursor::new(Box::new(PanicsOnUseSource), None, spec, None, false);

        assert!(!cursor.is_closed());
        cursor.close().await;
        assert!(cursor.is_closed());
    }

    #[tokio::test]
    async fn batch_size_round_trips() {
        let spec = exhausted_spec(vec![]);
        let mut cursor: Cursor<bson::Document> =
            Cursor::new(Box::new(PanicsOnUseSource), None, spec, None, false);

        assert_eq!(cursor.get_batch_size(), None);
        cursor.set_batch_size(Some(17));
        assert_eq!(cursor.get_batch_size(), Some(17));
    }
}
