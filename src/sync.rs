//! A thin blocking shim over the async core, available when the `sync` feature is enabled (spec
//! §9 design note: "a thin blocking shim is provided for callers who want synchronous
//! semantics"). Every type here just blocks the calling thread on [`crate::runtime::RUNTIME`]
//! rather than re-implementing the cursor/change-stream state machines a second time.

use serde::de::DeserializeOwned;

use crate::{
    change_stream::{event::ResumeToken, ChangeStream as AsyncChangeStream},
    cursor::Cursor as AsyncCursor,
    error::Result,
    runtime::RUNTIME,
};

/// Blocking sibling of [`crate::cursor::Cursor`]: iterates a server-side cursor's documents,
/// driving `getMore`s on the runtime in [`crate::runtime`] instead of requiring an async caller.
pub struct Cursor<T> {
    async_cursor: AsyncCursor<T>,
}

impl<T> Cursor<T>
where
    T: DeserializeOwned,
{
    pub(crate) fn new(async_cursor: AsyncCursor<T>) -> Self {
        Self { async_cursor }
    }

    /// Blocking sibling of [`crate::cursor::Cursor::try_next`].
    pub fn try_next(&mut self) -> Result<Option<T>> {
        RUNTIME.block_on(self.async_cursor.try_next())
    }

    /// Blocking sibling of [`crate::cursor::Cursor::close`].
    pub fn close(&mut self) {
        RUNTIME.block_on(self.async_cursor.close())
    }

    pub fn is_closed(&self) -> bool {
        self.async_cursor.is_closed()
    }

    pub fn server_cursor_id(&self) -> i64 {
        self.async_cursor.server_cursor_id()
    }

    pub fn set_batch_size(&mut self, batch_size: Option<u32>) {
        self.async_cursor.set_batch_size(batch_size);
    }

    pub fn get_batch_size(&self) -> Option<u32> {
        self.async_cursor.get_batch_size()
    }
}

impl<T> Iterator for Cursor<T>
where
    T: DeserializeOwned,
{
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        RUNTIME.block_on(self.async_cursor.next())
    }
}

/// Blocking sibling of [`crate::change_stream::ChangeStream`].
pub struct ChangeStream<T> {
    async_stream: AsyncChangeStream<T>,
}

impl<T> ChangeStream<T>
where
    T: DeserializeOwned,
{
    pub(crate) fn new(async_stream: AsyncChangeStream<T>) -> Self {
        Self { async_stream }
    }

    /// Blocking sibling of [`crate::change_stream::ChangeStream::try_next`].
    pub fn try_next(&mut self) -> Result<Option<T>> {
        RUNTIME.block_on(self.async_stream.try_next())
    }

    pub fn is_alive(&self) -> bool {
        self.async_stream.is_alive()
    }

    pub fn resume_token(&self) -> Option<ResumeToken> {
        self.async_stream.resume_token()
    }

    /// Blocking sibling of [`crate::change_stream::ChangeStream::close`].
    pub fn close(&mut self) {
        RUNTIME.block_on(self.async_stream.close())
    }
}

impl<T> Iterator for ChangeStream<T>
where
    T: DeserializeOwned,
{
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        RUNTIME.block_on(self.async_stream.next())
    }
}

#[cfg(test)]
mod test {
    use bson::{doc, RawDocumentBuf};

    use super::*;
    use crate::{
        binding::{Connection, ConnectionSource, ServerDescription},
        cursor::common::CursorSpecification,
        operation::CursorInfo,
        Namespace,
    };

    struct PanicsOnUseSource;

    #[async_trait::async_trait]
    impl ConnectionSource for PanicsOnUseSource {
        fn server_description(&self) -> &ServerDescription {
            unreachable!()
        }

        async fn checkout_connection(&self) -> Result<Box<dyn Connection>> {
            unreachable!()
        }

        fn clone_source(&self) -> Box<dyn ConnectionSource> {
            Box::new(PanicsOnUseSource)
        }
    }

    fn exhausted_spec(batch: Vec<bson::Document>) -> CursorSpecification {
        CursorSpecification::new(
            CursorInfo {
                id: 0,
                ns: Namespace::new("db", "coll"),
                first_batch: batch
                    .into_iter()
                    .map(|d| RawDocumentBuf::from_document(&d).unwrap())
                    .collect(),
                post_batch_resume_token: None,
            },
            "localhost:27017".to_string(),
            None,
            None,
            None,
        )
    }

    #[test]
    fn blocking_cursor_drains_an_already_exhausted_batch_without_a_tokio_context() {
        let spec = exhausted_spec(vec![doc! { "x": 1 }, doc! { "x": 2 }]);
        let async_cursor: AsyncCursor<bson::Document> =
            AsyncCursor::new(Box::new(PanicsOnUseSource), None, spec, None, false);
        let mut cursor = Cursor::new(async_cursor);

        assert_eq!(cursor.next().unwrap().unwrap().get_i32("x").unwrap(), 1);
        assert_eq!(cursor.next().unwrap().unwrap().get_i32("x").unwrap(), 2);
        assert!(cursor.next().is_none());
    }
}
