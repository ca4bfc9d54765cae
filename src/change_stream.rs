//! Change-Stream Batch Cursor (spec §4.5): layers resume-token tracking and a resumable-error
//! cursor rebuild on top of the generic [`Cursor`].

pub mod event;
pub mod options;

use std::marker::PhantomData;

use bson::{RawDocumentBuf, Timestamp};
use serde::de::DeserializeOwned;

use crate::{
    change_stream::event::ResumeToken,
    cursor::Cursor,
    error::Result,
    BoxFuture,
};

/// The state a resume needs to rebuild the initiating `$changeStream` aggregate (spec §4.5
/// invariant 1: a cached resume token takes precedence over `startAtOperationTime`, which is
/// only used the very first time, before any token has ever been observed).
#[derive(Debug, Clone, Default)]
pub struct ChangeStreamResumeContext {
    pub resume_token: Option<ResumeToken>,
    pub operation_time: Option<Timestamp>,
}

/// Rebuilds the underlying cursor after a resumable error (spec §4.5). Supplied by the embedding
/// driver, which alone knows how to re-select a server and reissue the `$changeStream` aggregate
/// with `resumeAfter`/`startAtOperationTime` set from the given context.
pub(crate) type ResumeCursor =
    Box<dyn FnMut(ChangeStreamResumeContext) -> BoxFuture<'static, Result<Cursor<RawDocumentBuf>>> + Send>;

/// Streams the ongoing changes a `$changeStream` aggregation reports, deserializing each event
/// into `T` and transparently resuming, at most once per error, on a resumable failure (spec
/// §4.5, §8 "change-stream resume idempotence").
pub struct ChangeStream<T> {
    cursor: Cursor<RawDocumentBuf>,
    resume_token: Option<ResumeToken>,
    initial_operation_time: Option<Timestamp>,
    resume_attempted: bool,
    rebuild: ResumeCursor,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ChangeStream<T>
where
    T: DeserializeOwned,
{
    pub(crate) fn new(
        cursor: Cursor<RawDocumentBuf>,
        initial_operation_time: Option<Timestamp>,
        resume_token: Option<ResumeToken>,
        rebuild: ResumeCursor,
    ) -> Self {
        Self {
            cursor,
            resume_token,
            initial_operation_time,
            resume_attempted: false,
            rebuild,
            _marker: PhantomData,
        }
    }

    /// The cached resume token usable to resume after the most recently observed event (spec
    /// §4.5 invariant 3).
    pub fn resume_token(&self) -> Option<ResumeToken> {
        self.resume_token.clone()
    }

    /// Whether the underlying cursor is still open.
    pub fn is_alive(&self) -> bool {
        !self.cursor.is_closed()
    }

    pub async fn close(&mut self) {
        self.cursor.close().await;
    }

    /// `Iterator`-shaped sibling of [`try_next`](Self::try_next).
    pub async fn next(&mut self) -> Option<Result<T>> {
        self.try_next().await.transpose()
    }

    /// Returns the next event, resuming the underlying cursor at most once per resumable error
    /// (spec §4.5). The resume token is updated from the event's own `_id` field, unless that
    /// event drained its batch and the batch carried a `postBatchResumeToken`, in which case the
    /// batch-level token takes precedence (spec §4.5 invariant 3).
    pub async fn try_next(&mut self) -> Result<Option<T>> {
        loop {
            let post_batch_token = self.cursor.post_batch_resume_token().cloned();
            match self.cursor.try_next().await {
                Ok(Some(raw)) => {
                    self.resume_attempted = false;
                    let doc_token = ResumeToken::from_event_id(&raw)?;
                    self.resume_token = if self.cursor.is_batch_drained() && post_batch_token.is_some() {
                        post_batch_token
                    } else {
                        Some(doc_token)
                    };
                    return Ok(Some(bson::from_slice(raw.as_bytes())?));
                }
                Ok(None) => {
                    if let Some(token) = post_batch_token {
                        self.resume_token = Some(token);
                    }
                    return Ok(None);
                }
                Err(error) if error.is_resumable() && !self.resume_attempted => {
                    self.resume_attempted = true;
                    self.rebuild_cursor().await?;
                }
                Err(error) => return Err(error),
            }
        }
    }

    async fn rebuild_cursor(&mut self) -> Result<()> {
        let context = ChangeStreamResumeContext {
            resume_token: self.resume_token.clone(),
            operation_time: if self.resume_token.is_none() {
                self.initial_operation_time
            } else {
                None
            },
        };
        // Best-effort: drop the old server cursor before swapping in the resumed one.
        self.cursor.close().await;
        self.cursor = (self.rebuild)(context).await?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use async_trait::async_trait;
    use bson::doc;

    use super::*;
    use crate::{
        binding::{Connection, ConnectionDescription, ConnectionSource, OperationContext, Response, ServerDescription, ServerType},
        operation::CursorInfo,
        Namespace,
    };

    struct NoopSource;

    #[async_trait]
    impl ConnectionSource for NoopSource {
        fn server_description(&self) -> &ServerDescription {
            unreachable!()
        }

        async fn checkout_connection(&self) -> Result<Box<dyn Connection>> {
            unreachable!()
        }

        fn clone_source(&self) -> Box<dyn ConnectionSource> {
            Box::new(NoopSource)
        }
    }

    fn exhausted_cursor(batch: Vec<bson::Document>) -> Cursor<RawDocumentBuf> {
        let spec = crate::cursor::common::CursorSpecification::new(
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
        );
        Cursor::new(Box::new(NoopSource), None, spec, None, true)
    }

    #[tokio::test]
    async fn resume_token_tracks_each_events_own_id() {
        let cursor = exhausted_cursor(vec![
            doc! { "_id": { "_data": "1" }, "operationType": "insert" },
            doc! { "_id": { "_data": "2" }, "operationType": "insert" },
        ]);
        let mut stream: ChangeStream<bson::Document> =
            ChangeStream::new(cursor, None, None, Box::new(|_| unreachable!()));

        assert!(stream.resume_token().is_none());
        stream.try_next().await.unwrap();
        assert_eq!(
            stream.resume_token().unwrap().into_document(),
            doc! { "_data": "1" }
        );
        stream.try_next().await.unwrap();
        assert_eq!(
            stream.resume_token().unwrap().into_document(),
            doc! { "_data": "2" }
        );
        assert!(stream.try_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_id_surfaces_missing_resume_token_error() {
        let cursor = exhausted_cursor(vec![doc! { "operationType": "insert" }]);
        let mut stream: ChangeStream<bson::Document> =
            ChangeStream::new(cursor, None, None, Box::new(|_| unreachable!()));

        let error = stream.try_next().await.unwrap_err();
        assert!(error.to_string().contains("resume token"));
    }

    /// A connection whose first `getMore` fails with a network error (always resumable) and
    /// whose second succeeds, used to drive the resume path end to end.
    struct FlakyConnection {
        calls: Arc<AtomicUsize>,
        description: ConnectionDescription,
    }

    #[async_trait]
    impl Connection for FlakyConnection {
        fn description(&self) -> &ConnectionDescription {
            &self.description
        }

        fn id(&self) -> u64 {
            1
        }

        async fn command(
            &mut self,
            _target_db: &str,
            _command: bson::Document,
            _context: OperationContext,
        ) -> Result<Response> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(std::io::Error::new(std::io::ErrorKind::Other, "connection reset").into());
            }
            let body = doc! {
                "cursor": {
                    "id": 0i64,
                    "nextBatch": [doc! { "_id": { "_data": "resumed" }, "operationType": "insert" }],
                },
            };
            Ok(Response::new(RawDocumentBuf::from_document(&body).unwrap()))
        }

        fn mark_corrupted(&mut self) {}

        fn is_corrupted(&self) -> bool {
            false
        }
    }

    struct FlakySource {
        calls: Arc<AtomicUsize>,
        description: ServerDescription,
    }

    #[async_trait]
    impl ConnectionSource for FlakySource {
        fn server_description(&self) -> &ServerDescription {
            &self.description
        }

        async fn checkout_connection(&self) -> Result<Box<dyn Connection>> {
            Ok(Box::new(FlakyConnection {
                calls: self.calls.clone(),
                description: crate::operation::test::connection_description(17),
            }))
        }

        fn clone_source(&self) -> Box<dyn ConnectionSource> {
            Box::new(FlakySource {
                calls: self.calls.clone(),
                description: self.description.clone(),
            })
        }
    }

    fn flaky_cursor(calls: Arc<AtomicUsize>) -> Cursor<RawDocumentBuf> {
        let spec = crate::cursor::common::CursorSpecification::new(
            CursorInfo {
                id: 7,
                ns: Namespace::new("db", "coll"),
                first_batch: Default::default(),
                post_batch_resume_token: None,
            },
            "localhost:27017".to_string(),
            None,
            None,
            None,
        );
        let source = FlakySource {
            calls,
            description: ServerDescription {
                server_type: ServerType::Standalone,
                address: "localhost:27017".to_string(),
                logical_session_timeout: None,
            },
        };
        Cursor::new(Box::new(source), None, spec, None, true)
    }

    #[tokio::test]
    async fn resumes_exactly_once_on_a_network_error() {
        let rebuild_calls = Arc::new(AtomicUsize::new(0));
        let rebuilds = rebuild_calls.clone();
        let mut stream: ChangeStream<bson::Document> = ChangeStream::new(
            flaky_cursor(Arc::new(AtomicUsize::new(0))),
            None,
            None,
            Box::new(move |_ctx| {
                rebuilds.fetch_add(1, Ordering::SeqCst);
                let cursor = flaky_cursor(Arc::new(AtomicUsize::new(1)));
                Box::pin(async move { Ok(cursor) })
            }),
        );

        let event: bson::Document = stream.try_next().await.unwrap().unwrap();
        assert_eq!(
            event.get_document("_id").unwrap().get_str("_data").unwrap(),
            "resumed"
        );
        assert_eq!(rebuild_calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            stream.resume_token().unwrap().into_document(),
            doc! { "_data": "resumed" }
        );
    }
}
