//! Cursor Resource Manager (spec §4.3) and Command Batch Cursor (spec §4.4).

use std::{collections::VecDeque, sync::Mutex, time::Duration};

use bson::RawDocumentBuf;

use crate::{
    binding::{Connection, ConnectionSource},
    change_stream::event::ResumeToken,
    error::{Error, ErrorKind, Result},
    operation::{self, kill_cursors::KillCursors},
    results::GetMoreResult,
    runtime::RUNTIME,
    timeout::TimeoutContext,
    Namespace,
};

/// The explicit state machine guarding a cursor's shared resources (spec §4.3). All transitions
/// happen under a single mutex so `try_start_operation`/`close` are atomic with respect to each
/// other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    OperationInProgress,
    ClosePending,
    Closed,
}

/// Thread-safe wrapper implementing the transition table in spec §4.3.
#[derive(Debug)]
pub(crate) struct ResourceManager {
    state: Mutex<State>,
}

impl ResourceManager {
    fn new() -> Self {
        Self {
            state: Mutex::new(State::Idle),
        }
    }

    /// Attempts to enter `OperationInProgress`. Fails with `ConcurrentOperation` if another `next`
    /// is already in flight, and with `CursorClosed` if the cursor has been closed.
    pub(crate) fn try_start_operation(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        match *state {
            State::Idle => {
                *state = State::OperationInProgress;
                Ok(())
            }
            State::OperationInProgress => Err(Error::new(ErrorKind::ConcurrentOperation, None)),
            State::ClosePending | State::Closed => Err(Error::new(ErrorKind::CursorClosed, None)),
        }
    }

    /// Ends the in-progress operation. Returns `true` if a deferred close should now run.
    pub(crate) fn end_operation(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        match *state {
            State::OperationInProgress => {
                *state = State::Idle;
                false
            }
            State::ClosePending => {
                *state = State::Closed;
                true
            }
            other => {
                *state = other;
                false
            }
        }
    }

    /// Requests the cursor be closed. Returns `true` if the caller should run the deferred close
    /// immediately (no operation is in flight); otherwise the close is deferred to the in-flight
    /// operation's `end_operation`.
    pub(crate) fn close(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        match *state {
            State::Idle => {
                *state = State::Closed;
                true
            }
            State::OperationInProgress => {
                *state = State::ClosePending;
                false
            }
            State::ClosePending | State::Closed => false,
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        matches!(*self.state.lock().unwrap(), State::Closed | State::ClosePending)
    }
}

/// Static information describing a cursor, captured from the command that created it.
#[derive(Debug, Clone)]
pub(crate) struct CursorInformation {
    pub(crate) ns: Namespace,
    pub(crate) server_address: String,
    pub(crate) batch_size: Option<u32>,
    pub(crate) max_time: Option<Duration>,
    pub(crate) comment: Option<bson::Bson>,
}

/// The result of the command (or `getMore`) that created/advanced a cursor, decoupled from
/// `operation::CursorInfo` so downstream code doesn't depend on the wire-shape type directly.
#[derive(Debug, Clone)]
pub(crate) struct CursorSpecification {
    pub(crate) info: CursorInformation,
    pub(crate) id: i64,
    pub(crate) initial_buffer: VecDeque<RawDocumentBuf>,
    pub(crate) post_batch_resume_token: Option<ResumeToken>,
}

impl CursorSpecification {
    pub(crate) fn new(
        cursor_info: operation::CursorInfo,
        server_address: String,
        batch_size: impl Into<Option<u32>>,
        max_time: impl Into<Option<Duration>>,
        comment: impl Into<Option<bson::Bson>>,
    ) -> Self {
        Self {
            info: CursorInformation {
                ns: cursor_info.ns,
                server_address,
                batch_size: batch_size.into(),
                max_time: max_time.into(),
                comment: comment.into(),
            },
            id: cursor_info.id,
            initial_buffer: cursor_info.first_batch,
            post_batch_resume_token: cursor_info
                .post_batch_resume_token
                .map(|doc| ResumeToken::from_raw(&doc)),
        }
    }

    /// An already-exhausted cursor over `ns`, used to recover a `NamespaceNotFound` error into
    /// an empty result set (spec §7, §8 scenario D) rather than surfacing it to the caller.
    pub(crate) fn empty(ns: Namespace) -> Self {
        Self {
            info: CursorInformation {
                ns,
                server_address: String::new(),
                batch_size: None,
                max_time: None,
                comment: None,
            },
            id: 0,
            initial_buffer: VecDeque::new(),
            post_batch_resume_token: None,
        }
    }
}

/// Drives `getMore`/`killCursors` for a single server cursor (spec §4.4), owning the
/// `ConnectionSource` (and, in load-balanced mode, the pinned `Connection`) it needs to do so.
pub(crate) struct CommandBatchCursor {
    resource_manager: ResourceManager,
    source: Box<dyn ConnectionSource>,
    pinned_connection: Option<Box<dyn Connection>>,
    info: CursorInformation,
    id: i64,
    buffer: VecDeque<RawDocumentBuf>,
    exhausted: bool,
    post_batch_resume_token: Option<ResumeToken>,
    skip_releasing_server_resources: bool,
    timeout: Option<TimeoutContext>,
    tailable: bool,
}

impl CommandBatchCursor {
    pub(crate) fn new(
        source: Box<dyn ConnectionSource>,
        pinned_connection: Option<Box<dyn Connection>>,
        spec: CursorSpecification,
        timeout: Option<TimeoutContext>,
        tailable: bool,
    ) -> Self {
        let id = spec.id;
        Self {
            resource_manager: ResourceManager::new(),
            source,
            pinned_connection,
            info: spec.info,
            id,
            buffer: spec.initial_buffer,
            exhausted: id == 0,
            post_batch_resume_token: spec.post_batch_resume_token,
            skip_releasing_server_resources: false,
            timeout,
            tailable,
        }
    }

    pub(crate) fn namespace(&self) -> &Namespace {
        &self.info.ns
    }

    pub(crate) fn server_cursor_id(&self) -> i64 {
        self.id
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.resource_manager.is_closed()
    }

    pub(crate) fn post_batch_resume_token(&self) -> Option<&ResumeToken> {
        self.post_batch_resume_token.as_ref()
    }

    pub(crate) fn set_batch_size(&mut self, batch_size: Option<u32>) {
        self.info.batch_size = batch_size;
    }

    pub(crate) fn batch_size(&self) -> Option<u32> {
        self.info.batch_size
    }

    pub(crate) fn is_first_batch_empty(&self) -> bool {
        self.buffer.is_empty() && !self.exhausted
    }

    /// Closes the cursor (spec §4.3, §4.4 "Close"), deferring to the resource manager so a close
    /// requested while a `next` is in flight runs once that operation finishes.
    pub(crate) async fn close(&mut self) {
        if self.resource_manager.close() {
            self.run_deferred_close().await;
        }
    }

    /// Drains the buffer, issuing `getMore`s as needed (spec §4.4 algorithm).
    pub(crate) async fn next_batch(&mut self) -> Result<VecDeque<RawDocumentBuf>> {
        self.resource_manager.try_start_operation()?;
        let result = self.next_batch_inner().await;
        if self.resource_manager.end_operation() {
            self.run_deferred_close().await;
        }
        if self.exhausted {
            if self.resource_manager.close() {
                self.run_deferred_close().await;
            }
        }
        result
    }

    async fn next_batch_inner(&mut self) -> Result<VecDeque<RawDocumentBuf>> {
        if !self.buffer.is_empty() {
            return Ok(std::mem::take(&mut self.buffer));
        }
        if self.exhausted {
            return Ok(VecDeque::new());
        }

        // Reset the per-iteration timeout clock, if any, before issuing the first `getMore` for
        // this `next` call (spec §3, §4.4 step 4). A no-op under `TimeoutMode::CursorLifetime`.
        if let Some(timeout) = self.timeout.as_mut() {
            timeout.reset_if_present();
        }

        loop {
            let get_more_result = self.run_get_more().await;
            let result = match get_more_result {
                Ok(result) => result,
                Err(error) => {
                    if error.is_network_error() {
                        if let Some(conn) = self.pinned_connection.as_mut() {
                            conn.mark_corrupted();
                        }
                        self.skip_releasing_server_resources = true;
                    }
                    return Err(error);
                }
            };

            self.id = result.id;
            self.exhausted = result.exhausted;
            if let Some(token) = result.post_batch_resume_token {
                self.post_batch_resume_token = Some(token);
            }

            if !result.batch.is_empty() || self.exhausted {
                return Ok(result.batch);
            }
            // Empty-but-live cursor: loop back per spec §4.4 step 7.
        }
    }

    async fn run_get_more(&mut self) -> Result<GetMoreResult> {
        // A tailable-await cursor's `getMore` carries its static `maxAwaitTimeMS`, never the
        // general operation timeout (spec §3, Open Question decision in DESIGN.md); otherwise
        // prefer the timeout context's remaining budget when one is configured.
        let max_time = if self.tailable {
            self.info.max_time
        } else {
            self.timeout
                .as_ref()
                .and_then(|t| t.effective_max_time())
                .or(self.info.max_time)
        };

        let mut op = operation::GetMore::new(
            self.info.ns.clone(),
            self.id,
            self.info.batch_size,
            max_time,
            self.info.comment.clone(),
        );
        #[cfg(feature = "tracing-unstable")]
        tracing::trace!(cursor_id = self.id, ns = %self.info.ns, "running getMore");
        if let Some(pinned) = self.pinned_connection.as_mut() {
            crate::executor::execute_on_connection(&mut op, pinned.as_mut()).await
        } else {
            let mut connection = self.source.checkout_connection().await?;
            crate::executor::execute_on_connection(&mut op, connection.as_mut()).await
        }
    }

    /// Kills the server cursor, best-effort (spec §4.4 "Close"): errors are swallowed. In
    /// load-balanced mode only the pinned connection may issue `killCursors`; if it was marked
    /// corrupted, skip entirely rather than risk sending on a bad socket.
    async fn run_deferred_close(&mut self) {
        if self.id == 0 || self.skip_releasing_server_resources {
            return;
        }
        let mut op = KillCursors::new(self.info.ns.clone(), vec![self.id]);
        if let Some(pinned) = self.pinned_connection.as_mut() {
            if !pinned.is_corrupted() {
                let _ = crate::executor::execute_on_connection(&mut op, pinned.as_mut()).await;
            }
            return;
        }
        let ns = self.info.ns.clone();
        let id = self.id;
        let source = self.source.clone_source();
        RUNTIME.spawn(async move {
            if let Ok(mut conn) = source.checkout_connection().await {
                let mut op = KillCursors::new(ns, vec![id]);
                let _ = crate::executor::execute_on_connection(&mut op, conn.as_mut()).await;
            }
        });
    }
}
