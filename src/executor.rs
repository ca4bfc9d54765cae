//! Command Executor (spec §4.2): builds an operation's command, attaches session and
//! read-concern state, sends it on a bound connection, and retries at most once on a retryable
//! failure against a freshly selected server.

use std::sync::atomic::{AtomicI32, Ordering};

use bson::{doc, Document};

use crate::{
    binding::{Connection, ConnectionSource, OperationContext, ReadBinding, WriteBinding},
    cursor::common::CursorSpecification,
    error::Result,
    operation::{self, Command, CommandBody, Operation},
    read_preference::ReadPreference,
    retry::{ErrorClassifier, RetryController},
    session::TransactionState,
};

static NEXT_REQUEST_ID: AtomicI32 = AtomicI32::new(1);

fn next_operation_context() -> OperationContext {
    OperationContext {
        request_id: NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed),
    }
}

fn command_to_document<T: CommandBody>(command: &Command<T>) -> Result<Document> {
    Ok(bson::to_document(&command.body)?)
}

/// Attaches the parts of a command that are decided once the bound connection (and, if present,
/// session) are known, rather than by the operation's own `build` (spec §4.1): `readConcern` and
/// the session's gossiped `$clusterTime`/`afterClusterTime`.
fn attach_read_concern<T: Operation>(
    op: &T,
    description: &crate::binding::ConnectionDescription,
    body: &mut Document,
) -> Result<()> {
    if !op.supports_read_concern(description) {
        return Ok(());
    }
    if let Some(read_concern) = op.read_concern() {
        if !read_concern.is_server_default() {
            body.insert("readConcern", bson::to_bson(read_concern)?);
        }
    }
    Ok(())
}

/// Builds and sends `op`'s command on an already-bound `connection`, with no retry and no session
/// attachment. Used by the Cursor Resource Manager to drive `getMore`/`killCursors` against the
/// connection (or pinned connection) a cursor already owns (spec §4.4).
pub(crate) async fn execute_on_connection<T>(
    op: &mut T,
    connection: &mut dyn Connection,
) -> Result<T::O>
where
    T: Operation + Send,
{
    let description = connection.description().clone();
    let command = op.build(&description)?;
    let body = command_to_document(&command)?;
    let result = connection
        .command(&command.target_db, body, next_operation_context())
        .await;
    match result {
        Ok(response) => op.handle_response(response, &description),
        Err(error) => op.handle_error(error),
    }
}

/// Runs a read operation against `binding`, selecting a server per `op.read_preference()`,
/// attaching `readConcern` and session cluster-time state, and retrying once on a retryable
/// failure (spec §4.2, §8 testable property 2).
pub(crate) async fn execute_read<T>(op: &mut T, binding: &mut dyn ReadBinding) -> Result<T::O>
where
    T: Operation + Send,
{
    let default_read_preference = ReadPreference::primary();
    let read_preference = op.read_preference().unwrap_or(&default_read_preference).clone();
    let retry_reads = binding.retry_reads();

    let mut controller = RetryController::new();
    loop {
        let source = binding.acquire_connection_source(&read_preference).await?;
        let attempt = attempt_once(op, binding.session_mut(), source.as_ref()).await;
        match attempt {
            Ok(output) => return Ok(output),
            Err(error) => {
                let transaction_state = binding
                    .session()
                    .map(|s| s.transaction_state())
                    .unwrap_or(TransactionState::None);
                let retryable =
                    ErrorClassifier::is_retryable_read(&error, retry_reads, transaction_state);
                if !controller.should_retry(retryable) {
                    return Err(error);
                }
                #[cfg(feature = "tracing-unstable")]
                tracing::debug!(command_name = op.name(), %error, "retrying read after retryable error");
                op.update_for_retry();
            }
        }
    }
}

/// Runs a write operation against `binding`'s primary, with the same session/retry handling as
/// [`execute_read`] but gated on write-retryability (spec §4.2). A retry is only structurally
/// possible when the operation itself supports it (`Retryability::Write`), the selected server
/// isn't a standalone, and the deployment's sessions are usable for it; those facts, not just the
/// error's own shape, decide whether the executor even looks at `ErrorClassifier`.
pub(crate) async fn execute_write<T>(op: &mut T, binding: &mut dyn WriteBinding) -> Result<T::O>
where
    T: Operation + Send,
{
    let retry_writes = binding.retry_writes();
    let is_acknowledged = op.is_acknowledged();
    let op_supports_retry = op.supports_sessions() && op.retryability() == operation::Retryability::Write;

    let mut controller = RetryController::new();
    let mut txn_number: Option<i64> = None;
    loop {
        let source = binding.acquire_connection_source().await?;
        let server_description = source.server_description();
        let eligible_for_retry = op_supports_retry
            && !server_description.server_type.is_standalone()
            && server_description.logical_session_timeout.is_some();

        if eligible_for_retry && txn_number.is_none() {
            txn_number = binding
                .session_mut()
                .map(|session| session.get_and_increment_txn_number());
        }

        let attempt =
            attempt_once_write(op, binding.session_mut(), source.as_ref(), txn_number).await;
        match attempt {
            Ok(output) => return Ok(output),
            Err(error) => {
                let transaction_state = binding
                    .session()
                    .map(|s| s.transaction_state())
                    .unwrap_or(TransactionState::None);
                let retryable = eligible_for_retry
                    && ErrorClassifier::is_retryable_write(
                        &error,
                        retry_writes,
                        is_acknowledged,
                        transaction_state,
                    );
                if !controller.should_retry(retryable) {
                    return Err(error);
                }
                #[cfg(feature = "tracing-unstable")]
                tracing::debug!(command_name = op.name(), %error, "retrying write after retryable error");
                op.update_for_retry();
            }
        }
    }
}

/// Runs a read operation that produces a [`CursorSpecification`], returning the spec along with
/// the `ConnectionSource` (and, under load-balanced topology, the pinned `Connection`) the
/// resulting `CommandBatchCursor` must retain for subsequent `getMore`s (spec §4.3 "Pinning").
pub(crate) async fn execute_read_cursor<T>(
    op: &mut T,
    binding: &mut dyn ReadBinding,
) -> Result<(CursorSpecification, Box<dyn ConnectionSource>, Option<Box<dyn Connection>>)>
where
    T: Operation<O = CursorSpecification> + Send,
{
    let default_read_preference = ReadPreference::primary();
    let read_preference = op.read_preference().unwrap_or(&default_read_preference).clone();
    let retry_reads = binding.retry_reads();

    let mut controller = RetryController::new();
    loop {
        let source = binding.acquire_connection_source(&read_preference).await?;
        let attempt = attempt_once(op, binding.session_mut(), source.as_ref()).await;
        match attempt {
            Ok(spec) => {
                let pinned = if source.server_description().server_type.is_load_balancer() {
                    source.pin_connection().await?
                } else {
                    None
                };
                return Ok((spec, source, pinned));
            }
            Err(error) => {
                let transaction_state = binding
                    .session()
                    .map(|s| s.transaction_state())
                    .unwrap_or(TransactionState::None);
                let retryable =
                    ErrorClassifier::is_retryable_read(&error, retry_reads, transaction_state);
                if !controller.should_retry(retryable) {
                    return Err(error);
                }
                op.update_for_retry();
            }
        }
    }
}

async fn attempt_once<T>(
    op: &mut T,
    session: Option<&mut crate::session::SessionContext>,
    source: &dyn ConnectionSource,
) -> Result<T::O>
where
    T: Operation + Send,
{
    let mut connection = source.checkout_connection().await?;
    let description = connection.description().clone();
    let command = op.build(&description)?;
    let mut body = command_to_document(&command)?;
    attach_read_concern(op, &description, &mut body)?;
    if let Some(ref mut session) = session {
        session.touch();
        body.insert("lsid", session.id().clone());
        if let Some(cluster_time) = session.cluster_time() {
            body.insert("$clusterTime", bson::to_bson(cluster_time)?);
        }
        if session.causal_consistency() {
            if let Some(operation_time) = session.operation_time() {
                body.insert("afterClusterTime", operation_time);
            }
        }
    }

    #[cfg(feature = "tracing-unstable")]
    tracing::trace!(command_name = op.name(), target_db = %command.target_db, "sending command");
    let result = connection
        .command(&command.target_db, body, next_operation_context())
        .await;
    match result {
        Ok(response) => {
            if let Some(ref mut session) = session {
                if let Some(ct) = operation::extract_cluster_time(&response) {
                    session.advance_cluster_time(&ct);
                }
            }
            op.handle_response(response, &description)
        }
        Err(error) => op.handle_error(error.with_wire_version(description.max_wire_version)),
    }
}

async fn attempt_once_write<T>(
    op: &mut T,
    session: Option<&mut crate::session::SessionContext>,
    source: &dyn ConnectionSource,
    txn_number: Option<i64>,
) -> Result<T::O>
where
    T: Operation + Send,
{
    let mut connection = source.checkout_connection().await?;
    let description = connection.description().clone();
    let command = op.build(&description)?;
    let mut body = command_to_document(&command)?;
    attach_read_concern(op, &description, &mut body)?;
    if let Some(ref mut session) = session {
        session.touch();
        body.insert("lsid", session.id().clone());
        if let Some(txn_number) = txn_number {
            body.insert("txnNumber", txn_number);
        }
        if let Some(cluster_time) = session.cluster_time() {
            body.insert("$clusterTime", bson::to_bson(cluster_time)?);
        }
        if session.causal_consistency() {
            if let Some(operation_time) = session.operation_time() {
                body.insert("afterClusterTime", operation_time);
            }
        }
    }

    let result = connection
        .command(&command.target_db, body, next_operation_context())
        .await;
    match result {
        Ok(response) => {
            if let Some(ref mut session) = session {
                if let Some(ct) = operation::extract_cluster_time(&response) {
                    session.advance_cluster_time(&ct);
                }
            }
            op.handle_response(response, &description)
        }
        Err(mut error) => {
            if txn_number.is_some() && error.should_add_retryable_write_label(description.max_wire_version) {
                error.add_label(crate::error::RETRYABLE_WRITE_ERROR);
            }
            op.handle_error(error.with_wire_version(description.max_wire_version))
        }
    }
}

/// `runCommand`-shaped escape hatch retained for parity with `run_command::RunCommand`: builds
/// a bare document as a command body without going through an `Operation` impl.
pub(crate) fn wrap_run_command(name: &str, target_db: &str, body: Document) -> Command<Document> {
    let mut doc = doc! { name: 1 };
    doc.extend(body);
    Command::new(name, target_db, doc)
}
