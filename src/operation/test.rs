//! Shared helpers for operation unit tests: building a fake [`Response`]/[`ConnectionDescription`]
//! pair and running a single `handle_response` call against it.

use bson::{Bson, Document, RawDocumentBuf};

use crate::{
    binding::{ConnectionDescription, Response},
    operation::{Operation, SERVER_4_4_0_WIRE_VERSION},
    read_preference::ReadPreference,
};

pub(crate) fn connection_description(max_wire_version: i32) -> ConnectionDescription {
    ConnectionDescription {
        max_wire_version,
        server_address: "localhost:27017".to_string(),
        max_write_batch_size: 100_000,
        max_bson_object_size: 16_777_216,
        max_message_size_bytes: 48_000_000,
    }
}

/// Runs `op.handle_response` against `response_doc`, as if it came back from a 4.4+ server.
pub(crate) fn handle_response_test<T: Operation>(
    op: &T,
    response_doc: Document,
) -> crate::error::Result<T::O> {
    let description = connection_description(SERVER_4_4_0_WIRE_VERSION);
    let raw = RawDocumentBuf::from_document(&response_doc).unwrap();
    op.handle_response(Response::new(raw), &description)
}

pub(crate) fn handle_command_error<T: Operation>(
    op: &T,
    code: i32,
    code_name: &str,
    message: &str,
) -> crate::error::Result<T::O> {
    handle_response_test(
        op,
        bson::doc! {
            "ok": Bson::Double(0.0),
            "code": code,
            "codeName": code_name,
            "errmsg": message,
        },
    )
}

/// Returns the read preference an operation would select a server with, for assertions that an
/// operation correctly surfaces caller-provided read preferences to the executor.
pub(crate) fn op_selection_criteria<T: Operation>(op: &T) -> Option<ReadPreference> {
    op.read_preference().cloned()
}
