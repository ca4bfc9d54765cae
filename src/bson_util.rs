//! Small BSON helpers shared across command shaping and response handling.

use bson::{Bson, Document, RawDocumentBuf};
use serde::Serialize;

use crate::error::Result;

/// Returns the first key of a document, if any. Used to identify a command's name (the first
/// field of a command document is always its name) or an aggregation stage's operator.
pub(crate) fn first_key(document: &Document) -> Option<&str> {
    document.keys().next().map(String::as_str)
}

/// Interprets a BSON numeric value as an `i64`, regardless of whether the server encoded it as a
/// 32-bit int, 64-bit int, or double (servers are inconsistent about this across commands).
pub(crate) fn get_int(bson: &Bson) -> Option<i64> {
    match bson {
        Bson::Int32(i) => Some(*i as i64),
        Bson::Int64(i) => Some(*i),
        Bson::Double(f) => Some(*f as i64),
        _ => None,
    }
}

pub(crate) fn get_int_raw(bson: bson::RawBsonRef<'_>) -> Option<i64> {
    match bson {
        bson::RawBsonRef::Int32(i) => Some(i as i64),
        bson::RawBsonRef::Int64(i) => Some(i),
        bson::RawBsonRef::Double(f) => Some(f as i64),
        _ => None,
    }
}

pub(crate) fn get_u64(bson: &Bson) -> Option<u64> {
    get_int(bson).and_then(|i| u64::try_from(i).ok())
}

/// Serializes a slice of values to a `Bson::Array`, used for command fields (e.g. a pipeline or
/// `arrayFilters`) that must be a literal array rather than whatever sequence type the caller
/// happened to use.
pub(crate) fn to_bson_array<T: Serialize>(values: &[T]) -> Bson {
    Bson::Array(
        values
            .iter()
            .map(|v| bson::to_bson(v).unwrap_or(Bson::Null))
            .collect(),
    )
}

pub(crate) fn to_raw_bson_array_ser<T: Serialize>(
    values: &[T],
) -> Result<bson::RawBson> {
    let mut array = bson::RawArrayBuf::new();
    for value in values {
        array.push(bson::to_raw_bson(value)?);
    }
    Ok(bson::RawBson::Array(array))
}

/// Appends the fields of `extension` onto `document`, needed when combining a base command
/// document with a serialized options struct.
pub(crate) fn extend_raw_document_buf(
    document: &mut RawDocumentBuf,
    extension: RawDocumentBuf,
) -> Result<()> {
    for result in extension.iter() {
        let (k, v) = result?;
        document.append(k, v.to_raw_bson());
    }
    Ok(())
}

/// The serialized size, in bytes, of an array entry at the given index holding a document of the
/// given byte length: the array index key (e.g. `"0"`), a type byte, and a null terminator.
pub(crate) fn array_entry_size_bytes(index: usize, doc_len: usize) -> u64 {
    // type byte + index key + nul + document bytes
    (1 + index.to_string().len() + 1 + doc_len) as u64
}

/// Recursively sorts a document's keys (and the keys of any nested documents), used by tests
/// comparing command shapes where field order is not semantically meaningful.
#[cfg(test)]
pub(crate) fn sort_document(document: &mut Document) {
    let mut keys: Vec<_> = document.keys().cloned().collect();
    keys.sort();
    let mut sorted = Document::new();
    for key in keys {
        let mut value = document.remove(&key).unwrap();
        if let Bson::Document(ref mut nested) = value {
            sort_document(nested);
        }
        sorted.insert(key, value);
    }
    *document = sorted;
}
