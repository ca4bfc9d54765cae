//! Index specifications for `createIndexes` (spec §6).

use bson::Document;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use typed_builder::TypedBuilder;

/// Specifies the fields and options for an index.
#[derive(Clone, Debug, Default, Deserialize, TypedBuilder, Serialize)]
#[builder(field_defaults(default, setter(into)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct IndexModel {
    /// The index's keys, specifying the field(s) and their corresponding directions or types.
    #[serde(rename = "key")]
    pub keys: Document,

    /// The options for the index.
    #[serde(flatten)]
    pub options: Option<IndexOptions>,
}

impl IndexModel {
    /// If the caller did not specify a name, generate one from the key pattern.
    pub(crate) fn update_name(&mut self) {
        if self
            .options
            .as_ref()
            .and_then(|o| o.name.as_ref())
            .is_none()
        {
            let key_names: Vec<String> = self
                .keys
                .iter()
                .map(|(k, v)| format!("{}_{}", k, v))
                .collect();
            self.options.get_or_insert_with(IndexOptions::default).name =
                Some(key_names.join("_"));
        }
    }

    pub(crate) fn get_name(&self) -> Option<String> {
        self.options.as_ref().and_then(|o| o.name.clone())
    }
}

/// Options for an index, per the `createIndexes` command's per-index option fields.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, Deserialize, Serialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
#[builder(field_defaults(default, setter(into)))]
#[non_exhaustive]
pub struct IndexOptions {
    /// A name for the index, generated from the key pattern if not provided.
    pub name: Option<String>,

    /// Whether the index enforces uniqueness.
    pub unique: Option<bool>,

    /// Whether the index is sparse.
    pub sparse: Option<bool>,

    /// A TTL, in seconds, after which documents in this collection expire.
    pub expire_after_seconds: Option<i64>,

    /// A filter expression restricting which documents this index covers.
    pub partial_filter_expression: Option<Document>,

    /// The collation for this index.
    pub collation: Option<crate::collation::Collation>,
}
