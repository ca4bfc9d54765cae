use bson::Document;

use crate::{
    binding::{ConnectionDescription, WriteBinding},
    bson::doc,
    error::Result,
    executor,
    index::IndexModel,
    operation::{append_options, remove_empty_write_concern, Command, OperationWithDefaults, WriteConcernOnlyBody},
    options::{CreateCollectionOptions, WriteConcern},
    Namespace,
};

use super::CreateIndexes;

/// `create { create: <collection>, ... }` (spec §6), used for explicit collection creation and
/// the auxiliary collections a queryable-encryption-enabled `createCollection` requires.
#[derive(Debug)]
pub(crate) struct Create {
    ns: Namespace,
    options: Option<CreateCollectionOptions>,
}

impl Create {
    pub(crate) fn new(ns: Namespace, options: Option<CreateCollectionOptions>) -> Self {
        Self { ns, options }
    }
}

impl OperationWithDefaults for Create {
    type O = ();
    type Command = Document;

    const NAME: &'static str = "create";

    fn build(&mut self, _description: &ConnectionDescription) -> Result<Command<Document>> {
        let mut body = doc! {
            Self::NAME: self.ns.coll.clone(),
        };

        remove_empty_write_concern!(self.options);
        append_options(&mut body, self.options.as_ref())?;

        Ok(Command::new(Self::NAME, &self.ns.db, body))
    }

    fn handle_response(
        &self,
        response: crate::binding::Response,
        _description: &ConnectionDescription,
    ) -> Result<Self::O> {
        let response: WriteConcernOnlyBody = response.body()?;
        response.validate()
    }

    fn write_concern(&self) -> Option<&WriteConcern> {
        self.options.as_ref().and_then(|opts| opts.write_concern.as_ref())
    }
}

/// The three queryable-encryption metadata-collection suffixes `create` must provision ahead of
/// the primary collection when `encryptedFields` is set (spec §6).
const ENCRYPTED_FIELDS_AUX_SUFFIXES: [&str; 3] = ["esc", "ecc", "ecoc"];

/// Runs `createCollection` for `ns` (spec §6), expanding into the full auxiliary-collection
/// sequence when `options.encrypted_fields` is set: the three `enxcol_.<coll>.{esc,ecc,ecoc}`
/// metadata collections, then the primary `create`, then a `createIndexes` on
/// `{__safeContent__: 1}`. Each command is sent in order and the sequence aborts on the first
/// failure — later commands are never attempted if an earlier one fails.
pub(crate) async fn execute(
    ns: &Namespace,
    options: Option<CreateCollectionOptions>,
    binding: &mut dyn WriteBinding,
) -> Result<()> {
    let has_encrypted_fields = options
        .as_ref()
        .map(|opts| opts.encrypted_fields.is_some())
        .unwrap_or(false);

    if has_encrypted_fields {
        for suffix in ENCRYPTED_FIELDS_AUX_SUFFIXES {
            let aux_ns = Namespace::new(ns.db.clone(), format!("enxcol_.{}.{}", ns.coll, suffix));
            let mut aux_create = Create::new(aux_ns, None);
            executor::execute_write(&mut aux_create, binding).await?;
        }
    }

    let mut create = Create::new(ns.clone(), options);
    executor::execute_write(&mut create, binding).await?;

    if has_encrypted_fields {
        let safe_content_index = IndexModel::builder().keys(doc! { "__safeContent__": 1 }).build();
        let mut create_indexes = CreateIndexes::new(ns.clone(), vec![safe_content_index], None);
        executor::execute_write(&mut create_indexes, binding).await?;
    }

    Ok(())
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
        binding::{Connection, ConnectionSource, OperationContext, Response, ServerDescription, ServerType},
        error::Error,
        session::SessionContext,
    };

    /// A fake `Connection`/`WriteBinding` pair that records every command name it was asked to
    /// run, in order, and fails the `n`th command it sees (1-indexed; `0` means never fail).
    struct RecordingConnection {
        description: ConnectionDescription,
        names: Arc<std::sync::Mutex<Vec<String>>>,
        fail_on_call: usize,
        call_counter: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Connection for RecordingConnection {
        fn description(&self) -> &ConnectionDescription {
            &self.description
        }

        fn id(&self) -> u64 {
            1
        }

        async fn command(
            &mut self,
            _target_db: &str,
            command: Document,
            _context: OperationContext,
        ) -> Result<Response> {
            let name = crate::bson_util::first_key(&command).unwrap_or_default().to_string();
            self.names.lock().unwrap().push(name);
            let call_index = self.call_counter.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_on_call != 0 && call_index == self.fail_on_call {
                return Err(Error::invalid_argument("forced failure"));
            }
            Ok(Response::new(bson::RawDocumentBuf::from_document(&doc! { "ok": 1.0 }).unwrap()))
        }

        fn mark_corrupted(&mut self) {}

        fn is_corrupted(&self) -> bool {
            false
        }
    }

    struct RecordingSource {
        description: ConnectionDescription,
        server_description: ServerDescription,
        names: Arc<std::sync::Mutex<Vec<String>>>,
        fail_on_call: usize,
        call_counter: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ConnectionSource for RecordingSource {
        fn server_description(&self) -> &ServerDescription {
            &self.server_description
        }

        async fn checkout_connection(&self) -> Result<Box<dyn Connection>> {
            Ok(Box::new(RecordingConnection {
                description: self.description.clone(),
                names: self.names.clone(),
                fail_on_call: self.fail_on_call,
                call_counter: self.call_counter.clone(),
            }))
        }

        fn clone_source(&self) -> Box<dyn ConnectionSource> {
            Box::new(RecordingSource {
                description: self.description.clone(),
                server_description: self.server_description.clone(),
                names: self.names.clone(),
                fail_on_call: self.fail_on_call,
                call_counter: self.call_counter.clone(),
            })
        }
    }

    struct RecordingBinding {
        source: RecordingSource,
    }

    #[async_trait]
    impl WriteBinding for RecordingBinding {
        async fn acquire_connection_source(&self) -> Result<Box<dyn ConnectionSource>> {
            Ok(Box::new(self.source.clone_source_concrete()))
        }

        fn session(&self) -> Option<&SessionContext> {
            None
        }

        fn session_mut(&mut self) -> Option<&mut SessionContext> {
            None
        }

        fn retry_writes(&self) -> bool {
            false
        }
    }

    impl RecordingSource {
        fn clone_source_concrete(&self) -> RecordingSource {
            RecordingSource {
                description: self.description.clone(),
                server_description: self.server_description.clone(),
                names: self.names.clone(),
                fail_on_call: self.fail_on_call,
                call_counter: self.call_counter.clone(),
            }
        }
    }

    fn description() -> ConnectionDescription {
        crate::operation::test::connection_description(crate::operation::SERVER_4_4_0_WIRE_VERSION)
    }

    fn server_description() -> ServerDescription {
        ServerDescription {
            server_type: ServerType::ReplicaSetPrimary,
            address: "localhost:27017".to_string(),
            logical_session_timeout: None,
        }
    }

    #[tokio::test]
    async fn encrypted_fields_emits_aux_creates_then_primary_then_create_indexes() {
        let names = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut binding = RecordingBinding {
            source: RecordingSource {
                description: description(),
                server_description: server_description(),
                names: names.clone(),
                fail_on_call: 0,
                call_counter: Arc::new(AtomicUsize::new(0)),
            },
        };

        let ns = Namespace::new("db", "coll");
        let options = CreateCollectionOptions::builder()
            .encrypted_fields(doc! { "fields": [] })
            .build();
        execute(&ns, Some(options), &mut binding).await.unwrap();

        let recorded = names.lock().unwrap().clone();
        assert_eq!(
            recorded,
            vec!["create", "create", "create", "create", "createIndexes"]
        );
    }

    #[tokio::test]
    async fn encrypted_fields_aborts_on_first_aux_failure() {
        let names = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut binding = RecordingBinding {
            source: RecordingSource {
                description: description(),
                server_description: server_description(),
                names: names.clone(),
                fail_on_call: 2,
                call_counter: Arc::new(AtomicUsize::new(0)),
            },
        };

        let ns = Namespace::new("db", "coll");
        let options = CreateCollectionOptions::builder()
            .encrypted_fields(doc! { "fields": [] })
            .build();
        let result = execute(&ns, Some(options), &mut binding).await;

        assert!(result.is_err());
        // Only the first two aux creates were attempted; nothing after the failing one ran.
        assert_eq!(names.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn without_encrypted_fields_only_the_primary_create_runs() {
        let names = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut binding = RecordingBinding {
            source: RecordingSource {
                description: description(),
                server_description: server_description(),
                names: names.clone(),
                fail_on_call: 0,
                call_counter: Arc::new(AtomicUsize::new(0)),
            },
        };

        let ns = Namespace::new("db", "coll");
        execute(&ns, None, &mut binding).await.unwrap();

        assert_eq!(names.lock().unwrap().clone(), vec!["create"]);
    }
}
