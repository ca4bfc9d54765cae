use bson::Document;

use crate::{
    binding::{ConnectionDescription, Response},
    error::{ErrorKind, Result},
    operation::{Command, OperationWithDefaults},
    options::ReadPreference,
};

/// A generic escape hatch for running an arbitrary command document (spec §4.1 "Command
/// Object" / "generic runCommand support"). The command's name, used for logging and session
/// eligibility, is taken from the body's first key.
#[derive(Debug, Clone)]
pub(crate) struct RunCommand {
    db: String,
    command: Document,
    read_preference: Option<ReadPreference>,
}

impl RunCommand {
    pub(crate) fn new(db: String, command: Document, read_preference: Option<ReadPreference>) -> Self {
        Self {
            db,
            command,
            read_preference,
        }
    }

    fn command_name(&self) -> Option<&str> {
        crate::bson_util::first_key(&self.command)
    }
}

impl OperationWithDefaults for RunCommand {
    type O = Document;
    type Command = Document;

    // The real command name is determined at `build` time from the body's first key; this is a
    // placeholder that should never reach the wire.
    const NAME: &'static str = "$genericRunCommand";

    fn build(&mut self, _description: &ConnectionDescription) -> Result<Command<Document>> {
        let command_name = self.command_name().ok_or_else(|| ErrorKind::InvalidArgument {
            message: "an empty document cannot be passed to a run_command operation".into(),
        })?;

        Ok(Command::new(command_name.to_string(), self.db.clone(), self.command.clone()))
    }

    fn handle_response(
        &self,
        response: Response,
        _description: &ConnectionDescription,
    ) -> Result<Self::O> {
        Ok(response.body()?)
    }

    fn read_preference(&self) -> Option<&ReadPreference> {
        self.read_preference.as_ref()
    }

    fn supports_sessions(&self) -> bool {
        self.command_name()
            .map(|name| !SESSIONS_UNSUPPORTED_COMMANDS.contains(&name.to_lowercase().as_str()))
            .unwrap_or(false)
    }
}

/// Commands for which the server rejects a `lsid` field outright (spec §4.1).
const SESSIONS_UNSUPPORTED_COMMANDS: &[&str] = &[
    "killcursors",
    "parallelcollectionscan",
];
