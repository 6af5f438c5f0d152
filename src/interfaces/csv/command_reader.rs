use crate::error::{FlowError, Result};
use serde::Deserialize;
use std::io::Read;

/// Presentation-layer gestures a script can replay against a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Start,
    Update,
    Submit,
    CollectorSucceeded,
    CollectorCancelled,
    CollectorFailed,
    Accept,
    Decline,
    Cancel,
    Back,
    Pay,
}

/// One script row: `command, arg, value`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScriptCommand {
    pub command: CommandKind,
    #[serde(default)]
    pub arg: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
}

/// Reads flow commands from a CSV source with a `command,arg,value` header.
///
/// Whitespace is trimmed and trailing columns may be omitted.
pub struct CommandReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CommandReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes commands; a malformed row yields an error without
    /// ending the iteration.
    pub fn commands(self) -> impl Iterator<Item = Result<ScriptCommand>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(FlowError::from))
    }
}
