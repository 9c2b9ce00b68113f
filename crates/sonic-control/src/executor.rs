//! Sends typed commands and validates their answers.

use std::sync::Arc;

use sonic_protocol::{Answer, AnswerValidator, Command, CommandCode, CommandLookupTable, ContractError};
use tracing::debug;

use crate::communicator::{Communicator, SendOptions};
use crate::error::DeviceResult;

/// Renders commands against a lookup table and validates the replies.
#[derive(Clone)]
pub struct CommandExecutor {
    communicator: Arc<dyn Communicator>,
    table: Arc<CommandLookupTable>,
}

impl CommandExecutor {
    pub fn new(communicator: Arc<dyn Communicator>, table: Arc<CommandLookupTable>) -> Self {
        communicator.set_lookup_table(Arc::clone(&table));
        CommandExecutor { communicator, table }
    }

    pub fn communicator(&self) -> &Arc<dyn Communicator> {
        &self.communicator
    }

    pub fn table(&self) -> &Arc<CommandLookupTable> {
        &self.table
    }

    /// Send a typed command and validate the answer against its contract.
    pub async fn send_command(&self, command: &Command) -> DeviceResult<Answer> {
        let lookup = self
            .table
            .get(command.code)
            .ok_or(ContractError::UnknownCommand(command.code))?;
        let request = command.render(&self.table)?;
        let options = SendOptions::for_lookup(lookup);

        self.send_message(&request, lookup.validator.as_deref(), &options)
            .await
    }

    /// Send raw request text.
    ///
    /// Without a validator the answer is passed through unvalidated.
    pub async fn send_message(
        &self,
        request: &str,
        validator: Option<&AnswerValidator>,
        options: &SendOptions,
    ) -> DeviceResult<Answer> {
        let response = self.communicator.send_and_wait(request, options).await?;
        let (code, body) = split_code(&response);

        let answer = match validator {
            Some(validator) => validator.validate(body),
            None => Answer::unvalidated(body),
        };
        if !answer.valid {
            debug!(request, response = %response, "answer does not match contract");
        }
        Ok(answer.with_code(code))
    }
}

impl std::fmt::Debug for CommandExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandExecutor")
            .field("kind", &self.communicator.kind())
            .field("protocol", self.table.info())
            .finish()
    }
}

/// Peel a leading `<code>#` off an answer body.
pub fn split_code(response: &str) -> (Option<CommandCode>, &str) {
    if let Some((prefix, rest)) = response.split_once('#') {
        if !prefix.is_empty() && prefix.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(code) = prefix.parse::<u16>() {
                return (Some(CommandCode(code)), rest);
            }
        }
    }
    (None, response)
}
