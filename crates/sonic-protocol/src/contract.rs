//! Declarative command/answer contracts.
//!
//! A [`CommandContract`] binds a [`CommandCode`] to the text a host sends
//! (its [`CommandDef`]) and the layout of the answer the device replies with
//! (its [`AnswerDef`]). Attributes that differ between protocol versions or
//! device types are wrapped in [`Export`].

use std::time::Duration;

use crate::{CommandCode, Export, FieldName, FieldType};

// ============================================================================
// Command side
// ============================================================================

/// Wire attributes of a command.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SonicTextAttrs {
    /// Accepted identifiers; the first one is used when sending.
    pub identifiers: Vec<String>,
    /// Expected time until the device answers.
    pub estimated_response_time: Option<Duration>,
}

impl SonicTextAttrs {
    /// Create attributes from a list of identifiers.
    pub fn new<I, S>(identifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SonicTextAttrs {
            identifiers: identifiers.into_iter().map(Into::into).collect(),
            estimated_response_time: None,
        }
    }

    /// Set the expected response time.
    pub fn with_response_time(mut self, time: Duration) -> Self {
        self.estimated_response_time = Some(time);
        self
    }

    /// Get the identifier used when sending.
    pub fn primary_identifier(&self) -> Option<&str> {
        self.identifiers.first().map(String::as_str)
    }
}

/// A parameter of a command (index or setter value).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommandParamDef {
    pub name: FieldName,
    pub field_type: FieldType,
    pub description: Option<String>,
}

impl CommandParamDef {
    pub fn new(name: FieldName, field_type: FieldType) -> Self {
        CommandParamDef {
            name,
            field_type,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// How a command is rendered on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommandDef {
    pub sonic_text_attrs: Export<SonicTextAttrs>,
    /// Suffixed numerically to the identifier.
    pub index_param: Option<CommandParamDef>,
    /// Suffixed after `=`.
    pub setter_param: Option<CommandParamDef>,
}

impl CommandDef {
    /// A command without parameters.
    pub fn new(attrs: impl Into<Export<SonicTextAttrs>>) -> Self {
        CommandDef {
            sonic_text_attrs: attrs.into(),
            index_param: None,
            setter_param: None,
        }
    }

    /// Shorthand for a command identified by a list of identifiers.
    pub fn identified_by(identifiers: &[&str]) -> Self {
        CommandDef::new(SonicTextAttrs::new(identifiers.iter().copied()))
    }

    pub fn with_index(mut self, param: CommandParamDef) -> Self {
        self.index_param = Some(param);
        self
    }

    pub fn with_setter(mut self, param: CommandParamDef) -> Self {
        self.setter_param = Some(param);
        self
    }
}

// ============================================================================
// Answer side
// ============================================================================

/// Default separator between answer fields.
pub const DEFAULT_SEPARATOR: &str = "#";

/// One field of an answer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AnswerFieldDef {
    pub name: FieldName,
    pub field_type: FieldType,
    /// Literal text in front of the value.
    pub prefix: String,
    /// Literal text after the value (and unit).
    pub postfix: String,
}

impl AnswerFieldDef {
    pub fn new(name: FieldName, field_type: FieldType) -> Self {
        AnswerFieldDef {
            name,
            field_type,
            prefix: String::new(),
            postfix: String::new(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_postfix(mut self, postfix: impl Into<String>) -> Self {
        self.postfix = postfix.into();
        self
    }
}

/// Layout of an answer: ordered fields joined by a separator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AnswerDef {
    pub fields: Vec<Export<AnswerFieldDef>>,
    pub separator: String,
}

impl AnswerDef {
    /// An answer whose fields apply unconditionally.
    pub fn new(fields: Vec<AnswerFieldDef>) -> Self {
        AnswerDef {
            fields: fields.into_iter().map(Export::Always).collect(),
            separator: DEFAULT_SEPARATOR.to_string(),
        }
    }

    /// An answer with per-field exports.
    pub fn with_exports(fields: Vec<Export<AnswerFieldDef>>) -> Self {
        AnswerDef {
            fields,
            separator: DEFAULT_SEPARATOR.to_string(),
        }
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }
}

// ============================================================================
// Contracts
// ============================================================================

/// Documentation attached to a contract.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct UserManualAttrs {
    pub description: Option<String>,
    pub example: Option<String>,
}

impl UserManualAttrs {
    pub fn described(description: impl Into<String>) -> Self {
        UserManualAttrs {
            description: Some(description.into()),
            example: None,
        }
    }
}

/// The declarative record binding a command code to its wire form and
/// answer layout.
///
/// `command_def = None` denotes a spontaneous device notification,
/// `answer_def = None` a fire-and-forget command.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommandContract {
    pub code: CommandCode,
    pub command_def: Option<Export<CommandDef>>,
    pub answer_def: Option<Export<AnswerDef>>,
    pub user_manual_attrs: Export<UserManualAttrs>,
    pub tags: Vec<String>,
    pub is_release: bool,
}

impl CommandContract {
    /// Create a release contract.
    pub fn new(
        code: CommandCode,
        command_def: impl Into<Export<CommandDef>>,
        answer_def: impl Into<Export<AnswerDef>>,
    ) -> Self {
        CommandContract {
            code,
            command_def: Some(command_def.into()),
            answer_def: Some(answer_def.into()),
            user_manual_attrs: Export::Always(UserManualAttrs::default()),
            tags: Vec::new(),
            is_release: true,
        }
    }

    /// Create a notification contract (no command side).
    pub fn notification(code: CommandCode, answer_def: impl Into<Export<AnswerDef>>) -> Self {
        CommandContract {
            code,
            command_def: None,
            answer_def: Some(answer_def.into()),
            user_manual_attrs: Export::Always(UserManualAttrs::default()),
            tags: Vec::new(),
            is_release: true,
        }
    }

    /// Replace the answer side.
    pub fn with_answer(mut self, answer_def: impl Into<Export<AnswerDef>>) -> Self {
        self.answer_def = Some(answer_def.into());
        self
    }

    /// Drop the answer side (fire-and-forget).
    pub fn without_answer(mut self) -> Self {
        self.answer_def = None;
        self
    }

    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.user_manual_attrs = Export::Always(UserManualAttrs::described(description));
        self
    }

    pub fn tagged(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    /// Mark as only available in debug firmware.
    pub fn debug_only(mut self) -> Self {
        self.is_release = false;
        self
    }
}
