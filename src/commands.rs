//! Declared command surface of a bot.

use serde::Serialize;
use std::collections::HashSet;

use crate::platform::Permission;

/// Name of the option that member-targeting commands resolve before running.
pub const TARGET_OPTION: &str = "target";

/// Primitive type of a command option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionKind {
    String,
    Integer,
    Boolean,
    User,
    Channel,
    Role,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptionSpec {
    pub name: String,
    pub description: String,
    pub kind: OptionKind,
    pub required: bool,
    /// Fixed `(label, value)` choices for string options.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<(String, String)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<i64>,
}

impl OptionSpec {
    pub fn new(name: &str, description: &str, kind: OptionKind) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            kind,
            required: false,
            choices: Vec::new(),
            min: None,
            max: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn choice(mut self, label: &str, value: &str) -> Self {
        self.choices.push((label.to_string(), value.to_string()));
        self
    }

    pub fn range(mut self, min: i64, max: i64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }
}

/// The declared shape of one invocable command.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandSpec {
    pub name: String,
    pub description: String,
    pub options: Vec<OptionSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permission: Option<Permission>,
    /// The invoker must have opted into the command through the selection menu.
    #[serde(skip)]
    pub requires_opt_in: bool,
    /// The `target` option must resolve to a live guild member.
    #[serde(skip)]
    pub acts_on_member: bool,
    /// Replaces the router's default permission-denied text.
    #[serde(skip)]
    pub denied_message: Option<String>,
}

impl CommandSpec {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            options: Vec::new(),
            permission: None,
            requires_opt_in: false,
            acts_on_member: false,
            denied_message: None,
        }
    }

    pub fn option(mut self, option: OptionSpec) -> Self {
        self.options.push(option);
        self
    }

    pub fn permission(mut self, permission: Permission) -> Self {
        self.permission = Some(permission);
        self
    }

    pub fn denied_message(mut self, text: &str) -> Self {
        self.denied_message = Some(text.to_string());
        self
    }

    pub fn opt_in(mut self) -> Self {
        self.requires_opt_in = true;
        self
    }

    /// Adds the required `target` user option and marks the command as acting
    /// on that member.
    pub fn targets_member(mut self, description: &str) -> Self {
        self.options
            .push(OptionSpec::new(TARGET_OPTION, description, OptionKind::User).required());
        self.acts_on_member = true;
        self
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CommandSetError {
    #[error("duplicate command name: {0}")]
    DuplicateName(String),
    #[error("command name must be 1-32 lowercase characters: {0:?}")]
    InvalidName(String),
}

/// A bot's full command set, unique by name, fixed for the process lifetime.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandSet {
    specs: Vec<CommandSpec>,
}

impl CommandSet {
    pub fn new(specs: Vec<CommandSpec>) -> Result<Self, CommandSetError> {
        let mut seen = HashSet::new();
        for spec in &specs {
            if !valid_name(&spec.name) {
                return Err(CommandSetError::InvalidName(spec.name.clone()));
            }
            if !seen.insert(spec.name.as_str()) {
                return Err(CommandSetError::DuplicateName(spec.name.clone()));
            }
        }
        Ok(Self { specs })
    }

    pub fn get(&self, name: &str) -> Option<&CommandSpec> {
        self.specs.iter().find(|s| s.name == name)
    }

    pub fn specs(&self) -> &[CommandSpec] {
        &self.specs
    }

    pub fn names(&self) -> Vec<&str> {
        self.specs.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

fn valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 32
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
}
