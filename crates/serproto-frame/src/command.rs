//! Command name ↔ id registry.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{FrameError, Result};

/// One `name = id` pair of a command table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommandBinding {
    pub name: String,
    pub id: u8,
}

impl CommandBinding {
    pub fn new(name: impl Into<String>, id: u8) -> Self {
        Self {
            name: name.into(),
            id,
        }
    }
}

impl From<(&str, u8)> for CommandBinding {
    fn from((name, id): (&str, u8)) -> Self {
        Self::new(name, id)
    }
}

impl From<(String, u8)> for CommandBinding {
    fn from((name, id): (String, u8)) -> Self {
        Self::new(name, id)
    }
}

/// Parses `NAME=ID`, with the id in decimal or `0x` hex.
impl FromStr for CommandBinding {
    type Err = FrameError;

    fn from_str(input: &str) -> Result<Self> {
        let invalid = |reason: &str| FrameError::InvalidBinding {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let (name, id) = input
            .split_once('=')
            .ok_or_else(|| invalid("expected NAME=ID"))?;
        let name = name.trim();
        let id = id.trim();
        if name.is_empty() {
            return Err(invalid("command name must not be empty"));
        }

        let id = match id.strip_prefix("0x").or_else(|| id.strip_prefix("0X")) {
            Some(hex) => u8::from_str_radix(hex, 16),
            None => id.parse::<u8>(),
        }
        .map_err(|_| invalid("id must be an integer in 0..=255"))?;

        Ok(Self::new(name, id))
    }
}

/// Key a decoded frame is dispatched under.
///
/// Ids without a binding are not an error: they surface as `Raw` so the
/// receiver can still observe them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CommandKey {
    Named(String),
    Raw(u8),
}

impl CommandKey {
    /// The command name, if the id was bound.
    pub fn name(&self) -> Option<&str> {
        match self {
            CommandKey::Named(name) => Some(name),
            CommandKey::Raw(_) => None,
        }
    }

    pub fn is_named(&self) -> bool {
        matches!(self, CommandKey::Named(_))
    }
}

impl fmt::Display for CommandKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandKey::Named(name) => f.write_str(name),
            CommandKey::Raw(id) => write!(f, "{id}"),
        }
    }
}

/// Immutable bijection between command names and single-byte ids.
#[derive(Debug, Clone)]
pub struct CommandTable {
    bindings: Vec<CommandBinding>,
    by_name: HashMap<String, u8>,
    by_id: HashMap<u8, String>,
}

impl CommandTable {
    /// Build a table from ordered bindings.
    ///
    /// Fails with [`FrameError::DuplicateCommandBinding`] if a name or an id
    /// appears twice.
    pub fn new<I, B>(bindings: I) -> Result<Self>
    where
        I: IntoIterator<Item = B>,
        B: Into<CommandBinding>,
    {
        let mut table = Self {
            bindings: Vec::new(),
            by_name: HashMap::new(),
            by_id: HashMap::new(),
        };

        for binding in bindings {
            let binding = binding.into();
            if let Some(existing) = table.by_name.get(&binding.name) {
                return Err(FrameError::DuplicateCommandBinding {
                    reason: format!("name already bound to id {existing}"),
                    name: binding.name,
                    id: binding.id,
                });
            }
            if let Some(existing) = table.by_id.get(&binding.id) {
                return Err(FrameError::DuplicateCommandBinding {
                    reason: format!("id already bound to {existing}"),
                    name: binding.name,
                    id: binding.id,
                });
            }
            table.by_name.insert(binding.name.clone(), binding.id);
            table.by_id.insert(binding.id, binding.name.clone());
            table.bindings.push(binding);
        }

        Ok(table)
    }

    /// Id bound to `name`.
    pub fn id_for(&self, name: &str) -> Result<u8> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| FrameError::UnknownCommand(name.to_string()))
    }

    /// Name bound to `id`, if any.
    pub fn name_for(&self, id: u8) -> Option<&str> {
        self.by_id.get(&id).map(String::as_str)
    }

    /// Dispatch key for `id`, falling back to the raw id when unbound.
    pub fn key_for(&self, id: u8) -> CommandKey {
        match self.name_for(id) {
            Some(name) => CommandKey::Named(name.to_string()),
            None => CommandKey::Raw(id),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Bindings in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &CommandBinding> {
        self.bindings.iter()
    }

    /// Command names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bindings.iter().map(|binding| binding.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
