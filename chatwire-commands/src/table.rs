// ABOUTME: Builds the immutable command table from declarations, validating every one up front.
// ABOUTME: Derives command names from handler identifiers and indexes names and aliases for lookup.

use std::collections::HashMap;
use std::sync::Arc;

use crate::declaration::{CommandDeclaration, CommandHandler};
use crate::descriptor::{ArgumentDescriptor, CommandDescriptor, Optionality, RestDescriptor};
use crate::error::ConfigurationError;
use crate::kind::ArgumentKind;

/// A validated command with its handler
#[derive(Clone)]
pub struct CommandEntry {
    pub descriptor: Arc<CommandDescriptor>,
    pub(crate) handler: Arc<dyn CommandHandler>,
}

/// Read-only set of commands, shared with the invoker behind an `Arc`.
#[derive(Clone, Default)]
pub struct CommandTable {
    entries: Vec<CommandEntry>,
    by_token: HashMap<String, usize>,
}

impl CommandTable {
    pub fn builder() -> CommandTableBuilder {
        CommandTableBuilder::default()
    }

    /// Look up by name or alias (case-sensitive)
    pub fn get(&self, token: &str) -> Option<&Arc<CommandDescriptor>> {
        self.resolve(token).map(|entry| &entry.descriptor)
    }

    pub(crate) fn resolve(&self, token: &str) -> Option<&CommandEntry> {
        self.by_token.get(token).map(|&i| &self.entries[i])
    }

    /// Commands in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<CommandDescriptor>> {
        self.entries.iter().map(|entry| &entry.descriptor)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Usage lines for every command, one per line
    pub fn help(&self, prefix: &str) -> String {
        self.iter()
            .map(|cmd| match &cmd.description {
                Some(description) => format!("{} - {}", cmd.usage(prefix), description),
                None => cmd.usage(prefix),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl std::fmt::Debug for CommandTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|entry| &entry.descriptor.name))
            .finish()
    }
}

#[derive(Default)]
pub struct CommandTableBuilder {
    declarations: Vec<CommandDeclaration>,
}

impl CommandTableBuilder {
    pub fn command(mut self, declaration: CommandDeclaration) -> Self {
        self.declarations.push(declaration);
        self
    }

    pub fn build(self) -> Result<CommandTable, ConfigurationError> {
        build(self.declarations)
    }
}

/// Validate every declaration and assemble the table.
///
/// The first invalid declaration aborts construction; the error names its
/// handler.
pub fn build(
    declarations: impl IntoIterator<Item = CommandDeclaration>,
) -> Result<CommandTable, ConfigurationError> {
    let mut table = CommandTable::default();

    for declaration in declarations {
        let descriptor = describe(&declaration)?;

        for token in std::iter::once(&descriptor.name).chain(&descriptor.aliases) {
            if let Some(&existing) = table.by_token.get(token) {
                // an index past the end means the clash is within this declaration
                let existing = table
                    .entries
                    .get(existing)
                    .map_or(&descriptor.name, |entry| &entry.descriptor.name);
                return Err(ConfigurationError::DuplicateName {
                    handler: declaration.identifier.clone(),
                    name: token.clone(),
                    existing: existing.clone(),
                });
            }
            table.by_token.insert(token.clone(), table.entries.len());
        }

        tracing::debug!(
            command = %descriptor.name,
            handler = %descriptor.handler,
            parameters = descriptor.parameters.len(),
            rest = descriptor.has_rest_parameter(),
            "Registered command"
        );
        table.entries.push(CommandEntry {
            descriptor: Arc::new(descriptor),
            handler: declaration.handler.clone(),
        });
    }

    Ok(table)
}

fn describe(declaration: &CommandDeclaration) -> Result<CommandDescriptor, ConfigurationError> {
    let handler = declaration.identifier.clone();

    let name = match &declaration.name {
        Some(name) => name.clone(),
        None => derive_name(&handler),
    };
    if name.is_empty() {
        return Err(ConfigurationError::EmptyName { handler });
    }
    for token in std::iter::once(&name).chain(&declaration.aliases) {
        if token.is_empty() || token.contains(char::is_whitespace) {
            return Err(ConfigurationError::InvalidName {
                handler,
                name: token.clone(),
            });
        }
    }

    let last = declaration.parameters.len().saturating_sub(1);
    let mut parameters = Vec::with_capacity(declaration.parameters.len());
    let mut rest = None;
    let mut seen_optional = false;

    for (index, param) in declaration.parameters.iter().enumerate() {
        if param.ty.is_rest() {
            if index != last {
                return Err(ConfigurationError::RestNotLast {
                    handler,
                    parameter: param.name.clone(),
                });
            }
            if param.default.is_some() {
                return Err(ConfigurationError::RestWithDefault {
                    handler,
                    parameter: param.name.clone(),
                });
            }
            rest = Some(RestDescriptor {
                index,
                name: param.name.clone(),
            });
            continue;
        }

        let kind = ArgumentKind::from_tag(param.ty.name()).ok_or_else(|| {
            ConfigurationError::UnsupportedType {
                handler: handler.clone(),
                parameter: param.name.clone(),
                type_name: param.ty.to_string(),
            }
        })?;

        if let Some(default) = &param.default {
            if default.kind() != kind {
                return Err(ConfigurationError::DefaultTypeMismatch {
                    handler,
                    parameter: param.name.clone(),
                    expected: kind,
                    actual: default.kind(),
                });
            }
        }

        let optionality = if param.ty.is_nullable() || param.default.is_some() {
            seen_optional = true;
            Optionality::Optional {
                default: param.default.clone(),
            }
        } else if seen_optional {
            return Err(ConfigurationError::RequiredAfterOptional {
                handler,
                parameter: param.name.clone(),
            });
        } else {
            Optionality::Required
        };

        parameters.push(ArgumentDescriptor {
            index,
            name: param.name.clone(),
            kind,
            optionality,
        });
    }

    let required_count = parameters
        .iter()
        .take_while(|p| !p.optionality.is_optional())
        .count();

    Ok(CommandDescriptor {
        handler,
        name,
        aliases: declaration.aliases.clone(),
        description: declaration.description.clone(),
        parameters,
        rest,
        required_count,
    })
}

/// Command name for a handler identifier: trailing `Async` then `Command`
/// (or `_async` / `_command`) removed, lower-cased.
pub fn derive_name(identifier: &str) -> String {
    let mut name = identifier.trim();
    for suffix in [["Async", "_async"], ["Command", "_command"]] {
        for candidate in suffix {
            if let Some(stripped) = name.strip_suffix(candidate) {
                name = stripped;
                break;
            }
        }
    }
    name.to_lowercase()
}
