// ABOUTME: Prefix commands for the chat client: declarations, validated table, and invoker.
// ABOUTME: Arguments are typed per parameter and converted before a handler ever runs.

pub mod context;
pub mod declaration;
pub mod descriptor;
pub mod error;
pub mod invoker;
pub mod kind;
pub mod table;

pub use context::{Arguments, InvocationContext};
pub use declaration::{CommandDeclaration, CommandHandler, FnHandler, ParameterDeclaration};
pub use descriptor::{ArgumentDescriptor, CommandDescriptor, Optionality, RestDescriptor};
pub use error::{ConfigurationError, InvocationError};
pub use invoker::{CommandInvoker, CommandMatch, CommandOutcome, InvokerConfig};
pub use kind::{ArgValue, ArgumentKind, ArgumentType, FromArgValue, ParseError, TypeTag};
pub use table::{build, derive_name, CommandEntry, CommandTable, CommandTableBuilder};
