// ABOUTME: Unvalidated command declarations: handler, identifier, and ordered parameter types.
// ABOUTME: The table builder turns these into descriptors or rejects them at startup.

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

use crate::context::{Arguments, InvocationContext};
use crate::kind::{ArgValue, ArgumentType, TypeTag};

/// Code run when a command matches.
///
/// Each invocation runs on its own task; errors and panics are reported
/// per invocation and never reach the event stream.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn invoke(&self, ctx: InvocationContext, args: Arguments) -> anyhow::Result<()>;
}

/// Adapter turning an async closure into a [`CommandHandler`]
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F, Fut> CommandHandler for FnHandler<F>
where
    F: Fn(InvocationContext, Arguments) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn invoke(&self, ctx: InvocationContext, args: Arguments) -> anyhow::Result<()> {
        (self.0)(ctx, args).await
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDeclaration {
    pub name: String,
    pub ty: TypeTag,
    pub default: Option<ArgValue>,
}

/// A command as written by its author, before validation.
///
/// ```ignore
/// CommandDeclaration::from_fn("RollCommandAsync", roll)
///     .alias("r")
///     .param::<u32>("sides")
///     .param_with_default("count", 1u8)
///     .rest("label");
/// ```
#[derive(Clone)]
pub struct CommandDeclaration {
    pub(crate) identifier: String,
    pub(crate) name: Option<String>,
    pub(crate) aliases: Vec<String>,
    pub(crate) description: Option<String>,
    pub(crate) parameters: Vec<ParameterDeclaration>,
    pub(crate) handler: Arc<dyn CommandHandler>,
}

impl CommandDeclaration {
    /// `identifier` names the handler; the command name derives from it
    /// unless overridden with [`CommandDeclaration::named`].
    pub fn new(identifier: impl Into<String>, handler: impl CommandHandler + 'static) -> Self {
        Self {
            identifier: identifier.into(),
            name: None,
            aliases: Vec::new(),
            description: None,
            parameters: Vec::new(),
            handler: Arc::new(handler),
        }
    }

    pub fn from_fn<F, Fut>(identifier: impl Into<String>, handler: F) -> Self
    where
        F: Fn(InvocationContext, Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::new(identifier, FnHandler(handler))
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Next positional parameter typed by a Rust type
    pub fn param<T: ArgumentType>(self, name: impl Into<String>) -> Self {
        self.param_typed(name, TypeTag::of::<T>())
    }

    /// Optional parameter filled with `default` when no token is given
    pub fn param_with_default<T>(self, name: impl Into<String>, default: T) -> Self
    where
        T: ArgumentType + Into<ArgValue>,
    {
        self.param_typed_with_default(name, TypeTag::of::<T>(), default.into())
    }

    pub fn param_typed(mut self, name: impl Into<String>, ty: TypeTag) -> Self {
        self.parameters.push(ParameterDeclaration {
            name: name.into(),
            ty,
            default: None,
        });
        self
    }

    pub fn param_typed_with_default(
        mut self,
        name: impl Into<String>,
        ty: TypeTag,
        default: ArgValue,
    ) -> Self {
        self.parameters.push(ParameterDeclaration {
            name: name.into(),
            ty,
            default: Some(default),
        });
        self
    }

    /// Trailing parameter collecting the remaining tokens
    pub fn rest(self, name: impl Into<String>) -> Self {
        self.param_typed(name, TypeTag::rest())
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn parameters(&self) -> &[ParameterDeclaration] {
        &self.parameters
    }
}

impl std::fmt::Debug for CommandDeclaration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandDeclaration")
            .field("identifier", &self.identifier)
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}
